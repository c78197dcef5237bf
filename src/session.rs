//! Per-session chat state.
//!
//! A [`SessionState`] owns everything one user sees: the append-only
//! transcript, the document and workflow selection, and where the session
//! is in its dispatch cycle:
//!
//! ```text
//!            select                 submit                answer
//!   Idle ───────────▶ AwaitingSelection ───▶ Dispatching ─────────▶ Idle
//!    │                                  ▲        │
//!    └──────────── submit ──────────────┼────────┤ failure
//!                                       │        ▼
//!                                       └──── Error ── dismiss ──▶ Idle
//! ```
//!
//! Sessions are independent values. The HTTP server keeps them in a
//! [`SessionStore`]; the terminal chat owns exactly one.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::config::{QueryScope, WorkflowConfig};
use crate::error::{ServiceError, SessionError};
use crate::models::{ChatMessage, DocumentRecord, QueryRequest, QueryResponse, Role};

/// Template used for document-scoped workflow queries when the configured
/// template does not mention the company.
const DOCUMENT_TEMPLATE: &str = "Show me the {workflow} for the {company} {city} project.";

/// Where a session is in its dispatch cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    AwaitingSelection,
    Dispatching,
    Error { message: String },
}

/// What to show under an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CitationView {
    Source {
        uri: String,
        context: Option<String>,
    },
    NoContext,
}

impl CitationView {
    /// Only the first reference of the first citation is consulted.
    pub fn from_response(response: &QueryResponse) -> Self {
        match response.primary_reference() {
            Some(reference) => match reference.source_uri {
                Some(ref uri) => CitationView::Source {
                    uri: uri.clone(),
                    context: reference.context_text.clone(),
                },
                None => CitationView::NoContext,
            },
            None => CitationView::NoContext,
        }
    }
}

/// One completed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub citation: CitationView,
}

/// Builds questions from a workflow option and a selected document.
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    template: String,
    scope: QueryScope,
}

impl QueryTemplate {
    pub fn new(template: impl Into<String>, scope: QueryScope) -> Self {
        Self {
            template: template.into(),
            scope,
        }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(config.template.clone(), config.scope)
    }

    /// Fill the template. The workflow label is lowercased, so
    /// `"Key contacts"` reads as `"... the key contacts for ..."`.
    pub fn build(&self, document: &DocumentRecord, workflow: &str) -> QueryRequest {
        let template = match self.scope {
            QueryScope::Document if !self.template.contains("{company}") => DOCUMENT_TEMPLATE,
            _ => self.template.as_str(),
        };
        let workflow = workflow.to_lowercase();
        let mut text = String::with_capacity(template.len() + 32);
        let mut rest = template;
        // Single left-to-right pass: substituted values are never rescanned.
        while let Some(open) = rest.find('{') {
            text.push_str(&rest[..open]);
            let tail = &rest[open..];
            let value = [
                ("{workflow}", workflow.as_str()),
                ("{company}", document.company.as_str()),
                ("{city}", document.city.as_str()),
            ]
            .into_iter()
            .find(|(placeholder, _)| tail.starts_with(placeholder));
            match value {
                Some((placeholder, value)) => {
                    text.push_str(value);
                    rest = &tail[placeholder.len()..];
                }
                None => {
                    text.push('{');
                    rest = &tail[1..];
                }
            }
        }
        text.push_str(rest);
        QueryRequest::new(text)
    }
}

impl Default for QueryTemplate {
    fn default() -> Self {
        Self::from_config(&WorkflowConfig::default())
    }
}

/// State of one user session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    id: Uuid,
    chat_history: Vec<ChatMessage>,
    selected_document: Option<DocumentRecord>,
    selected_workflow: Option<String>,
    chat_started: bool,
    phase: SessionPhase,
    last_turn: Option<Turn>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_history: Vec::new(),
            selected_document: None,
            selected_workflow: None,
            chat_started: false,
            phase: SessionPhase::Idle,
            last_turn: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.chat_history
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// Whether a question has ever been submitted in this session.
    pub fn chat_started(&self) -> bool {
        self.chat_started
    }

    pub fn selected_document(&self) -> Option<&DocumentRecord> {
        self.selected_document.as_ref()
    }

    pub fn selected_workflow(&self) -> Option<&str> {
        self.selected_workflow.as_deref()
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.last_turn.as_ref()
    }

    fn ensure_not_dispatching(&self) -> Result<(), SessionError> {
        if self.phase == SessionPhase::Dispatching {
            return Err(SessionError::Busy);
        }
        Ok(())
    }

    pub fn select_document(&mut self, document: DocumentRecord) -> Result<(), SessionError> {
        self.ensure_not_dispatching()?;
        self.selected_document = Some(document);
        self.phase = SessionPhase::AwaitingSelection;
        Ok(())
    }

    /// Select a workflow option; `label` must be one of `options`.
    pub fn select_workflow(&mut self, label: &str, options: &[String]) -> Result<(), SessionError> {
        self.ensure_not_dispatching()?;
        let option = options
            .iter()
            .find(|o| o.eq_ignore_ascii_case(label.trim()))
            .ok_or_else(|| SessionError::UnknownWorkflow(label.to_string()))?;
        self.selected_workflow = Some(option.clone());
        self.phase = SessionPhase::AwaitingSelection;
        Ok(())
    }

    /// Build the workflow question for the current selection.
    pub fn workflow_request(&self, template: &QueryTemplate) -> Result<QueryRequest, SessionError> {
        match (&self.selected_document, &self.selected_workflow) {
            (Some(document), Some(workflow)) => Ok(template.build(document, workflow)),
            _ => Err(SessionError::IncompleteSelection),
        }
    }

    /// Record the user's question and enter `Dispatching`.
    ///
    /// The text is forwarded as given; it is only checked for being blank.
    pub fn begin_turn(&mut self, text: &str) -> Result<QueryRequest, SessionError> {
        self.ensure_not_dispatching()?;
        if text.trim().is_empty() {
            return Err(SessionError::EmptyQuestion);
        }
        self.chat_started = true;
        self.chat_history.push(ChatMessage::user(text));
        self.phase = SessionPhase::Dispatching;
        Ok(QueryRequest::new(text))
    }

    /// Apply the dispatch outcome and leave `Dispatching`.
    ///
    /// On success the answer is appended and the session returns to `Idle`.
    /// On failure nothing is appended and the session enters `Error`,
    /// keeping the user's question in the transcript.
    pub fn finish_turn(
        &mut self,
        outcome: Result<QueryResponse, ServiceError>,
    ) -> Result<Turn, ServiceError> {
        let question = self
            .chat_history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text.clone())
            .unwrap_or_default();

        match outcome {
            Ok(response) => {
                let turn = Turn {
                    question,
                    citation: CitationView::from_response(&response),
                    answer: response.answer_text,
                };
                self.chat_history.push(ChatMessage::assistant(turn.answer.clone()));
                self.last_turn = Some(turn.clone());
                self.phase = SessionPhase::Idle;
                Ok(turn)
            }
            Err(err) => {
                self.phase = SessionPhase::Error {
                    message: err.to_string(),
                };
                Err(err)
            }
        }
    }

    /// Clear an error so the user can try again. Selections are kept.
    pub fn dismiss_error(&mut self) {
        if let SessionPhase::Error { .. } = self.phase {
            self.phase = SessionPhase::Idle;
        }
    }
}

/// In-memory registry of live sessions, keyed by id.
///
/// Nothing is shared between sessions; removing one discards its state.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, SessionState>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, SessionState>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn create(&self) -> Uuid {
        let session = SessionState::new();
        let id = session.id();
        self.lock().insert(id, session);
        tracing::debug!(session = %id, "session started");
        id
    }

    /// Run `f` against a session, or return `None` if it does not exist.
    pub fn with<R>(&self, id: Uuid, f: impl FnOnce(&mut SessionState) -> R) -> Option<R> {
        self.lock().get_mut(&id).map(f)
    }

    pub fn snapshot(&self, id: Uuid) -> Option<SessionState> {
        self.lock().get(&id).cloned()
    }

    pub fn remove(&self, id: Uuid) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(session = %id, "session ended");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Citation, RetrievedReference};

    fn acme_berlin() -> DocumentRecord {
        DocumentRecord {
            company: "Acme".to_string(),
            city: "Berlin".to_string(),
            key: "Acme_Berlin.pdf".to_string(),
        }
    }

    fn options() -> Vec<String> {
        WorkflowConfig::default().options
    }

    fn answer(text: &str, uri: Option<&str>) -> QueryResponse {
        QueryResponse {
            answer_text: text.to_string(),
            citations: vec![Citation {
                references: uri
                    .map(|u| RetrievedReference {
                        source_uri: Some(u.to_string()),
                        context_text: Some("excerpt".to_string()),
                    })
                    .into_iter()
                    .collect(),
            }],
        }
    }

    #[test]
    fn test_workflow_query_uses_city() {
        let mut session = SessionState::new();
        session.select_document(acme_berlin()).unwrap();
        session.select_workflow("Key contacts", &options()).unwrap();
        let request = session.workflow_request(&QueryTemplate::default()).unwrap();
        assert_eq!(request.text, "Show me the key contacts for Berlin projects.");
    }

    #[test]
    fn test_workflow_query_document_scope() {
        let template = QueryTemplate::new(WorkflowConfig::default().template, QueryScope::Document);
        let request = template.build(&acme_berlin(), "Tech used");
        assert_eq!(request.text, "Show me the tech used for the Acme Berlin project.");
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let template = QueryTemplate::new(
            "{workflow} of {company} in {city} {unknown} {",
            QueryScope::Document,
        );
        let document = DocumentRecord {
            company: "X{city}".to_string(),
            city: "{workflow}".to_string(),
            key: "X{city}_{workflow}.pdf".to_string(),
        };
        let request = template.build(&document, "Tech {company}");
        assert_eq!(
            request.text,
            "tech {company} of X{city} in {workflow} {unknown} {"
        );
    }

    #[test]
    fn test_workflow_requires_both_selections() {
        let mut session = SessionState::new();
        assert_eq!(
            session.workflow_request(&QueryTemplate::default()),
            Err(SessionError::IncompleteSelection)
        );
        session.select_document(acme_berlin()).unwrap();
        assert_eq!(
            session.workflow_request(&QueryTemplate::default()),
            Err(SessionError::IncompleteSelection)
        );
        assert_eq!(session.phase(), &SessionPhase::AwaitingSelection);
    }

    #[test]
    fn test_unknown_workflow_rejected() {
        let mut session = SessionState::new();
        assert_eq!(
            session.select_workflow("Budget", &options()),
            Err(SessionError::UnknownWorkflow("Budget".to_string()))
        );
        assert_eq!(session.phase(), &SessionPhase::Idle);
    }

    #[test]
    fn test_successful_turn_appends_two_messages() {
        let mut session = SessionState::new();
        assert!(!session.chat_started());

        let request = session.begin_turn("Who was the architect?").unwrap();
        assert_eq!(request.text, "Who was the architect?");
        assert_eq!(session.phase(), &SessionPhase::Dispatching);
        assert!(session.chat_started());

        let turn = session
            .finish_turn(Ok(answer("Jane Doe", Some("s3://b/Acme_Berlin.pdf"))))
            .unwrap();
        assert_eq!(
            turn.citation,
            CitationView::Source {
                uri: "s3://b/Acme_Berlin.pdf".to_string(),
                context: Some("excerpt".to_string()),
            }
        );
        assert_eq!(
            session.history(),
            &[
                ChatMessage::user("Who was the architect?"),
                ChatMessage::assistant("Jane Doe"),
            ]
        );
        assert_eq!(session.phase(), &SessionPhase::Idle);
    }

    #[test]
    fn test_empty_citations_render_no_context() {
        let mut session = SessionState::new();
        session.begin_turn("q").unwrap();
        let turn = session.finish_turn(Ok(answer("a", None))).unwrap();
        assert_eq!(turn.citation, CitationView::NoContext);
    }

    #[test]
    fn test_failed_turn_keeps_question_only() {
        let mut session = SessionState::new();
        session.select_document(acme_berlin()).unwrap();
        session.begin_turn("q").unwrap();
        let err = session
            .finish_turn(Err(ServiceError::Unavailable("connection refused".into())))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert_eq!(session.history(), &[ChatMessage::user("q")]);
        assert!(matches!(session.phase(), SessionPhase::Error { .. }));
        assert_eq!(session.selected_document(), Some(&acme_berlin()));

        session.dismiss_error();
        assert_eq!(session.phase(), &SessionPhase::Idle);
        session.begin_turn("q again").unwrap();
    }

    #[test]
    fn test_busy_while_dispatching() {
        let mut session = SessionState::new();
        session.begin_turn("first").unwrap();
        assert_eq!(session.begin_turn("second"), Err(SessionError::Busy));
        assert_eq!(session.select_document(acme_berlin()), Err(SessionError::Busy));
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_blank_question_rejected() {
        let mut session = SessionState::new();
        assert_eq!(session.begin_turn("   "), Err(SessionError::EmptyQuestion));
        assert!(session.history().is_empty());
        assert!(!session.chat_started());
    }

    #[test]
    fn test_transcript_is_append_only() {
        let mut session = SessionState::new();
        for q in ["same", "same", "other"] {
            session.begin_turn(q).unwrap();
            session.finish_turn(Ok(answer("a", None))).unwrap();
        }
        let roles: Vec<Role> = session.history().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant
            ]
        );
        assert_eq!(session.history()[2].text, "same");
    }

    #[test]
    fn test_store_isolates_sessions() {
        let store = SessionStore::new();
        let a = store.create();
        let b = store.create();
        assert_ne!(a, b);

        store.with(a, |s| s.begin_turn("only in a").map(|_| ())).unwrap().unwrap();
        assert_eq!(store.snapshot(a).unwrap().history().len(), 1);
        assert!(store.snapshot(b).unwrap().history().is_empty());

        assert!(store.remove(a));
        assert!(!store.remove(a));
        assert!(store.with(a, |_| ()).is_none());
        assert_eq!(store.len(), 1);
    }
}
