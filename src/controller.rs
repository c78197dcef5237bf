//! The dispatch-and-render cycle.
//!
//! Every user event (a typed question, a workflow request, a selection)
//! makes one linear pass: list the catalog if needed, build the question,
//! forward it to the knowledge base, and apply the outcome to the session.
//! The [`Controller`] holds the collaborators; the session is passed in by
//! reference so any number of sessions can share one controller.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{CatalogError, ServiceError, SessionError, TurnError};
use crate::models::{DocumentRecord, QueryRequest, QueryResponse};
use crate::session::{QueryTemplate, SessionState, Turn};
use crate::traits::{KnowledgeBase, ObjectStore};

#[derive(Clone)]
pub struct Controller {
    catalog: Catalog,
    knowledge_base: Arc<dyn KnowledgeBase>,
    template: QueryTemplate,
    workflow_options: Vec<String>,
    sample_queries: Vec<String>,
}

impl Controller {
    pub fn new(
        catalog: Catalog,
        knowledge_base: Arc<dyn KnowledgeBase>,
        template: QueryTemplate,
        workflow_options: Vec<String>,
        sample_queries: Vec<String>,
    ) -> Self {
        Self {
            catalog,
            knowledge_base,
            template,
            workflow_options,
            sample_queries,
        }
    }

    pub fn from_config(
        config: &Config,
        store: Arc<dyn ObjectStore>,
        knowledge_base: Arc<dyn KnowledgeBase>,
    ) -> Self {
        Self::new(
            Catalog::from_config(store, config),
            knowledge_base,
            QueryTemplate::from_config(&config.workflows),
            config.workflows.options.clone(),
            config.workflows.sample_queries.clone(),
        )
    }

    pub fn workflow_options(&self) -> &[String] {
        &self.workflow_options
    }

    pub fn sample_queries(&self) -> &[String] {
        &self.sample_queries
    }

    pub fn template(&self) -> &QueryTemplate {
        &self.template
    }

    /// Re-list the document catalog.
    pub async fn documents(&self) -> Result<Vec<DocumentRecord>, CatalogError> {
        self.catalog.list().await
    }

    /// Select a document by key. The catalog is re-listed so only documents
    /// that currently exist can be selected.
    pub async fn select_document(
        &self,
        session: &mut SessionState,
        key: &str,
    ) -> Result<DocumentRecord, TurnError> {
        let document = self
            .catalog
            .find(key)
            .await?
            .ok_or_else(|| SessionError::UnknownDocument(key.to_string()))?;
        session.select_document(document.clone())?;
        Ok(document)
    }

    pub fn select_workflow(&self, session: &mut SessionState, label: &str) -> Result<(), SessionError> {
        session.select_workflow(label, &self.workflow_options)
    }

    /// Forward one question to the knowledge base.
    pub async fn dispatch(&self, request: &QueryRequest) -> Result<QueryResponse, ServiceError> {
        tracing::info!(chars = request.text.len(), "dispatching question");
        let outcome = self.knowledge_base.retrieve_and_generate(request).await;
        if let Err(ref err) = outcome {
            tracing::warn!(error = %err, "knowledge base call failed");
        }
        outcome
    }

    /// Answer a free-text question within `session`.
    pub async fn ask(&self, session: &mut SessionState, text: &str) -> Result<Turn, TurnError> {
        let request = session.begin_turn(text)?;
        let outcome = self.dispatch(&request).await;
        Ok(session.finish_turn(outcome)?)
    }

    /// Answer the templated question for the session's current selection.
    pub async fn run_workflow(&self, session: &mut SessionState) -> Result<Turn, TurnError> {
        let request = session.workflow_request(&self.template)?;
        self.ask(session, &request.text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ParseOptions;
    use crate::models::{ChatMessage, Citation, RetrievedReference};
    use crate::session::{CitationView, SessionPhase};
    use crate::traits::ObjectPage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedStore(Vec<&'static str>);

    #[async_trait]
    impl ObjectStore for FixedStore {
        async fn list_page(
            &self,
            _bucket: &str,
            _continuation: Option<&str>,
        ) -> Result<ObjectPage, CatalogError> {
            Ok(ObjectPage {
                keys: self.0.iter().map(|k| k.to_string()).collect(),
                next_token: None,
            })
        }
    }

    /// Echoes the question back and records what it received.
    struct EchoKnowledgeBase {
        seen: Mutex<Vec<String>>,
        citation_uri: Option<&'static str>,
    }

    #[async_trait]
    impl KnowledgeBase for EchoKnowledgeBase {
        async fn retrieve_and_generate(
            &self,
            request: &QueryRequest,
        ) -> Result<QueryResponse, ServiceError> {
            self.seen.lock().unwrap().push(request.text.clone());
            Ok(QueryResponse {
                answer_text: format!("answer to: {}", request.text),
                citations: self
                    .citation_uri
                    .map(|uri| Citation {
                        references: vec![RetrievedReference {
                            source_uri: Some(uri.to_string()),
                            context_text: None,
                        }],
                    })
                    .into_iter()
                    .collect(),
            })
        }
    }

    struct DownKnowledgeBase;

    #[async_trait]
    impl KnowledgeBase for DownKnowledgeBase {
        async fn retrieve_and_generate(
            &self,
            _request: &QueryRequest,
        ) -> Result<QueryResponse, ServiceError> {
            Err(ServiceError::Unavailable("connection reset".to_string()))
        }
    }

    fn controller(kb: Arc<dyn KnowledgeBase>) -> Controller {
        let catalog = Catalog::new(
            Arc::new(FixedStore(vec!["Acme_Berlin.pdf", "Globex_Tokyo.pdf", "notes.txt"])),
            "projectstracker",
            ParseOptions::default(),
        );
        Controller::new(
            catalog,
            kb,
            QueryTemplate::default(),
            crate::config::WorkflowConfig::default().options,
            vec![],
        )
    }

    #[tokio::test]
    async fn test_ask_forwards_verbatim() {
        let kb = Arc::new(EchoKnowledgeBase {
            seen: Mutex::new(vec![]),
            citation_uri: Some("s3://projectstracker/Acme_Berlin.pdf"),
        });
        let ctrl = controller(kb.clone());
        let mut session = SessionState::new();

        let turn = ctrl.ask(&mut session, "  Who?  ").await.unwrap();
        assert_eq!(*kb.seen.lock().unwrap(), vec!["  Who?  ".to_string()]);
        assert_eq!(turn.answer, "answer to:   Who?  ");
        assert_eq!(
            turn.citation,
            CitationView::Source {
                uri: "s3://projectstracker/Acme_Berlin.pdf".to_string(),
                context: None
            }
        );
    }

    #[tokio::test]
    async fn test_workflow_end_to_end() {
        let kb = Arc::new(EchoKnowledgeBase {
            seen: Mutex::new(vec![]),
            citation_uri: None,
        });
        let ctrl = controller(kb.clone());
        let mut session = SessionState::new();

        let docs = ctrl.documents().await.unwrap();
        assert_eq!(docs.len(), 2);

        ctrl.select_document(&mut session, "Acme_Berlin.pdf").await.unwrap();
        ctrl.select_workflow(&mut session, "Key contacts").unwrap();
        let turn = ctrl.run_workflow(&mut session).await.unwrap();

        assert_eq!(
            *kb.seen.lock().unwrap(),
            vec!["Show me the key contacts for Berlin projects.".to_string()]
        );
        assert_eq!(turn.citation, CitationView::NoContext);
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_document_rejected() {
        let ctrl = controller(Arc::new(DownKnowledgeBase));
        let mut session = SessionState::new();
        let err = ctrl
            .select_document(&mut session, "notes.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Session(SessionError::UnknownDocument(_))));
        assert!(session.selected_document().is_none());
    }

    #[tokio::test]
    async fn test_dispatch_failure_keeps_user_message() {
        let ctrl = controller(Arc::new(DownKnowledgeBase));
        let mut session = SessionState::new();

        let err = ctrl.ask(&mut session, "Who?").await.unwrap_err();
        assert!(matches!(err, TurnError::Service(ServiceError::Unavailable(_))));
        assert_eq!(session.history(), &[ChatMessage::user("Who?")]);
        assert!(matches!(session.phase(), SessionPhase::Error { .. }));
    }
}
