//! Core data models used throughout Projects Tracker.
//!
//! These types represent the catalog entries, transcript messages, and
//! knowledge-base replies that flow between the catalog, the dispatcher,
//! and the session layer.

use serde::{Deserialize, Serialize};

/// A project document derived from an object key of the form
/// `<company>_<city>.<ext>`.
///
/// Never persisted; recomputed on every catalog listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub company: String,
    pub city: String,
    /// Full object key within the bucket.
    pub key: String,
}

impl DocumentRecord {
    /// Display label used by the document picker, e.g. `"Acme - Berlin"`.
    pub fn label(&self) -> String {
        format!("{} - {}", self.company, self.city)
    }
}

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// One entry of the append-only chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// A question about to be forwarded to the knowledge base.
///
/// Either raw user input or a string built from a workflow template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A single pointer from the generated answer back to a source excerpt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedReference {
    /// `location.s3Location.uri`; absent for non-S3 locations.
    pub source_uri: Option<String>,
    /// `content.text`, the excerpt that supported the answer.
    pub context_text: Option<String>,
}

/// A citation groups the references backing one part of the answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub references: Vec<RetrievedReference>,
}

/// The knowledge base's answer and its supporting citations, verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer_text: String,
    pub citations: Vec<Citation>,
}

impl QueryResponse {
    /// The only reference ever consulted: the first reference of the first
    /// citation.
    pub fn primary_reference(&self) -> Option<&RetrievedReference> {
        self.citations.first()?.references.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(uri: &str) -> RetrievedReference {
        RetrievedReference {
            source_uri: Some(uri.to_string()),
            context_text: None,
        }
    }

    #[test]
    fn test_label_joins_company_and_city() {
        let doc = DocumentRecord {
            company: "Acme".to_string(),
            city: "Berlin".to_string(),
            key: "Acme_Berlin.pdf".to_string(),
        };
        assert_eq!(doc.label(), "Acme - Berlin");
    }

    #[test]
    fn test_primary_reference_is_first_of_first() {
        let response = QueryResponse {
            answer_text: "a".to_string(),
            citations: vec![
                Citation {
                    references: vec![reference("s3://b/one.pdf"), reference("s3://b/two.pdf")],
                },
                Citation {
                    references: vec![reference("s3://b/three.pdf")],
                },
            ],
        };
        assert_eq!(
            response.primary_reference().unwrap().source_uri.as_deref(),
            Some("s3://b/one.pdf")
        );
    }

    #[test]
    fn test_primary_reference_absent() {
        let no_citations = QueryResponse {
            answer_text: "a".to_string(),
            citations: vec![],
        };
        assert!(no_citations.primary_reference().is_none());

        // Bedrock replies this way when nothing relevant was retrieved.
        let empty_citation = QueryResponse {
            answer_text: "a".to_string(),
            citations: vec![Citation::default()],
        };
        assert!(empty_citation.primary_reference().is_none());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
    }
}
