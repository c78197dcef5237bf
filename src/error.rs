//! Typed errors for the catalog, the knowledge-base dispatcher, and sessions.
//!
//! Keys that do not follow the naming convention are not errors; the
//! catalog drops them silently. A reply without citations is not an error
//! either; it renders as "No Context".

use thiserror::Error;

/// Listing the document bucket failed.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("object listing request failed: {0}")]
    Request(String),

    #[error("object listing failed (HTTP {status}): {body}")]
    Status { status: u16, body: String },

    #[error("malformed object listing: {0}")]
    Malformed(String),
}

/// Calling the retrieve-and-generate endpoint failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("knowledge base rejected the credentials: {0}")]
    Unauthorized(String),

    #[error("knowledge base is rate limiting requests: {0}")]
    RateLimited(String),

    #[error("knowledge base unavailable: {0}")]
    Unavailable(String),

    #[error("malformed knowledge base response: {0}")]
    MalformedResponse(String),
}

impl ServiceError {
    /// Transient failures are the only ones worth a retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::RateLimited(_) | ServiceError::Unavailable(_))
    }

    /// Machine-readable code used by the HTTP error contract.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::RateLimited(_) => "rate_limited",
            ServiceError::Unavailable(_) => "unavailable",
            ServiceError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// A session event could not be applied in the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("a question is already being answered")]
    Busy,

    #[error("select both a document and a workflow first")]
    IncompleteSelection,

    #[error("unknown document: {0}")]
    UnknownDocument(String),

    #[error("unknown workflow option: {0}")]
    UnknownWorkflow(String),
}

/// Anything that can stop one pass of the dispatch-and-render cycle.
///
/// Caught at the presentation boundary (terminal chat, HTTP handler) and
/// shown to the user; the session stays usable.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
