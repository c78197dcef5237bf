//! Seams between the tracker and the two managed services it consumes.
//!
//! ```text
//!   ┌──────────────┐           ┌────────────────┐
//!   │ ObjectStore  │──pages──▶ │ catalog lister │
//!   │ (S3)         │           └───────┬────────┘
//!   └──────────────┘                   ▼
//!                              ┌────────────────┐      ┌───────────────┐
//!                              │ session/ctrl   │─────▶│ KnowledgeBase │
//!                              └────────────────┘      │ (Bedrock)     │
//!                                                      └───────────────┘
//! ```
//!
//! The production implementations live in [`crate::s3`] and
//! [`crate::bedrock`]. Tests substitute in-memory ones.

use async_trait::async_trait;

use crate::error::{CatalogError, ServiceError};
use crate::models::{QueryRequest, QueryResponse};

/// One page of an object listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    /// Present when the listing is truncated and another page follows.
    pub next_token: Option<String>,
}

/// An object store that lists keys page by page.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one page of keys in `bucket`, continuing from `continuation`.
    async fn list_page(
        &self,
        bucket: &str,
        continuation: Option<&str>,
    ) -> Result<ObjectPage, CatalogError>;
}

/// A managed retrieve-and-generate service.
///
/// Implementations forward `request.text` verbatim and return the
/// service's answer verbatim.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn retrieve_and_generate(
        &self,
        request: &QueryRequest,
    ) -> Result<QueryResponse, ServiceError>;
}
