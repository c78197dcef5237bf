//! Document catalog lister.
//!
//! Enumerates the project documents in the bucket by naming convention:
//! every key ending in the recognized extension and shaped like
//! `<company>_<city>.<ext>` becomes a [`DocumentRecord`]. Anything else is
//! skipped without being reported.
//!
//! The catalog is never cached; each call re-lists the bucket, following
//! continuation tokens until the store reports no more pages.

use std::sync::Arc;

use crate::config::{CatalogConfig, Config};
use crate::error::CatalogError;
use crate::models::DocumentRecord;
use crate::traits::ObjectStore;

/// How object keys are turned into documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Recognized suffix, including the dot.
    pub extension: String,
    /// Remove the extension from the city segment.
    pub strip_extension: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            extension: ".pdf".to_string(),
            strip_extension: true,
        }
    }
}

impl From<&CatalogConfig> for ParseOptions {
    fn from(config: &CatalogConfig) -> Self {
        Self {
            extension: config.extension.clone(),
            strip_extension: config.strip_extension,
        }
    }
}

/// Parse one object key, or `None` when it does not follow the convention.
///
/// Only the first two `_`-separated segments are used; further segments
/// are ignored.
pub fn parse_document_key(key: &str, options: &ParseOptions) -> Option<DocumentRecord> {
    if !key.ends_with(&options.extension) {
        return None;
    }

    let mut parts = key.split('_');
    let company = parts.next()?;
    let city = parts.next()?;

    let city = if options.strip_extension {
        city.strip_suffix(options.extension.as_str()).unwrap_or(city)
    } else {
        city
    };

    Some(DocumentRecord {
        company: company.to_string(),
        city: city.to_string(),
        key: key.to_string(),
    })
}

/// List every document in `bucket`.
///
/// # Errors
///
/// Returns the first [`CatalogError`] raised by the store; partial results
/// are discarded.
pub async fn list_documents(
    store: &dyn ObjectStore,
    bucket: &str,
    options: &ParseOptions,
) -> Result<Vec<DocumentRecord>, CatalogError> {
    let mut documents = Vec::new();
    let mut continuation: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = store.list_page(bucket, continuation.as_deref()).await?;
        pages += 1;

        for key in &page.keys {
            match parse_document_key(key, options) {
                Some(doc) => documents.push(doc),
                None => tracing::debug!(key = %key, "skipping object outside naming convention"),
            }
        }

        match page.next_token {
            Some(token) if continuation.as_deref() == Some(token.as_str()) => {
                return Err(CatalogError::Malformed(format!(
                    "continuation token repeated: {}",
                    token
                )));
            }
            Some(token) => continuation = Some(token),
            None => break,
        }
    }

    tracing::debug!(bucket, pages, documents = documents.len(), "catalog listed");
    Ok(documents)
}

/// The configured bucket and parsing rules bound to an [`ObjectStore`].
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    options: ParseOptions,
}

impl Catalog {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, options: ParseOptions) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            options,
        }
    }

    pub fn from_config(store: Arc<dyn ObjectStore>, config: &Config) -> Self {
        Self::new(
            store,
            config.catalog.bucket.clone(),
            ParseOptions::from(&config.catalog),
        )
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn list(&self) -> Result<Vec<DocumentRecord>, CatalogError> {
        list_documents(self.store.as_ref(), &self.bucket, &self.options).await
    }

    /// Re-list the bucket and look up one document by its full key.
    pub async fn find(&self, key: &str) -> Result<Option<DocumentRecord>, CatalogError> {
        Ok(self.list().await?.into_iter().find(|doc| doc.key == key))
    }
}
