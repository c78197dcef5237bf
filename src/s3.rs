//! Amazon S3 object listing.
//!
//! Lists object keys in a bucket using the `ListObjectsV2` REST API with
//! AWS Signature V4 authentication. One call returns one page; the catalog
//! lister follows continuation tokens until the listing is complete.
//!
//! Supports custom endpoints for S3-compatible services (MinIO, LocalStack).
//! With a custom endpoint the bucket is addressed path-style
//! (`<endpoint>/<bucket>?list-type=2`), otherwise virtual-hosted style
//! (`https://<bucket>.s3.<region>.amazonaws.com/?list-type=2`).
//!
//! # Configuration
//!
//! ```toml
//! [aws]
//! region = "eu-west-3"
//!
//! [catalog]
//! bucket = "projectstracker"
//! prefix = ""
//! # endpoint_url = "http://localhost:9000"   # MinIO
//! ```

use async_trait::async_trait;
use chrono::Utc;
use quick_xml::events::Event;

use crate::aws::{canonical_query, sign_request, uri_encode, AwsCredentials, Endpoint, SigningInput};
use crate::config::Config;
use crate::error::CatalogError;
use crate::traits::{ObjectPage, ObjectStore};

/// Keys requested per `ListObjectsV2` page.
const PAGE_SIZE: u32 = 1000;

/// A signed `ListObjectsV2` client implementing [`ObjectStore`].
pub struct S3Client {
    client: reqwest::Client,
    creds: AwsCredentials,
    region: String,
    prefix: String,
    endpoint_url: Option<String>,
}

impl S3Client {
    pub fn new(config: &Config, creds: AwsCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            creds,
            region: config.aws.region.clone(),
            prefix: config.catalog.prefix.clone(),
            endpoint_url: config.catalog.endpoint_url.clone(),
        }
    }

    /// Endpoint and canonical URI for a bucket.
    fn locate(&self, bucket: &str) -> (Endpoint, String) {
        match self.endpoint_url {
            Some(ref url) => (Endpoint::parse(url), format!("/{}", uri_encode(bucket))),
            None => (
                Endpoint::https(format!("{}.s3.{}.amazonaws.com", bucket, self.region)),
                "/".to_string(),
            ),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn list_page(
        &self,
        bucket: &str,
        continuation: Option<&str>,
    ) -> Result<ObjectPage, CatalogError> {
        let mut params = vec![
            ("list-type".to_string(), "2".to_string()),
            ("max-keys".to_string(), PAGE_SIZE.to_string()),
        ];
        if !self.prefix.is_empty() {
            params.push(("prefix".to_string(), self.prefix.clone()));
        }
        if let Some(token) = continuation {
            params.push(("continuation-token".to_string(), token.to_string()));
        }

        let (endpoint, canonical_uri) = self.locate(bucket);
        let query = canonical_query(&params);
        let headers = sign_request(
            &self.creds,
            &SigningInput {
                method: "GET",
                host: &endpoint.host,
                canonical_uri: &canonical_uri,
                canonical_query: &query,
                payload: b"",
                region: &self.region,
                service: "s3",
            },
            Utc::now(),
        );

        let url = format!("{}{}?{}", endpoint.base_url, canonical_uri, query);
        let mut req = self.client.get(&url);
        for (name, value) in &headers {
            req = req.header(name, value);
        }

        tracing::debug!(bucket, continuation = continuation.is_some(), "listing objects");

        let resp = req.send().await.map_err(|e| {
            CatalogError::Request(format!("failed to list s3://{}/{}: {}", bucket, self.prefix, e))
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CatalogError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let xml = resp
            .text()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))?;
        parse_list_objects_response(&xml)
    }
}

/// Parse a `ListObjectsV2` XML response into an [`ObjectPage`].
///
/// Folder placeholder keys (ending in `/`) are skipped.
pub fn parse_list_objects_response(xml: &str) -> Result<ObjectPage, CatalogError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = ObjectPage::default();
    let mut is_truncated = false;
    let mut saw_root = false;
    let mut in_contents = false;
    let mut current: Option<Vec<u8>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                match name.as_slice() {
                    b"ListBucketResult" => saw_root = true,
                    b"Contents" => in_contents = true,
                    _ => {}
                }
                current = Some(name);
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| CatalogError::Malformed(e.to_string()))?;
                match current.as_deref() {
                    Some(b"Key") if in_contents => {
                        if !text.ends_with('/') {
                            page.keys.push(text.into_owned());
                        }
                    }
                    Some(b"IsTruncated") if !in_contents => is_truncated = text == "true",
                    Some(b"NextContinuationToken") => page.next_token = Some(text.into_owned()),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"Contents" {
                    in_contents = false;
                }
                current = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(CatalogError::Malformed(e.to_string())),
            _ => {}
        }
    }

    if !saw_root {
        return Err(CatalogError::Malformed(
            "missing ListBucketResult element".to_string(),
        ));
    }
    if !is_truncated {
        page.next_token = None;
    } else if page.next_token.is_none() {
        return Err(CatalogError::Malformed(
            "listing is truncated but has no NextContinuationToken".to_string(),
        ));
    }

    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>projectstracker</Name>
  <KeyCount>3</KeyCount>
  <MaxKeys>1000</MaxKeys>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>1ueGcxLPRx1Tr/XYExHnhbYLgveDs2J/wm36Hy4vbOwM=</NextContinuationToken>
  <Contents>
    <Key>Acme_Berlin.pdf</Key>
    <LastModified>2024-03-07T10:00:00.000Z</LastModified>
    <ETag>"abc"</ETag>
    <Size>1024</Size>
  </Contents>
  <Contents>
    <Key>reports/</Key>
    <Size>0</Size>
  </Contents>
  <Contents>
    <Key>Smith &amp; Co_Paris.pdf</Key>
    <Size>10</Size>
  </Contents>
</ListBucketResult>"#;

    #[test]
    fn test_parse_truncated_page() {
        let page = parse_list_objects_response(PAGE).unwrap();
        assert_eq!(page.keys, vec!["Acme_Berlin.pdf", "Smith & Co_Paris.pdf"]);
        assert_eq!(
            page.next_token.as_deref(),
            Some("1ueGcxLPRx1Tr/XYExHnhbYLgveDs2J/wm36Hy4vbOwM=")
        );
    }

    #[test]
    fn test_parse_last_page() {
        let xml = r#"<ListBucketResult>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>Globex_Tokyo.pdf</Key></Contents>
</ListBucketResult>"#;
        let page = parse_list_objects_response(xml).unwrap();
        assert_eq!(page.keys, vec!["Globex_Tokyo.pdf"]);
        assert!(page.next_token.is_none());
    }

    #[test]
    fn test_parse_empty_bucket() {
        let xml = "<ListBucketResult><IsTruncated>false</IsTruncated><KeyCount>0</KeyCount></ListBucketResult>";
        let page = parse_list_objects_response(xml).unwrap();
        assert!(page.keys.is_empty());
    }

    #[test]
    fn test_parse_rejects_non_listing() {
        let xml = "<Error><Code>AccessDenied</Code></Error>";
        assert!(matches!(
            parse_list_objects_response(xml),
            Err(CatalogError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_rejects_truncated_without_token() {
        let xml = "<ListBucketResult><IsTruncated>true</IsTruncated></ListBucketResult>";
        assert!(matches!(
            parse_list_objects_response(xml),
            Err(CatalogError::Malformed(_))
        ));
    }

    #[test]
    fn test_locate_virtual_hosted_and_path_style() {
        let creds = AwsCredentials::new("a", "b", None);
        let mut config = Config::default();
        let client = S3Client::new(&config, creds.clone());
        let (endpoint, uri) = client.locate("projectstracker");
        assert_eq!(endpoint.host, "projectstracker.s3.eu-west-3.amazonaws.com");
        assert_eq!(uri, "/");

        config.catalog.endpoint_url = Some("http://localhost:9000".to_string());
        let client = S3Client::new(&config, creds);
        let (endpoint, uri) = client.locate("projectstracker");
        assert_eq!(endpoint.base_url, "http://localhost:9000");
        assert_eq!(uri, "/projectstracker");
    }
}
