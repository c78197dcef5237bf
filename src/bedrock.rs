//! Query dispatcher for the Bedrock knowledge base.
//!
//! Forwards a question verbatim to the `RetrieveAndGenerate` API of Bedrock
//! Agent Runtime with a fixed knowledge base and generation model, and
//! returns the synthesized answer with its citations verbatim.
//!
//! # Request
//!
//! ```json
//! {
//!   "input": { "text": "Who was the architect on Berlin project?" },
//!   "retrieveAndGenerateConfiguration": {
//!     "type": "KNOWLEDGE_BASE",
//!     "knowledgeBaseConfiguration": { "knowledgeBaseId": "...", "modelArn": "..." }
//!   }
//! }
//! ```
//!
//! # Error Mapping
//!
//! | Reply | [`ServiceError`] |
//! |-------|------------------|
//! | HTTP 401 / 403 | `Unauthorized` |
//! | HTTP 429 | `RateLimited` |
//! | HTTP 5xx, network error, timeout | `Unavailable` |
//! | other HTTP 4xx, undecodable body | `MalformedResponse` |
//!
//! # Retry Strategy
//!
//! Only `RateLimited` and `Unavailable` are retried, and only once when
//! `knowledge_base.max_retries = 1` (the default), after a 1s pause.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::aws::{sign_request, AwsCredentials, Endpoint, SigningInput};
use crate::config::Config;
use crate::error::ServiceError;
use crate::models::{Citation, QueryRequest, QueryResponse, RetrievedReference};
use crate::traits::KnowledgeBase;

const RETRIEVE_AND_GENERATE_PATH: &str = "/retrieveAndGenerate";
const SIGNING_SERVICE: &str = "bedrock";

// ============ Wire format ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveAndGenerateBody<'a> {
    input: InputText<'a>,
    retrieve_and_generate_configuration: GenerateConfiguration<'a>,
}

#[derive(Serialize)]
struct InputText<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateConfiguration<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    knowledge_base_configuration: KnowledgeBaseConfiguration<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KnowledgeBaseConfiguration<'a> {
    knowledge_base_id: &'a str,
    model_arn: &'a str,
}

#[derive(Deserialize)]
struct WireResponse {
    output: WireOutput,
    #[serde(default)]
    citations: Vec<WireCitation>,
}

#[derive(Deserialize)]
struct WireOutput {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCitation {
    #[serde(default)]
    retrieved_references: Vec<WireReference>,
}

#[derive(Deserialize)]
struct WireReference {
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    location: Option<WireLocation>,
}

#[derive(Deserialize)]
struct WireContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLocation {
    #[serde(default)]
    s3_location: Option<WireS3Location>,
}

#[derive(Deserialize)]
struct WireS3Location {
    uri: String,
}

impl From<WireResponse> for QueryResponse {
    fn from(wire: WireResponse) -> Self {
        let citations = wire
            .citations
            .into_iter()
            .map(|c| Citation {
                references: c
                    .retrieved_references
                    .into_iter()
                    .map(|r| RetrievedReference {
                        source_uri: r.location.and_then(|l| l.s3_location).map(|s3| s3.uri),
                        context_text: r.content.and_then(|c| c.text),
                    })
                    .collect(),
            })
            .collect();

        QueryResponse {
            answer_text: wire.output.text,
            citations,
        }
    }
}

/// Decode a `RetrieveAndGenerate` reply body.
pub fn parse_response(body: &[u8]) -> Result<QueryResponse, ServiceError> {
    serde_json::from_slice::<WireResponse>(body)
        .map(QueryResponse::from)
        .map_err(|e| ServiceError::MalformedResponse(e.to_string()))
}

/// Map a non-success HTTP status to a [`ServiceError`].
pub fn classify_status(status: u16, body: &str) -> ServiceError {
    let detail = format!("HTTP {}: {}", status, body.chars().take(300).collect::<String>());
    match status {
        401 | 403 => ServiceError::Unauthorized(detail),
        429 => ServiceError::RateLimited(detail),
        500..=599 => ServiceError::Unavailable(detail),
        _ => ServiceError::MalformedResponse(detail),
    }
}

// ============ Client ============

/// Signed `RetrieveAndGenerate` client implementing [`KnowledgeBase`].
pub struct BedrockKnowledgeBase {
    client: reqwest::Client,
    creds: AwsCredentials,
    region: String,
    endpoint: Endpoint,
    knowledge_base_id: String,
    model_arn: String,
    max_retries: u32,
    backoff: Duration,
}

impl BedrockKnowledgeBase {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config, creds: AwsCredentials) -> anyhow::Result<Self> {
        let kb = &config.knowledge_base;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(kb.timeout_secs))
            .build()?;

        let endpoint = match kb.endpoint_url {
            Some(ref url) => Endpoint::parse(url),
            None => Endpoint::https(format!(
                "bedrock-agent-runtime.{}.amazonaws.com",
                config.aws.region
            )),
        };

        Ok(Self {
            client,
            creds,
            region: config.aws.region.clone(),
            endpoint,
            knowledge_base_id: kb.id.clone(),
            model_arn: kb.model_arn.clone(),
            max_retries: kb.max_retries,
            backoff: Duration::from_secs(1),
        })
    }

    /// Override the base delay between retries.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn request_body(&self, text: &str) -> Result<Vec<u8>, ServiceError> {
        let body = RetrieveAndGenerateBody {
            input: InputText { text },
            retrieve_and_generate_configuration: GenerateConfiguration {
                kind: "KNOWLEDGE_BASE",
                knowledge_base_configuration: KnowledgeBaseConfiguration {
                    knowledge_base_id: &self.knowledge_base_id,
                    model_arn: &self.model_arn,
                },
            },
        };
        serde_json::to_vec(&body).map_err(|e| ServiceError::MalformedResponse(e.to_string()))
    }

    async fn send_once(&self, payload: &[u8]) -> Result<QueryResponse, ServiceError> {
        let headers = sign_request(
            &self.creds,
            &SigningInput {
                method: "POST",
                host: &self.endpoint.host,
                canonical_uri: RETRIEVE_AND_GENERATE_PATH,
                canonical_query: "",
                payload,
                region: &self.region,
                service: SIGNING_SERVICE,
            },
            Utc::now(),
        );

        let url = format!("{}{}", self.endpoint.base_url, RETRIEVE_AND_GENERATE_PATH);
        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(payload.to_vec());
        for (name, value) in &headers {
            req = req.header(name, value);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;
        parse_response(&bytes)
    }
}

#[async_trait]
impl KnowledgeBase for BedrockKnowledgeBase {
    async fn retrieve_and_generate(
        &self,
        request: &QueryRequest,
    ) -> Result<QueryResponse, ServiceError> {
        let payload = self.request_body(&request.text)?;

        let mut attempt = 0;
        loop {
            match self.send_once(&payload).await {
                Ok(response) => {
                    tracing::debug!(
                        attempt,
                        citations = response.citations.len(),
                        "knowledge base answered"
                    );
                    return Ok(response);
                }
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff;
                    tracing::warn!(attempt, error = %err, ?delay, "retrying knowledge base call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
