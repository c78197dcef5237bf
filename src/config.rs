//! Configuration parsing and validation.
//!
//! Projects Tracker is configured via a TOML file (default `./config/tracker.toml`).
//! Every section is optional; omitted values fall back to the deployment the
//! tracker was built for (bucket `projectstracker` in `eu-west-3`).
//!
//! # Example
//!
//! ```toml
//! [aws]
//! region = "eu-west-3"
//!
//! [catalog]
//! bucket = "projectstracker"
//! extension = ".pdf"
//! strip_extension = true
//!
//! [knowledge_base]
//! id = "UCVNLTOZKW"
//! model_arn = "arn:aws:bedrock:eu-west-3::foundation-model/anthropic.claude-3-haiku-20240307-v1:0"
//! max_retries = 1
//!
//! [workflows]
//! options = ["Tech used", "Key contacts", "Delivery dates"]
//! template = "Show me the {workflow} for {city} projects."
//! scope = "city"
//!
//! [server]
//! bind = "127.0.0.1:8501"
//! ```
//!
//! AWS credentials are never read from this file; see [`crate::aws`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration structure.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,
    #[serde(default)]
    pub workflows: WorkflowConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AwsConfig {
    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
        }
    }
}

fn default_region() -> String {
    "eu-west-3".to_string()
}

/// Where project documents live and how their keys are parsed.
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Only keys ending with this suffix are documents.
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Remove the extension from the parsed city name.
    #[serde(default = "default_true")]
    pub strip_extension: bool,
    #[serde(default)]
    pub prefix: String,
    /// Custom endpoint for S3-compatible stores (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            extension: default_extension(),
            strip_extension: true,
            prefix: String::new(),
            endpoint_url: None,
        }
    }
}

fn default_bucket() -> String {
    "projectstracker".to_string()
}
fn default_extension() -> String {
    ".pdf".to_string()
}
fn default_true() -> bool {
    true
}

/// The managed knowledge base every question is forwarded to.
#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeBaseConfig {
    #[serde(default = "default_kb_id")]
    pub id: String,
    #[serde(default = "default_model_arn")]
    pub model_arn: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts after a rate-limited or unavailable reply.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            id: default_kb_id(),
            model_arn: default_model_arn(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            endpoint_url: None,
        }
    }
}

fn default_kb_id() -> String {
    "UCVNLTOZKW".to_string()
}
fn default_model_arn() -> String {
    "arn:aws:bedrock:eu-west-3::foundation-model/anthropic.claude-3-haiku-20240307-v1:0"
        .to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    1
}

/// Which part of the selected document a workflow query is scoped to.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryScope {
    /// "projects in this city"; the company is ignored.
    #[default]
    City,
    /// The single selected document, by company and city.
    Document,
}

/// Canned topics and the template that turns one into a question.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowConfig {
    #[serde(default = "default_workflow_options")]
    pub options: Vec<String>,
    /// Placeholders: `{workflow}`, `{city}`, `{company}`.
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default)]
    pub scope: QueryScope,
    #[serde(default = "default_sample_queries")]
    pub sample_queries: Vec<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            options: default_workflow_options(),
            template: default_template(),
            scope: QueryScope::City,
            sample_queries: default_sample_queries(),
        }
    }
}

fn default_workflow_options() -> Vec<String> {
    vec![
        "Tech used".to_string(),
        "Key contacts".to_string(),
        "Delivery dates".to_string(),
    ]
}
fn default_template() -> String {
    "Show me the {workflow} for {city} projects.".to_string()
}
fn default_sample_queries() -> Vec<String> {
    vec![
        "Who was the architect on Berlin project?".to_string(),
        "What technologies were used in Mumbai project?".to_string(),
        "What were the key dates for Tokyo project?".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

/// Load the configuration at `path`, or the built-in defaults when the
/// file does not exist. The result is always validated.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };
    validate(&config)?;
    Ok(config)
}

/// Parse a TOML document into a [`Config`] without validating it.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

pub fn validate(config: &Config) -> Result<()> {
    if config.aws.region.trim().is_empty() {
        bail!("aws.region must not be empty");
    }

    if config.catalog.bucket.trim().is_empty() {
        bail!("catalog.bucket must not be empty");
    }
    if !config.catalog.extension.starts_with('.') || config.catalog.extension.len() < 2 {
        bail!(
            "catalog.extension must look like '.pdf', got '{}'",
            config.catalog.extension
        );
    }

    if config.knowledge_base.id.trim().is_empty() {
        bail!("knowledge_base.id must not be empty");
    }
    if config.knowledge_base.model_arn.trim().is_empty() {
        bail!("knowledge_base.model_arn must not be empty");
    }
    if config.knowledge_base.timeout_secs == 0 {
        bail!("knowledge_base.timeout_secs must be > 0");
    }
    if config.knowledge_base.max_retries > 1 {
        bail!("knowledge_base.max_retries must be 0 or 1");
    }

    if config.workflows.options.is_empty() {
        bail!("workflows.options must list at least one option");
    }
    if !config.workflows.template.contains("{workflow}") {
        bail!("workflows.template must contain a {{workflow}} placeholder");
    }

    Ok(())
}
