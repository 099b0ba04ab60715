//! Extraction and embedding capability interfaces.
//!
//! The graph engine never talks to a language model directly; it depends on
//! the two traits here. [`ExtractionProvider`] turns episode text into
//! candidate entities and facts, confirms entity equivalence during fuzzy
//! resolution, and rewrites queries into keyword-rich form.
//! [`EmbeddingProvider`] produces vectors for resolution and semantic
//! ranking.
//!
//! Both traits are object-safe so the engine can hold `Arc<dyn ...>` and
//! tests can substitute the deterministic implementations in [`mock`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod mock;
pub mod openai;
pub mod retry;

pub use mock::{MockEmbedder, MockExtractor};
pub use openai::OpenAiProvider;
pub use retry::{with_retries, RetryPolicy};

/// An entity proposed by extraction, before resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEntity {
    pub name: String,
    /// Free-form type label; never a closed schema.
    #[serde(default = "default_entity_type")]
    pub entity_type: String,
}

fn default_entity_type() -> String {
    "entity".to_string()
}

/// A fact proposed by extraction. Endpoints are names, not ids; resolution
/// rewrites them before the store sees the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFact {
    pub source: String,
    pub target: String,
    /// Relationship type label, e.g. "works_at".
    pub name: String,
    /// Human-readable assertion text.
    pub assertion: String,
    /// Event time the text states for the relationship, when it states one.
    #[serde(default)]
    pub valid_at: Option<DateTime<Utc>>,
}

/// Everything extraction produced for one episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    #[serde(default)]
    pub entities: Vec<CandidateEntity>,
    #[serde(default)]
    pub facts: Vec<CandidateFact>,
}

/// Provider failure taxonomy. [`ProviderError::is_transient`] decides
/// whether a bounded retry is worthwhile.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider rate limited the request")]
    RateLimited,
    #[error("provider request timed out")]
    Timeout,
    #[error("provider authentication failed: {0}")]
    Auth(String),
    #[error("provider returned malformed output: {0}")]
    Malformed(String),
    #[error("provider api error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether retrying the same request can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited | ProviderError::Timeout | ProviderError::Network(_) => true,
            ProviderError::Api { status, .. } => *status >= 500,
            ProviderError::Auth(_) | ProviderError::Malformed(_) => false,
        }
    }
}

/// Language-model capability used by ingestion and search.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Extract candidate entities and facts from episode text. `context` is
    /// assembled by the caller from recent episodes and tenant hints.
    async fn extract(&self, text: &str, context: &str)
        -> Result<ExtractionOutput, ProviderError>;

    /// Whether two entity names denote the same real-world object. Gates
    /// fuzzy resolution merges.
    async fn confirm_equivalence(&self, left: &str, right: &str) -> Result<bool, ProviderError>;

    /// Rewrite a natural-language question into a keyword-rich query.
    async fn enhance_query(&self, query: &str) -> Result<String, ProviderError>;
}

/// Embedding capability used by resolution and semantic ranking.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}
