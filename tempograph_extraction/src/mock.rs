//! Deterministic providers for tests.
//!
//! `MockExtractor` reads facts straight out of a pipe-delimited episode
//! format, so a test controls extraction output through the text it ingests:
//!
//! ```text
//! Alice | works_at | Acme | Alice works at Acme
//! Alice | joined | Acme | Alice joined Acme in March | 2024-03-01T00:00:00Z
//! ```
//!
//! Lines without pipes are ignored. Endpoint entities are emitted with type
//! "entity".

use async_trait::async_trait;
use chrono::DateTime;

use crate::{
    CandidateEntity, CandidateFact, EmbeddingProvider, ExtractionOutput, ExtractionProvider,
    ProviderError,
};

/// Scripted extraction provider.
pub struct MockExtractor {
    /// Answer for every equivalence question.
    pub confirm: bool,
    /// Fixed enhancement output; `None` leaves queries unchanged.
    pub enhanced: Option<String>,
    fail: bool,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            confirm: true,
            enhanced: None,
            fail: false,
        }
    }

    /// A provider whose `extract` always fails with a non-transient error.
    pub fn failing() -> Self {
        Self {
            confirm: true,
            enhanced: None,
            fail: true,
        }
    }

    pub fn with_confirm(mut self, confirm: bool) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_enhancement(mut self, enhanced: impl Into<String>) -> Self {
        self.enhanced = Some(enhanced.into());
        self
    }
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionProvider for MockExtractor {
    async fn extract(
        &self,
        text: &str,
        _context: &str,
    ) -> Result<ExtractionOutput, ProviderError> {
        if self.fail {
            return Err(ProviderError::Malformed("scripted failure".to_string()));
        }
        let mut output = ExtractionOutput::default();
        for line in text.lines() {
            let parts: Vec<&str> = line.split('|').map(str::trim).collect();
            if parts.len() < 4 {
                continue;
            }
            let (source, name, target, assertion) = (parts[0], parts[1], parts[2], parts[3]);
            if source.is_empty() || target.is_empty() {
                continue;
            }
            let valid_at = parts
                .get(4)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|dt| dt.to_utc());
            for endpoint in [source, target] {
                if !output.entities.iter().any(|e| e.name == endpoint) {
                    output.entities.push(CandidateEntity {
                        name: endpoint.to_string(),
                        entity_type: "entity".to_string(),
                    });
                }
            }
            output.facts.push(CandidateFact {
                source: source.to_string(),
                target: target.to_string(),
                name: name.to_string(),
                assertion: assertion.to_string(),
                valid_at,
            });
        }
        Ok(output)
    }

    async fn confirm_equivalence(&self, _left: &str, _right: &str) -> Result<bool, ProviderError> {
        Ok(self.confirm)
    }

    async fn enhance_query(&self, query: &str) -> Result<String, ProviderError> {
        Ok(self.enhanced.clone().unwrap_or_else(|| query.to_string()))
    }
}

/// Deterministic embedder: a seeded pseudo-vector derived from the text's
/// bytes, normalized to unit length. Same text, same vector.
pub struct MockEmbedder {
    dim: usize,
    fail: bool,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self { dim: 64, fail: false }
    }

    /// An embedder whose every call fails with a transient error.
    pub fn failing() -> Self {
        Self { dim: 64, fail: true }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if self.fail {
            return Err(ProviderError::Timeout);
        }
        let mut state: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.to_lowercase().bytes() {
            state ^= byte as u64;
            state = state.wrapping_mul(0x0000_0100_0000_01b3);
        }
        let mut vec = Vec::with_capacity(self.dim);
        for _ in 0..self.dim {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            vec.push(((state % 2000) as f32 / 1000.0) - 1.0);
        }
        let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        }
        Ok(vec)
    }
}
