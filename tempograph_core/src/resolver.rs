//! Entity resolution primitives.
//!
//! Pure merge-or-create matching: exact case-insensitive name match wins
//! outright; otherwise the best cosine match above the configured threshold
//! is proposed as a fuzzy candidate for confirmation. The bias is toward
//! false negatives (duplicate entities) over false positives (wrongly merged
//! entities), so a fuzzy proposal is never a merge by itself.

use serde::{Deserialize, Serialize};

use crate::types::{Entity, EntityId};

/// Default cosine similarity threshold for fuzzy match proposals.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.85;

/// Resolution tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Minimum cosine similarity for a fuzzy match proposal.
    pub similarity_threshold: f32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// Outcome of matching one extracted candidate against stored entities.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchDecision {
    /// Exact case-insensitive name match. Merge unconditionally.
    Exact(EntityId),
    /// Embedding similarity above threshold. Merge only after the language
    /// model confirms the two names denote the same real-world object.
    Fuzzy { id: EntityId, name: String, score: f32 },
    /// No acceptable match. Create a new entity.
    New,
}

/// Cosine similarity of two vectors. Returns 0.0 for mismatched lengths or
/// zero-magnitude inputs rather than propagating a NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Match a candidate name (with an optional embedding) against the stored
/// entities of its partition.
///
/// `stored` should already be restricted to one partition; resolution never
/// looks across tenants.
pub fn match_candidate(
    name: &str,
    embedding: Option<&[f32]>,
    stored: &[Entity],
    config: &ResolverConfig,
) -> MatchDecision {
    let needle = name.to_lowercase();
    if let Some(exact) = stored.iter().find(|e| e.name.to_lowercase() == needle) {
        return MatchDecision::Exact(exact.id);
    }

    let Some(query) = embedding else {
        return MatchDecision::New;
    };

    let mut best: Option<(&Entity, f32)> = None;
    for entity in stored {
        let Some(stored_vec) = entity.embedding.as_deref() else {
            continue;
        };
        let score = cosine_similarity(query, stored_vec);
        if score >= config.similarity_threshold
            && best.map_or(true, |(_, best_score)| score > best_score)
        {
            best = Some((entity, score));
        }
    }

    match best {
        Some((entity, score)) => MatchDecision::Fuzzy {
            id: entity.id,
            name: entity.name.clone(),
            score,
        },
        None => MatchDecision::New,
    }
}
