//! Hybrid fact ranking.
//!
//! Combines three signals into one score per candidate fact:
//!
//! - **semantic**: cosine similarity between the query embedding and the
//!   fact's assertion embedding;
//! - **lexical**: BM25 over the candidate set, normalized by the best raw
//!   score so the component lands in `[0, 1]`. Document statistics are built
//!   from the candidates themselves, so one partition's corpus never leaks
//!   into another's scores;
//! - **graph**: hop-decayed proximity to the query's anchor entities.
//!
//! When no query embedding is available (degraded mode) the semantic
//! component is zero for every candidate and ranking proceeds on the other
//! two signals. Ties break toward the most recent event time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::resolver::cosine_similarity;
use crate::types::{EntityId, Fact};

/// Component weights and BM25 parameters for hybrid ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankWeights {
    /// Weight of the cosine similarity component. Default: 0.5.
    pub semantic: f32,
    /// Weight of the BM25 component. Default: 0.3.
    pub lexical: f32,
    /// Weight of the graph proximity component. Default: 0.2.
    pub graph: f32,
    /// BM25 term-frequency saturation. Default: 1.2.
    pub bm25_k1: f32,
    /// BM25 length normalization. Default: 0.75.
    pub bm25_b: f32,
    /// Per-hop decay of the proximity boost. Default: 0.5.
    pub hop_decay: f32,
    /// Maximum hops explored from anchor entities. Default: 2.
    pub max_hops: usize,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            semantic: 0.5,
            lexical: 0.3,
            graph: 0.2,
            bm25_k1: 1.2,
            bm25_b: 0.75,
            hop_decay: 0.5,
            max_hops: 2,
        }
    }
}

/// One fact entering ranking, with its graph proximity boost already
/// resolved (the better of its two endpoints).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub fact: Fact,
    pub graph_boost: f32,
}

impl Candidate {
    pub fn new(fact: Fact, graph_boost: f32) -> Self {
        Self { fact, graph_boost }
    }
}

/// A ranked fact with its component scores, for explainability.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub fact: Fact,
    pub score: f32,
    pub semantic: f32,
    pub lexical: f32,
    pub graph: f32,
}

/// Lowercase alphanumeric tokenization shared by queries and assertions.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Convert BFS hop distances into decayed proximity boosts. Distance 0
/// (an anchor itself) scores 1.0; each further hop multiplies by
/// `hop_decay`.
pub fn proximity_boosts(
    distances: &HashMap<EntityId, usize>,
    hop_decay: f32,
) -> HashMap<EntityId, f32> {
    distances
        .iter()
        .map(|(id, depth)| (*id, hop_decay.powi(*depth as i32)))
        .collect()
}

/// BM25 document statistics over one candidate set.
struct Bm25Context {
    doc_freq: HashMap<String, usize>,
    total_docs: usize,
    avg_doc_len: f32,
}

impl Bm25Context {
    fn build(docs: &[Vec<String>]) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;
        for doc in docs {
            total_len += doc.len();
            let mut seen: Vec<&String> = Vec::new();
            for token in doc {
                if !seen.contains(&token) {
                    seen.push(token);
                    *doc_freq.entry(token.clone()).or_insert(0) += 1;
                }
            }
        }
        let total_docs = docs.len();
        Self {
            doc_freq,
            total_docs,
            avg_doc_len: if total_docs > 0 {
                total_len as f32 / total_docs as f32
            } else {
                0.0
            },
        }
    }

    fn score(&self, query: &[String], doc: &[String], k1: f32, b: f32) -> f32 {
        if doc.is_empty() || self.total_docs == 0 {
            return 0.0;
        }
        let mut score = 0.0f32;
        for term in query {
            let tf = doc.iter().filter(|t| *t == term).count() as f32;
            if tf == 0.0 {
                continue;
            }
            let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
            let idf = ((self.total_docs as f32 - df + 0.5) / (df + 0.5) + 1.0).ln();
            let denom = tf + k1 * (1.0 - b + b * doc.len() as f32 / self.avg_doc_len.max(1e-6));
            score += idf * tf * (k1 + 1.0) / denom;
        }
        score
    }
}

/// Rank candidate facts for a query.
///
/// `query_embedding = None` drops the semantic component entirely. The
/// returned list is sorted by combined score, ties broken by most recent
/// `valid_at`.
pub fn rank(
    query_embedding: Option<&[f32]>,
    query_text: &str,
    candidates: Vec<Candidate>,
    weights: &RankWeights,
) -> Vec<RankedCandidate> {
    let query_tokens = tokenize(query_text);
    let docs: Vec<Vec<String>> = candidates
        .iter()
        .map(|c| tokenize(&c.fact.assertion))
        .collect();
    let context = Bm25Context::build(&docs);

    let raw_lexical: Vec<f32> = docs
        .iter()
        .map(|doc| context.score(&query_tokens, doc, weights.bm25_k1, weights.bm25_b))
        .collect();
    let max_lexical = raw_lexical.iter().cloned().fold(0.0f32, f32::max);

    let mut ranked: Vec<RankedCandidate> = candidates
        .into_iter()
        .zip(raw_lexical)
        .map(|(candidate, raw)| {
            let semantic = match (query_embedding, candidate.fact.embedding.as_deref()) {
                (Some(q), Some(f)) => cosine_similarity(q, f).max(0.0),
                _ => 0.0,
            };
            let lexical = if max_lexical > 0.0 { raw / max_lexical } else { 0.0 };
            let graph = candidate.graph_boost.clamp(0.0, 1.0);
            let score =
                weights.semantic * semantic + weights.lexical * lexical + weights.graph * graph;
            RankedCandidate {
                fact: candidate.fact,
                score,
                semantic,
                lexical,
                graph,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.fact.valid_at.cmp(&a.fact.valid_at))
    });
    ranked
}
