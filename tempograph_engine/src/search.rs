//! Search flow: strategy selection, optional enhancement, hybrid ranking.

use std::collections::HashMap;

use tracing::{debug, warn};

use tempograph_core::{
    extract_entity_names, proximity_boosts, query::Transformation, rank, should_use_entity_filter,
    strategy_reason, Candidate, EntityId, PartitionFilter, Strategy,
};
use tempograph_extraction::with_retries;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::types::{endpoint_boost, resolve_group_id, SearchRequest, SearchResponse, SearchResult};

impl Engine {
    /// Answer a natural-language query over one partition.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, EngineError> {
        let group_id = resolve_group_id(
            request.tenant_id.as_deref(),
            request.tenant_context.as_ref(),
        )?;
        let filter = PartitionFilter::one(group_id.clone());
        let policy = self.retry_policy();
        let num_results = request
            .num_results
            .unwrap_or(self.config.search.default_num_results);

        // Strategy: caller override wins, heuristics otherwise.
        let (use_entity_filter, auto_detected) = match request.use_entity_filter {
            Some(explicit) => (explicit, false),
            None => (should_use_entity_filter(&request.query), true),
        };
        let reason = strategy_reason(&request.query, use_entity_filter);

        // Optional enhancement; failure falls back to the original query.
        let rewritten = if request.enhance_query {
            match with_retries(&policy, || self.extractor.enhance_query(&request.query)).await {
                Ok(enhanced) => enhanced,
                Err(err) => {
                    warn!(%group_id, %err, "query enhancement failed, using original query");
                    request.query.clone()
                }
            }
        } else {
            request.query.clone()
        };
        let query_was_enhanced = rewritten != request.query;

        // Embedding; failure degrades ranking rather than failing the search.
        let (query_embedding, degraded) =
            match with_retries(&policy, || self.embedder.embed(&rewritten)).await {
                Ok(vec) => (Some(vec), false),
                Err(err) => {
                    warn!(%group_id, %err, "query embedding failed, ranking without semantic component");
                    (None, true)
                }
            };

        // Entity anchoring.
        let detected_entities = if use_entity_filter {
            extract_entity_names(&rewritten)
        } else {
            Vec::new()
        };
        // Substring match so "Sarah" finds the stored "Sarah Martinez".
        let mut resolved_entity_ids: Vec<EntityId> = Vec::new();
        for name in &detected_entities {
            for entity in self.store().entities(&filter, Some(name), 5, 0) {
                if !resolved_entity_ids.contains(&entity.id) {
                    resolved_entity_ids.push(entity.id);
                }
            }
        }

        let fell_back = use_entity_filter && resolved_entity_ids.is_empty();
        let executed = if use_entity_filter && !fell_back {
            Strategy::EntityFilter
        } else {
            Strategy::SemanticSearch
        };

        let weights = self.config.rank_weights();
        let (candidates, boosts) = match executed {
            Strategy::EntityFilter => {
                let distances =
                    self.store()
                        .neighborhood(&group_id, &resolved_entity_ids, weights.max_hops);
                let anchor: Vec<EntityId> = distances.keys().copied().collect();
                let facts = self.store().facts(&filter, Some(&anchor), request.as_of);
                (facts, proximity_boosts(&distances, weights.hop_decay))
            }
            Strategy::SemanticSearch => {
                let facts = self.store().facts(&filter, None, request.as_of);
                (facts, HashMap::new())
            }
        };

        let ranked = rank(
            query_embedding.as_deref(),
            &rewritten,
            candidates
                .into_iter()
                .map(|fact| {
                    let boost = endpoint_boost(&boosts, &fact);
                    Candidate::new(fact, boost)
                })
                .collect(),
            &weights,
        );

        let results: Vec<SearchResult> = ranked
            .into_iter()
            .take(num_results)
            .map(|r| {
                let source_name = self
                    .store()
                    .entity(&filter, r.fact.source)
                    .map(|e| e.name)
                    .unwrap_or_default();
                let target_name = self
                    .store()
                    .entity(&filter, r.fact.target)
                    .map(|e| e.name)
                    .unwrap_or_default();
                SearchResult {
                    fact: r.fact,
                    source_name,
                    target_name,
                    score: r.score,
                    semantic_score: r.semantic,
                    lexical_score: r.lexical,
                    graph_score: r.graph,
                }
            })
            .collect();

        self.note_search_served();
        debug!(
            %group_id,
            strategy = ?executed,
            results = results.len(),
            fell_back,
            degraded,
            "search served"
        );

        Ok(SearchResponse {
            results,
            transformation: Transformation {
                original_query: request.query,
                rewritten_query: rewritten,
                query_was_enhanced,
                strategy: executed,
                auto_detected,
                reason,
                detected_entities,
                resolved_entity_ids,
                fell_back,
            },
            group_id,
            degraded,
        })
    }
}
