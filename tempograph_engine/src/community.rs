//! Batch community building.
//!
//! One build per partition at a time; a second request while one is running
//! gets an `InProgress` status rather than being queued. The in-flight
//! marker is released by a drop guard, so a failing build never wedges the
//! partition.

use std::collections::HashMap;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use tempograph_core::{cluster_entities, Community, EntityId, PartitionFilter};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::types::{BuildOutcome, CommunityBuildReport};

/// Releases the partition's in-flight marker when the build ends, on any
/// path out of the function.
struct BuildGuard<'a> {
    engine: &'a Engine,
    group_id: String,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.engine
            .builds_in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&self.group_id);
    }
}

impl Engine {
    /// Rebuild the community set of one partition from its current facts.
    ///
    /// An under-threshold partition or an already-running build is reported
    /// as a status, not an error. The previous set is replaced wholesale on
    /// a completed build and left untouched otherwise.
    pub async fn build_communities(&self, group_id: &str) -> Result<BuildOutcome, EngineError> {
        {
            let mut in_flight = self
                .builds_in_flight
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if !in_flight.insert(group_id.to_string()) {
                return Ok(BuildOutcome::InProgress);
            }
        }
        let _guard = BuildGuard {
            engine: self,
            group_id: group_id.to_string(),
        };

        let filter = PartitionFilter::one(group_id);
        let entity_count = self.store().entity_count(&filter);
        let params = self.config.community_params();
        if entity_count < params.min_entity_count {
            return Ok(BuildOutcome::InsufficientData {
                entity_count,
                required: params.min_entity_count,
            });
        }

        // Edge weight is the count of current facts on the pair.
        let mut weights: HashMap<(EntityId, EntityId), f32> = HashMap::new();
        for fact in self.store().facts(&filter, None, None) {
            let key = if fact.source <= fact.target {
                (fact.source, fact.target)
            } else {
                (fact.target, fact.source)
            };
            *weights.entry(key).or_insert(0.0) += 1.0;
        }
        let edges: Vec<(EntityId, EntityId, f32)> = weights
            .into_iter()
            .map(|((s, t), w)| (s, t, w))
            .collect();

        // Clustering is CPU-bound; keep it off the async worker threads.
        let clusters = tokio::task::spawn_blocking(move || cluster_entities(&edges, &params))
            .await
            .map_err(anyhow::Error::new)??;

        let built_at = Utc::now();
        let communities: Vec<Community> = clusters
            .iter()
            .map(|members| {
                let names: Vec<String> = members
                    .iter()
                    .filter_map(|id| self.store().entity(&filter, *id))
                    .map(|e| e.name)
                    .collect();
                let label = names
                    .iter()
                    .take(3)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ");
                Community {
                    id: Uuid::new_v4(),
                    group_id: group_id.to_string(),
                    label: label.clone(),
                    summary: format!("{} entities around {}", members.len(), label),
                    members: members.clone(),
                    size: members.len(),
                    built_at,
                }
            })
            .collect();

        let report = CommunityBuildReport {
            group_id: group_id.to_string(),
            community_count: communities.len(),
            entities_clustered: communities.iter().map(|c| c.size).sum(),
            community_ids: communities.iter().map(|c| c.id).collect(),
            built_at,
        };
        self.store().replace_communities(group_id, communities);

        info!(
            group_id,
            communities = report.community_count,
            entities = report.entities_clustered,
            "community build finished"
        );
        Ok(BuildOutcome::Built(report))
    }
}
