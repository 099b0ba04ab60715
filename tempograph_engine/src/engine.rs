//! Engine state and administrative operations.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tempograph_config::TempographConfig;
use tempograph_core::{
    BiTemporalStore, Community, Entity, EntityId, Episode, EpisodeId, GraphStats, GroupId,
    PartitionFilter,
};
use tempograph_extraction::{EmbeddingProvider, ExtractionProvider, RetryPolicy};

use crate::error::EngineError;

/// Shared engine state: the store, the capability providers, and counters.
///
/// Cheap to clone behind an `Arc`; all interior state is thread-safe and no
/// lock is held across an await point.
pub struct Engine {
    store: Arc<BiTemporalStore>,
    pub(crate) extractor: Arc<dyn ExtractionProvider>,
    pub(crate) embedder: Arc<dyn EmbeddingProvider>,
    pub(crate) config: TempographConfig,
    /// Partitions with a community build currently running.
    pub(crate) builds_in_flight: Mutex<HashSet<GroupId>>,
    episodes_ingested: AtomicU64,
    searches_served: AtomicU64,
}

impl Engine {
    pub fn new(
        config: TempographConfig,
        extractor: Arc<dyn ExtractionProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            store: Arc::new(BiTemporalStore::new()),
            extractor,
            embedder,
            config,
            builds_in_flight: Mutex::new(HashSet::new()),
            episodes_ingested: AtomicU64::new(0),
            searches_served: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &BiTemporalStore {
        &self.store
    }

    pub fn config(&self) -> &TempographConfig {
        &self.config
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.retry.max_retries,
            base_delay_ms: self.config.retry.base_delay_ms,
        }
    }

    pub(crate) fn note_episode_ingested(&self) {
        self.episodes_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_search_served(&self) {
        self.searches_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn episodes_ingested(&self) -> u64 {
        self.episodes_ingested.load(Ordering::Relaxed)
    }

    pub fn searches_served(&self) -> u64 {
        self.searches_served.load(Ordering::Relaxed)
    }

    // ---- partition-scoped listings ----

    pub fn episodes(&self, group_id: &str, limit: usize, offset: usize) -> Vec<Episode> {
        self.store
            .episodes(&PartitionFilter::one(group_id), limit, offset)
    }

    pub fn entities(
        &self,
        group_id: &str,
        name_query: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Vec<Entity> {
        self.store
            .entities(&PartitionFilter::one(group_id), name_query, limit, offset)
    }

    pub fn communities(&self, group_id: &str) -> Vec<Community> {
        self.store.communities(&PartitionFilter::one(group_id))
    }

    pub fn stats(&self, group_id: &str) -> GraphStats {
        self.store.stats(&PartitionFilter::one(group_id))
    }

    // ---- deletes ----

    pub fn delete_episode(&self, group_id: &str, id: EpisodeId) -> Result<(), EngineError> {
        if self.store.delete_episode(&PartitionFilter::one(group_id), id) {
            Ok(())
        } else {
            Err(EngineError::EpisodeNotFound(id))
        }
    }

    pub fn delete_entity(&self, group_id: &str, id: EntityId) -> Result<(), EngineError> {
        if self.store.delete_entity(&PartitionFilter::one(group_id), id) {
            Ok(())
        } else {
            Err(EngineError::EntityNotFound(id))
        }
    }
}
