//! Partition-scoped bi-temporal system of record.
//!
//! Each tenant partition (`group_id`) is a separate map entry; cross-partition
//! reads exist only through an explicit [`PartitionFilter`], so isolation is a
//! structural property of the store rather than a filter each caller must
//! remember to apply.
//!
//! Facts are never deleted by supersession. A contradicted fact gets its
//! `expired_at` stamped (record time) and its `invalid_at` closed (event
//! time); `as_of` snapshot reads can still see it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::{
    Community, Entity, EntityId, Episode, EpisodeId, Fact, FactId, FactKey, GroupId,
};

/// Scope of a read against the store.
///
/// Writes always target exactly one partition; reads may span several for
/// administrative listings, but never implicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionFilter {
    /// All partitions. Administrative listings only.
    All,
    /// A single partition.
    One(GroupId),
    /// An explicit set of partitions.
    Any(Vec<GroupId>),
}

impl PartitionFilter {
    /// Whether `group_id` falls inside this filter.
    pub fn matches(&self, group_id: &str) -> bool {
        match self {
            PartitionFilter::All => true,
            PartitionFilter::One(g) => g == group_id,
            PartitionFilter::Any(gs) => gs.iter().any(|g| g == group_id),
        }
    }

    /// Convenience constructor for the common single-partition case.
    pub fn one(group_id: impl Into<GroupId>) -> Self {
        PartitionFilter::One(group_id.into())
    }
}

/// Outcome of a fact write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactWrite {
    /// A new fact was stored.
    Created(FactId),
    /// An identical fact (same idempotency key) already existed; nothing
    /// changed.
    Duplicate(FactId),
    /// The new fact contradicted existing current facts on the same edge.
    /// The old facts were expired and event-time-closed, the new one stored.
    Superseded { new: FactId, expired: Vec<FactId> },
}

/// Partition-scoped graph statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphStats {
    pub episode_count: usize,
    pub entity_count: usize,
    /// Facts with no `expired_at`.
    pub current_fact_count: usize,
    /// Facts that have been superseded.
    pub expired_fact_count: usize,
    pub community_count: usize,
    /// `current_facts / (entities * (entities - 1))` for a directed graph;
    /// zero when fewer than two entities exist.
    pub density: f64,
    pub avg_facts_per_entity: f64,
}

#[derive(Debug, Default)]
struct Partition {
    episodes: HashMap<EpisodeId, Episode>,
    entities: HashMap<EntityId, Entity>,
    facts: HashMap<FactId, Fact>,
    /// Idempotency index over current facts.
    fact_keys: HashMap<FactKey, FactId>,
    communities: Vec<Community>,
}

/// In-memory bi-temporal graph store.
///
/// Interior mutability with short critical sections; callers never hold a
/// guard, so the store is safe to share behind an `Arc` across async tasks.
#[derive(Debug, Default)]
pub struct BiTemporalStore {
    partitions: RwLock<HashMap<GroupId, Partition>>,
}

fn read_guard(
    lock: &RwLock<HashMap<GroupId, Partition>>,
) -> RwLockReadGuard<'_, HashMap<GroupId, Partition>> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_guard(
    lock: &RwLock<HashMap<GroupId, Partition>>,
) -> RwLockWriteGuard<'_, HashMap<GroupId, Partition>> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl BiTemporalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Partitions currently present in the store.
    pub fn group_ids(&self) -> Vec<GroupId> {
        let guard = read_guard(&self.partitions);
        let mut ids: Vec<GroupId> = guard.keys().cloned().collect();
        ids.sort();
        ids
    }

    // ---- episodes ----

    /// Persist an episode into its partition.
    pub fn write_episode(&self, episode: Episode) -> EpisodeId {
        let id = episode.id;
        let mut guard = write_guard(&self.partitions);
        guard
            .entry(episode.group_id.clone())
            .or_default()
            .episodes
            .insert(id, episode);
        id
    }

    pub fn episode(&self, filter: &PartitionFilter, id: EpisodeId) -> Option<Episode> {
        let guard = read_guard(&self.partitions);
        guard
            .iter()
            .filter(|(g, _)| filter.matches(g))
            .find_map(|(_, p)| p.episodes.get(&id))
            .cloned()
    }

    /// Episodes in the filter, newest `recorded_at` first, paginated.
    pub fn episodes(&self, filter: &PartitionFilter, limit: usize, offset: usize) -> Vec<Episode> {
        let guard = read_guard(&self.partitions);
        let mut out: Vec<Episode> = guard
            .iter()
            .filter(|(g, _)| filter.matches(g))
            .flat_map(|(_, p)| p.episodes.values().cloned())
            .collect();
        out.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        out.into_iter().skip(offset).take(limit).collect()
    }

    /// The `n` most recently recorded episodes of one partition, used to
    /// build extraction context for a new episode.
    pub fn recent_episodes(&self, group_id: &str, n: usize) -> Vec<Episode> {
        self.episodes(&PartitionFilter::one(group_id), n, 0)
    }

    /// Delete an episode and detach it from the provenance of every entity
    /// and fact in its partition. Facts whose provenance becomes empty are
    /// removed; entities are kept even with empty provenance, since other
    /// facts may still reference them.
    ///
    /// Returns `false` when the episode does not exist in the filter.
    pub fn delete_episode(&self, filter: &PartitionFilter, id: EpisodeId) -> bool {
        let mut guard = write_guard(&self.partitions);
        for (group_id, partition) in guard.iter_mut() {
            if !filter.matches(group_id) {
                continue;
            }
            if partition.episodes.remove(&id).is_none() {
                continue;
            }
            for entity in partition.entities.values_mut() {
                entity.source_episodes.retain(|e| *e != id);
            }
            let mut orphaned: Vec<FactId> = Vec::new();
            for fact in partition.facts.values_mut() {
                fact.episodes.retain(|e| *e != id);
                if fact.episodes.is_empty() {
                    orphaned.push(fact.id);
                }
            }
            for fact_id in &orphaned {
                if let Some(fact) = partition.facts.remove(fact_id) {
                    partition.fact_keys.remove(&fact.key());
                }
            }
            debug!(%group_id, %id, orphaned = orphaned.len(), "deleted episode");
            return true;
        }
        false
    }

    // ---- entities ----

    /// Persist a new entity into its partition.
    pub fn write_entity(&self, entity: Entity) -> EntityId {
        let id = entity.id;
        let mut guard = write_guard(&self.partitions);
        guard
            .entry(entity.group_id.clone())
            .or_default()
            .entities
            .insert(id, entity);
        id
    }

    /// Replace a stored entity wholesale. Used by resolution merges to fold
    /// in new provenance and attributes.
    ///
    /// Returns `false` when no entity with that id exists in the partition.
    pub fn update_entity(&self, entity: Entity) -> bool {
        let mut guard = write_guard(&self.partitions);
        match guard.get_mut(&entity.group_id) {
            Some(partition) if partition.entities.contains_key(&entity.id) => {
                partition.entities.insert(entity.id, entity);
                true
            }
            _ => false,
        }
    }

    pub fn entity(&self, filter: &PartitionFilter, id: EntityId) -> Option<Entity> {
        let guard = read_guard(&self.partitions);
        guard
            .iter()
            .filter(|(g, _)| filter.matches(g))
            .find_map(|(_, p)| p.entities.get(&id))
            .cloned()
    }

    /// Entities in the filter, optionally name-filtered (case-insensitive
    /// substring), sorted by name, paginated.
    pub fn entities(
        &self,
        filter: &PartitionFilter,
        name_query: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Vec<Entity> {
        let needle = name_query.map(str::to_lowercase);
        let guard = read_guard(&self.partitions);
        let mut out: Vec<Entity> = guard
            .iter()
            .filter(|(g, _)| filter.matches(g))
            .flat_map(|(_, p)| p.entities.values())
            .filter(|e| match &needle {
                Some(n) => e.name.to_lowercase().contains(n),
                None => true,
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out.into_iter().skip(offset).take(limit).collect()
    }

    pub fn entity_count(&self, filter: &PartitionFilter) -> usize {
        let guard = read_guard(&self.partitions);
        guard
            .iter()
            .filter(|(g, _)| filter.matches(g))
            .map(|(_, p)| p.entities.len())
            .sum()
    }

    /// Exact case-insensitive name lookup within one partition.
    pub fn find_entity_ci(&self, group_id: &str, name: &str) -> Option<Entity> {
        let needle = name.to_lowercase();
        let guard = read_guard(&self.partitions);
        guard
            .get(group_id)?
            .entities
            .values()
            .find(|e| e.name.to_lowercase() == needle)
            .cloned()
    }

    /// All entities of one partition that carry an embedding, for fuzzy
    /// resolution.
    pub fn embedded_entities(&self, group_id: &str) -> Vec<Entity> {
        let guard = read_guard(&self.partitions);
        guard
            .get(group_id)
            .map(|p| {
                p.entities
                    .values()
                    .filter(|e| e.embedding.is_some())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Delete an entity along with every fact incident to it. A fact without
    /// one of its endpoints is not representable.
    pub fn delete_entity(&self, filter: &PartitionFilter, id: EntityId) -> bool {
        let mut guard = write_guard(&self.partitions);
        for (group_id, partition) in guard.iter_mut() {
            if !filter.matches(group_id) {
                continue;
            }
            if partition.entities.remove(&id).is_none() {
                continue;
            }
            let incident: Vec<FactId> = partition
                .facts
                .values()
                .filter(|f| f.source == id || f.target == id)
                .map(|f| f.id)
                .collect();
            for fact_id in &incident {
                if let Some(fact) = partition.facts.remove(fact_id) {
                    partition.fact_keys.remove(&fact.key());
                }
            }
            debug!(%group_id, %id, incident = incident.len(), "deleted entity");
            return true;
        }
        false
    }

    // ---- facts ----

    /// Write a fact with idempotency and supersession semantics.
    ///
    /// - Same idempotency key `(source, target, name, valid_at)` as an
    ///   existing fact: no-op, provenance of the new episode is folded into
    ///   the existing fact.
    /// - Same edge and relationship type, different assertion: every current
    ///   contradicted fact gets `expired_at = now` and
    ///   `invalid_at = new.valid_at`, clamped so `invalid_at` never precedes
    ///   the expired fact's own `valid_at`, then the new fact is stored.
    /// - Otherwise: plain insert.
    pub fn write_fact(&self, fact: Fact) -> FactWrite {
        let mut guard = write_guard(&self.partitions);
        let partition = guard.entry(fact.group_id.clone()).or_default();

        if let Some(existing_id) = partition.fact_keys.get(&fact.key()).copied() {
            if let Some(existing) = partition.facts.get_mut(&existing_id) {
                if existing.assertion == fact.assertion {
                    for ep in &fact.episodes {
                        if !existing.episodes.contains(ep) {
                            existing.episodes.push(*ep);
                        }
                    }
                    return FactWrite::Duplicate(existing_id);
                }
            }
        }

        let now = Utc::now();
        let mut expired: Vec<FactId> = Vec::new();
        for existing in partition.facts.values_mut() {
            if existing.is_current() && existing.contradicts(&fact) {
                existing.expired_at = Some(now);
                // A contradicting fact may carry an earlier event time than
                // the fact it supersedes; the clamp keeps invalid_at >= valid_at.
                existing.invalid_at = Some(fact.valid_at.max(existing.valid_at));
                expired.push(existing.id);
            }
        }
        for fact_id in &expired {
            if let Some(old) = partition.facts.get(fact_id) {
                partition.fact_keys.remove(&old.key());
            }
        }

        let id = fact.id;
        partition.fact_keys.insert(fact.key(), id);
        partition.facts.insert(id, fact);

        if expired.is_empty() {
            FactWrite::Created(id)
        } else {
            debug!(%id, expired = expired.len(), "fact superseded prior assertions");
            FactWrite::Superseded { new: id, expired }
        }
    }

    pub fn fact(&self, filter: &PartitionFilter, id: FactId) -> Option<Fact> {
        let guard = read_guard(&self.partitions);
        guard
            .iter()
            .filter(|(g, _)| filter.matches(g))
            .find_map(|(_, p)| p.facts.get(&id))
            .cloned()
    }

    /// Facts in the filter, optionally restricted to those touching one of
    /// `anchor_entities`, at the requested record-time view.
    ///
    /// `as_of = None` means the current view (facts with no `expired_at`);
    /// `Some(t)` means the snapshot the system believed at `t`.
    pub fn facts(
        &self,
        filter: &PartitionFilter,
        anchor_entities: Option<&[EntityId]>,
        as_of: Option<DateTime<Utc>>,
    ) -> Vec<Fact> {
        let guard = read_guard(&self.partitions);
        let mut out: Vec<Fact> = guard
            .iter()
            .filter(|(g, _)| filter.matches(g))
            .flat_map(|(_, p)| p.facts.values())
            .filter(|f| match as_of {
                None => f.is_current(),
                Some(t) => f.visible_at(t),
            })
            .filter(|f| match anchor_entities {
                Some(anchors) => anchors.iter().any(|a| f.source == *a || f.target == *a),
                None => true,
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.valid_at.cmp(&a.valid_at));
        out
    }

    /// Entities reachable within `max_hops` of `seeds` over non-expired
    /// facts, with their hop distance. Seeds are reported at distance 0.
    pub fn neighborhood(
        &self,
        group_id: &str,
        seeds: &[EntityId],
        max_hops: usize,
    ) -> HashMap<EntityId, usize> {
        let guard = read_guard(&self.partitions);
        let Some(partition) = guard.get(group_id) else {
            return HashMap::new();
        };

        let mut adjacency: HashMap<EntityId, Vec<EntityId>> = HashMap::new();
        for fact in partition.facts.values().filter(|f| f.is_current()) {
            adjacency.entry(fact.source).or_default().push(fact.target);
            adjacency.entry(fact.target).or_default().push(fact.source);
        }

        let mut distances: HashMap<EntityId, usize> = HashMap::new();
        let mut queue: VecDeque<(EntityId, usize)> = VecDeque::new();
        for seed in seeds {
            if partition.entities.contains_key(seed) {
                distances.insert(*seed, 0);
                queue.push_back((*seed, 0));
            }
        }
        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_hops {
                continue;
            }
            if let Some(next) = adjacency.get(&node) {
                for n in next {
                    if !distances.contains_key(n) {
                        distances.insert(*n, depth + 1);
                        queue.push_back((*n, depth + 1));
                    }
                }
            }
        }
        distances
    }

    // ---- communities ----

    /// Replace a partition's entire community set.
    pub fn replace_communities(&self, group_id: &str, communities: Vec<Community>) {
        let mut guard = write_guard(&self.partitions);
        guard.entry(group_id.to_string()).or_default().communities = communities;
    }

    /// Communities in the filter, largest first.
    pub fn communities(&self, filter: &PartitionFilter) -> Vec<Community> {
        let guard = read_guard(&self.partitions);
        let mut out: Vec<Community> = guard
            .iter()
            .filter(|(g, _)| filter.matches(g))
            .flat_map(|(_, p)| p.communities.iter().cloned())
            .collect();
        out.sort_by(|a, b| b.size.cmp(&a.size));
        out
    }

    // ---- statistics ----

    /// Graph statistics over the filter. Density treats the graph as
    /// directed and counts only current facts over distinct edges.
    pub fn stats(&self, filter: &PartitionFilter) -> GraphStats {
        let guard = read_guard(&self.partitions);
        let mut episode_count = 0;
        let mut entity_count = 0;
        let mut current_fact_count = 0;
        let mut expired_fact_count = 0;
        let mut community_count = 0;
        let mut edges: HashSet<(EntityId, EntityId)> = HashSet::new();

        for (group_id, partition) in guard.iter() {
            if !filter.matches(group_id) {
                continue;
            }
            episode_count += partition.episodes.len();
            entity_count += partition.entities.len();
            community_count += partition.communities.len();
            for fact in partition.facts.values() {
                if fact.is_current() {
                    current_fact_count += 1;
                    edges.insert((fact.source, fact.target));
                } else {
                    expired_fact_count += 1;
                }
            }
        }

        let density = if entity_count > 1 {
            edges.len() as f64 / (entity_count as f64 * (entity_count as f64 - 1.0))
        } else {
            0.0
        };
        let avg_facts_per_entity = if entity_count > 0 {
            current_fact_count as f64 / entity_count as f64
        } else {
            0.0
        };

        GraphStats {
            episode_count,
            entity_count,
            current_fact_count,
            expired_fact_count,
            community_count,
            density,
            avg_facts_per_entity,
        }
    }
}
