//! # Tempograph Core
//!
//! Core data model and algorithms for the Tempograph temporal knowledge graph:
//!
//! - **Bi-temporal records** ([`types`]) — episodes, entities, facts, and
//!   communities, each tagged with a tenant partition (`group_id`) and, for
//!   facts, the `(valid_at, invalid_at, recorded_at, expired_at)` quadruple.
//! - **Partition-scoped store** ([`store`]) — the system of record. Tenant
//!   isolation is enforced at the storage boundary: every read and write goes
//!   through a [`store::PartitionFilter`], never an ambient global graph.
//! - **Entity resolution** ([`resolver`]) — merge-or-create matching with an
//!   explicit false-negative bias.
//! - **Community detection** ([`community`]) — Leiden clustering over the
//!   non-expired fact graph via the `graphrs` crate.
//! - **Hybrid ranking** ([`retrieval`]) — cosine similarity + BM25 lexical
//!   scoring + hop-decayed graph proximity, combined as a weighted sum.
//! - **Query transformation heuristics** ([`query`]) — entity-filter vs.
//!   semantic-search strategy selection with a public transformation record.
//!
//! Everything in this crate is synchronous and provider-free; language-model
//! and embedding capabilities live behind traits in `tempograph_extraction`
//! and are orchestrated by `tempograph_engine`.

pub mod community;
pub mod query;
pub mod resolver;
pub mod retrieval;
pub mod store;
pub mod types;

pub use community::{cluster_entities, CommunityParams, QualityFunctionType};
pub use query::{
    extract_entity_names, should_use_entity_filter, strategy_reason, Strategy, Transformation,
};
pub use resolver::{cosine_similarity, match_candidate, MatchDecision, ResolverConfig};
pub use retrieval::{proximity_boosts, rank, Candidate, RankWeights, RankedCandidate};
pub use store::{BiTemporalStore, FactWrite, GraphStats, PartitionFilter};
pub use types::{
    AttrValue, Community, CommunityId, Entity, EntityId, Episode, EpisodeContent, EpisodeId, Fact,
    FactId, FactKey, GroupId,
};
