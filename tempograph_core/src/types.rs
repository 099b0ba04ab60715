//! Core record types for the Tempograph knowledge graph.
//!
//! Defines the four stored record kinds (episode, entity, fact, community)
//! plus the partition identifier and the open attribute model. All records
//! carry exactly one `group_id`; the store never returns a record whose
//! partition does not match the requested filter.
//!
//! # Bi-temporal model
//!
//! Facts track two independent timelines:
//! - **Event time** (`valid_at` / `invalid_at`): when the relationship held
//!   in the real world.
//! - **Record time** (`recorded_at` / `expired_at`): when the system believed
//!   it. A fact with a non-null `expired_at` is logically superseded — it is
//!   excluded from default retrieval but retained for audit and `as_of`
//!   snapshots.
//!
//! `None` on the end of either timeline means "still valid" / "not yet
//! expired".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Tenant partition identifier. The isolation boundary for all stored data.
pub type GroupId = String;

/// Unique identifier for an episode.
pub type EpisodeId = Uuid;

/// Unique identifier for an entity.
pub type EntityId = Uuid;

/// Unique identifier for a fact.
pub type FactId = Uuid;

/// Unique identifier for a community.
pub type CommunityId = Uuid;

/// Flexible attribute value supporting common JSON-like types.
///
/// Entities are schema-less: a free-form type label plus an open attribute
/// map, not a closed enum of entity kinds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AttrValue {
    /// A string value.
    String(String),
    /// An integer value.
    Integer(i64),
    /// A floating-point value.
    Float(f64),
    /// A boolean value.
    Bool(bool),
}

/// Raw content of an ingested episode.
///
/// Untagged on the wire: a JSON string is text, any other JSON value is a
/// structured payload. Ingestion is schema-less.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum EpisodeContent {
    /// Plain text payload.
    Text(String),
    /// Structured (JSON) payload, ingested schema-less.
    Structured(serde_json::Value),
}

impl EpisodeContent {
    /// Render the content as text suitable for entity extraction.
    ///
    /// Structured payloads are pretty-printed so the extraction capability
    /// sees field names alongside values.
    pub fn as_extraction_text(&self) -> String {
        match self {
            EpisodeContent::Text(text) => text.clone(),
            EpisodeContent::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }

    /// Short tag describing the payload kind ("text" or "json").
    pub fn kind(&self) -> &'static str {
        match self {
            EpisodeContent::Text(_) => "text",
            EpisodeContent::Structured(_) => "json",
        }
    }
}

/// One immutable ingested unit of data.
///
/// Episodes are append-only: created once at ingestion, never mutated, and
/// deletable only by id. `recorded_at` is always assigned by the system at
/// construction time; `valid_at` is caller-supplied event time, defaulting
/// to the ingestion instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Unique episode identifier.
    pub id: EpisodeId,
    /// Raw payload.
    pub content: EpisodeContent,
    /// Optional free-text context supplied at ingestion.
    pub context: Option<String>,
    /// Event time: when the described events occurred.
    pub valid_at: DateTime<Utc>,
    /// Record time: when the system ingested this episode. Never
    /// caller-supplied.
    pub recorded_at: DateTime<Utc>,
    /// Tenant partition this episode belongs to.
    pub group_id: GroupId,
}

impl Episode {
    /// Create a new episode for `group_id`.
    ///
    /// `valid_at` defaults to the ingestion wall-clock when the caller does
    /// not supply a reference time. `recorded_at` is always the ingestion
    /// wall-clock, independent of `valid_at` (which may be in the past or
    /// the future).
    pub fn new(
        group_id: impl Into<GroupId>,
        content: EpisodeContent,
        valid_at: Option<DateTime<Utc>>,
        context: Option<String>,
    ) -> Self {
        let recorded_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            content,
            context,
            valid_at: valid_at.unwrap_or(recorded_at),
            recorded_at,
            group_id: group_id.into(),
        }
    }
}

/// A resolved real-world object node in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Unique entity identifier.
    pub id: EntityId,
    /// Canonical display name.
    pub name: String,
    /// Free-form type label (e.g. "person", "organization"). Not a closed
    /// schema.
    pub entity_type: String,
    /// Tenant partition this entity belongs to.
    pub group_id: GroupId,
    /// Episodes that produced or corroborated this entity.
    pub source_episodes: Vec<EpisodeId>,
    /// When this entity record was created.
    pub created_at: DateTime<Utc>,
    /// Optional embedding of the canonical description, used for fuzzy
    /// resolution and semantic ranking.
    pub embedding: Option<Vec<f32>>,
    /// Open attribute map.
    pub attributes: HashMap<String, AttrValue>,
}

impl Entity {
    /// Create a new entity sourced from a single episode.
    pub fn new(
        group_id: impl Into<GroupId>,
        name: impl Into<String>,
        entity_type: impl Into<String>,
        source_episode: EpisodeId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            entity_type: entity_type.into(),
            group_id: group_id.into(),
            source_episodes: vec![source_episode],
            created_at: Utc::now(),
            embedding: None,
            attributes: HashMap::new(),
        }
    }
}

/// Idempotency key for fact writes.
///
/// Two writes with the same key are the same fact: re-submission is a no-op.
/// Supersession is keyed on the same triple minus `valid_at` (same edge, new
/// assertion).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactKey {
    pub source: EntityId,
    pub target: EntityId,
    pub name: String,
    pub valid_at: DateTime<Utc>,
}

/// A directed, typed, bi-temporal relationship between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    /// Unique fact identifier.
    pub id: FactId,
    /// Source entity.
    pub source: EntityId,
    /// Target entity.
    pub target: EntityId,
    /// Relationship type label (e.g. "works_at", "joined_as").
    pub name: String,
    /// Human-readable assertion describing the relationship.
    pub assertion: String,
    /// Tenant partition this fact belongs to.
    pub group_id: GroupId,
    /// Event time: when the relationship became true.
    pub valid_at: DateTime<Utc>,
    /// Event time: when the relationship ceased to hold, if known.
    pub invalid_at: Option<DateTime<Utc>>,
    /// Record time: when the system recorded this fact.
    pub recorded_at: DateTime<Utc>,
    /// Record time: when this fact was superseded in the graph, if ever.
    pub expired_at: Option<DateTime<Utc>>,
    /// Provenance: episodes that asserted this fact.
    pub episodes: Vec<EpisodeId>,
    /// Optional embedding of the assertion text.
    pub embedding: Option<Vec<f32>>,
}

impl Fact {
    /// Create a new current fact sourced from a single episode.
    pub fn new(
        group_id: impl Into<GroupId>,
        source: EntityId,
        target: EntityId,
        name: impl Into<String>,
        assertion: impl Into<String>,
        valid_at: DateTime<Utc>,
        source_episode: EpisodeId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            target,
            name: name.into(),
            assertion: assertion.into(),
            group_id: group_id.into(),
            valid_at,
            invalid_at: None,
            recorded_at: Utc::now(),
            expired_at: None,
            episodes: vec![source_episode],
            embedding: None,
        }
    }

    /// Idempotency key for this fact.
    pub fn key(&self) -> FactKey {
        FactKey {
            source: self.source,
            target: self.target,
            name: self.name.clone(),
            valid_at: self.valid_at,
        }
    }

    /// Whether this fact is still believed (record time has not ended).
    pub fn is_current(&self) -> bool {
        self.expired_at.is_none()
    }

    /// Whether this fact is visible in a record-time snapshot taken at
    /// `as_of`: `recorded_at <= as_of < (expired_at or infinity)`.
    pub fn visible_at(&self, as_of: DateTime<Utc>) -> bool {
        self.recorded_at <= as_of && self.expired_at.map_or(true, |expired| as_of < expired)
    }

    /// Whether `other` contradicts this fact: same edge and relationship
    /// type, different assertion text.
    pub fn contradicts(&self, other: &Fact) -> bool {
        self.source == other.source
            && self.target == other.target
            && self.name == other.name
            && self.assertion != other.assertion
    }
}

/// A derived cluster of strongly connected entities within one partition.
///
/// Communities are replaceable artifacts: each builder run produces the
/// partition's full community set wholesale, never an incremental patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    /// Unique community identifier.
    pub id: CommunityId,
    /// Tenant partition this community belongs to.
    pub group_id: GroupId,
    /// Short label, derived from prominent member names.
    pub label: String,
    /// Human-readable summary of the cluster.
    pub summary: String,
    /// Member entity ids.
    pub members: Vec<EntityId>,
    /// Member count, denormalized for listing.
    pub size: usize,
    /// When this community set was built.
    pub built_at: DateTime<Utc>,
}
