//! Boundary request and response shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempograph_core::{
    query::Transformation, CommunityId, EntityId, EpisodeContent, EpisodeId, Fact, GroupId,
};

use crate::error::EngineError;

/// Tenant metadata attached to a request. When present, its `tenant_id`
/// takes precedence over the request's top-level `tenant_id` field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: Option<String>,
    pub tenant_name: Option<String>,
    #[serde(default)]
    pub tenant_address: Option<String>,
}

/// Customer metadata used as an extraction and enhancement hint. Never a
/// partition key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerContext {
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_address: Option<String>,
}

/// Pick the partition id for a request.
///
/// Precedence: `tenant_context.tenant_id`, then the top-level `tenant_id`.
/// A request with neither is rejected before any store access.
pub fn resolve_group_id(
    tenant_id: Option<&str>,
    tenant_context: Option<&TenantContext>,
) -> Result<GroupId, EngineError> {
    if let Some(id) = tenant_context
        .and_then(|tc| tc.tenant_id.as_deref())
        .filter(|id| !id.trim().is_empty())
    {
        return Ok(id.to_string());
    }
    tenant_id
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
        .ok_or(EngineError::MissingTenant)
}

/// One unit of data to ingest. Schema-less: `data` is plain text or any
/// JSON value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(alias = "content")]
    pub data: EpisodeContent,
    /// Free-text context stored on the episode.
    #[serde(default)]
    pub context: Option<String>,
    /// Event time of the described events; defaults to ingestion time.
    #[serde(default, alias = "valid_at")]
    pub reference_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub tenant_context: Option<TenantContext>,
    #[serde(default)]
    pub customer_context: Option<CustomerContext>,
}

/// Outcome of one ingestion. `warning` is set when the episode was stored
/// but extraction failed; nothing was lost and the episode can be
/// re-processed later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub episode_id: EpisodeId,
    pub group_id: GroupId,
    pub entities_created: usize,
    pub entities_merged: usize,
    pub facts_created: usize,
    pub facts_duplicated: usize,
    pub facts_superseded: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// A search over one partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Result cap; the configured default applies when absent.
    #[serde(default)]
    pub num_results: Option<usize>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub tenant_context: Option<TenantContext>,
    #[serde(default)]
    pub customer_context: Option<CustomerContext>,
    /// Caller override for strategy selection; `None` auto-detects.
    #[serde(default)]
    pub use_entity_filter: Option<bool>,
    /// Whether to run language-model query enhancement.
    #[serde(default)]
    pub enhance_query: bool,
    /// Record-time snapshot; `None` searches the current view.
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

/// One ranked fact with its component scores and resolved endpoint names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub fact: Fact,
    pub source_name: String,
    pub target_name: String,
    pub score: f32,
    pub semantic_score: f32,
    pub lexical_score: f32,
    pub graph_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    /// How the query was transformed and which strategy ran.
    pub transformation: Transformation,
    pub group_id: GroupId,
    /// True when embedding failed and ranking ran without the semantic
    /// component.
    pub degraded: bool,
}

/// Report of one community build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityBuildReport {
    pub group_id: GroupId,
    pub community_count: usize,
    pub entities_clustered: usize,
    pub community_ids: Vec<CommunityId>,
    pub built_at: DateTime<Utc>,
}

/// Outcome of a community build request. The two non-`Built` variants are
/// statuses, not failures: the caller retries later or ingests more data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildOutcome {
    /// The build completed and replaced the partition's community set.
    Built(CommunityBuildReport),
    /// Too few entities for a meaningful build; nothing was written.
    InsufficientData { entity_count: usize, required: usize },
    /// Another build already holds this partition; retry later.
    InProgress,
}

impl BuildOutcome {
    /// The completed report, if the build ran.
    pub fn report(&self) -> Option<&CommunityBuildReport> {
        match self {
            BuildOutcome::Built(report) => Some(report),
            _ => None,
        }
    }
}

/// Per-candidate anchor for the graph component of ranking.
pub(crate) fn endpoint_boost(
    boosts: &std::collections::HashMap<EntityId, f32>,
    fact: &Fact,
) -> f32 {
    let s = boosts.get(&fact.source).copied().unwrap_or(0.0);
    let t = boosts.get(&fact.target).copied().unwrap_or(0.0);
    s.max(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_context_takes_precedence() {
        let tc = TenantContext {
            tenant_id: Some("from_context".into()),
            tenant_name: None,
            tenant_address: None,
        };
        let group = resolve_group_id(Some("from_field"), Some(&tc)).unwrap();
        assert_eq!(group, "from_context");
    }

    #[test]
    fn test_falls_back_to_top_level_tenant_id() {
        let tc = TenantContext::default();
        assert_eq!(resolve_group_id(Some("t1"), Some(&tc)).unwrap(), "t1");
        assert_eq!(resolve_group_id(Some("t1"), None).unwrap(), "t1");
    }

    #[test]
    fn test_missing_tenant_rejected() {
        assert!(matches!(
            resolve_group_id(None, None),
            Err(EngineError::MissingTenant)
        ));
        let blank = TenantContext {
            tenant_id: Some("  ".into()),
            tenant_name: None,
            tenant_address: None,
        };
        assert!(matches!(
            resolve_group_id(None, Some(&blank)),
            Err(EngineError::MissingTenant)
        ));
    }

    #[test]
    fn test_ingest_request_accepts_documented_shape() {
        let req: IngestRequest = serde_json::from_str(
            r#"{
                "data": "Alice joined Acme as CTO on 2024-01-10",
                "reference_time": "2024-01-10T09:00:00Z",
                "tenant_id": "T1",
                "tenant_context": {"tenant_id": "T1", "tenant_address": "1 Main St"},
                "customer_context": {"customer_name": "John Anderson"}
            }"#,
        )
        .unwrap();
        assert_eq!(req.data, EpisodeContent::Text("Alice joined Acme as CTO on 2024-01-10".into()));
        assert!(req.reference_time.is_some());
        assert_eq!(
            req.tenant_context.unwrap().tenant_address.as_deref(),
            Some("1 Main St")
        );

        // structured payloads need no envelope
        let json: IngestRequest = serde_json::from_str(
            r#"{"data": {"name": "Alice", "role": "CTO"}, "tenant_id": "T1"}"#,
        )
        .unwrap();
        assert_eq!(json.data.kind(), "json");
    }

    #[test]
    fn test_build_outcome_serializes_as_status() {
        let json = serde_json::to_string(&BuildOutcome::InProgress).unwrap();
        assert_eq!(json, r#"{"status":"in_progress"}"#);
        let json = serde_json::to_string(&BuildOutcome::InsufficientData {
            entity_count: 6,
            required: 20,
        })
        .unwrap();
        assert!(json.contains(r#""status":"insufficient_data""#));
    }

    #[test]
    fn test_search_request_deserializes_with_defaults() {
        let req: SearchRequest =
            serde_json::from_str(r#"{"query": "who is Alice", "tenant_id": "t1"}"#).unwrap();
        assert!(req.use_entity_filter.is_none());
        assert!(!req.enhance_query);
        assert!(req.as_of.is_none());
        assert!(req.num_results.is_none());
    }
}
