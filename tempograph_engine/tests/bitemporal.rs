//! Bi-temporal behavior through the full ingestion flow: idempotency,
//! supersession, snapshots, and the non-lossy extraction guarantee.

use std::sync::Arc;

use chrono::Utc;
use tempograph_config::TempographConfig;
use tempograph_core::{EpisodeContent, PartitionFilter};
use tempograph_engine::{Engine, EngineError, IngestRequest};
use tempograph_extraction::{MockEmbedder, MockExtractor};

fn engine() -> Engine {
    Engine::new(
        TempographConfig::default(),
        Arc::new(MockExtractor::new()),
        Arc::new(MockEmbedder::new()),
    )
}

fn fast_retry_config() -> TempographConfig {
    let mut config = TempographConfig::default();
    config.retry.base_delay_ms = 1;
    config
}

fn ingest_request(tenant: &str, text: &str) -> IngestRequest {
    IngestRequest {
        data: EpisodeContent::Text(text.into()),
        context: None,
        reference_time: None,
        tenant_id: Some(tenant.into()),
        tenant_context: None,
        customer_context: None,
    }
}

#[tokio::test]
async fn test_duplicate_ingest_new_episode_single_fact() {
    let engine = engine();
    let line = "Alice | works_at | Acme | Alice works at Acme | 2024-01-15T00:00:00Z";

    let first = engine.ingest(ingest_request("t1", line)).await.unwrap();
    assert_eq!(first.facts_created, 1);
    assert_eq!(first.entities_created, 2);

    let second = engine.ingest(ingest_request("t1", line)).await.unwrap();
    assert_eq!(second.facts_created, 0);
    assert_eq!(second.facts_duplicated, 1);
    assert_eq!(second.entities_created, 0);
    assert_eq!(second.entities_merged, 2);

    // two episodes, one fact, both episodes in the fact's provenance
    let stats = engine.stats("t1");
    assert_eq!(stats.episode_count, 2);
    assert_eq!(stats.current_fact_count, 1);

    let facts = engine
        .store()
        .facts(&PartitionFilter::one("t1"), None, None);
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].episodes.len(), 2);
    assert!(facts[0].episodes.contains(&first.episode_id));
    assert!(facts[0].episodes.contains(&second.episode_id));
}

#[tokio::test]
async fn test_contradiction_supersedes_and_snapshot_recovers_old_belief() {
    let engine = engine();
    let filter = PartitionFilter::one("t1");

    engine
        .ingest(ingest_request(
            "t1",
            "Bob | role_at | Acme | Bob is an engineer at Acme | 2023-06-01T00:00:00Z",
        ))
        .await
        .unwrap();
    let after_first = Utc::now();

    let second = engine
        .ingest(ingest_request(
            "t1",
            "Bob | role_at | Acme | Bob is a manager at Acme | 2024-02-01T00:00:00Z",
        ))
        .await
        .unwrap();
    assert_eq!(second.facts_created, 1);
    assert_eq!(second.facts_superseded, 1);

    // current view: only the manager fact
    let current = engine.store().facts(&filter, None, None);
    assert_eq!(current.len(), 1);
    assert!(current[0].assertion.contains("manager"));
    assert!(current[0].expired_at.is_none());

    // the engineer fact survives with both timelines closed
    let snapshot = engine.store().facts(&filter, None, Some(after_first));
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].assertion.contains("engineer"));
    assert!(snapshot[0].expired_at.is_some());
    assert!(snapshot[0].invalid_at.is_some());

    let stats = engine.stats("t1");
    assert_eq!(stats.current_fact_count, 1);
    assert_eq!(stats.expired_fact_count, 1);
}

#[tokio::test]
async fn test_caller_supplied_event_time_flows_to_facts() {
    let engine = engine();
    let past = "2020-05-01T12:00:00Z".parse().unwrap();
    let mut request = ingest_request("t1", "Alice | joined | Acme | Alice joined Acme");
    request.reference_time = Some(past);

    engine.ingest(request).await.unwrap();
    let facts = engine
        .store()
        .facts(&PartitionFilter::one("t1"), None, None);
    // no explicit date on the line, so the fact inherits the episode's event time
    assert_eq!(facts[0].valid_at, past);
    assert!(facts[0].recorded_at > past);
}

#[tokio::test]
async fn test_extraction_failure_keeps_episode() {
    let engine = Engine::new(
        fast_retry_config(),
        Arc::new(MockExtractor::failing()),
        Arc::new(MockEmbedder::new()),
    );

    let response = engine
        .ingest(ingest_request("t1", "Alice | knows | Bob | Alice knows Bob"))
        .await
        .unwrap();
    assert!(response.warning.is_some());
    assert_eq!(response.facts_created, 0);
    assert_eq!(response.entities_created, 0);

    // the raw episode is retained for later re-processing
    let stats = engine.stats("t1");
    assert_eq!(stats.episode_count, 1);
    assert_eq!(stats.entity_count, 0);
    let episodes = engine.episodes("t1", 10, 0);
    assert_eq!(episodes[0].id, response.episode_id);
}

#[tokio::test]
async fn test_structured_content_is_ingestable() {
    let engine = engine();
    let request = IngestRequest {
        data: EpisodeContent::Structured(serde_json::json!({
            "note": "Alice | works_at | Acme | Alice works at Acme"
        })),
        context: None,
        reference_time: None,
        tenant_id: Some("t1".into()),
        tenant_context: None,
        customer_context: None,
    };
    let response = engine.ingest(request).await.unwrap();
    assert!(response.warning.is_none());
    assert_eq!(engine.stats("t1").episode_count, 1);
}

#[tokio::test]
async fn test_delete_episode_cascades_and_reports_missing() {
    let engine = engine();
    let first = engine
        .ingest(ingest_request("t1", "Alice | knows | Bob | Alice knows Bob"))
        .await
        .unwrap();

    engine.delete_episode("t1", first.episode_id).unwrap();
    // the fact's only provenance is gone, so the fact goes with it
    assert_eq!(engine.stats("t1").current_fact_count, 0);
    assert_eq!(engine.stats("t1").episode_count, 0);

    assert!(matches!(
        engine.delete_episode("t1", first.episode_id),
        Err(EngineError::EpisodeNotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_entity_removes_incident_facts() {
    let engine = engine();
    engine
        .ingest(ingest_request("t1", "Alice | knows | Bob | Alice knows Bob"))
        .await
        .unwrap();
    let alice = engine.entities("t1", Some("alice"), 10, 0).remove(0);

    engine.delete_entity("t1", alice.id).unwrap();
    assert_eq!(engine.stats("t1").current_fact_count, 0);
    assert_eq!(engine.entities("t1", None, 10, 0).len(), 1, "Bob remains");
}
