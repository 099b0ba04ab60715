//! Community building: thresholds, wholesale replacement, and guard
//! release.

use std::sync::Arc;

use tempograph_config::TempographConfig;
use tempograph_core::EpisodeContent;
use tempograph_engine::{BuildOutcome, Engine, IngestRequest};
use tempograph_extraction::{MockEmbedder, MockExtractor};

fn engine_with_min_entities(min: usize) -> Engine {
    let mut config = TempographConfig::default();
    config.community.min_entity_count = min;
    Engine::new(
        config,
        Arc::new(MockExtractor::new()),
        Arc::new(MockEmbedder::new()),
    )
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

/// Two disconnected triangles.
async fn seed_two_cliques(engine: &Engine, tenant: &str) {
    for line in [
        "A1 | knows | A2 | A1 knows A2",
        "A2 | knows | A3 | A2 knows A3",
        "A3 | knows | A1 | A3 knows A1",
        "B1 | knows | B2 | B1 knows B2",
        "B2 | knows | B3 | B2 knows B3",
        "B3 | knows | B1 | B3 knows B1",
    ] {
        engine.ingest(ingest_request(tenant, line)).await.unwrap();
    }
}

#[tokio::test]
async fn test_small_partition_reports_insufficient_data() {
    let engine = engine_with_min_entities(20);
    seed_two_cliques(&engine, "t1").await;

    match engine.build_communities("t1").await.unwrap() {
        BuildOutcome::InsufficientData {
            entity_count,
            required,
        } => {
            assert_eq!(entity_count, 6);
            assert_eq!(required, 20);
        }
        other => panic!("expected insufficient data, got {other:?}"),
    }
    // nothing was written
    assert!(engine.communities("t1").is_empty());

    // the in-flight marker was released, a second attempt gets the same
    // answer instead of InProgress
    assert!(matches!(
        engine.build_communities("t1").await.unwrap(),
        BuildOutcome::InsufficientData { .. }
    ));
}

#[tokio::test]
async fn test_build_clusters_disconnected_groups_apart() {
    let engine = engine_with_min_entities(4);
    seed_two_cliques(&engine, "t1").await;

    let BuildOutcome::Built(report) = engine.build_communities("t1").await.unwrap() else {
        panic!("expected a completed build");
    };
    assert_eq!(report.group_id, "t1");
    assert!(report.community_count >= 2);
    assert_eq!(report.entities_clustered, 6);

    let communities = engine.communities("t1");
    assert_eq!(communities.len(), report.community_count);
    for community in &communities {
        assert_eq!(community.size, community.members.len());
        assert!(!community.label.is_empty());
        // one cluster never mixes the two cliques
        let names: Vec<String> = community
            .members
            .iter()
            .filter_map(|id| {
                engine
                    .entities("t1", None, 100, 0)
                    .into_iter()
                    .find(|e| e.id == *id)
            })
            .map(|e| e.name)
            .collect();
        let has_a = names.iter().any(|n| n.starts_with('A'));
        let has_b = names.iter().any(|n| n.starts_with('B'));
        assert!(!(has_a && has_b), "mixed cliques in one community: {names:?}");
    }
}

#[tokio::test]
async fn test_rebuild_replaces_previous_set_wholesale() {
    let engine = engine_with_min_entities(4);
    seed_two_cliques(&engine, "t1").await;

    let BuildOutcome::Built(first) = engine.build_communities("t1").await.unwrap() else {
        panic!("expected a completed build");
    };
    let first_ids = first.community_ids.clone();

    // connect the cliques strongly and rebuild
    for line in [
        "A1 | partners_with | B1 | A1 partners with B1",
        "A2 | partners_with | B2 | A2 partners with B2",
        "A3 | partners_with | B3 | A3 partners with B3",
    ] {
        engine.ingest(ingest_request("t1", line)).await.unwrap();
    }
    let BuildOutcome::Built(second) = engine.build_communities("t1").await.unwrap() else {
        panic!("expected a completed build");
    };

    let communities = engine.communities("t1");
    assert_eq!(communities.len(), second.community_count);
    // no community from the first build survives
    for community in &communities {
        assert!(!first_ids.contains(&community.id));
    }
}

#[tokio::test]
async fn test_builds_are_partition_scoped() {
    let engine = engine_with_min_entities(4);
    seed_two_cliques(&engine, "t1").await;
    seed_two_cliques(&engine, "t2").await;

    assert!(engine.build_communities("t1").await.unwrap().report().is_some());
    assert!(!engine.communities("t1").is_empty());
    assert!(engine.communities("t2").is_empty());

    engine.build_communities("t2").await.unwrap();
    let t2 = engine.communities("t2");
    assert!(t2.iter().all(|c| c.group_id == "t2"));
}

#[tokio::test]
async fn test_concurrent_build_on_same_partition_reports_in_progress() {
    let engine = engine_with_min_entities(4);
    seed_two_cliques(&engine, "t1").await;

    // On the single-threaded test runtime the first build parks at its
    // clustering task, so the second poll observes the in-flight marker.
    let (first, second) = tokio::join!(
        engine.build_communities("t1"),
        engine.build_communities("t1"),
    );
    let outcomes = [first.unwrap(), second.unwrap()];
    assert!(
        outcomes.iter().any(|o| o.report().is_some()),
        "one build must complete: {outcomes:?}"
    );
    assert!(
        outcomes
            .iter()
            .any(|o| matches!(o, BuildOutcome::InProgress)),
        "the other must be turned away: {outcomes:?}"
    );

    // the guard released the marker, so a later build runs again
    assert!(engine.build_communities("t1").await.unwrap().report().is_some());
}

#[tokio::test]
async fn test_removed_bridge_no_longer_links_communities() {
    let engine = engine_with_min_entities(4);
    seed_two_cliques(&engine, "t1").await;
    // bridge the cliques, then remove it by deleting its only source episode
    let bridge = engine
        .ingest(ingest_request(
            "t1",
            "A1 | partners_with | B1 | A1 partners with B1",
        ))
        .await
        .unwrap();
    engine.delete_episode("t1", bridge.episode_id).unwrap();

    let BuildOutcome::Built(report) = engine.build_communities("t1").await.unwrap() else {
        panic!("expected a completed build");
    };
    assert!(report.community_count >= 2, "bridge removal must split the graph");
}
