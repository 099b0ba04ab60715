//! Search flow: strategy selection, enhancement, fallback, and degraded
//! ranking.

use std::sync::Arc;

use tempograph_config::TempographConfig;
use tempograph_core::{EpisodeContent, Strategy};
use tempograph_engine::{Engine, IngestRequest, SearchRequest};
use tempograph_extraction::{MockEmbedder, MockExtractor};

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

fn search_request(tenant: &str, query: &str) -> SearchRequest {
    SearchRequest {
        query: query.into(),
        num_results: None,
        tenant_id: Some(tenant.into()),
        tenant_context: None,
        customer_context: None,
        use_entity_filter: None,
        enhance_query: false,
        as_of: None,
    }
}

async fn seeded_engine() -> Engine {
    let engine = Engine::new(
        TempographConfig::default(),
        Arc::new(MockExtractor::new()),
        Arc::new(MockEmbedder::new()),
    );
    for line in [
        "David Chen | works_at | TechVision | David Chen is a manager at TechVision",
        "David Chen | manages | Engineering | David Chen manages the Engineering department",
        "Sarah Martinez | works_at | TechVision | Sarah Martinez works at TechVision",
        "TechVision | located_in | Austin | TechVision is headquartered in Austin",
    ] {
        engine.ingest(ingest_request("t1", line)).await.unwrap();
    }
    engine
}

#[tokio::test]
async fn test_entity_filter_auto_detected_and_anchored() {
    let engine = seeded_engine().await;
    let response = engine
        .search(search_request("t1", "What happened to David Chen?"))
        .await
        .unwrap();

    let t = &response.transformation;
    assert_eq!(t.strategy, Strategy::EntityFilter);
    assert!(t.auto_detected);
    assert!(!t.fell_back);
    assert!(t.detected_entities.iter().any(|n| n == "David"));
    assert!(!t.resolved_entity_ids.is_empty());
    assert!(t.reason.contains("entity filter"));

    assert!(!response.results.is_empty());
    assert!(response
        .results
        .iter()
        .any(|r| r.fact.assertion.contains("David Chen")));
    // endpoint names resolved for display
    assert!(response.results.iter().all(|r| !r.source_name.is_empty()));
}

#[tokio::test]
async fn test_unresolved_entities_fall_back_to_semantic() {
    let engine = seeded_engine().await;
    let response = engine
        .search(search_request("t1", "What about Zelda Fitzgerald Unknown?"))
        .await
        .unwrap();

    let t = &response.transformation;
    assert!(t.fell_back);
    assert_eq!(t.strategy, Strategy::SemanticSearch);
    assert!(t.resolved_entity_ids.is_empty());
    // fallback still searches the whole partition
    assert!(!response.results.is_empty());
}

#[tokio::test]
async fn test_caller_override_disables_auto_detection() {
    let engine = seeded_engine().await;
    let mut request = search_request("t1", "What happened to David Chen?");
    request.use_entity_filter = Some(false);

    let response = engine.search(request).await.unwrap();
    let t = &response.transformation;
    assert_eq!(t.strategy, Strategy::SemanticSearch);
    assert!(!t.auto_detected);
    assert!(t.reason.contains("manual override"), "got: {}", t.reason);
}

#[tokio::test]
async fn test_question_pattern_routes_to_semantic_search() {
    let engine = seeded_engine().await;
    let response = engine
        .search(search_request("t1", "tell me about the office"))
        .await
        .unwrap();
    let t = &response.transformation;
    assert_eq!(t.strategy, Strategy::SemanticSearch);
    assert!(t.auto_detected);
    assert!(!t.fell_back);
}

#[tokio::test]
async fn test_enhancement_rewrites_query_and_is_recorded() {
    let engine = Engine::new(
        TempographConfig::default(),
        Arc::new(MockExtractor::new().with_enhancement("David Chen departure manager")),
        Arc::new(MockEmbedder::new()),
    );
    engine
        .ingest(ingest_request(
            "t1",
            "David Chen | works_at | TechVision | David Chen is a manager at TechVision",
        ))
        .await
        .unwrap();

    let mut request = search_request("t1", "What happened to him?");
    request.enhance_query = true;
    request.use_entity_filter = Some(true);
    let response = engine.search(request).await.unwrap();

    let t = &response.transformation;
    assert!(t.query_was_enhanced);
    assert_eq!(t.original_query, "What happened to him?");
    assert_eq!(t.rewritten_query, "David Chen departure manager");
    // entity names come from the rewritten query
    assert!(t.detected_entities.iter().any(|n| n == "David"));
    assert_eq!(t.strategy, Strategy::EntityFilter);
    assert!(!t.fell_back);
}

#[tokio::test]
async fn test_embedding_failure_degrades_to_lexical_ranking() {
    let mut config = TempographConfig::default();
    config.retry.base_delay_ms = 1;
    let engine = Engine::new(
        config,
        Arc::new(MockExtractor::new()),
        Arc::new(MockEmbedder::failing()),
    );
    engine
        .ingest(ingest_request(
            "t1",
            "Alice | works_at | Acme | Alice works at Acme",
        ))
        .await
        .unwrap();
    engine
        .ingest(ingest_request(
            "t1",
            "Bob | likes | Tennis | Bob likes tennis on weekends",
        ))
        .await
        .unwrap();

    let response = engine
        .search(search_request("t1", "where does Alice work"))
        .await
        .unwrap();
    assert!(response.degraded);
    assert!(!response.results.is_empty());
    // lexical signal still orders the Alice fact first
    assert!(response.results[0].fact.assertion.contains("Alice"));
    assert_eq!(response.results[0].semantic_score, 0.0);
}

#[tokio::test]
async fn test_num_results_caps_output() {
    let engine = seeded_engine().await;
    let mut request = search_request("t1", "TechVision people and places");
    request.num_results = Some(2);
    let response = engine.search(request).await.unwrap();
    assert_eq!(response.results.len(), 2);
}

#[tokio::test]
async fn test_graph_proximity_ranks_neighborhood_of_anchor() {
    let engine = seeded_engine().await;
    // Anchored on Sarah Martinez; her own fact should outrank facts two hops
    // out when lexical and semantic signals are weak.
    let response = engine
        .search(search_request("t1", "news involving Sarah Martinez"))
        .await
        .unwrap();
    assert_eq!(response.transformation.strategy, Strategy::EntityFilter);
    assert!(response.results[0].fact.assertion.contains("Sarah Martinez"));
    assert!(response.results[0].graph_score >= response.results.last().unwrap().graph_score);
}
