//! Engine running on the SQLite backend.

#![cfg(feature = "sqlite")]

use chrono::{Duration, Utc};
use std::sync::Arc;

use strata_core::promotion::BackendTerminology;
use strata_core::traits::MatchType;
use strata_core::{
    EngineConfig, EntityCategory, EventBus, GraphBackend, GraphEntity, KnowledgeLayer,
    PromotionEngine, TransitionStatus, TriggerOutcome,
};
use strata_graph_stores::{
    GraphBackendConfig, GraphBackendFactory, GraphBackendProvider, SqliteGraphBackend,
};

fn asthma() -> GraphEntity {
    let now = Utc::now();
    GraphEntity::new("e1", "Asthma", EntityCategory::Disease, KnowledgeLayer::Perception, 0.9)
        .with_observations(5)
        .with_observed_between(now - Duration::hours(72), now)
        .with_sources(["ehr", "claims", "registry"])
}

#[tokio::test]
async fn test_versioned_promotions_keep_lineage() {
    let dir = tempfile::tempdir().unwrap();
    let sqlite = Arc::new(SqliteGraphBackend::new(dir.path().join("graph.db")).unwrap());
    sqlite
        .add_terminology("asthma", "SNOMED-CT", "195967001", "Asthma")
        .unwrap();
    sqlite.upsert_entity(asthma()).await.unwrap();

    let backend: Arc<dyn GraphBackend> = sqlite.clone();
    let mut config = EngineConfig::default();
    config.orchestrator.create_versions = true;
    let engine = PromotionEngine::new(
        config,
        backend.clone(),
        Arc::new(BackendTerminology::new(backend.clone())),
        EventBus::new(),
    )
    .unwrap();

    let outcome = engine
        .evaluate_and_promote("e1", KnowledgeLayer::Semantic)
        .await
        .unwrap();
    let TriggerOutcome::Promoted(first) = outcome else {
        panic!("expected promotion, got {:?}", outcome);
    };
    assert_eq!(first.new_entity_id.as_deref(), Some("e1_v2"));
    assert!(backend.get_entity("e1").await.unwrap().is_none());

    // High-risk SEMANTIC -> REASONING waits for a reviewer
    let outcome = engine
        .evaluate_and_promote("e1_v2", KnowledgeLayer::Reasoning)
        .await
        .unwrap();
    let TriggerOutcome::QueuedForReview(decision) = outcome else {
        panic!("expected review, got {:?}", outcome);
    };
    let terminology = decision.terminology.clone().unwrap();
    assert_eq!(terminology.match_type, Some(MatchType::Exact));
    assert_eq!(terminology.code.as_deref(), Some("195967001"));

    let second = tokio_test::assert_ok!(engine.approve_review("e1_v2", "reviewer", None).await);
    assert_eq!(second.status, TransitionStatus::Completed);
    assert_eq!(second.new_entity_id.as_deref(), Some("e1_v3"));
    assert_eq!(second.lineage, vec!["e1".to_string()]);

    let stored = backend.get_entity("e1_v3").await.unwrap().unwrap();
    assert_eq!(stored.layer, KnowledgeLayer::Reasoning);
    assert_eq!(stored.attributes["previous_id"], serde_json::json!("e1_v2"));
    assert_eq!(stored.attributes["domain"], serde_json::json!("clinical"));

    for id in ["e1", "e1_v2", "e1_v3"] {
        let lineage = engine.orchestrator().get_entity_lineage(id).await;
        assert_eq!(lineage.len(), 2, "lineage for {}", id);
        assert_eq!(lineage[0].to_layer, KnowledgeLayer::Semantic);
        assert_eq!(lineage[1].to_layer, KnowledgeLayer::Reasoning);
    }
}

#[tokio::test]
async fn test_scan_reads_candidates_from_sqlite() {
    let backend = GraphBackendFactory::sqlite(":memory:").await.unwrap();
    backend.upsert_entity(asthma()).await.unwrap();
    backend
        .upsert_entity(GraphEntity::new(
            "weak",
            "Unclear finding",
            EntityCategory::Symptom,
            KnowledgeLayer::Perception,
            0.3,
        ))
        .await
        .unwrap();

    let engine = PromotionEngine::with_backend(backend.clone()).unwrap();
    let report = engine.trigger().run_promotion_scan(None).await;

    assert_eq!(report.promoted(), 1);
    assert_eq!(
        backend.get_entity("e1").await.unwrap().unwrap().layer,
        KnowledgeLayer::Semantic
    );
    assert_eq!(
        backend.get_entity("weak").await.unwrap().unwrap().layer,
        KnowledgeLayer::Perception
    );
}

#[tokio::test]
async fn test_factory_builds_in_memory_backend() {
    let backend = GraphBackendFactory::create(&GraphBackendConfig::default())
        .await
        .unwrap();
    assert!(backend.get_entity("anything").await.unwrap().is_none());

    let config = GraphBackendConfig {
        provider: GraphBackendProvider::Sqlite,
        url: String::new(),
    };
    let sqlite = GraphBackendFactory::create(&config).await.unwrap();
    sqlite.upsert_entity(asthma()).await.unwrap();
    assert!(sqlite.get_entity("e1").await.unwrap().is_some());
}
