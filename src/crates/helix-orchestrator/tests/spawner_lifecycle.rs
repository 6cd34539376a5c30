//! Spawner behaviour through the public API, including concurrent use.

use helix_orchestrator::spawner::{
    EchoHandler, HandlerTable, InMemoryAuditLog, InMemoryCostLedger, StaticModelRouter,
};
use helix_orchestrator::{
    ModelSelection, ModelSpawner, ModelStatus, Operation, OperationType, Provider,
};
use std::sync::Arc;

struct Fixture {
    spawner: Arc<ModelSpawner>,
    ledger: Arc<InMemoryCostLedger>,
    audit: Arc<InMemoryAuditLog>,
}

fn fixture() -> Fixture {
    let default = ModelSelection::new(Provider::DeepSeek, "deepseek-chat");
    let router = StaticModelRouter::new(default.clone()).with_route(
        OperationType::Embedding,
        ModelSelection::new(Provider::OpenAi, "text-embedding-3-small"),
    );
    let ledger = Arc::new(InMemoryCostLedger::new());
    let audit = Arc::new(InMemoryAuditLog::new());
    let spawner = ModelSpawner::new(
        Arc::new(router),
        ledger.clone(),
        audit.clone(),
        HandlerTable::uniform(Arc::new(EchoHandler::new())),
        default,
    );
    Fixture {
        spawner: Arc::new(spawner),
        ledger,
        audit,
    }
}

#[tokio::test]
async fn test_declined_spawn_writes_nothing() {
    let f = fixture();
    let result = f
        .spawner
        .spawn("u-1", Operation::new(OperationType::Reasoning, 1_000), 500)
        .await;

    assert!(result.spawned_models.is_empty());
    assert_eq!(result.total_cost_cents, 0);
    assert_eq!(result.success_count, 0);
    assert_eq!(result.failed_count, 0);

    f.spawner.wait_idle().await;
    assert!(f.audit.is_empty());
    assert!(f.ledger.entries().is_empty());
    assert_eq!(f.spawner.get_active_model_count(), 0);
}

#[tokio::test]
async fn test_spawn_settle_and_clear() {
    let f = fixture();
    let result = f
        .spawner
        .spawn("u-1", Operation::new(OperationType::Embedding, 10), 100)
        .await;
    assert_eq!(result.success_count, 1);
    assert_eq!(result.total_cost_cents, 10);
    assert_eq!(
        result.spawned_models[0].model_selection.to_string(),
        "openai/text-embedding-3-small"
    );
    assert_eq!(f.spawner.get_active_model_count(), 1);
    assert_eq!(f.spawner.get_execution_contexts()[0].budget_remaining, 90);

    f.spawner.wait_idle().await;
    let model = f
        .spawner
        .get_model(&result.spawned_models[0].model_id)
        .unwrap();
    assert_eq!(model.status, ModelStatus::Completed);

    assert_eq!(f.spawner.clear_completed_models(), 1);
    assert_eq!(f.spawner.get_active_model_count(), 0);
    assert!(f.spawner.get_execution_contexts().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_spawns_keep_every_model() {
    let f = fixture();
    let mut handles = Vec::new();
    for i in 0..20 {
        let spawner = Arc::clone(&f.spawner);
        handles.push(tokio::spawn(async move {
            spawner
                .spawn(
                    &format!("u-{}", i % 3),
                    Operation::new(OperationType::Generation, 5),
                    50,
                )
                .await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().success_count, 1);
    }

    f.spawner.wait_idle().await;
    let models = f.spawner.get_active_models();
    assert_eq!(models.len(), 20);
    assert!(models.iter().all(|m| m.status == ModelStatus::Completed));

    assert_eq!(f.audit.len(), 20);
    assert_eq!(f.audit.first_broken_link(), None);
    assert_eq!(f.ledger.entries().len(), 20);
}
