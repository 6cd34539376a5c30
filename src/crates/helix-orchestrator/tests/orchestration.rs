//! End-to-end runs through the supervisor graph.

use helix_checkpoint::{CheckpointSaver, FileCheckpointSaver, InMemoryCheckpointSaver};
use helix_orchestrator::agents::{ActionAgent, EchoAgent, SupervisorAgent};
use helix_orchestrator::{
    AgentRole, AgentSuite, DefaultStateFactory, InMemoryCommandQueue, ModelSelection,
    ModelSpawner, NextLabelRouter, Orchestrator, OrchestratorError, OrchestratorState,
    OperationType, Provider, RunOptions,
};
use serde_json::json;
use std::sync::Arc;

fn memory_saver() -> Arc<InMemoryCheckpointSaver<OrchestratorState>> {
    Arc::new(InMemoryCheckpointSaver::new())
}

fn with_spawner(orchestrator: Orchestrator) -> (Orchestrator, Arc<ModelSpawner>) {
    let spawner = Arc::new(ModelSpawner::in_memory(ModelSelection::new(
        Provider::DeepSeek,
        "deepseek-chat",
    )));
    (orchestrator.with_spawner(spawner.clone()), spawner)
}

#[tokio::test]
async fn test_invoke_and_stream_agree() {
    let orchestrator = Orchestrator::reference(1_000);
    for task in ["tell me a story", "recall my notes", "why does it matter"] {
        let invoked = orchestrator
            .run(task, RunOptions::default().with_thread_id("t-invoke"))
            .await
            .unwrap();
        let streamed = orchestrator
            .stream(task, None, RunOptions::default().with_thread_id("t-stream"))
            .await
            .unwrap();

        assert_eq!(invoked.task(), streamed.task());
        assert_eq!(invoked.budget_remaining_cents(), streamed.budget_remaining_cents());
        let contents = |s: &OrchestratorState| {
            s.messages()
                .iter()
                .map(|m| (m.role, m.name.clone(), m.content.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(contents(&invoked), contents(&streamed));
    }
}

#[tokio::test]
async fn test_checkpoints_written_per_step() {
    let saver = memory_saver();
    let options = RunOptions::default()
        .with_thread_id("t-1")
        .with_checkpointer(saver.clone());

    Orchestrator::reference(1_000)
        .run("tell me a story", options)
        .await
        .unwrap();

    let history = Orchestrator::reference(1_000)
        .get_execution_history("t-1", &*saver)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].next(), Some("narrative"));
    assert_eq!(history[1].messages().len(), 3);
}

#[tokio::test]
async fn test_history_is_oldest_first() {
    let saver = memory_saver();
    let mut state = OrchestratorState::new("plan trip", 500);
    for step in ["T1", "T2", "T3"] {
        state.push_message(helix_orchestrator::Message::system(step));
        saver.save("t-hist", &state).await.unwrap();
    }

    let history = Orchestrator::reference(500)
        .get_execution_history("t-hist", &*saver)
        .await
        .unwrap();
    let last: Vec<&str> = history
        .iter()
        .map(|s| s.messages().last().unwrap().content.as_str())
        .collect();
    assert_eq!(last, vec!["T1", "T2", "T3"]);

    let empty = Orchestrator::reference(500)
        .get_execution_history("t-none", &*saver)
        .await
        .unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn test_resume_errors() {
    let orchestrator = Orchestrator::reference(1_000);

    let err = orchestrator
        .resume("missing-id", RunOptions::default().with_checkpointer(memory_saver()))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::CheckpointNotFound(ref id) if id == "missing-id"));

    let err = orchestrator
        .resume("missing-id", RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::CheckpointerRequired));
}

#[tokio::test]
async fn test_resume_continues_on_checkpoint_thread() {
    let saver = memory_saver();
    let orchestrator = Orchestrator::reference(1_000);
    orchestrator
        .run(
            "tell me a story",
            RunOptions::default()
                .with_thread_id("t-origin")
                .with_checkpointer(saver.clone()),
        )
        .await
        .unwrap();
    let first = saver.history("t-origin").await.unwrap().remove(0);

    // The thread id in the options is ignored in favour of the checkpoint's.
    let state = orchestrator
        .resume(
            &first.checkpoint_id,
            RunOptions::default()
                .with_thread_id("t-other")
                .with_checkpointer(saver.clone()),
        )
        .await
        .unwrap();

    assert_eq!(state.task(), "tell me a story");
    assert!(state.messages().len() > first.state.messages().len());
    assert_eq!(saver.history("t-origin").await.unwrap().len(), 4);
    assert!(saver.history("t-other").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_backed_run_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let file = FileCheckpointSaver::<OrchestratorState>::open(dir.path())
            .await
            .unwrap();
        let saver: Arc<dyn CheckpointSaver<OrchestratorState>> = Arc::new(file);
        Orchestrator::reference(1_000)
            .run(
                "recall my notes",
                RunOptions::default()
                    .with_thread_id("t-file")
                    .with_checkpointer(saver),
            )
            .await
            .unwrap();
    }

    let reopened = FileCheckpointSaver::<OrchestratorState>::open(dir.path())
        .await
        .unwrap();
    let states = Orchestrator::reference(1_000)
        .get_execution_history("t-file", &reopened)
        .await
        .unwrap();
    assert_eq!(states.len(), 2);
    assert_eq!(states[1].messages()[2].name.as_deref(), Some("memoryAgent"));
}

#[tokio::test]
async fn test_compare_execution_paths() {
    let orchestrator = Orchestrator::reference(1_000);
    let config_a = json!({ "narrativeAgent": { "provider": "anthropic" } });
    let config_b = json!({ "narrativeAgent": { "provider": "openai" } });

    let comparison = orchestrator
        .compare_execution_paths(
            "tell me a story",
            config_a,
            config_b,
            RunOptions::default().with_thread_id("ignored"),
        )
        .await
        .unwrap();

    assert_ne!(comparison.path1.thread_id, comparison.path2.thread_id);
    assert_ne!(comparison.path1.thread_id, "ignored");
    assert_eq!(comparison.path1.state.task(), "tell me a story");
    assert_eq!(comparison.path2.state.task(), "tell me a story");

    let reply = |s: &OrchestratorState| s.messages().last().unwrap().content.clone();
    assert!(reply(&comparison.path1.state).starts_with("[anthropic/"));
    assert!(reply(&comparison.path2.state).starts_with("[openai/"));
}

#[tokio::test]
async fn test_compare_fails_when_either_config_fails() {
    let err = Orchestrator::reference(1_000)
        .compare_execution_paths(
            "tell me a story",
            json!({}),
            json!({ "purposeAgent": null }),
            RunOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(
        matches!(err, OrchestratorError::Configuration { ref missing } if missing == &["purposeAgent"])
    );
}

#[tokio::test]
async fn test_plan_trip_declined_over_budget() {
    let suite = AgentSuite::reference().with_specialist(
        "action",
        Arc::new(ActionAgent::new(OperationType::ToolUse, 1_000)),
    );
    let (orchestrator, spawner) = with_spawner(Orchestrator::new(
        suite,
        Arc::new(DefaultStateFactory::new(500)),
    ));

    let state = orchestrator
        .run("plan trip", RunOptions::default())
        .await
        .unwrap();

    assert_eq!(state.budget_remaining_cents(), 500);
    assert!(state.messages().last().unwrap().content.starts_with("declined"));
    assert_eq!(spawner.get_active_model_count(), 0);
}

#[tokio::test]
async fn test_action_spends_and_queues() {
    let queue = Arc::new(InMemoryCommandQueue::new());
    let (orchestrator, spawner) = with_spawner(Orchestrator::reference(500));

    let state = orchestrator
        .run(
            "book a table for two",
            RunOptions::default()
                .with_user_id("u-1")
                .with_executor(queue.clone()),
        )
        .await
        .unwrap();

    assert_eq!(state.spent_cents(), 50);
    assert_eq!(queue.pending().len(), 1);
    assert_eq!(queue.pending()[0].request.requested_by, "u-1");

    spawner.wait_idle().await;
    let models = spawner.get_active_models();
    assert_eq!(models.len(), 1);
    assert!(models[0].status.is_terminal());
}

#[tokio::test]
async fn test_unrestricted_mode_spends_past_zero_budget() {
    let suite = AgentSuite::reference().with_specialist(
        "action",
        Arc::new(ActionAgent::new(OperationType::ToolUse, 1_000)),
    );
    let (orchestrator, _spawner) = with_spawner(Orchestrator::new(
        suite,
        Arc::new(DefaultStateFactory::new(500)),
    ));

    let state = orchestrator
        .run(
            "plan trip",
            RunOptions::default().with_config(json!({ "approvalMode": "unrestricted" })),
        )
        .await
        .unwrap();
    assert_eq!(state.budget_remaining_cents(), 0);
}

#[tokio::test]
async fn test_unregistered_purpose_label_is_routing_error() {
    let suite = AgentSuite::new(Arc::new(SupervisorAgent::new()), Arc::new(NextLabelRouter))
        .with_specialist("narrative", Arc::new(EchoAgent::new(AgentRole::Narrative)))
        .with_specialist("memory", Arc::new(EchoAgent::new(AgentRole::Memory)));
    let orchestrator = Orchestrator::new(suite, Arc::new(DefaultStateFactory::new(100)));

    let err = orchestrator
        .run("what is the goal here", RunOptions::default())
        .await
        .unwrap_err();
    match err {
        OrchestratorError::Graph(inner) => assert!(inner.to_string().contains("purpose")),
        other => panic!("expected routing error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_max_steps_from_config() {
    // One step allows the supervisor but not the specialist after it.
    let err = Orchestrator::reference(1_000)
        .run(
            "tell me a story",
            RunOptions::default().with_config(json!({ "maxSteps": 1 })),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Graph(_)));
}
