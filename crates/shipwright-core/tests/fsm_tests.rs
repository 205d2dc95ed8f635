mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{chain_plan, create_test_operator, key, plan_with, RecordingDispatch, SharedDispatch};
use shipwright_core::{
    fsm::{ExecutionMode, Fsm},
    models::{OperationKind, OperationState, Phase, PhaseState, ProgressState},
    LocalOperator, Operator, OpsError,
};

async fn setup(
    plan: shipwright_core::models::OperationPlan,
    dispatch: Arc<RecordingDispatch>,
) -> (tempfile::TempDir, Arc<LocalOperator>, Fsm) {
    let (temp_dir, operator) = create_test_operator().await;
    operator
        .create_operation(&key(), OperationKind::Install)
        .await
        .expect("Failed to create operation");
    operator
        .create_operation_plan(&plan)
        .await
        .expect("Failed to create plan");
    let fsm = Fsm::new(key(), operator.clone(), Arc::new(SharedDispatch(dispatch)));
    (temp_dir, operator, fsm)
}

#[tokio::test]
async fn test_run_executes_phases_in_order() {
    let dispatch = RecordingDispatch::new();
    let (_temp_dir, operator, fsm) = setup(chain_plan(&["/a", "/b", "/c"]), dispatch.clone()).await;

    fsm.run().await.expect("Plan should complete");

    assert_eq!(dispatch.executed(), vec!["/a", "/b", "/c"]);
    let plan = fsm.plan().await.unwrap();
    assert!(fsm.plan_state().await.unwrap().is_completed(&plan));

    let operation = operator.get_operation(&key()).await.unwrap();
    assert_eq!(operation.state, OperationState::InProgress);

    let progress = operator.get_site_operation_progress(&key()).await.unwrap().unwrap();
    assert_eq!(progress.completion, 99);
    assert_eq!(progress.step, 3);
}

#[tokio::test]
async fn test_resume_does_not_reexecute_completed_phases() {
    let dispatch = RecordingDispatch::new();
    let (_temp_dir, operator, fsm) = setup(chain_plan(&["/a", "/b", "/c"]), dispatch.clone()).await;
    operator
        .create_operation_plan_change(&key(), "/a", PhaseState::Completed, None)
        .await
        .unwrap();
    // An interrupted phase is picked up again.
    operator
        .create_operation_plan_change(&key(), "/b", PhaseState::InProgress, None)
        .await
        .unwrap();

    fsm.resume().await.expect("Resume should complete");

    assert_eq!(dispatch.executed(), vec!["/b", "/c"]);
}

#[tokio::test]
async fn test_failure_stops_dependents_and_requires_manual_retry() {
    let dispatch = RecordingDispatch::new();
    dispatch.fail("/b");
    let (_temp_dir, _operator, fsm) = setup(chain_plan(&["/a", "/b", "/c"]), dispatch.clone()).await;

    let err = fsm.run().await.unwrap_err();
    assert!(err.to_string().contains("/b exploded"));
    assert_eq!(dispatch.executed(), vec!["/a", "/b"]);

    let state = fsm.plan_state().await.unwrap();
    assert_eq!(state.leaf_state("/b"), PhaseState::Failed);
    assert_eq!(state.error("/b"), Some("/b exploded"));
    assert_eq!(state.leaf_state("/c"), PhaseState::Unstarted);

    // A resume run never retries the failed phase on its own.
    dispatch.heal("/b");
    let err = fsm.resume().await.unwrap_err();
    assert!(err.is_bad_parameter());
    assert!(err.to_string().contains("shipwright plan execute --phase /b"));
    assert_eq!(dispatch.executed().len(), 2);

    fsm.execute_phase("/b", false).await.expect("Manual retry should succeed");
    fsm.resume().await.expect("Resume should complete");
    assert_eq!(dispatch.executed(), vec!["/a", "/b", "/b", "/c"]);
}

#[tokio::test]
async fn test_group_limit_bounds_concurrency() {
    let children = ["/g/1", "/g/2", "/g/3", "/g/4", "/g/5"];
    let dispatch = RecordingDispatch::with_delay(&children, Duration::from_millis(50));
    let mut group = Phase::new("/g", "group").with_limit(2);
    for id in children {
        group.add_child(Phase::new(id, id));
    }
    let (_temp_dir, _operator, fsm) = setup(plan_with(vec![group]), dispatch.clone()).await;

    fsm.run().await.expect("Plan should complete");

    assert_eq!(dispatch.executed().len(), 5);
    assert_eq!(dispatch.max_running.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_group_without_limit_runs_sequentially() {
    let children = ["/g/1", "/g/2", "/g/3"];
    let dispatch = RecordingDispatch::with_delay(&children, Duration::from_millis(20));
    let mut group = Phase::new("/g", "group");
    for id in children {
        group.add_child(Phase::new(id, id));
    }
    let (_temp_dir, _operator, fsm) = setup(plan_with(vec![group]), dispatch.clone()).await;

    fsm.run().await.expect("Plan should complete");

    assert_eq!(dispatch.executed(), vec!["/g/1", "/g/2", "/g/3"]);
    assert_eq!(dispatch.max_running.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_child_stops_siblings_from_starting() {
    let dispatch = RecordingDispatch::new();
    dispatch.fail("/g/1");
    let mut group = Phase::new("/g", "group");
    for id in ["/g/1", "/g/2"] {
        group.add_child(Phase::new(id, id));
    }
    let after = Phase::new("/after", "after").with_requires(vec!["/g".to_string()]);
    let (_temp_dir, _operator, fsm) = setup(plan_with(vec![group, after]), dispatch.clone()).await;

    assert!(fsm.run().await.is_err());
    assert_eq!(dispatch.executed(), vec!["/g/1"]);

    let plan = fsm.plan().await.unwrap();
    let state = fsm.plan_state().await.unwrap();
    assert_eq!(state.state_of(&plan, "/g"), PhaseState::Failed);
    assert!(state.is_failed(&plan));
}

#[tokio::test]
async fn test_execute_phase_checks_requirements_and_force() {
    let dispatch = RecordingDispatch::new();
    let (_temp_dir, _operator, fsm) = setup(chain_plan(&["/a", "/b"]), dispatch.clone()).await;

    let err = fsm.execute_phase("/b", false).await.unwrap_err();
    assert!(err.is_bad_parameter());
    assert!(err.to_string().contains("/a"));

    let err = fsm.execute_phase("/missing", false).await.unwrap_err();
    assert!(err.is_not_found());

    fsm.execute_phase("/a", false).await.unwrap();
    let err = fsm.execute_phase("/a", false).await.unwrap_err();
    assert!(err.to_string().contains("--force"));

    fsm.execute_phase("/a", true).await.unwrap();
    assert_eq!(dispatch.executed(), vec!["/a", "/a"]);
}

#[tokio::test]
async fn test_rollback_phase() {
    let dispatch = RecordingDispatch::new();
    dispatch.fail("/b");
    let (_temp_dir, _operator, fsm) = setup(chain_plan(&["/a", "/b", "/c"]), dispatch.clone()).await;
    assert!(fsm.run().await.is_err());

    fsm.rollback_phase("/b", false).await.unwrap();
    assert_eq!(dispatch.rolled_back(), vec!["/b"]);
    let state = fsm.plan_state().await.unwrap();
    assert_eq!(state.leaf_state("/b"), PhaseState::RolledBack);

    // Nothing to do for a phase that never ran.
    fsm.rollback_phase("/c", false).await.unwrap();
    assert_eq!(dispatch.rolled_back(), vec!["/b"]);

    let err = fsm.rollback_phase("/a", false).await.unwrap_err();
    assert!(err.is_bad_parameter());
    fsm.rollback_phase("/a", true).await.unwrap();
    assert_eq!(dispatch.rolled_back(), vec!["/b", "/a"]);
}

#[tokio::test]
async fn test_manual_mode_does_not_traverse() {
    let dispatch = RecordingDispatch::new();
    let (_temp_dir, operator, fsm) = setup(chain_plan(&["/a"]), dispatch.clone()).await;

    fsm.with_mode(ExecutionMode::Manual).run().await.unwrap();

    assert!(dispatch.executed().is_empty());
    let operation = operator.get_operation(&key()).await.unwrap();
    assert_eq!(operation.state, OperationState::Created);
}

#[tokio::test]
async fn test_complete_records_outcome() {
    let dispatch = RecordingDispatch::new();
    let (_temp_dir, operator, fsm) = setup(chain_plan(&["/a", "/b"]), dispatch).await;

    fsm.complete(None).await.unwrap();
    let operation = operator.get_operation(&key()).await.unwrap();
    assert_eq!(operation.state, OperationState::Completed);
    assert_eq!(operation.message.as_deref(), Some("operation completed manually"));
    let progress = operator.get_site_operation_progress(&key()).await.unwrap().unwrap();
    assert_eq!(progress.completion, 100);
    assert_eq!(progress.state, ProgressState::Completed);

    fsm.complete(Some(&OpsError::bad_parameter("disk too slow")))
        .await
        .unwrap();
    let operation = operator.get_operation(&key()).await.unwrap();
    assert_eq!(operation.state, OperationState::Failed);
    assert!(operation.message.unwrap().contains("disk too slow"));
}

#[tokio::test]
async fn test_progress_can_be_disabled() {
    let dispatch = RecordingDispatch::new();
    let (_temp_dir, operator, fsm) = setup(chain_plan(&["/a"]), dispatch).await;

    fsm.with_progress(false).run().await.unwrap();

    assert!(operator
        .get_site_operation_progress(&key())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_wide_group_records_every_change() {
    let children: Vec<String> = (1..=40).map(|i| format!("/g/{i}")).collect();
    for round in 0..5 {
        let dispatch = RecordingDispatch::new();
        let mut group = Phase::new("/g", "group").with_limit(10);
        for id in &children {
            group.add_child(Phase::new(id, id));
        }
        let (_temp_dir, operator, fsm) = setup(plan_with(vec![group]), dispatch.clone()).await;

        fsm.resume()
            .await
            .unwrap_or_else(|e| panic!("round {round} should complete: {e}"));

        assert_eq!(dispatch.executed().len(), 40);
        let state = fsm.plan_state().await.unwrap();
        for id in &children {
            assert_eq!(state.leaf_state(id), PhaseState::Completed, "{id} in round {round}");
        }
        let changes = operator.get_operation_plan_changes(&key()).await.unwrap();
        assert_eq!(changes.len(), 80);
    }
}

#[tokio::test]
async fn test_execute_phase_finishes_partially_completed_group() {
    let dispatch = RecordingDispatch::new();
    let mut group = Phase::new("/g", "group").with_limit(2);
    for id in ["/g/1", "/g/2"] {
        group.add_child(Phase::new(id, id));
    }
    let (_temp_dir, operator, fsm) = setup(plan_with(vec![group]), dispatch.clone()).await;
    operator
        .create_operation_plan_change(&key(), "/g/1", PhaseState::Completed, None)
        .await
        .unwrap();

    fsm.execute_phase("/g", false)
        .await
        .expect("Unstarted children should run without force");

    assert_eq!(dispatch.executed(), vec!["/g/2"]);
    let plan = fsm.plan().await.unwrap();
    assert!(fsm.plan_state().await.unwrap().is_completed(&plan));
}

#[tokio::test]
async fn test_execute_phase_refuses_group_with_running_child() {
    let dispatch = RecordingDispatch::new();
    let mut group = Phase::new("/g", "group").with_limit(2);
    for id in ["/g/1", "/g/2"] {
        group.add_child(Phase::new(id, id));
    }
    let (_temp_dir, operator, fsm) = setup(plan_with(vec![group]), dispatch.clone()).await;
    operator
        .create_operation_plan_change(&key(), "/g/1", PhaseState::InProgress, None)
        .await
        .unwrap();

    let err = fsm.execute_phase("/g", false).await.unwrap_err();
    assert!(err.is_bad_parameter());
    assert!(dispatch.executed().is_empty());

    fsm.execute_phase("/g", true).await.expect("Force should re-run the group");
    assert_eq!(dispatch.executed().len(), 2);
}
