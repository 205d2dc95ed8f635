mod common;

use common::{chain_plan, key, server_info};
use shipwright_core::{
    db::Database,
    models::{AgentReport, OperationKey, OperationKind, OperationState, PhaseState, ProgressState},
};
use tempfile::NamedTempFile;

/// Helper function to create a temporary database for testing
fn create_test_db() -> (NamedTempFile, Database) {
    let temp_file = NamedTempFile::new().expect("Failed to create temporary file");
    let db = Database::new(temp_file.path()).expect("Failed to create test database");
    (temp_file, db)
}

#[test]
fn test_database_initialization() {
    let (temp_file, _db) = create_test_db();
    assert!(temp_file.path().exists());
}

#[test]
fn test_create_operation() {
    let (_temp_file, mut db) = create_test_db();

    let operation = db
        .create_operation(&key(), OperationKind::Install)
        .expect("Failed to create operation");
    assert_eq!(operation.key, key());
    assert_eq!(operation.state, OperationState::Created);
    assert!(operation.message.is_none());

    let retrieved = db
        .get_operation("op-1")
        .expect("Failed to get operation")
        .expect("Operation should exist");
    assert_eq!(retrieved.kind, OperationKind::Install);
    assert_eq!(retrieved.key.cluster_name, "example.com");
}

#[test]
fn test_create_operation_twice_fails() {
    let (_temp_file, mut db) = create_test_db();
    db.create_operation(&key(), OperationKind::Install).unwrap();

    let err = db
        .create_operation(&key(), OperationKind::Expand)
        .unwrap_err();
    assert!(err.is_already_exists());
}

#[test]
fn test_get_nonexistent_operation() {
    let (_temp_file, db) = create_test_db();
    assert!(db.get_operation("missing").unwrap().is_none());
    assert!(db.last_operation().unwrap().is_none());
}

#[test]
fn test_list_operations_newest_first() {
    let (_temp_file, mut db) = create_test_db();
    for id in ["op-1", "op-2", "op-3"] {
        db.create_operation(&OperationKey::new("system", "example.com", id), OperationKind::Install)
            .unwrap();
    }

    let ids: Vec<String> = db
        .list_operations()
        .unwrap()
        .into_iter()
        .map(|operation| operation.key.operation_id)
        .collect();
    assert_eq!(ids, vec!["op-3", "op-2", "op-1"]);
    assert_eq!(db.last_operation().unwrap().unwrap().key.operation_id, "op-3");
}

#[test]
fn test_set_operation_state() {
    let (_temp_file, mut db) = create_test_db();
    db.create_operation(&key(), OperationKind::Install).unwrap();

    db.set_operation_state("op-1", OperationState::Failed, Some("disk too slow"))
        .unwrap();

    let operation = db.get_operation("op-1").unwrap().unwrap();
    assert_eq!(operation.state, OperationState::Failed);
    assert_eq!(operation.message.as_deref(), Some("disk too slow"));

    let err = db
        .set_operation_state("missing", OperationState::Completed, None)
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_plan_is_written_once() {
    let (_temp_file, mut db) = create_test_db();
    let plan = chain_plan(&["/a", "/b"]);

    // Plans belong to an existing operation.
    assert!(db.create_plan(&plan).unwrap_err().is_not_found());

    db.create_operation(&key(), OperationKind::Install).unwrap();
    db.create_plan(&plan).expect("Failed to create plan");
    assert!(db.create_plan(&plan).unwrap_err().is_already_exists());

    let stored = db.get_plan("op-1").unwrap().expect("Plan should exist");
    assert_eq!(stored.phases.len(), 2);
    assert_eq!(stored.phases[1].requires, vec!["/a".to_string()]);
    assert!(db.get_plan("missing").unwrap().is_none());
}

#[test]
fn test_plan_changes_are_ordered() {
    let (_temp_file, mut db) = create_test_db();
    db.create_operation(&key(), OperationKind::Install).unwrap();

    let err = db
        .create_plan_change("op-1", "/a", PhaseState::InProgress, None)
        .unwrap_err();
    assert!(err.is_not_found());

    db.create_plan(&chain_plan(&["/a"])).unwrap();
    let first = db
        .create_plan_change("op-1", "/a", PhaseState::InProgress, None)
        .unwrap();
    let second = db
        .create_plan_change("op-1", "/a", PhaseState::Failed, Some("boom"))
        .unwrap();
    assert!(second.id > first.id);

    let changes = db.get_plan_changes("op-1").unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].new_state, PhaseState::InProgress);
    assert_eq!(changes[1].new_state, PhaseState::Failed);
    assert_eq!(changes[1].error.as_deref(), Some("boom"));
}

#[test]
fn test_progress_entries() {
    let (_temp_file, mut db) = create_test_db();
    db.create_operation(&key(), OperationKind::Install).unwrap();
    assert!(db.last_progress_entry("op-1").unwrap().is_none());

    db.create_progress_entry("op-1", 25, 1, ProgressState::InProgress, "checks")
        .unwrap();
    let entry = db
        .create_progress_entry("op-1", 250, 2, ProgressState::Completed, "done")
        .unwrap();
    assert_eq!(entry.completion, 100);

    let last = db.last_progress_entry("op-1").unwrap().unwrap();
    assert_eq!(last.step, 2);
    assert_eq!(last.message, "done");
    assert_eq!(last.state, ProgressState::Completed);
}

#[test]
fn test_agent_report_upsert() {
    let (_temp_file, mut db) = create_test_db();
    db.create_operation(&key(), OperationKind::Install).unwrap();
    assert!(db.get_agent_report("op-1").unwrap().servers.is_empty());

    let mut report = AgentReport {
        servers: vec![server_info("node-1", "10.0.0.1", "master")],
        message: String::new(),
    };
    db.set_agent_report("op-1", &report).unwrap();
    report
        .servers
        .push(server_info("node-2", "10.0.0.2", "worker"));
    db.set_agent_report("op-1", &report).unwrap();

    let stored = db.get_agent_report("op-1").unwrap();
    assert_eq!(stored.servers.len(), 2);
    assert_eq!(stored.servers[1].hostname, "node-2");
}
