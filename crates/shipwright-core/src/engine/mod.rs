//! Operation engines.
//!
//! An engine owns one operation from start to finish: it prepares local
//! state, creates the operation record, builds and persists the plan, and
//! drives the [`Fsm`] through it. Every step is safe to repeat, so running
//! an engine again with the same configuration resumes the operation.
//!
//! ```text
//! bootstrap ─▶ create operation ─▶ (wait for agents) ─▶ init plan ─▶ FSM
//! ```

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::{
    backoff::{classify, polling_policy, retry_notify, BackoffError},
    error::{OpsError, Result},
    fsm::{ExecutionMode, Fsm},
    models::{AgentReport, Operation, OperationKey, OperationKind, OperationPlan, Server},
    operator::Operator,
};

mod expand;
mod install;
mod reconfigure;

pub use expand::Expander;
pub use install::Installer;
pub use reconfigure::Reconfigurator;

/// File in the state directory holding the token agents join with.
pub const TOKEN_FILE: &str = "install-token";

/// File in the state directory remembering the operation being run.
pub const OPERATION_FILE: &str = "operation-id";

/// How an engine run ended.
#[derive(Debug)]
pub enum Outcome {
    Completed,
    /// The plan stopped on a failed phase; the operation stays resumable
    Failed { key: OperationKey, error: OpsError },
    /// The plan was initialized for manual execution
    Manual,
    /// The run was interrupted before the plan finished
    Interrupted,
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

fn fs_error(path: &Path) -> impl FnOnce(std::io::Error) -> OpsError + '_ {
    move |source| OpsError::FileSystem {
        path: path.to_path_buf(),
        source,
    }
}

/// Returns the contents of `name` in `dir`, creating it with `generate` and
/// owner-only permissions if it does not exist yet.
pub(crate) fn read_or_create(dir: &Path, name: &str, generate: impl FnOnce() -> String) -> Result<String> {
    std::fs::create_dir_all(dir).map_err(fs_error(dir))?;
    let path = dir.join(name);
    match std::fs::read_to_string(&path) {
        Ok(contents) if !contents.trim().is_empty() => return Ok(contents.trim().to_string()),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(fs_error(&path)(e)),
    }

    let value = generate();
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&path).map_err(fs_error(&path))?;
    file.write_all(value.as_bytes()).map_err(fs_error(&path))?;
    Ok(value)
}

/// Resolves the operation key: the configured ID, else the one remembered
/// in the state directory, else a fresh one.
pub(crate) fn operation_key(
    state_dir: &Path,
    account_id: &str,
    cluster_name: &str,
    operation_id: Option<&str>,
) -> Result<OperationKey> {
    let operation_id = match operation_id {
        Some(id) => id.to_string(),
        None => read_or_create(state_dir, OPERATION_FILE, || uuid::Uuid::new_v4().to_string())?,
    };
    Ok(OperationKey::new(account_id, cluster_name, operation_id))
}

/// Creates the operation, or returns it if it already exists.
pub(crate) async fn ensure_operation(
    operator: &dyn Operator,
    key: &OperationKey,
    kind: OperationKind,
) -> Result<Operation> {
    match operator.create_operation(key, kind).await {
        Ok(operation) => {
            info!("created {key}");
            Ok(operation)
        }
        Err(e) if e.is_already_exists() => {
            info!("resuming {key}");
            let operation = operator.get_operation(key).await?;
            if operation.kind != kind {
                return Err(OpsError::bad_parameter(format!(
                    "{key} is a {} operation, not {}",
                    operation.kind.as_str(),
                    kind.as_str()
                )));
            }
            Ok(operation)
        }
        Err(e) => Err(e),
    }
}

/// Persists `plan` unless the operation already has one, in which case the
/// stored plan is returned.
pub(crate) async fn init_plan(operator: &dyn Operator, plan: OperationPlan) -> Result<OperationPlan> {
    let key = plan.key();
    match operator.create_operation_plan(&plan).await {
        Ok(()) => {
            info!(
                "initialized plan of {key} with {} phases",
                plan.top_level_count()
            );
            Ok(plan)
        }
        Err(e) if e.is_already_exists() => operator.get_operation_plan(&key).await,
        Err(e) => Err(e),
    }
}

/// Polls the agent report until an agent has joined from every server in
/// `servers`, logging agents as they join.
pub(crate) async fn wait_for_agents(
    operator: Arc<dyn Operator>,
    key: &OperationKey,
    servers: &[Server],
    timeout: Duration,
) -> Result<AgentReport> {
    let expected: Vec<String> = servers.iter().map(|s| s.hostname.clone()).collect();
    let last: Arc<Mutex<Option<AgentReport>>> = Arc::new(Mutex::new(None));
    info!("waiting for agents on {}", expected.join(", "));

    let result = retry_notify(
        polling_policy(timeout),
        || {
            let operator = Arc::clone(&operator);
            let last = Arc::clone(&last);
            let expected = expected.clone();
            let key = key.clone();
            async move {
                let report = operator
                    .get_site_install_operation_agent_report(&key)
                    .await
                    .map_err(classify)?;
                {
                    let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
                    for hostname in report.joined_since(last.as_ref()) {
                        info!("agent on {hostname} joined");
                    }
                    *last = Some(report.clone());
                }

                let missing: Vec<&str> = expected
                    .iter()
                    .map(String::as_str)
                    .filter(|hostname| report.servers.iter().all(|s| s.hostname != *hostname))
                    .collect();
                if missing.is_empty() {
                    Ok(report)
                } else {
                    Err(BackoffError::transient(OpsError::limit_exceeded(format!(
                        "still waiting for agents on {}",
                        missing.join(", ")
                    ))))
                }
            }
        },
        |error: OpsError, delay: Duration| debug!("{error}, checking again in {delay:?}"),
    )
    .await;

    result.map_err(|error| match error {
        OpsError::AccessDenied { .. } | OpsError::BadParameter { .. } => error,
        error => OpsError::limit_exceeded(format!(
            "agents did not join within {timeout:?}: {error}"
        )),
    })
}

/// Runs the plan, racing it against Ctrl-C, and records the outcome.
pub(crate) async fn drive(fsm: Fsm, mode: ExecutionMode) -> Result<Outcome> {
    let fsm = fsm.with_mode(mode);
    if mode == ExecutionMode::Manual {
        fsm.run().await?;
        return Ok(Outcome::Manual);
    }

    let result = tokio::select! {
        result = fsm.run() => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, {} can be resumed with `shipwright plan resume`", fsm.key());
            return Ok(Outcome::Interrupted);
        }
    };

    match result {
        Ok(()) => {
            fsm.complete(None).await?;
            info!("{} completed", fsm.key());
            Ok(Outcome::Completed)
        }
        Err(e) => {
            error!("{} failed: {e}", fsm.key());
            fsm.complete(Some(&e)).await?;
            for hint in recovery_hints(fsm.key()) {
                info!("{hint}");
            }
            Ok(Outcome::Failed {
                key: fsm.key().clone(),
                error: e,
            })
        }
    }
}

/// Commands that pick a failed operation back up.
pub fn recovery_hints(key: &OperationKey) -> Vec<String> {
    let id = &key.operation_id;
    vec![
        format!("inspect the plan with `shipwright plan show --operation-id {id}`"),
        format!(
            "retry a failed phase with `shipwright plan execute --operation-id {id} --phase <phase-id>` \
             or roll it back with `shipwright plan rollback --operation-id {id} --phase <phase-id>`"
        ),
        format!("continue with `shipwright plan resume --operation-id {id}`"),
    ]
}
