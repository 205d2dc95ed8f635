//! Phase executor contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::Result,
    models::{OperationKey, OperationPlan, Phase},
};

/// Performs the work of a single leaf phase.
///
/// `execute` may be invoked again for a phase that was interrupted, so it
/// must tolerate partially applied side effects. `pre_check` and
/// `post_check` are hooks for idempotency guards and default to no-ops.
#[async_trait]
pub trait PhaseExecutor: Send + Sync {
    async fn pre_check(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(&self) -> Result<()>;

    async fn post_check(&self) -> Result<()> {
        Ok(())
    }

    /// Undoes the phase's side effects. Only invoked on operator request.
    async fn rollback(&self) -> Result<()> {
        Ok(())
    }
}

/// Snapshot handed to an executor at dispatch time.
#[derive(Debug, Clone)]
pub struct ExecutorParams {
    pub plan: Arc<OperationPlan>,
    pub phase: Phase,
    pub key: OperationKey,
}

/// Resolves the executor for a leaf phase.
///
/// Resolution is a pure function of the phase; it must not perform I/O.
pub trait Dispatch: Send + Sync {
    fn resolve(&self, params: ExecutorParams) -> Result<Box<dyn PhaseExecutor>>;
}
