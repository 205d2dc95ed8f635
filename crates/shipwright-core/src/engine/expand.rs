//! Expand engine: joins one node to a running cluster.

use std::sync::Arc;
use std::time::Duration;

use super::{drive, ensure_operation, init_plan, operation_key, wait_for_agents, Outcome};
use crate::{
    config::{ExpandConfig, DEFAULT_AGENT_WAIT_SECS},
    error::Result,
    fsm::{ExecutionMode, Fsm, InstallDispatch},
    models::{OperationKey, OperationKind},
    plan::build_expand_plan,
    services::Services,
};

pub struct Expander {
    config: ExpandConfig,
    services: Services,
}

impl Expander {
    pub fn new(config: ExpandConfig, services: Services) -> Self {
        Self { config, services }
    }

    pub fn fsm(&self, key: OperationKey) -> Fsm {
        let dispatch = InstallDispatch::new(
            self.services.clone(),
            Arc::new(self.config.manifest.clone()),
            self.config.checker_config(),
        )
        .with_wait_timeout(Duration::from_secs(self.config.cluster_wait_timeout_secs));
        Fsm::new(key, Arc::clone(&self.services.operator), Arc::new(dispatch))
    }

    pub async fn run(&self) -> Result<Outcome> {
        let operator = Arc::clone(&self.services.operator);
        let key = operation_key(
            &self.config.state_dir,
            &self.config.account_id,
            &self.config.cluster_name,
            self.config.operation_id.as_deref(),
        )?;
        ensure_operation(operator.as_ref(), &key, OperationKind::Expand).await?;
        wait_for_agents(
            Arc::clone(&operator),
            &key,
            std::slice::from_ref(&self.config.server),
            Duration::from_secs(DEFAULT_AGENT_WAIT_SECS),
        )
        .await?;

        let plan = build_expand_plan(&self.config.expand_params(key.clone()), &self.config.manifest)?;
        init_plan(operator.as_ref(), plan).await?;

        let mode = if self.config.manual {
            ExecutionMode::Manual
        } else {
            ExecutionMode::Automatic
        };
        drive(self.fsm(key), mode).await
    }
}
