//! Reconfigure engine: moves a single-node cluster to a new advertise
//! address.

use std::sync::Arc;

use log::info;

use super::{drive, ensure_operation, init_plan, operation_key, Outcome};
use crate::{
    checks::CheckerConfig,
    config::ReconfigureConfig,
    error::Result,
    fsm::{ExecutionMode, Fsm, InstallDispatch},
    models::{OperationKey, OperationKind},
    plan::build_reconfigure_plan,
    services::Services,
};

pub struct Reconfigurator {
    config: ReconfigureConfig,
    services: Services,
}

impl Reconfigurator {
    pub fn new(config: ReconfigureConfig, services: Services) -> Self {
        Self { config, services }
    }

    pub fn fsm(&self, key: OperationKey) -> Fsm {
        let dispatch = InstallDispatch::new(
            self.services.clone(),
            Arc::new(self.config.manifest.clone()),
            CheckerConfig {
                state_dir: self.config.state_dir.clone(),
                ..CheckerConfig::default()
            },
        );
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
        ensure_operation(operator.as_ref(), &key, OperationKind::Reconfigure).await?;

        let plan = build_reconfigure_plan(&self.config.reconfigure_params(key.clone()))?;
        init_plan(operator.as_ref(), plan).await?;
        info!(
            "reconfiguring {} from {} to {}",
            self.config.server.hostname, self.config.server.advertise_ip, self.config.advertise_addr
        );

        let mode = if self.config.manual {
            ExecutionMode::Manual
        } else {
            ExecutionMode::Automatic
        };
        drive(self.fsm(key), mode).await
    }
}
