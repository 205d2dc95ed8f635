//! Phase dispatch.
//!
//! A leaf phase ID is parsed into a [`PhaseKind`], and [`InstallDispatch`]
//! maps each kind to its executor with an exhaustive match. Adding a phase
//! kind means adding a variant here.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    checks::CheckerConfig,
    error::{OpsError, Result},
    fsm::executor::{Dispatch, ExecutorParams, PhaseExecutor},
    models::{Manifest, OperationKind},
    phases::{self, SystemComponent},
    plan::phases::*,
    services::Services,
};

/// A leaf phase identified by its ID, with the payload its path carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseKind {
    Init,
    Selinux { node: String },
    Checks,
    Configure,
    Bootstrap { node: String },
    Pull { node: String },
    System { node: String, component: SystemComponent },
    Wait,
    Rbac,
    SystemResources,
    UserResources,
    Export { node: String },
    Runtime { app: String },
    App { app: String },
    Election,
    GravityResources,
    Reconfigure { step: String },
}

impl PhaseKind {
    /// Parses the ID of a leaf phase of a plan of the given kind.
    ///
    /// ```
    /// use shipwright_core::fsm::PhaseKind;
    /// use shipwright_core::models::OperationKind;
    /// use shipwright_core::phases::SystemComponent;
    ///
    /// let kind = PhaseKind::parse(OperationKind::Install, "/masters/node-1/planet").unwrap();
    /// assert_eq!(
    ///     kind,
    ///     PhaseKind::System { node: "node-1".into(), component: SystemComponent::Planet }
    /// );
    /// assert!(PhaseKind::parse(OperationKind::Install, "/masters").is_err());
    /// ```
    pub fn parse(kind: OperationKind, id: &str) -> Result<Self> {
        let unknown = || OpsError::bad_parameter(format!("unknown phase {id:?}"));
        let segments: Vec<&str> = id
            .strip_prefix('/')
            .ok_or_else(unknown)?
            .split('/')
            .collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(unknown());
        }

        if kind == OperationKind::Reconfigure {
            return match segments.as_slice() {
                [step] => Ok(PhaseKind::Reconfigure {
                    step: step.to_string(),
                }),
                _ => Err(unknown()),
            };
        }

        let root = format!("/{}", segments[0]);
        let phase = match (root.as_str(), &segments[1..]) {
            (INIT_PHASE, []) => PhaseKind::Init,
            (SELINUX_PHASE, [node]) => PhaseKind::Selinux {
                node: node.to_string(),
            },
            (CHECKS_PHASE, []) => PhaseKind::Checks,
            (CONFIGURE_PHASE, []) => PhaseKind::Configure,
            (BOOTSTRAP_PHASE, [node]) => PhaseKind::Bootstrap {
                node: node.to_string(),
            },
            (PULL_PHASE, [node]) => PhaseKind::Pull {
                node: node.to_string(),
            },
            (MASTERS_PHASE | NODES_PHASE | SYSTEM_PHASE, [node, component]) => PhaseKind::System {
                node: node.to_string(),
                component: component.parse().map_err(|_| unknown())?,
            },
            (WAIT_PHASE, []) => PhaseKind::Wait,
            (RBAC_PHASE, []) => PhaseKind::Rbac,
            (SYSTEM_RESOURCES_PHASE, []) => PhaseKind::SystemResources,
            (USER_RESOURCES_PHASE, []) => PhaseKind::UserResources,
            (EXPORT_PHASE, [node]) => PhaseKind::Export {
                node: node.to_string(),
            },
            (RUNTIME_PHASE, [app]) => PhaseKind::Runtime {
                app: app.to_string(),
            },
            (APP_PHASE, [app]) => PhaseKind::App {
                app: app.to_string(),
            },
            (ELECTION_PHASE | ELECT_PHASE, []) => PhaseKind::Election,
            (GRAVITY_RESOURCES_PHASE, []) => PhaseKind::GravityResources,
            _ => return Err(unknown()),
        };
        Ok(phase)
    }
}

/// Dispatch for install, expand and reconfigure plans.
pub struct InstallDispatch {
    services: Services,
    manifest: Arc<Manifest>,
    checker: CheckerConfig,
    state_dir: PathBuf,
    wait_timeout: Duration,
}

impl InstallDispatch {
    pub fn new(services: Services, manifest: Arc<Manifest>, checker: CheckerConfig) -> Self {
        let state_dir = checker.state_dir.clone();
        Self {
            services,
            manifest,
            checker,
            state_dir,
            wait_timeout: phases::DEFAULT_WAIT_TIMEOUT,
        }
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }
}

impl Dispatch for InstallDispatch {
    fn resolve(&self, params: ExecutorParams) -> Result<Box<dyn PhaseExecutor>> {
        let kind = PhaseKind::parse(params.plan.operation_kind, &params.phase.id)?;
        let services = &self.services;
        let executor: Box<dyn PhaseExecutor> = match kind {
            PhaseKind::Init => Box::new(phases::InitExecutor::new(
                params,
                Arc::clone(&services.remote),
            )?),
            PhaseKind::Selinux { .. } => Box::new(phases::SelinuxExecutor::new(
                params,
                Arc::clone(&services.remote),
            )?),
            PhaseKind::Checks => Box::new(phases::ChecksExecutor::new(
                params,
                Arc::clone(&services.operator),
                Arc::clone(&services.remote),
                Arc::clone(&self.manifest),
                self.checker.clone(),
            )),
            PhaseKind::Configure => Box::new(phases::ConfigureExecutor::new(
                params,
                Arc::clone(&services.packages),
            )?),
            PhaseKind::Bootstrap { .. } => Box::new(phases::BootstrapExecutor::new(
                params,
                Arc::clone(&services.remote),
                self.state_dir.clone(),
            )?),
            PhaseKind::Pull { .. } => Box::new(phases::PullExecutor::new(
                params,
                Arc::clone(&services.packages),
            )?),
            PhaseKind::System { component, .. } => Box::new(phases::SystemExecutor::new(
                params,
                component,
                Arc::clone(&services.packages),
                Arc::clone(&services.remote),
            )?),
            PhaseKind::Wait => Box::new(phases::WaitExecutor::new(
                params,
                Arc::clone(&services.remote),
                self.wait_timeout,
            )?),
            PhaseKind::Rbac | PhaseKind::Runtime { .. } | PhaseKind::App { .. } => Box::new(
                phases::AppExecutor::new(params, Arc::clone(&services.apps))?,
            ),
            PhaseKind::SystemResources | PhaseKind::UserResources | PhaseKind::GravityResources => {
                Box::new(phases::ResourcesExecutor::new(
                    params,
                    Arc::clone(&services.apps),
                )?)
            }
            PhaseKind::Export { .. } => Box::new(phases::ExportExecutor::new(
                params,
                Arc::clone(&services.packages),
            )?),
            PhaseKind::Election => Box::new(phases::ElectionExecutor::new(
                params,
                Arc::clone(&services.apps),
            )?),
            PhaseKind::Reconfigure { .. } => Box::new(phases::CommandExecutor::new(
                params,
                Arc::clone(&services.remote),
            )?),
        };
        Ok(executor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(id: &str) -> Result<PhaseKind> {
        PhaseKind::parse(OperationKind::Install, id)
    }

    #[test]
    fn test_parse_leaf_ids() {
        assert_eq!(parse("/init").unwrap(), PhaseKind::Init);
        assert_eq!(
            parse("/pull/node-1").unwrap(),
            PhaseKind::Pull {
                node: "node-1".to_string()
            }
        );
        assert_eq!(
            parse("/nodes/node-2/teleport").unwrap(),
            PhaseKind::System {
                node: "node-2".to_string(),
                component: SystemComponent::Teleport
            }
        );
        assert_eq!(
            parse("/runtime/dns-app").unwrap(),
            PhaseKind::Runtime {
                app: "dns-app".to_string()
            }
        );
        assert_eq!(parse("/elect").unwrap(), PhaseKind::Election);
    }

    #[test]
    fn test_unknown_ids_are_bad_parameter() {
        for id in ["", "init", "/", "/unknown", "/pull", "/masters/node-1/etcd", "/init/extra", "/pull//"] {
            assert!(parse(id).unwrap_err().is_bad_parameter(), "{id}");
        }
    }

    #[test]
    fn test_reconfigure_steps() {
        assert_eq!(
            PhaseKind::parse(OperationKind::Reconfigure, "/checks").unwrap(),
            PhaseKind::Reconfigure {
                step: "checks".to_string()
            }
        );
        assert!(PhaseKind::parse(OperationKind::Reconfigure, "/etcd/extra").is_err());
    }
}
