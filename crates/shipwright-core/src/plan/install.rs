//! Install plan.

use serde_json::json;

use super::{phases::*, split_servers, InstallParams, PhaseList};
use crate::{
    error::{OpsError, Result},
    models::{
        Locator, Manifest, OperationKind, OperationPlan, Phase, PhaseData, PullData, Server,
        DNS_APP, GRAVITY_PACKAGE, RBAC_APP, SITE_APP, TELEPORT_PACKAGE,
    },
};

/// Builds the plan that installs a new cluster on `params.servers`.
///
/// Phases run in this order, each top-level phase requiring the ones before
/// it that it depends on:
///
/// ```text
/// /init → /selinux → /checks → /configure → /bootstrap → /pull → /masters
///   → /nodes → /wait → /rbac → /system-resources → /user-resources
///   → /export → /runtime → /app → /election → /gravity-resources
/// ```
///
/// `/selinux`, `/nodes`, `/user-resources` and `/gravity-resources` are only
/// added when they have work to do.
pub fn build_install_plan(params: &InstallParams, manifest: &Manifest) -> Result<OperationPlan> {
    let (masters, nodes) = split_servers(&params.servers, manifest)?;
    let builder = InstallBuilder::new(params, manifest, &masters)?;
    let servers: Vec<Server> = masters.iter().chain(nodes.iter()).cloned().collect();

    let mut plan = PhaseList::default();
    plan.push(builder.init_phase());
    if params.selinux {
        plan.push(
            builder
                .per_node(SELINUX_PHASE, "Bootstrap SELinux policy", &servers, |server| {
                    Ok(PhaseData {
                        server: Some(server.clone()),
                        ..Default::default()
                    })
                })?
                .with_requires(plan.require_if_present(&[INIT_PHASE])),
        );
    }
    plan.push(
        builder
            .checks_phase()
            .with_requires(plan.require_if_present(&[INIT_PHASE, SELINUX_PHASE])),
    );
    plan.push(
        builder
            .configure_phase()
            .with_requires(plan.require_if_present(&[CHECKS_PHASE])),
    );
    plan.push(
        builder
            .per_node(BOOTSTRAP_PHASE, "Bootstrap local state", &servers, |server| {
                Ok(PhaseData {
                    server: Some(server.clone()),
                    master: Some(builder.master.clone()),
                    service_user: Some(params.service_user.clone()),
                    ..Default::default()
                })
            })?
            .with_requires(plan.require_if_present(&[CONFIGURE_PHASE])),
    );
    plan.push(
        builder
            .per_node(PULL_PHASE, "Pull packages", &servers, |server| {
                Ok(PhaseData {
                    server: Some(server.clone()),
                    pull: Some(builder.pull_data(server)?),
                    ..Default::default()
                })
            })?
            .with_requires(plan.require_if_present(&[CONFIGURE_PHASE, BOOTSTRAP_PHASE])),
    );
    plan.push(builder.system_phase(
        MASTERS_PHASE,
        "Install system software on master nodes",
        &masters,
    )?);
    if !nodes.is_empty() {
        plan.push(builder.system_phase(
            NODES_PHASE,
            "Install system software on regular nodes",
            &nodes,
        )?);
    }
    plan.push(
        builder
            .master_phase(WAIT_PHASE, "Wait for the cluster to come up")
            .with_requires(plan.require_if_present(&[MASTERS_PHASE, NODES_PHASE])),
    );
    plan.push(
        Phase::new(RBAC_PHASE, "Bootstrap cluster permissions")
            .with_data(PhaseData {
                master: Some(builder.master.clone()),
                package: Some(builder.rbac.clone()),
                ..Default::default()
            })
            .with_requires(plan.require_if_present(&[WAIT_PHASE])),
    );
    plan.push(
        builder
            .resources_phase(
                SYSTEM_RESOURCES_PHASE,
                "Create system resources",
                builder.system_resources(&servers),
            )
            .with_requires(plan.require_if_present(&[RBAC_PHASE])),
    );
    if let Some(resources) = &params.user_resources {
        plan.push(
            builder
                .resources_phase(
                    USER_RESOURCES_PHASE,
                    "Create user supplied resources",
                    resources.clone(),
                )
                .with_requires(plan.require_if_present(&[SYSTEM_RESOURCES_PHASE])),
        );
    }
    plan.push(
        builder
            .per_node(EXPORT_PHASE, "Export application images", &masters, |server| {
                Ok(PhaseData {
                    server: Some(server.clone()),
                    package: Some(manifest.locator.clone()),
                    ..Default::default()
                })
            })?
            .with_requires(plan.require_if_present(&[WAIT_PHASE])),
    );
    plan.push(
        builder
            .apps_phase(RUNTIME_PHASE, "Install system applications", &manifest.runtime_apps())
            .with_requires(plan.require_if_present(&[RBAC_PHASE, EXPORT_PHASE])),
    );
    plan.push(
        builder
            .apps_phase(APP_PHASE, "Install the application", &[&manifest.locator])
            .with_requires(plan.require_if_present(&[RUNTIME_PHASE])),
    );
    plan.push(
        builder
            .master_phase(ELECTION_PHASE, "Enable leader election on master nodes")
            .with_requires(plan.require_if_present(&[APP_PHASE])),
    );
    if let Some(resources) = &params.gravity_resources {
        plan.push(
            builder
                .resources_phase(
                    GRAVITY_RESOURCES_PHASE,
                    "Create cluster configuration resources",
                    resources.clone(),
                )
                .with_requires(plan.require_if_present(&[ELECTION_PHASE])),
        );
    }

    let plan = plan.into_plan(&params.key, OperationKind::Install, servers);
    plan.check()?;
    Ok(plan)
}

struct InstallBuilder<'a> {
    params: &'a InstallParams,
    manifest: &'a Manifest,
    master: Server,
    teleport: Locator,
    gravity: Locator,
    rbac: Locator,
}

impl<'a> InstallBuilder<'a> {
    fn new(params: &'a InstallParams, manifest: &'a Manifest, masters: &[Server]) -> Result<Self> {
        let master = masters
            .first()
            .cloned()
            .ok_or_else(|| OpsError::bad_parameter("no master servers"))?;

        // Resolve every dependency up front.
        manifest.dependency_app(SITE_APP)?;
        manifest.dependency_app(DNS_APP)?;
        Ok(Self {
            params,
            manifest,
            master,
            teleport: manifest.dependency_package(TELEPORT_PACKAGE)?.clone(),
            gravity: manifest.dependency_package(GRAVITY_PACKAGE)?.clone(),
            rbac: manifest.dependency_app(RBAC_APP)?.clone(),
        })
    }

    fn init_phase(&self) -> Phase {
        Phase::new(INIT_PHASE, "Initialize the operation").with_data(PhaseData {
            master: Some(self.master.clone()),
            ..Default::default()
        })
    }

    fn checks_phase(&self) -> Phase {
        Phase::new(CHECKS_PHASE, "Run preflight checks")
    }

    fn configure_phase(&self) -> Phase {
        Phase::new(CONFIGURE_PHASE, "Configure packages for all nodes").with_data(PhaseData {
            master: Some(self.master.clone()),
            ..Default::default()
        })
    }

    /// Leaf running cluster-level work on the first master.
    fn master_phase(&self, id: &str, description: &str) -> Phase {
        Phase::new(id, description).with_data(PhaseData {
            master: Some(self.master.clone()),
            ..Default::default()
        })
    }

    fn resources_phase(&self, id: &str, description: &str, resources: String) -> Phase {
        Phase::new(id, description).with_data(PhaseData {
            master: Some(self.master.clone()),
            resources: Some(resources),
            ..Default::default()
        })
    }

    /// Group with one child per server, executed concurrently.
    fn per_node<F>(
        &self,
        id: &str,
        description: &str,
        servers: &[Server],
        data: F,
    ) -> Result<Phase>
    where
        F: Fn(&Server) -> Result<PhaseData>,
    {
        let mut group = Phase::new(id, description).with_limit(self.params.num_parallel.max(1));
        for server in servers {
            group.add_child(
                Phase::new(
                    child_id(id, &server.hostname),
                    format!("{description} on node {}", server.hostname),
                )
                .with_data(data(server)?),
            );
        }
        Ok(group)
    }

    /// Installs teleport and the runtime on each server once it has pulled
    /// its packages.
    fn system_phase(&self, id: &str, description: &str, servers: &[Server]) -> Result<Phase> {
        let mut group = Phase::new(id, description).with_limit(self.params.num_parallel.max(1));
        for server in servers {
            let profile = self.manifest.node_profile(&server.role)?;
            let runtime = self.manifest.runtime_package(profile)?;
            let node_id = child_id(id, &server.hostname);

            let mut node = Phase::new(
                node_id.clone(),
                format!("Install system software on node {}", server.hostname),
            )
            .with_requires(vec![child_id(PULL_PHASE, &server.hostname)]);
            node.add_child(
                Phase::new(
                    child_id(&node_id, TELEPORT_COMPONENT),
                    format!(
                        "Install system package {} on node {}",
                        self.teleport.name, server.hostname
                    ),
                )
                .with_data(PhaseData {
                    server: Some(server.clone()),
                    package: Some(self.teleport.clone()),
                    ..Default::default()
                }),
            );
            node.add_child(
                Phase::new(
                    child_id(&node_id, PLANET_COMPONENT),
                    format!(
                        "Install system package {} on node {}",
                        runtime.name, server.hostname
                    ),
                )
                .with_data(PhaseData {
                    server: Some(server.clone()),
                    package: Some(runtime),
                    service_user: Some(self.params.service_user.clone()),
                    ..Default::default()
                }),
            );
            group.add_child(node);
        }
        Ok(group)
    }

    /// Group installing applications one after another on the master.
    fn apps_phase(&self, id: &str, description: &str, apps: &[&Locator]) -> Phase {
        let mut group = Phase::new(id, description);
        for locator in apps {
            group.add_child(
                Phase::new(
                    child_id(id, &locator.name),
                    format!("Install application {}:{}", locator.name, locator.version),
                )
                .with_data(PhaseData {
                    master: Some(self.master.clone()),
                    package: Some((*locator).clone()),
                    ..Default::default()
                }),
            );
        }
        group
    }

    /// Masters pull the whole application, regular nodes only what they
    /// need to run.
    fn pull_data(&self, server: &Server) -> Result<PullData> {
        let profile = self.manifest.node_profile(&server.role)?;
        let packages = vec![
            self.gravity.clone(),
            self.teleport.clone(),
            self.manifest.runtime_package(profile)?,
        ];
        if !server.is_master() {
            return Ok(PullData {
                packages,
                apps: Vec::new(),
            });
        }
        let mut apps: Vec<Locator> = self.manifest.dependencies.apps.clone();
        apps.push(self.manifest.locator.clone());
        Ok(PullData { packages, apps })
    }

    fn system_resources(&self, servers: &[Server]) -> String {
        json!({
            "kind": "cluster",
            "cluster": self.params.key.cluster_name,
            "application": self.manifest.locator.to_string(),
            "masters": servers
                .iter()
                .filter(|server| server.is_master())
                .map(|server| server.advertise_ip.as_str())
                .collect::<Vec<_>>(),
            "service_user": {
                "name": self.params.service_user.name,
                "uid": self.params.service_user.uid,
                "gid": self.params.service_user.gid,
            },
        })
        .to_string()
    }
}
