//! Expand plan: joins one node to a running cluster.

use super::{phases::*, PhaseList};
use crate::{
    error::{OpsError, Result},
    models::{
        ClusterRole, Manifest, OperationKey, OperationKind, OperationPlan, Phase, PhaseData,
        PullData, Server, ServiceUser, GRAVITY_PACKAGE, SERVICE_ROLE_MASTER, SERVICE_ROLE_NODE,
        TELEPORT_PACKAGE,
    },
};

#[derive(Debug, Clone)]
pub struct ExpandParams {
    pub key: OperationKey,
    /// The joining server
    pub server: Server,
    /// A master of the running cluster
    pub master: Server,
    pub selinux: bool,
    pub service_user: ServiceUser,
}

/// Builds the plan that joins `params.server` to the cluster.
///
/// The joining server becomes a master only if its profile asks for it or
/// the caller assigned it the role; otherwise it joins as a regular node.
pub fn build_expand_plan(params: &ExpandParams, manifest: &Manifest) -> Result<OperationPlan> {
    let profile = manifest.node_profile(&params.server.role)?;
    let role = match (params.server.cluster_role, profile.service_role.as_deref()) {
        (Some(role), _) => role,
        (None, Some(SERVICE_ROLE_MASTER)) => ClusterRole::Master,
        (None, None | Some("") | Some(SERVICE_ROLE_NODE)) => ClusterRole::Node,
        (None, Some(other)) => {
            return Err(OpsError::bad_parameter(format!(
                "node profile {:?} has unknown service role {other:?}",
                profile.name
            )))
        }
    };
    let mut server = params.server.clone();
    server.cluster_role = Some(role);

    let teleport = manifest.dependency_package(TELEPORT_PACKAGE)?.clone();
    let gravity = manifest.dependency_package(GRAVITY_PACKAGE)?.clone();
    let runtime = manifest.runtime_package(profile)?;
    let hostname = server.hostname.clone();

    let data = || PhaseData {
        server: Some(server.clone()),
        master: Some(params.master.clone()),
        ..Default::default()
    };
    let node_group = |id: &str, description: &str, leaf: PhaseData| {
        let mut group = Phase::new(id, description);
        group.add_child(
            Phase::new(
                child_id(id, &hostname),
                format!("{description} on node {hostname}"),
            )
            .with_data(leaf),
        );
        group
    };

    let mut plan = PhaseList::default();
    plan.push(Phase::new(INIT_PHASE, "Initialize the operation").with_data(data()));
    if params.selinux {
        plan.push(
            node_group(SELINUX_PHASE, "Bootstrap SELinux policy", data())
                .with_requires(plan.require_if_present(&[INIT_PHASE])),
        );
    }
    plan.push(
        Phase::new(CHECKS_PHASE, "Run preflight checks")
            .with_requires(plan.require_if_present(&[INIT_PHASE, SELINUX_PHASE])),
    );
    plan.push(
        Phase::new(CONFIGURE_PHASE, "Configure packages for the joining node")
            .with_data(data())
            .with_requires(plan.require_if_present(&[CHECKS_PHASE])),
    );
    plan.push(
        node_group(
            BOOTSTRAP_PHASE,
            "Bootstrap local state",
            PhaseData {
                service_user: Some(params.service_user.clone()),
                ..data()
            },
        )
        .with_requires(plan.require_if_present(&[CONFIGURE_PHASE])),
    );
    plan.push(
        node_group(
            PULL_PHASE,
            "Pull packages",
            PhaseData {
                pull: Some(PullData {
                    packages: vec![gravity, teleport.clone(), runtime.clone()],
                    apps: Vec::new(),
                }),
                ..data()
            },
        )
        .with_requires(plan.require_if_present(&[CONFIGURE_PHASE, BOOTSTRAP_PHASE])),
    );

    let node_id = child_id(SYSTEM_PHASE, &hostname);
    let mut node = Phase::new(
        node_id.clone(),
        format!("Install system software on node {hostname}"),
    );
    node.add_child(
        Phase::new(
            child_id(&node_id, TELEPORT_COMPONENT),
            format!("Install system package {} on node {hostname}", teleport.name),
        )
        .with_data(PhaseData {
            package: Some(teleport),
            ..data()
        }),
    );
    node.add_child(
        Phase::new(
            child_id(&node_id, PLANET_COMPONENT),
            format!("Install system package {} on node {hostname}", runtime.name),
        )
        .with_data(PhaseData {
            package: Some(runtime),
            service_user: Some(params.service_user.clone()),
            ..data()
        }),
    );
    let mut system = Phase::new(SYSTEM_PHASE, "Install system software")
        .with_requires(plan.require_if_present(&[PULL_PHASE]));
    system.add_child(node);
    plan.push(system);

    plan.push(
        Phase::new(WAIT_PHASE, "Wait for the node to join the cluster")
            .with_data(data())
            .with_requires(plan.require_if_present(&[SYSTEM_PHASE])),
    );
    if role == ClusterRole::Master {
        plan.push(
            Phase::new(ELECT_PHASE, "Enable leader election on the joined master")
                .with_data(data())
                .with_requires(plan.require_if_present(&[WAIT_PHASE])),
        );
    }

    let plan = plan.into_plan(&params.key, OperationKind::Expand, vec![server]);
    plan.check()?;
    Ok(plan)
}
