mod plan_tests {
    use std::collections::BTreeSet;

    use crate::models::{
        ClusterRole, Dependencies, Locator, Manifest, NodeProfile, OperationKey, OperationKind,
        OperationPlan, Server, DNS_APP, GRAVITY_PACKAGE, PLANET_PACKAGE, RBAC_APP, SITE_APP,
        SERVICE_ROLE_MASTER, SERVICE_ROLE_NODE, TELEPORT_PACKAGE,
    };
    use crate::plan::{
        build_expand_plan, build_install_plan, build_reconfigure_plan, phases::*, ExpandParams,
        InstallParams, ReconfigureParams,
    };

    fn locator(name: &str) -> Locator {
        Locator::new("gravitational.io", name, "1.0.0")
    }

    fn create_manifest() -> Manifest {
        Manifest {
            locator: locator("telekube"),
            node_profiles: vec![
                NodeProfile::new("master").with_service_role(SERVICE_ROLE_MASTER),
                NodeProfile::new("worker").with_service_role(SERVICE_ROLE_NODE),
                NodeProfile::new("any"),
            ],
            dependencies: Dependencies {
                packages: vec![
                    locator(GRAVITY_PACKAGE),
                    locator(TELEPORT_PACKAGE),
                    locator(PLANET_PACKAGE),
                ],
                apps: vec![locator(RBAC_APP), locator(DNS_APP), locator(SITE_APP)],
            },
        }
    }

    fn key() -> OperationKey {
        OperationKey::new("system", "example.com", "op-1")
    }

    fn install_params(roles: &[&str]) -> InstallParams {
        let servers = roles
            .iter()
            .enumerate()
            .map(|(i, role)| {
                Server::new(format!("node-{}", i + 1), format!("10.0.0.{}", i + 1), *role)
            })
            .collect();
        InstallParams::new(key(), servers)
    }

    fn top_level_ids(plan: &OperationPlan) -> Vec<&str> {
        plan.phases.iter().map(|phase| phase.id.as_str()).collect()
    }

    #[test]
    fn test_single_master_order() {
        let plan = build_install_plan(&install_params(&["master"]), &create_manifest()).unwrap();
        assert_eq!(
            top_level_ids(&plan),
            vec![
                INIT_PHASE,
                CHECKS_PHASE,
                CONFIGURE_PHASE,
                BOOTSTRAP_PHASE,
                PULL_PHASE,
                MASTERS_PHASE,
                WAIT_PHASE,
                RBAC_PHASE,
                SYSTEM_RESOURCES_PHASE,
                EXPORT_PHASE,
                RUNTIME_PHASE,
                APP_PHASE,
                ELECTION_PHASE,
            ]
        );
        assert!(plan.find_phase(NODES_PHASE).is_none());
        assert_eq!(
            plan.find_phase(WAIT_PHASE).unwrap().requires,
            vec![MASTERS_PHASE.to_string()]
        );
    }

    #[test]
    fn test_nodes_and_optional_phases() {
        let mut params = install_params(&["master", "worker", "worker"]);
        params.selinux = true;
        params.user_resources = Some("kind: ConfigMap".to_string());
        params.gravity_resources = Some("kind: AuthGateway".to_string());
        let plan = build_install_plan(&params, &create_manifest()).unwrap();

        assert_eq!(
            top_level_ids(&plan),
            vec![
                INIT_PHASE,
                SELINUX_PHASE,
                CHECKS_PHASE,
                CONFIGURE_PHASE,
                BOOTSTRAP_PHASE,
                PULL_PHASE,
                MASTERS_PHASE,
                NODES_PHASE,
                WAIT_PHASE,
                RBAC_PHASE,
                SYSTEM_RESOURCES_PHASE,
                USER_RESOURCES_PHASE,
                EXPORT_PHASE,
                RUNTIME_PHASE,
                APP_PHASE,
                ELECTION_PHASE,
                GRAVITY_RESOURCES_PHASE,
            ]
        );
        assert_eq!(
            plan.find_phase(CHECKS_PHASE).unwrap().requires,
            vec![INIT_PHASE.to_string(), SELINUX_PHASE.to_string()]
        );
        assert_eq!(
            plan.find_phase(WAIT_PHASE).unwrap().requires,
            vec![MASTERS_PHASE.to_string(), NODES_PHASE.to_string()]
        );

        let nodes = plan.find_phase(NODES_PHASE).unwrap();
        assert_eq!(nodes.limit, Some(10));
        let node = plan.find_phase("/nodes/node-2").unwrap();
        assert_eq!(node.requires, vec!["/pull/node-2".to_string()]);
        assert_eq!(node.phases.len(), 2);
        assert!(plan.find_phase("/nodes/node-3/planet").is_some());
        assert!(plan.find_phase("/export/node-2").is_none());
    }

    #[test]
    fn test_masters_pull_application_nodes_pull_runtime() {
        let plan =
            build_install_plan(&install_params(&["master", "worker"]), &create_manifest()).unwrap();

        let master_pull = plan.find_phase("/pull/node-1").unwrap();
        let pull = master_pull.data.as_ref().unwrap().pull.as_ref().unwrap();
        assert!(pull.apps.contains(&locator("telekube")));
        assert_eq!(pull.apps.len(), 4);

        let node_pull = plan.find_phase("/pull/node-2").unwrap();
        let pull = node_pull.data.as_ref().unwrap().pull.as_ref().unwrap();
        assert!(pull.apps.is_empty());
        assert_eq!(
            pull.packages,
            vec![
                locator(GRAVITY_PACKAGE),
                locator(TELEPORT_PACKAGE),
                locator(PLANET_PACKAGE)
            ]
        );
    }

    #[test]
    fn test_steps_follow_top_level_order() {
        let plan = build_install_plan(&install_params(&["master"]), &create_manifest()).unwrap();
        for (index, phase) in plan.phases.iter().enumerate() {
            let step = index as u32 + 1;
            assert_eq!(phase.step, step);
            assert!(phase.leaves().iter().all(|leaf| leaf.step == step));
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let params = install_params(&["any", "any", "worker", "any", "master"]);
        let manifest = create_manifest();
        let first = build_install_plan(&params, &manifest).unwrap();
        let second = build_install_plan(&params, &manifest).unwrap();

        let edges = |plan: &OperationPlan| -> BTreeSet<(String, Vec<String>)> {
            plan.all_phases()
                .into_iter()
                .map(|phase| (phase.id.clone(), phase.requires.clone()))
                .collect()
        };
        assert_eq!(edges(&first), edges(&second));
        assert_eq!(first.phases, second.phases);
        assert_eq!(first.servers, second.servers);
    }

    #[test]
    fn test_missing_dependencies_fail_before_execution() {
        let params = install_params(&["master"]);
        for missing in [TELEPORT_PACKAGE, GRAVITY_PACKAGE] {
            let mut manifest = create_manifest();
            manifest.dependencies.packages.retain(|l| l.name != missing);
            let err = build_install_plan(&params, &manifest).unwrap_err();
            assert!(err.is_not_found(), "{missing}: {err}");
        }
        for missing in [RBAC_APP, DNS_APP, SITE_APP] {
            let mut manifest = create_manifest();
            manifest.dependencies.apps.retain(|l| l.name != missing);
            let err = build_install_plan(&params, &manifest).unwrap_err();
            assert!(err.is_not_found(), "{missing}: {err}");
        }
    }

    #[test]
    fn test_runtime_apps_exclude_rbac() {
        let plan = build_install_plan(&install_params(&["master"]), &create_manifest()).unwrap();
        let runtime = plan.find_phase(RUNTIME_PHASE).unwrap();
        let ids: Vec<&str> = runtime.phases.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["/runtime/dns-app", "/runtime/site"]);
        assert!(plan.find_phase("/app/telekube").is_some());
    }

    #[test]
    fn test_expand_master_gets_election() {
        let mut manifest = create_manifest();
        manifest.dependencies.apps.clear();
        let params = ExpandParams {
            key: key(),
            server: Server::new("node-4", "10.0.0.4", "master"),
            master: Server::new("node-1", "10.0.0.1", "master"),
            selinux: false,
            service_user: Default::default(),
        };
        let plan = build_expand_plan(&params, &manifest).unwrap();
        assert_eq!(plan.operation_kind, OperationKind::Expand);
        assert_eq!(
            top_level_ids(&plan),
            vec![
                INIT_PHASE,
                CHECKS_PHASE,
                CONFIGURE_PHASE,
                BOOTSTRAP_PHASE,
                PULL_PHASE,
                SYSTEM_PHASE,
                WAIT_PHASE,
                ELECT_PHASE,
            ]
        );
        assert!(plan.find_phase("/system/node-4/planet").is_some());
        assert_eq!(plan.servers[0].cluster_role, Some(ClusterRole::Master));

        let params = ExpandParams {
            server: Server::new("node-5", "10.0.0.5", "worker"),
            ..params
        };
        let plan = build_expand_plan(&params, &manifest).unwrap();
        assert!(plan.find_phase(ELECT_PHASE).is_none());
    }

    #[test]
    fn test_reconfigure_is_a_chain_of_commands() {
        let params = ReconfigureParams {
            key: key(),
            server: Server::new("node-1", "10.0.0.1", "master"),
            advertise_addr: "10.0.0.100".to_string(),
        };
        let plan = build_reconfigure_plan(&params).unwrap();
        assert_eq!(plan.phases.len(), 10);
        assert_eq!(plan.phases[0].id, CHECKS_PHASE);
        assert!(plan.phases[0].requires.is_empty());
        for pair in plan.phases.windows(2) {
            assert_eq!(pair[1].requires, vec![pair[0].id.clone()]);
        }
        let etcd = plan.find_phase(ETCD_PHASE).unwrap();
        assert_eq!(
            etcd.data.as_ref().unwrap().command,
            vec![
                "shipwright",
                "system",
                "reconfigure",
                "etcd",
                "--advertise-addr",
                "10.0.0.100"
            ]
        );

        let same = ReconfigureParams {
            advertise_addr: "10.0.0.1".to_string(),
            ..params
        };
        assert!(build_reconfigure_plan(&same).unwrap_err().is_bad_parameter());
    }
}
