mod model_tests {
    use jiff::Timestamp;

    use crate::models::{
        OperationKind, OperationPlan, Phase, PhaseData, PhaseState, Server,
    };

    fn create_test_plan() -> OperationPlan {
        let mut masters = Phase::new("/masters", "Install system software on masters");
        let mut node = Phase::new("/masters/node-1", "Install system software on node-1")
            .with_requires(vec!["/pull/node-1".to_string()]);
        node.add_child(Phase::new("/masters/node-1/teleport", "Install teleport"));
        node.add_child(Phase::new("/masters/node-1/planet", "Install planet"));
        masters.add_child(node);

        let mut pull = Phase::new("/pull", "Pull packages");
        pull.add_child(Phase::new("/pull/node-1", "Pull packages on node-1").with_data(
            PhaseData {
                server: Some(Server::new("node-1", "10.0.0.1", "master")),
                ..Default::default()
            },
        ));

        OperationPlan {
            operation_id: "op-1".to_string(),
            operation_kind: OperationKind::Install,
            account_id: "system".to_string(),
            cluster_name: "example.com".to_string(),
            servers: vec![Server::new("node-1", "10.0.0.1", "master")],
            phases: vec![pull, masters],
            created_at: Timestamp::from_second(1640995200).unwrap(), // 2022-01-01 00:00:00 UTC
        }
    }

    #[test]
    fn test_find_phase_and_leaves() {
        let plan = create_test_plan();
        assert!(plan.find_phase("/masters/node-1/planet").is_some());
        assert!(plan.find_phase("/masters/node-2").is_none());

        let leaves: Vec<&str> = plan.leaf_phases().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(
            leaves,
            vec!["/pull/node-1", "/masters/node-1/teleport", "/masters/node-1/planet"]
        );
        assert_eq!(plan.top_level_count(), 2);
    }

    #[test]
    fn test_ancestors() {
        let plan = create_test_plan();
        let ancestors: Vec<&str> = plan
            .ancestors("/masters/node-1/planet")
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ancestors, vec!["/masters", "/masters/node-1"]);
        assert!(plan.ancestors("/pull").is_empty());
    }

    #[test]
    fn test_check_accepts_valid_plan() {
        create_test_plan().check().expect("plan should be valid");
    }

    #[test]
    fn test_check_rejects_duplicate_ids() {
        let mut plan = create_test_plan();
        plan.phases.push(Phase::new("/pull", "Duplicate"));
        assert!(plan.check().unwrap_err().is_bad_parameter());
    }

    #[test]
    fn test_check_rejects_composite_with_data() {
        let mut plan = create_test_plan();
        plan.phases[1].data = Some(PhaseData::default());
        assert!(plan.check().unwrap_err().is_bad_parameter());
    }

    #[test]
    fn test_check_rejects_dangling_requirement() {
        let mut plan = create_test_plan();
        plan.phases[0].requires.push("/selinux".to_string());
        assert!(plan.check().unwrap_err().is_bad_parameter());
    }

    #[test]
    fn test_children_inherit_step() {
        let mut group = Phase::new("/bootstrap", "Bootstrap");
        group.step = 4;
        group.add_child(Phase::new("/bootstrap/node-1", "Bootstrap node-1"));
        assert_eq!(group.phases[0].step, 4);
    }

    #[test]
    fn test_phase_state_parse() {
        assert_eq!("completed".parse::<PhaseState>(), Ok(PhaseState::Completed));
        assert_eq!("rolled_back".parse::<PhaseState>(), Ok(PhaseState::RolledBack));
        assert!("done".parse::<PhaseState>().is_err());
    }
}
