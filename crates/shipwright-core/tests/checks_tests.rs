mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{manifest, server_info, FakeRemote};
use shipwright_core::{
    checks::{check_ports, ports_game, Checker, CheckerConfig, TEST_PORTS},
    models::{Manifest, OsInfo, Server, ServerInfos},
    remote::Remote,
    OpsError,
};

fn checker(remote: FakeRemote, manifest: Manifest) -> Checker {
    let config = CheckerConfig {
        test_duration: Duration::from_secs(1),
        ..CheckerConfig::default()
    };
    Checker::new(Arc::new(remote), Arc::new(manifest), config)
}

fn servers() -> Vec<Server> {
    vec![
        Server::new("node-1", "10.0.0.1", "master"),
        Server::new("node-2", "10.0.0.2", "worker"),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_silent_agent_times_out_game() {
    let remote: Arc<dyn Remote> = Arc::new(FakeRemote {
        silent_agents: HashSet::from(["10.0.0.2".to_string()]),
        ..FakeRemote::default()
    });
    let game = ports_game(&servers(), TEST_PORTS, Duration::from_secs(1));

    let started = tokio::time::Instant::now();
    let err = check_ports(remote, game).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_limit_exceeded(), "unexpected error: {err}");
    assert!(err.to_string().contains("1 of 2 agents"));
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(3));
}

#[tokio::test]
async fn test_healthy_cluster_passes_checks() {
    let checker = checker(FakeRemote::default(), manifest());
    let infos = ServerInfos(vec![
        server_info("node-1", "10.0.0.1", "master"),
        server_info("node-2", "10.0.0.2", "worker"),
    ]);

    checker.run(&infos).await.expect("Checks should pass");
}

#[tokio::test]
async fn test_checker_reports_every_violation() {
    let mut manifest = manifest();
    manifest.node_profiles[1].requirements.cpu_min = 8;
    let checker = checker(FakeRemote::default(), manifest);

    let mut worker = server_info("node-2", "10.0.0.2", "worker");
    worker.os = OsInfo::new("ubuntu", "18.04");
    let infos = ServerInfos(vec![server_info("node-1", "10.0.0.1", "master"), worker]);

    let err = checker.run(&infos).await.unwrap_err();
    let OpsError::Aggregate(errors) = &err else {
        panic!("expected an aggregate error, got {err:?}");
    };
    assert_eq!(errors.len(), 2);
    let message = err.to_string();
    assert!(message.contains("less than required minimum of 8"));
    assert!(message.contains("different OS distributions"));
}

#[tokio::test]
async fn test_unknown_profile_fails_checks() {
    let checker = checker(FakeRemote::default(), manifest());
    let infos = ServerInfos(vec![server_info("node-1", "10.0.0.1", "database")]);

    let err = checker.check_servers(&infos).unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_slow_disk_is_critical() {
    let remote = FakeRemote {
        disk_iops: 5.0,
        ..FakeRemote::default()
    };
    let checker = checker(remote, manifest());

    let probes = checker.check_disks(&servers()).await.unwrap();
    assert_eq!(probes.len(), 2);
    assert!(probes.iter().all(|probe| probe.is_critical()));
    assert!(probes[0].message.ends_with("on node-1"));

    let infos = ServerInfos(vec![
        server_info("node-1", "10.0.0.1", "master"),
        server_info("node-2", "10.0.0.2", "worker"),
    ]);
    assert!(checker.run(&infos).await.is_err());
}

#[tokio::test]
async fn test_degraded_disk_only_warns() {
    let remote = FakeRemote {
        disk_iops: 30.0,
        ..FakeRemote::default()
    };
    let checker = checker(remote, manifest());

    let probes = checker.check_disks(&servers()).await.unwrap();
    assert!(probes.iter().all(|probe| probe.is_warning()));

    let infos = ServerInfos(vec![server_info("node-1", "10.0.0.1", "master")]);
    checker.run(&infos).await.expect("Warnings should not fail checks");
}
