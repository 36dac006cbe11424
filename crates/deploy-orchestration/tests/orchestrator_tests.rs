//! State machine behaviour with scripted strategies and probes

use deploy_orchestration::testing::{
    Journal, MockStrategy, RecordingTransfer, Reply, ScriptedExecutor,
};
use deploy_orchestration::{
    ContainerSettings, ContainerizedStrategy, DeploymentOrchestrator, DeploymentStrategy,
    DirectProcessSettings, DirectProcessStrategy, ErrorKind, HealthProber, OrchestratorSettings,
    Outcome, ProbeSettings, RunState, ServiceRegistry, ServiceSpec, ServiceState, StrategyKind,
};
use std::sync::Arc;
use std::time::Duration;

const CONTAINERIZED: StrategyKind = StrategyKind::Containerized;
const DIRECT: StrategyKind = StrategyKind::DirectProcess;

fn registry(count: u16) -> ServiceRegistry {
    let specs = (0..count)
        .map(|i| {
            ServiceSpec::new(
                format!("svc{i}"),
                3000 + i,
                format!("node svc{i}.js"),
                format!("svc{i}.log"),
            )
            .with_readiness_pattern("listening")
            .with_failure_pattern("EADDRINUSE")
        })
        .collect();
    ServiceRegistry::new(specs).unwrap()
}

fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        settle_delay: Duration::ZERO,
        run_deadline: Duration::from_secs(5),
    }
}

fn prober(executor: ScriptedExecutor) -> HealthProber {
    HealthProber::new(
        Arc::new(executor),
        ProbeSettings {
            attempts: 1,
            retry_delay: Duration::from_millis(1),
            request_timeout: Duration::from_secs(1),
            log_tail_lines: 20,
            probe_host: "localhost".to_string(),
        },
    )
}

/// Probe executor where the first `up` of `count` services answer 200
fn ports_up(up: u16, count: u16) -> ScriptedExecutor {
    (0..count).fold(ScriptedExecutor::new("probe-host"), |executor, i| {
        let code = if i < up { "200" } else { "000" };
        executor.on(format!("localhost:{}/", 3000 + i), Reply::ok(code))
    })
}

fn orchestrator(
    count: u16,
    strategies: Vec<MockStrategy>,
    probes: ScriptedExecutor,
) -> DeploymentOrchestrator {
    let strategies = strategies
        .into_iter()
        .map(|s| Box::new(s) as Box<dyn DeploymentStrategy>)
        .collect();
    DeploymentOrchestrator::new(registry(count), strategies, prober(probes), settings())
}

#[smol_potat::test]
async fn test_all_up_succeeds_with_first_strategy() {
    let journal = Journal::new();
    let report = orchestrator(
        5,
        vec![
            MockStrategy::new(CONTAINERIZED, &journal),
            MockStrategy::new(DIRECT, &journal),
        ],
        ports_up(5, 5),
    )
    .run()
    .await;

    assert_eq!(report.outcome, Outcome::Succeeded);
    assert_eq!(report.final_strategy, Some(CONTAINERIZED));
    assert_eq!(report.up_count(), 5);
    assert!(report.error.is_none());
    assert_eq!(
        report.transitions,
        vec![
            RunState::Idle,
            RunState::StrategySelected(CONTAINERIZED),
            RunState::TearingDown,
            RunState::Deploying,
            RunState::Probing,
            RunState::Evaluating,
            RunState::Succeeded,
        ]
    );
    assert_eq!(
        journal.entries(),
        vec![
            "containerized:is_available",
            "containerized:teardown",
            "containerized:deploy",
        ]
    );

    let attempt = &report.attempts[0];
    assert_eq!(attempt.outcome, Outcome::Succeeded);
    assert_eq!(attempt.statuses.len(), 5);
    assert!(attempt.finished_at.is_some());
}

#[smol_potat::test]
async fn test_partial_success_is_terminal() {
    let journal = Journal::new();
    let report = orchestrator(
        5,
        vec![
            MockStrategy::new(CONTAINERIZED, &journal),
            MockStrategy::new(DIRECT, &journal),
        ],
        ports_up(4, 5),
    )
    .run()
    .await;

    assert_eq!(report.outcome, Outcome::PartialSuccess);
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.services_in(ServiceState::Down), vec!["svc4"]);
    assert_eq!(report.transitions.last(), Some(&RunState::Succeeded));
    assert_eq!(journal.count("direct-process:is_available"), 0);
    assert_eq!(journal.count("direct-process:deploy"), 0);
}

#[smol_potat::test]
async fn test_unavailable_container_runtime_selects_direct_process() {
    let journal = Journal::new();
    let report = orchestrator(
        3,
        vec![
            MockStrategy::new(CONTAINERIZED, &journal).unavailable(),
            MockStrategy::new(DIRECT, &journal),
        ],
        ports_up(3, 3),
    )
    .run()
    .await;

    assert_eq!(report.outcome, Outcome::Succeeded);
    assert_eq!(report.final_strategy, Some(DIRECT));
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(
        journal.entries(),
        vec![
            "containerized:is_available",
            "direct-process:is_available",
            "direct-process:teardown",
            "direct-process:deploy",
        ]
    );
}

#[smol_potat::test]
async fn test_all_down_falls_back_once() {
    let journal = Journal::new();
    let probes = (0..3).fold(ScriptedExecutor::new("probe-host"), |executor, i| {
        executor.on_sequence(
            format!("localhost:{}/", 3000 + i),
            vec![Reply::ok("000"), Reply::ok("200")],
        )
    });

    let report = orchestrator(
        3,
        vec![
            MockStrategy::new(CONTAINERIZED, &journal),
            MockStrategy::new(DIRECT, &journal),
        ],
        probes,
    )
    .run()
    .await;

    assert_eq!(report.outcome, Outcome::Succeeded);
    assert_eq!(report.final_strategy, Some(DIRECT));
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(report.attempts[0].outcome, Outcome::Failed);
    assert_eq!(report.attempts[0].up_count(), 0);
    assert_eq!(report.attempts[1].outcome, Outcome::Succeeded);

    assert_eq!(journal.count("containerized:deploy"), 1);
    assert_eq!(journal.count("direct-process:deploy"), 1);
    // Released on fall back, before the next strategy starts
    assert_eq!(journal.count("containerized:teardown"), 2);
    assert_eq!(
        journal.entries(),
        vec![
            "containerized:is_available",
            "containerized:teardown",
            "containerized:deploy",
            "direct-process:is_available",
            "containerized:teardown",
            "direct-process:teardown",
            "direct-process:deploy",
        ]
    );

    assert!(report.transitions.contains(&RunState::FallingBack));
    assert!(report.transitions.contains(&RunState::StrategySelected(DIRECT)));
}

#[smol_potat::test]
async fn test_nothing_up_and_no_further_strategy_fails() {
    let journal = Journal::new();
    let report = orchestrator(
        5,
        vec![
            MockStrategy::new(CONTAINERIZED, &journal),
            MockStrategy::new(DIRECT, &journal),
        ],
        ports_up(0, 5),
    )
    .run()
    .await;

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(report.final_strategy, Some(DIRECT));
    assert_eq!(report.attempts.len(), 2);
    assert!(report.attempts.iter().all(|a| a.outcome == Outcome::Failed));
    assert!(report.error.is_none());
    assert_eq!(report.transitions.last(), Some(&RunState::Failed));
    assert_eq!(report.services_in(ServiceState::Down).len(), 5);
}

#[smol_potat::test]
async fn test_no_available_strategy() {
    let journal = Journal::new();
    let report = orchestrator(
        5,
        vec![
            MockStrategy::new(CONTAINERIZED, &journal).unavailable(),
            MockStrategy::new(DIRECT, &journal).unavailable(),
        ],
        ports_up(5, 5),
    )
    .run()
    .await;

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(report.final_strategy, None);
    assert!(report.attempts.is_empty());
    assert_eq!(
        report.error.as_ref().map(|e| e.kind),
        Some(ErrorKind::NoStrategyAvailable)
    );
    assert_eq!(report.transitions, vec![RunState::Idle, RunState::Failed]);

    // Every registered service is still listed
    assert_eq!(report.services.len(), 5);
    assert!(
        report
            .services
            .values()
            .all(|s| s.state == ServiceState::Unknown)
    );
}

#[smol_potat::test]
async fn test_deploy_failure_falls_back_without_probing() {
    let journal = Journal::new();
    let probes = ports_up(2, 2);
    let report = orchestrator(
        2,
        vec![
            MockStrategy::new(CONTAINERIZED, &journal).failing_deploy("build failed"),
            MockStrategy::new(DIRECT, &journal),
        ],
        probes,
    )
    .run()
    .await;

    assert_eq!(report.outcome, Outcome::Succeeded);
    assert_eq!(report.final_strategy, Some(DIRECT));

    let first = &report.attempts[0];
    assert_eq!(first.outcome, Outcome::Failed);
    assert!(first.statuses.is_empty());
    assert_eq!(first.errors.len(), 1);
    assert_eq!(first.errors[0].kind, ErrorKind::Execution);
    assert!(first.errors[0].message.contains("build failed"));

    assert_eq!(
        &report.transitions[..5],
        &[
            RunState::Idle,
            RunState::StrategySelected(CONTAINERIZED),
            RunState::TearingDown,
            RunState::Deploying,
            RunState::FallingBack,
        ]
    );
}

#[smol_potat::test]
async fn test_deploy_failure_without_fallback_fails() {
    let journal = Journal::new();
    let report = orchestrator(
        2,
        vec![MockStrategy::new(DIRECT, &journal).failing_deploy("npm ERR!")],
        ports_up(2, 2),
    )
    .run()
    .await;

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(report.attempts.len(), 1);
    assert!(!report.transitions.contains(&RunState::Probing));
    assert_eq!(report.transitions.last(), Some(&RunState::Failed));
}

#[smol_potat::test]
async fn test_initial_teardown_errors_are_ignored() {
    let journal = Journal::new();
    let report = orchestrator(
        1,
        vec![MockStrategy::new(DIRECT, &journal).failing_teardown("pkill: permission denied")],
        ports_up(1, 1),
    )
    .run()
    .await;

    assert_eq!(report.outcome, Outcome::Succeeded);
    assert_eq!(report.attempts[0].errors.len(), 1);
    assert_eq!(report.attempts[0].errors[0].kind, ErrorKind::Execution);
}

#[smol_potat::test]
async fn test_healthy_port_with_failure_log_is_failed() {
    let journal = Journal::new();
    let probes = ScriptedExecutor::new("probe-host")
        .on("localhost:3000/", Reply::ok("200"))
        .on(
            "svc0.log",
            Reply::ok("starting\nError: listen EADDRINUSE: address already in use :::3000\n"),
        );

    let report = orchestrator(1, vec![MockStrategy::new(DIRECT, &journal)], probes)
        .run()
        .await;

    assert_eq!(report.outcome, Outcome::Failed);
    let status = &report.services["svc0"];
    assert_eq!(status.state, ServiceState::Failed);
    assert_eq!(status.http_status, Some(200));
    assert_eq!(
        status.last_log_snippet,
        vec!["Error: listen EADDRINUSE: address already in use :::3000"]
    );
}

#[smol_potat::test]
async fn test_readiness_without_response_is_recorded_as_inconclusive() {
    let journal = Journal::new();
    let probes = ScriptedExecutor::new("probe-host")
        .on("localhost:3000/", Reply::ok("200"))
        .on("localhost:3001/", Reply::ok("000"))
        .on("svc1.log", Reply::ok("svc1 listening on 3001\n"));

    let report = orchestrator(2, vec![MockStrategy::new(DIRECT, &journal)], probes)
        .run()
        .await;

    assert_eq!(report.outcome, Outcome::PartialSuccess);
    let status = &report.services["svc1"];
    assert_eq!(status.state, ServiceState::Starting);
    assert!(status.inconclusive);
    assert!(
        report.attempts[0]
            .errors
            .iter()
            .any(|e| e.kind == ErrorKind::ProbeInconclusive && e.message.contains("svc1"))
    );
}

#[smol_potat::test]
async fn test_hanging_deploy_hits_run_deadline() {
    let journal = Journal::new();
    let strategies: Vec<Box<dyn DeploymentStrategy>> = vec![
        Box::new(MockStrategy::new(CONTAINERIZED, &journal).hanging_deploy()),
        Box::new(MockStrategy::new(DIRECT, &journal)),
    ];
    let orchestrator = DeploymentOrchestrator::new(
        registry(2),
        strategies,
        prober(ports_up(2, 2)),
        OrchestratorSettings {
            settle_delay: Duration::ZERO,
            run_deadline: Duration::from_millis(100),
        },
    );

    let report = orchestrator.run().await;

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(
        report.error.as_ref().map(|e| e.kind),
        Some(ErrorKind::Timeout)
    );
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.attempts[0].outcome, Outcome::Failed);
    assert_eq!(report.transitions.last(), Some(&RunState::Failed));
    assert_eq!(journal.count("direct-process:deploy"), 0);
}

#[smol_potat::test]
async fn test_unresponsive_transport_fails_with_timeout() {
    let executor = Arc::new(ScriptedExecutor::new("10.0.0.5").with_default(Reply::Hang));
    let strategy = DirectProcessStrategy::new(
        executor.clone(),
        Arc::new(RecordingTransfer::new()),
        DirectProcessSettings::default(),
    );
    let orchestrator = DeploymentOrchestrator::new(
        registry(2),
        vec![Box::new(strategy)],
        HealthProber::new(executor.clone(), ProbeSettings::default()),
        OrchestratorSettings {
            settle_delay: Duration::ZERO,
            run_deadline: Duration::from_millis(100),
        },
    );

    let report = orchestrator.run().await;

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(
        report.error.as_ref().map(|e| e.kind),
        Some(ErrorKind::Timeout)
    );
    assert!(report.attempts.is_empty());
    assert_eq!(executor.commands().len(), 1);
}

/// Both real strategies and the prober sharing one scripted host
fn host_orchestrator(executor: &Arc<ScriptedExecutor>, count: u16) -> DeploymentOrchestrator {
    let containerized = ContainerizedStrategy::new(
        executor.clone(),
        Arc::new(RecordingTransfer::new()),
        ContainerSettings::new("app", "app:latest"),
    );
    let direct = DirectProcessStrategy::new(
        executor.clone(),
        Arc::new(RecordingTransfer::new()),
        DirectProcessSettings {
            inter_service_delay: Duration::ZERO,
            ..DirectProcessSettings::default()
        },
    );
    let prober = HealthProber::new(
        executor.clone(),
        ProbeSettings {
            attempts: 1,
            ..ProbeSettings::default()
        },
    );
    DeploymentOrchestrator::new(
        registry(count),
        vec![Box::new(containerized), Box::new(direct)],
        prober,
        OrchestratorSettings {
            settle_delay: Duration::ZERO,
            run_deadline: Duration::from_secs(60),
        },
    )
}

#[smol_potat::test]
async fn test_timed_out_availability_checks_fail_with_timeout() {
    let executor = Arc::new(ScriptedExecutor::new("10.0.0.5").with_default(Reply::Timeout));

    let report = host_orchestrator(&executor, 2).run().await;

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(
        report.error.as_ref().map(|e| e.kind),
        Some(ErrorKind::Timeout)
    );
    assert!(report.attempts.is_empty());
    assert_eq!(report.transitions, vec![RunState::Idle, RunState::Failed]);
    assert_eq!(executor.commands_matching("docker version").len(), 1);
    assert_eq!(executor.commands_matching("command -v").len(), 1);
}

#[smol_potat::test]
async fn test_refused_connection_fails_with_connect_error() {
    let executor =
        Arc::new(ScriptedExecutor::new("10.0.0.5").with_default(Reply::ConnectionRefused));

    let report = host_orchestrator(&executor, 2).run().await;

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(
        report.error.as_ref().map(|e| e.kind),
        Some(ErrorKind::Connect)
    );
    assert!(
        report.services.values().all(|s| s.state == ServiceState::Unknown),
        "nothing should have been probed"
    );
}

#[smol_potat::test]
async fn test_timed_out_docker_check_still_selects_direct_process() {
    let executor = Arc::new(
        ScriptedExecutor::new("10.0.0.5")
            .on("docker version", Reply::Timeout)
            .on("localhost:3000/", Reply::ok("200")),
    );

    let report = host_orchestrator(&executor, 1).run().await;

    assert_eq!(report.outcome, Outcome::Succeeded);
    assert_eq!(report.final_strategy, Some(DIRECT));
    assert!(report.error.is_none());
    assert_eq!(report.attempts.len(), 1);
    assert!(executor.commands_matching("docker run").is_empty());
}

#[smol_potat::test]
async fn test_strategies_are_tried_in_preference_order() {
    let journal = Journal::new();
    let orchestrator = orchestrator(
        1,
        vec![
            MockStrategy::new(DIRECT, &journal),
            MockStrategy::new(CONTAINERIZED, &journal),
        ],
        ports_up(1, 1),
    );
    assert_eq!(orchestrator.strategy_order(), vec![CONTAINERIZED, DIRECT]);

    let report = orchestrator.run().await;
    assert_eq!(report.final_strategy, Some(CONTAINERIZED));
}

#[smol_potat::test]
async fn test_report_serializes_to_json() {
    let journal = Journal::new();
    let report = orchestrator(2, vec![MockStrategy::new(DIRECT, &journal)], ports_up(1, 2))
        .run()
        .await;

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcome"], "partial_success");
    assert_eq!(json["final_strategy"], "direct_process");
    assert_eq!(json["services"]["svc0"]["state"], "up");
    assert_eq!(json["services"]["svc1"]["state"], "down");
}
