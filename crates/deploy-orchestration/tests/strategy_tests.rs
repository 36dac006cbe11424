//! Remote command sequences issued by the concrete strategies

use deploy_orchestration::testing::{RecordingTransfer, Reply, ScriptedExecutor};
use deploy_orchestration::{
    Artifact, ContainerSettings, ContainerizedStrategy, DeploymentStrategy,
    DirectProcessSettings, DirectProcessStrategy, ErrorKind, ServiceSpec,
};
use std::sync::Arc;
use std::time::Duration;

fn specs() -> Vec<ServiceSpec> {
    vec![
        ServiceSpec::new("proxy", 3001, "node proxy.js", "proxy.log"),
        ServiceSpec::new("web", 3000, "npx serve -l 3000 dist", "web.log"),
    ]
}

fn containerized(executor: &Arc<ScriptedExecutor>) -> ContainerizedStrategy {
    ContainerizedStrategy::new(
        executor.clone(),
        Arc::new(RecordingTransfer::new()),
        ContainerSettings::new("app", "app:latest"),
    )
}

fn direct_settings() -> DirectProcessSettings {
    DirectProcessSettings {
        inter_service_delay: Duration::ZERO,
        ..DirectProcessSettings::default()
    }
}

#[smol_potat::test]
async fn test_container_teardown_is_idempotent() {
    let executor = Arc::new(
        ScriptedExecutor::new("host")
            .on_sequence("docker ps -aq", vec![Reply::ok("3f2a9c\n"), Reply::ok("")]),
    );
    let strategy = containerized(&executor);

    strategy.teardown(&specs()).await.unwrap();
    strategy.teardown(&specs()).await.unwrap();

    assert_eq!(
        executor.commands(),
        vec![
            "docker ps -aq --filter 'name=^/app$'",
            "docker rm -f app",
            "docker ps -aq --filter 'name=^/app$'",
        ]
    );
}

#[smol_potat::test]
async fn test_container_deploy_builds_missing_image() {
    let executor = Arc::new(
        ScriptedExecutor::new("host")
            .on("docker image inspect", Reply::exit(1, "No such image"))
            .on("docker run", Reply::ok("3f2a9c81d0e4\n")),
    );
    let strategy = containerized(&executor);

    strategy.deploy(&specs()).await.unwrap();

    let commands = executor.commands();
    assert_eq!(commands.len(), 3);
    assert_eq!(commands[1], "docker build -t app:latest -f Dockerfile .");
    assert!(commands[2].starts_with("docker run -d --name app --restart unless-stopped"));
    assert!(commands[2].contains("-p 3001:3001 -p 3000:3000"));
}

#[smol_potat::test]
async fn test_container_deploy_reuses_existing_image() {
    let executor = Arc::new(ScriptedExecutor::new("host"));
    let strategy = containerized(&executor);

    strategy.deploy(&specs()).await.unwrap();

    assert!(executor.commands_matching("docker build").is_empty());
    assert_eq!(executor.commands_matching("docker run").len(), 1);
}

#[smol_potat::test]
async fn test_container_build_failure_is_fatal() {
    let executor = Arc::new(
        ScriptedExecutor::new("host")
            .on("docker image inspect", Reply::exit(1, ""))
            .on("docker build", Reply::exit(1, "failed to solve: npm ci")),
    );
    let strategy = containerized(&executor);

    let err = strategy.deploy(&specs()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Execution);
    assert!(err.to_string().contains("failed to solve"));
    assert!(executor.commands_matching("docker run").is_empty());
}

#[smol_potat::test]
async fn test_container_availability() {
    let up = Arc::new(ScriptedExecutor::new("host").on("docker version", Reply::ok("24.0.7")));
    assert!(containerized(&up).is_available().await.unwrap());

    let no_daemon = Arc::new(ScriptedExecutor::new("host").on(
        "docker version",
        Reply::exit(1, "Cannot connect to the Docker daemon"),
    ));
    assert!(!containerized(&no_daemon).is_available().await.unwrap());

    let unreachable =
        Arc::new(ScriptedExecutor::new("host").with_default(Reply::ConnectionRefused));
    let err = containerized(&unreachable).is_available().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connect);

    let silent = Arc::new(ScriptedExecutor::new("host").with_default(Reply::Timeout));
    let err = containerized(&silent).is_available().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[smol_potat::test]
async fn test_optional_artifact_failure_is_swallowed() {
    let executor = Arc::new(ScriptedExecutor::new("host"));
    let transfer = Arc::new(RecordingTransfer::new().fail_on("assets/favicon.ico"));
    let settings = ContainerSettings::new("app", "app:latest")
        .with_artifact(Artifact::required("Dockerfile", "Dockerfile"))
        .with_artifact(Artifact::optional("assets/favicon.ico", "assets/favicon.ico"))
        .with_artifact(Artifact::required("src", "src"));
    let strategy = ContainerizedStrategy::new(executor.clone(), transfer.clone(), settings);

    strategy.deploy(&specs()).await.unwrap();

    assert_eq!(transfer.uploads().len(), 3);
    assert_eq!(executor.commands_matching("docker run").len(), 1);
}

#[smol_potat::test]
async fn test_required_artifact_failure_is_fatal() {
    let executor = Arc::new(ScriptedExecutor::new("host"));
    let transfer = Arc::new(RecordingTransfer::new().fail_on("src"));
    let settings = DirectProcessSettings {
        artifacts: vec![
            Artifact::required("src", "src"),
            Artifact::required("package.json", "package.json"),
        ],
        ..direct_settings()
    };
    let strategy = DirectProcessStrategy::new(executor.clone(), transfer.clone(), settings);

    let err = strategy.deploy(&specs()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transfer);
    assert_eq!(transfer.uploads().len(), 1);
    assert!(executor.commands().is_empty());
}

#[smol_potat::test]
async fn test_direct_teardown_tolerates_nothing_running() {
    let executor = Arc::new(ScriptedExecutor::new("host").on("pkill", Reply::exit(1, "")));
    let strategy = DirectProcessStrategy::new(
        executor.clone(),
        Arc::new(RecordingTransfer::new()),
        direct_settings(),
    );

    strategy.teardown(&specs()).await.unwrap();
    strategy.teardown(&specs()).await.unwrap();

    assert_eq!(
        &executor.commands()[..3],
        &[
            "pkill -f '[n]ode proxy\\.js'",
            "pkill -f '[n]px serve -l 3000 dist'",
            "rm -f proxy.log web.log",
        ]
    );
}

#[smol_potat::test]
async fn test_direct_teardown_reports_pkill_errors() {
    let executor = Arc::new(
        ScriptedExecutor::new("host").on("pkill", Reply::exit(2, "pkill: invalid option")),
    );
    let strategy = DirectProcessStrategy::new(
        executor,
        Arc::new(RecordingTransfer::new()),
        direct_settings(),
    );

    let err = strategy.teardown(&specs()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
}

#[smol_potat::test]
async fn test_direct_deploy_installs_then_starts_in_order() {
    let executor = Arc::new(ScriptedExecutor::new("host"));
    let strategy = DirectProcessStrategy::new(
        executor.clone(),
        Arc::new(RecordingTransfer::new()),
        direct_settings(),
    );

    strategy.deploy(&specs()).await.unwrap();

    assert_eq!(
        executor.commands(),
        vec![
            "npm install",
            "nohup sh -c 'node proxy.js' > proxy.log 2>&1 < /dev/null &",
            "nohup sh -c 'npx serve -l 3000 dist' > web.log 2>&1 < /dev/null &",
        ]
    );
}

#[smol_potat::test]
async fn test_direct_install_failure_starts_nothing() {
    let executor = Arc::new(
        ScriptedExecutor::new("host").on("npm install", Reply::exit(1, "npm ERR! EACCES")),
    );
    let strategy = DirectProcessStrategy::new(
        executor.clone(),
        Arc::new(RecordingTransfer::new()),
        direct_settings(),
    );

    let err = strategy.deploy(&specs()).await.unwrap_err();

    assert!(err.to_string().contains("EACCES"));
    assert!(executor.commands_matching("nohup").is_empty());
}

#[smol_potat::test]
async fn test_direct_availability_checks_binaries() {
    let executor = Arc::new(
        ScriptedExecutor::new("host").on("command -v", Reply::exit(1, "")),
    );
    let strategy = DirectProcessStrategy::new(
        executor.clone(),
        Arc::new(RecordingTransfer::new()),
        direct_settings(),
    );

    assert!(!strategy.is_available().await.unwrap());
    assert_eq!(executor.commands(), vec!["command -v node > /dev/null"]);
}
