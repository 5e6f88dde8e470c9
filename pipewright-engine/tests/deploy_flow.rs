use std::{fs, path::Path, sync::Arc};

use pipewright_common::{environment::Environment, error::Error, gate::Decision};
use pipewright_engine::{
    Configuration, DeployRequest, Deployer, EnvironmentGate, FileApprovalStore, GateSettings,
    InMemoryConnector, InMemoryExecutionService, RetryPolicy, SubmitOptions,
};
use pipewright_registry::JobRegistry;

const SINADEF: &str = r#"
name: sinadef-analysis
description: Violent deaths aggregated by district
schedule: "0 9 * * *"
compute:
  cpu: "4"
  memory: 16Gi
  timeout: 2h
parameters:
  input_path: https://example.org/SINADEF_DATOS_ABIERTOS.csv
  output_path: "gs://{{BUCKET}}/data/homicidios_detallado.csv"
"#;

struct Workspace {
    _dir: tempfile::TempDir,
    jobs: std::path::PathBuf,
    approvals: std::path::PathBuf,
}

fn workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let jobs = dir.path().join("etls");
    let resources = jobs.join("sinadef-analysis").join("resources");
    fs::create_dir_all(&resources).unwrap();
    fs::write(resources.join("config.yaml"), SINADEF).unwrap();

    let approvals = dir.path().join("approvals.yaml");
    Workspace {
        _dir: dir,
        jobs,
        approvals,
    }
}

fn configuration(environment: Environment) -> Configuration {
    let project = format!("acme-{}", environment);
    Configuration::from_sources(
        environment,
        Vec::new(),
        vec![
            (format!("{}PROJECT_ID", environment.variable_prefix()), project.clone()),
            (format!("{}REGION", environment.variable_prefix()), "us-central1".to_string()),
            (
                format!("{}SERVICE_ACCOUNT", environment.variable_prefix()),
                format!("runner@{}.iam.gserviceaccount.com", project),
            ),
            (format!("{}BUCKET", environment.variable_prefix()), "acme-pipes".to_string()),
            (
                format!("{}CONTAINER_REGISTRY", environment.variable_prefix()),
                "gcr.io".to_string(),
            ),
            (
                format!("{}CONTAINER_REGISTRY_PROJECT", environment.variable_prefix()),
                project,
            ),
        ],
    )
}

fn deployer(jobs: &Path, approvals: &Path, connector: &InMemoryConnector) -> Deployer {
    Deployer::new(
        JobRegistry::new(jobs),
        EnvironmentGate::new(
            GateSettings::default(),
            Arc::new(FileApprovalStore::new(approvals)),
        ),
        Arc::new(connector.clone()),
        RetryPolicy::immediate(3),
    )
}

fn request<'a>(configuration: &'a Configuration, tag: &'a str) -> DeployRequest<'a> {
    DeployRequest {
        job: "sinadef-analysis",
        configuration,
        tag,
        actor: "ci",
        image: None,
        options: SubmitOptions::default(),
    }
}

#[tokio::test]
async fn test_dev_redeploy_keeps_one_schedule() {
    let ws = workspace();
    let service = Arc::new(InMemoryExecutionService::new());
    let connector = InMemoryConnector::new(service.clone());
    let deployer = deployer(&ws.jobs, &ws.approvals, &connector);
    let dev = configuration(Environment::Dev);

    let first = deployer.deploy(request(&dev, "v1")).await.unwrap();
    let second = deployer.deploy(request(&dev, "v2")).await.unwrap();

    assert!(!first.replaced);
    assert!(second.replaced);

    let schedules = service.schedules().await;
    assert_eq!(schedules.len(), 1);
    assert_eq!(schedules[0].name, "sinadef-analysis-schedule-dev");

    let artifact = service
        .pipeline_artifact("sinadef-analysis-dev")
        .await
        .unwrap();
    let container = &artifact.deployment_spec.executors["exec-sinadef-analysis-task"].container;
    assert_eq!(container.image, "gcr.io/acme-dev/sinadef-analysis:v2");
    assert!(
        container
            .args
            .contains(&"gs://acme-pipes/data/homicidios_detallado.csv".to_string())
    );
}

#[tokio::test]
async fn test_prod_without_approval_never_reaches_service() {
    let ws = workspace();
    let service = Arc::new(InMemoryExecutionService::new());
    let connector = InMemoryConnector::new(service.clone());
    let deployer = deployer(&ws.jobs, &ws.approvals, &connector);
    let prod = configuration(Environment::Prod);

    match deployer.deploy(request(&prod, "v1")).await {
        Err(Error::Authorization {
            decision,
            environment,
            ..
        }) => {
            assert_eq!(decision, Decision::PendingApproval);
            assert_eq!(environment, Environment::Prod);
        }
        other => panic!("expected authorization error, got {:?}", other),
    }

    assert_eq!(connector.connections(), 0);
    assert!(service.calls().await.is_empty());
}

#[tokio::test]
async fn test_prod_with_approval_deploys() {
    let ws = workspace();
    fs::write(
        &ws.approvals,
        r#"
approvals:
  - job: sinadef-analysis
    environment: prod
    tag: v1
    reviewer: maria
    status: approved
    recorded_at: 2026-10-01T12:00:00Z
"#,
    )
    .unwrap();

    let service = Arc::new(InMemoryExecutionService::new());
    let connector = InMemoryConnector::new(service.clone());
    let deployer = deployer(&ws.jobs, &ws.approvals, &connector);
    let prod = configuration(Environment::Prod);

    let outcome = deployer.deploy(request(&prod, "v1")).await.unwrap();
    assert_eq!(outcome.key.environment, Environment::Prod);
    assert_eq!(connector.connections(), 1);
    assert_eq!(service.schedules().await[0].name, "sinadef-analysis-schedule-prod");

    // The approval names v1, so v2 still waits for review.
    assert!(matches!(
        deployer.deploy(request(&prod, "v2")).await,
        Err(Error::Authorization { .. })
    ));
}

#[tokio::test]
async fn test_missing_prod_configuration_fails_before_gate() {
    let ws = workspace();
    let connector = InMemoryConnector::default();
    let deployer = deployer(&ws.jobs, &ws.approvals, &connector);
    let incomplete = Configuration::from_sources(
        Environment::Prod,
        Vec::new(),
        vec![("DEV_BUCKET".to_string(), "acme-dev".to_string())],
    );

    match deployer.deploy(request(&incomplete, "v1")).await {
        Err(Error::MissingConfiguration { key, .. }) => assert_eq!(key, "PROJECT_ID"),
        other => panic!("expected missing configuration, got {:?}", other),
    }
    assert_eq!(connector.connections(), 0);
}

#[tokio::test]
async fn test_explicit_image_override() {
    let ws = workspace();
    let connector = InMemoryConnector::default();
    let deployer = deployer(&ws.jobs, &ws.approvals, &connector);
    let dev = configuration(Environment::Dev);

    let (context, graph) = deployer
        .prepare(
            "sinadef-analysis",
            &dev,
            "v9",
            Some("europe-docker.pkg.dev/acme/etl/sinadef:v9"),
        )
        .unwrap();

    assert_eq!(context.image_reference, "europe-docker.pkg.dev/acme/etl/sinadef:v9");
    assert_eq!(graph.steps[0].image, context.image_reference);
}
