//! Test: Secrets - the env file written before the build

use crate::helpers::*;
use ci_runner::core::config::WorkflowConfig;
use ci_runner::core::secrets::StaticSecretStore;
use ci_runner::core::{EventDescriptor, StepKind, WorkspaceMode};
use ci_runner::execution::RunError;

fn env_file_at_build(calls: &[RuntimeCall]) -> Option<String> {
    calls.iter().find_map(|c| match c {
        RuntimeCall::Build { env_file, .. } => env_file.clone(),
        _ => None,
    })
}

/// The build sees both secrets as KEY=value lines
#[tokio::test]
async fn test_env_file_contents() {
    let runtime = MockRuntime::new();
    let result = run_default(EventDescriptor::dispatch(), MockSource::new(), runtime.clone()).await;

    assert_run_passed(&result);
    assert_eq!(
        env_file_at_build(&runtime.calls()).as_deref(),
        Some("CLIENT_ID=client-id-123\nCLIENT_SECRET=s3cr3t\n")
    );
}

/// Secret values never show up in step output or events
#[tokio::test]
async fn test_secret_values_are_not_reported() {
    let result = run_default(EventDescriptor::dispatch(), MockSource::new(), MockRuntime::new()).await;

    let rendered = format!("{:?}", result.events);
    assert!(!rendered.contains("s3cr3t"));
    assert!(!rendered.contains("client-id-123"));
}

/// By default an unset secret is written empty and the run continues
#[tokio::test]
async fn test_unset_secret_is_written_empty() {
    let runtime = MockRuntime::new();
    let secrets = StaticSecretStore::new().with("CLIENT_ID", "client-id-123");

    let result = run_with(
        &WorkflowConfig::default(),
        EventDescriptor::dispatch(),
        WorkspaceMode::Ephemeral,
        MockSource::new(),
        runtime.clone(),
        secrets,
    )
    .await;

    assert_run_passed(&result);
    assert_step_completed(&result, StepKind::Secrets, "CLIENT_SECRET is empty");
    assert_eq!(
        env_file_at_build(&runtime.calls()).as_deref(),
        Some("CLIENT_ID=client-id-123\nCLIENT_SECRET=\n")
    );
}

/// Strict mode fails before the build when a secret is missing or empty
#[tokio::test]
async fn test_strict_secrets_fail_before_build() {
    let yaml = r#"
name: "tests"
secrets:
  require_non_empty: true
"#;
    let config = WorkflowConfig::from_yaml(yaml).unwrap();
    let runtime = MockRuntime::new();
    let secrets = StaticSecretStore::new()
        .with("CLIENT_ID", "")
        .with("CLIENT_SECRET", "s3cr3t");

    let result = run_with(
        &config,
        EventDescriptor::dispatch(),
        WorkspaceMode::Ephemeral,
        MockSource::new(),
        runtime.clone(),
        secrets,
    )
    .await;

    assert_run_failed(&result);
    assert!(matches!(result.error, Some(RunError::Secrets(_))));
    assert_step_failed(&result, StepKind::Secrets, "CLIENT_ID");
    assert_step_skipped(&result, StepKind::Build);
    assert_step_skipped(&result, StepKind::Test);
    assert!(runtime.calls().is_empty());
}

/// With pass_env_file the test container also gets the env file
#[tokio::test]
async fn test_env_file_passed_to_container() {
    let yaml = r#"
name: "tests"
test:
  pass_env_file: true
"#;
    let config = WorkflowConfig::from_yaml(yaml).unwrap();
    let runtime = MockRuntime::new();

    let result = run_with(
        &config,
        EventDescriptor::dispatch(),
        WorkspaceMode::Ephemeral,
        MockSource::new(),
        runtime.clone(),
        test_secrets(),
    )
    .await;
    assert_run_passed(&result);

    let env_file = runtime.calls().into_iter().find_map(|c| match c {
        RuntimeCall::Run { env_file, .. } => env_file,
        _ => None,
    });
    assert!(env_file.unwrap().ends_with(".env"));
}

/// In-place runs restore a pre-existing env file afterwards
#[tokio::test]
async fn test_in_place_run_restores_env_file() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    std::fs::write(root.join(".env"), "CLIENT_ID=local\n").unwrap();

    let runtime = MockRuntime::new();
    let result = run_with(
        &WorkflowConfig::default(),
        EventDescriptor::dispatch(),
        WorkspaceMode::InPlace(root.clone()),
        ci_runner::backend::LocalTree::new(root.clone()),
        runtime.clone(),
        test_secrets(),
    )
    .await;

    assert_run_passed(&result);
    assert_eq!(
        env_file_at_build(&runtime.calls()).as_deref(),
        Some("CLIENT_ID=client-id-123\nCLIENT_SECRET=s3cr3t\n")
    );
    assert_eq!(
        std::fs::read_to_string(root.join(".env")).unwrap(),
        "CLIENT_ID=local\n"
    );
}

/// In-place runs remove an env file that did not exist before
#[tokio::test]
async fn test_in_place_run_removes_new_env_file() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();

    let result = run_with(
        &WorkflowConfig::default(),
        EventDescriptor::dispatch(),
        WorkspaceMode::InPlace(root.clone()),
        ci_runner::backend::LocalTree::new(root.clone()),
        MockRuntime::new().build_exit(1),
        test_secrets(),
    )
    .await;

    assert_run_failed(&result);
    assert!(!root.join(".env").exists());
}

/// A line break in a secret is reported by name; the value itself is not
#[tokio::test]
async fn test_secret_with_line_break_is_reported() {
    let secrets = StaticSecretStore::new()
        .with("CLIENT_ID", "client-id-123")
        .with("CLIENT_SECRET", "s3cr3t\nINJECTED=1");

    let result = run_with(
        &WorkflowConfig::default(),
        EventDescriptor::dispatch(),
        WorkspaceMode::Ephemeral,
        MockSource::new(),
        MockRuntime::new(),
        secrets,
    )
    .await;

    assert_run_passed(&result);
    assert_step_completed(
        &result,
        StepKind::Secrets,
        "warning: CLIENT_SECRET contains a line break",
    );
    assert!(!format!("{:?}", result.events).contains("INJECTED"));
}

/// Strict mode refuses to write a secret that spans several lines
#[tokio::test]
async fn test_strict_secrets_reject_line_break() {
    let yaml = r#"
name: "tests"
secrets:
  require_non_empty: true
"#;
    let config = WorkflowConfig::from_yaml(yaml).unwrap();
    let runtime = MockRuntime::new();
    let secrets = StaticSecretStore::new()
        .with("CLIENT_ID", "client-id-123")
        .with("CLIENT_SECRET", "s3cr3t\r\n");

    let result = run_with(
        &config,
        EventDescriptor::dispatch(),
        WorkspaceMode::Ephemeral,
        MockSource::new(),
        runtime.clone(),
        secrets,
    )
    .await;

    assert_run_failed(&result);
    assert!(matches!(result.error, Some(RunError::Secrets(_))));
    assert_step_failed(&result, StepKind::Secrets, "line break in value: CLIENT_SECRET");
    assert_eq!(count_builds(&runtime.calls()), 0);
}
