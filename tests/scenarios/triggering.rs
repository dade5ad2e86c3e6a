//! Test: Triggering - which events start a run

use ci_runner::core::config::WorkflowConfig;
use ci_runner::core::{EventDescriptor, PrAction, TriggerPolicy};

fn default_policy() -> TriggerPolicy {
    WorkflowConfig::default().trigger_policy().unwrap()
}

/// A push touching only ignored paths does not trigger
#[test]
fn test_push_of_ignored_paths_is_skipped() {
    let policy = default_policy();

    let event = EventDescriptor::push([
        "README.md",
        ".devcontainer/devcontainer.json",
        ".vscode/settings.json",
        ".vscode/extensions/recommended.json",
        ".gitignore",
        "pyproject.toml",
    ]);

    let decision = policy.evaluate(&event);
    assert!(!decision.should_run(), "{:?}", decision);
}

/// One functional path among ignored ones is enough
#[test]
fn test_push_touching_code_triggers() {
    let policy = default_policy();

    let event = EventDescriptor::push(["README.md", "src/bigdbm/client.py"]);
    let decision = policy.evaluate(&event);
    assert!(decision.should_run());
    assert!(decision.reason().contains("src/bigdbm/client.py"));
}

/// Ignore entries match whole paths, not basenames
#[test]
fn test_nested_readme_is_not_ignored() {
    let policy = default_policy();

    assert!(policy.evaluate(&EventDescriptor::push(["docs/README.md"])).should_run());
    assert!(policy.evaluate(&EventDescriptor::push(["tests/pyproject.toml"])).should_run());
}

/// A push whose changed paths are unknown runs
#[test]
fn test_push_without_paths_triggers() {
    let policy = default_policy();
    let empty: [&str; 0] = [];
    assert!(policy.evaluate(&EventDescriptor::push(empty)).should_run());
}

/// Only opened and reopened pull requests trigger
#[test]
fn test_pull_request_actions() {
    let policy = default_policy();

    for (action, expected) in [
        (PrAction::Opened, true),
        (PrAction::Reopened, true),
        (PrAction::Synchronize, false),
        (PrAction::Closed, false),
        (PrAction::Edited, false),
        (PrAction::Other("labeled".to_string()), false),
    ] {
        let decision = policy.evaluate(&EventDescriptor::pull_request(action.clone()));
        assert_eq!(decision.should_run(), expected, "action {}", action);
    }
}

/// A pull request event without an action is ignored
#[test]
fn test_pull_request_without_action_is_skipped() {
    let policy = default_policy();
    let mut event = EventDescriptor::pull_request(PrAction::Opened);
    event.action = None;
    assert!(!policy.evaluate(&event).should_run());
}

/// Manual dispatch always triggers, regardless of paths
#[test]
fn test_dispatch_always_triggers() {
    let policy = default_policy();
    assert!(policy.evaluate(&EventDescriptor::dispatch()).should_run());

    let mut event = EventDescriptor::dispatch();
    event.changed_paths = vec!["README.md".to_string()];
    assert!(policy.evaluate(&event).should_run());
}

/// Triggers from a workflow file replace the built-in ones
#[test]
fn test_configured_triggers() {
    let yaml = r#"
name: "Docs-aware tests"
on:
  push:
    paths-ignore:
      - "docs/**"
      - "*.md"
  pull_request:
    types: [opened, synchronize]
"#;
    let policy = WorkflowConfig::from_yaml(yaml)
        .unwrap()
        .trigger_policy()
        .unwrap();

    assert!(!policy
        .evaluate(&EventDescriptor::push(["docs/guide/intro.md", "CHANGELOG.md"]))
        .should_run());
    assert!(policy
        .evaluate(&EventDescriptor::push(["docs/guide/intro.md", "app.py"]))
        .should_run());
    assert!(policy
        .evaluate(&EventDescriptor::pull_request(PrAction::Synchronize))
        .should_run());
    assert!(!policy
        .evaluate(&EventDescriptor::pull_request(PrAction::Reopened))
        .should_run());

    // workflow_dispatch omitted from the file
    assert!(!policy.evaluate(&EventDescriptor::dispatch()).should_run());
}
