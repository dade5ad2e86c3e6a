//! Test: Dispatch - independent runs side by side

use crate::helpers::*;
use ci_runner::core::config::WorkflowConfig;
use ci_runner::core::{EventDescriptor, StepKind, WorkspaceMode};
use ci_runner::execution::{RunDispatcher, RunEngine, RunError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn runs(events: Vec<EventDescriptor>) -> Vec<ci_runner::core::Run> {
    let config = WorkflowConfig::default();
    events
        .into_iter()
        .map(|event| config.to_run(event, WorkspaceMode::Ephemeral))
        .collect()
}

/// Runs respect the concurrency limit and come back in input order
#[tokio::test]
async fn test_parallel_runs_are_limited() {
    let runtime = MockRuntime::new().with_delay(Duration::from_millis(50));
    let engine = Arc::new(RunEngine::new(
        MockSource::new(),
        runtime.clone(),
        Arc::new(test_secrets()),
    ));

    let input = runs(vec![
        EventDescriptor::dispatch().with_ref("refs/heads/a"),
        EventDescriptor::dispatch().with_ref("refs/heads/b"),
        EventDescriptor::dispatch().with_ref("refs/heads/c"),
        EventDescriptor::dispatch().with_ref("refs/heads/d"),
    ]);
    let ids: Vec<_> = input.iter().map(|r| r.state.run_id).collect();

    let results = RunDispatcher::new(engine, 2).dispatch(input).await;

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.run.passed() && r.error.is_none()));
    assert_eq!(
        results.iter().map(|r| r.run.state.run_id).collect::<Vec<_>>(),
        ids
    );
    assert!(runtime.max_active() <= 2, "max active {}", runtime.max_active());

    // Every run built and removed its own image
    let tags: HashSet<_> = results.iter().map(|r| r.run.image_tag()).collect();
    assert_eq!(tags.len(), 4);
    assert_eq!(count_builds(&runtime.calls()), 4);
}

/// One failing run does not affect the others
#[tokio::test]
async fn test_failure_is_isolated() {
    let engine = Arc::new(RunEngine::new(
        MockSource::new().fail_on_revision("bad"),
        MockRuntime::new(),
        Arc::new(test_secrets()),
    ));

    let results = RunDispatcher::new(engine, 3)
        .dispatch(runs(vec![
            EventDescriptor::push(["app.py"]).with_sha("good1"),
            EventDescriptor::push(["app.py"]).with_sha("bad"),
            EventDescriptor::push(["app.py"]).with_sha("good2"),
        ]))
        .await;

    assert!(results[0].run.passed());
    assert!(results[2].run.passed());

    let failed = &results[1];
    assert!(failed.run.has_failed());
    assert_eq!(failed.run.state.failed_step, Some(StepKind::Checkout));
    assert!(matches!(failed.error, Some(RunError::Checkout(_))));
}

/// A zero limit still makes progress
#[tokio::test]
async fn test_zero_limit_runs_sequentially() {
    let runtime = MockRuntime::new().with_delay(Duration::from_millis(10));
    let engine = Arc::new(RunEngine::new(
        MockSource::new(),
        runtime.clone(),
        Arc::new(test_secrets()),
    ));

    let results = RunDispatcher::new(engine, 0)
        .dispatch(runs(vec![EventDescriptor::dispatch(), EventDescriptor::dispatch()]))
        .await;

    assert!(results.iter().all(|r| r.run.passed()));
    assert_eq!(runtime.max_active(), 1);
}

/// A run whose task panics is still reported, as failed
#[tokio::test]
async fn test_panicking_run_is_reported() {
    let engine = Arc::new(RunEngine::new(
        MockSource::new(),
        MockRuntime::new(),
        Arc::new(test_secrets()),
    ));
    engine
        .add_event_handler(|event| {
            if let ci_runner::execution::ExecutionEvent::RunStarted {
                git_ref: Some(git_ref),
                ..
            } = &event
            {
                if git_ref == "refs/heads/boom" {
                    panic!("handler failed for {}", git_ref);
                }
            }
        })
        .await;

    let input = runs(vec![
        EventDescriptor::dispatch().with_ref("refs/heads/main"),
        EventDescriptor::dispatch().with_ref("refs/heads/boom"),
    ]);
    let ids: Vec<_> = input.iter().map(|r| r.state.run_id).collect();

    let results = RunDispatcher::new(engine, 2).dispatch(input).await;

    assert_eq!(results.len(), 2);
    assert_eq!(
        results.iter().map(|r| r.run.state.run_id).collect::<Vec<_>>(),
        ids
    );
    assert!(results[0].run.passed());

    let aborted = &results[1];
    assert!(aborted.run.has_failed());
    assert!(matches!(aborted.error, Some(RunError::Aborted(_))));
    assert_eq!(aborted.run.state.failed_step, None);
}
