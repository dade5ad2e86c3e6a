//! Runs several triggered runs side by side

use crate::{
    backend::{ContainerRuntime, SourceProvider},
    core::Run,
    execution::{engine::RunEngine, error::RunError},
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// A finished run and its failure, if any
#[derive(Debug)]
pub struct DispatchResult {
    pub run: Run,
    pub error: Option<RunError>,
}

/// Executes independent runs concurrently, at most `max_parallel` at a time
///
/// Runs share nothing: each has its own workspace and image tag.
pub struct RunDispatcher<S, C> {
    engine: Arc<RunEngine<S, C>>,
    max_parallel: usize,
}

impl<S: SourceProvider + 'static, C: ContainerRuntime + 'static> RunDispatcher<S, C> {
    pub fn new(engine: Arc<RunEngine<S, C>>, max_parallel: usize) -> Self {
        Self {
            engine,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Execute all runs; results come back in input order
    pub async fn dispatch(&self, runs: Vec<Run>) -> Vec<DispatchResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut tasks = JoinSet::new();

        for (index, mut run) in runs.into_iter().enumerate() {
            let engine = self.engine.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                debug!("Dispatching run {}", run.state.run_id);

                // The run executes in its own task so a panic only loses that run
                let mut aborted = run.clone();
                let handle = tokio::spawn(async move {
                    let result = engine.execute(&mut run).await;
                    (run, result)
                });

                let result = match handle.await {
                    Ok((run, result)) => DispatchResult {
                        run,
                        error: result.err(),
                    },
                    Err(e) => {
                        let reason = if e.is_panic() {
                            "run task panicked"
                        } else {
                            "run task was cancelled"
                        };
                        error!("Run {} aborted: {}", aborted.state.run_id, e);
                        aborted.abort(reason);
                        DispatchResult {
                            run: aborted,
                            error: Some(RunError::Aborted(reason.to_string())),
                        }
                    }
                };
                (index, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!("Dispatch task failed: {}", e),
            }
        }

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }
}
