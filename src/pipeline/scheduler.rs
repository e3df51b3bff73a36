//! Bounded-concurrency batch scheduler.
//!
//! Every layer is spawned as its own tokio task up front, in input order,
//! and each task's first await is a semaphore acquire. Tokio's semaphore
//! queues waiters fairly, so layers start in the order they were listed
//! even though at most `concurrency` run at once. A layer failure releases
//! its permit and is recorded; sibling tasks are never cancelled.

use crate::models::{LayerConfig, LayerOutput};
use crate::pipeline::LayerFailure;
use crate::state::BatchState;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Outcome of a whole batch run.
pub struct BatchResult {
    /// Per-layer outcomes in input order.
    pub state: BatchState,
    /// True when any layer did not succeed.
    pub failed: bool,
}

/// Run every layer through `run_layer_fn`, at most `concurrency` at a time.
///
/// The runner is injected so the scheduling behavior is testable without
/// the external tools the real per-layer pipeline shells out to.
pub async fn run_batch<F, Fut>(
    layers: Vec<LayerConfig>,
    concurrency: usize,
    run_layer_fn: F,
) -> BatchResult
where
    F: Fn(LayerConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<LayerOutput, LayerFailure>> + Send + 'static,
{
    let mut state = BatchState::new(layers.iter().map(|l| l.layer_name.clone()));
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let run_layer_fn = Arc::new(run_layer_fn);

    let mut tasks = Vec::with_capacity(layers.len());
    for layer in layers {
        let semaphore = Arc::clone(&semaphore);
        let run = Arc::clone(&run_layer_fn);
        let name = layer.layer_name.clone();
        let handle = tokio::spawn(async move {
            // Never closed while tasks hold clones of the Arc.
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            run(layer).await
        });
        tasks.push((name, handle));
    }

    let mut failed = false;
    for (name, handle) in tasks {
        match handle.await {
            Ok(Ok(output)) => {
                state.mark_succeeded(&name, output);
            }
            Ok(Err(failure)) => {
                tracing::error!("{}", failure);
                state.mark_failed(&name);
                failed = true;
            }
            Err(join_error) => {
                tracing::error!("Layer {} task aborted: {}", name, join_error);
                state.mark_failed(&name);
                failed = true;
            }
        }
    }

    BatchResult { state, failed }
}
