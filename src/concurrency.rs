//! Small worker-pool helpers shared by the Migrator and Bulk Orchestrator
//! (spec.md §5, §9 "Panic recovery").
use tokio::task::JoinHandle;

use crate::context::Context;
use crate::error::{Error, ErrorBag, Result};

/// Joins every handle, logging (rather than propagating) each worker's
/// failure or panic into an [`ErrorBag`] — isolates one bad worker from
/// the rest without cancelling any other worker.
pub async fn await_all_logged<R>(handles: Vec<JoinHandle<Result<R>>>, ctx: &Context, op_name: &str) -> (Vec<R>, ErrorBag) {
    let mut bag = ErrorBag::new();
    let mut oks = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Ok(value)) => oks.push(value),
            Ok(Err(e)) => {
                tracing::error!(task_name = %ctx.task_name, op = op_name, error = %e, "worker failed");
                bag.push(e);
            }
            Err(join_err) => {
                let msg = if join_err.is_panic() {
                    "panic".to_string()
                } else {
                    join_err.to_string()
                };
                tracing::error!(task_name = %ctx.task_name, op = op_name, error = %msg, "worker panicked");
                bag.push(Error::Panic(msg));
            }
        }
    }
    (oks, bag)
}
