//! Task Runner: wraps one [`BulkOrchestrator`] per configured task,
//! selects the action, and emits a per-pair summary (spec.md §4.6).
//! Grounded on `service/task.go`'s `Run` method in the original tool.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{Config, TaskAction, TaskSpec};
use crate::context::Context;
use crate::diff::DiffResult;
use crate::error::{Error, Result};
use crate::es::ClusterAdapter;
use crate::migrator::Tuning;
use crate::orchestrator::BulkOrchestrator;

/// Runs every selected task in order. A fatal error on one task is
/// logged and does not stop the remaining tasks from running (spec.md
/// §7); the first fatal error encountered is what's ultimately returned
/// to the CLI, matching "Task Runner returns the first error back to
/// the CLI."
///
/// A single Ctrl-C listener is installed for the whole run and shared
/// across every task's [`Context`] (spec.md §5 "A context carries
/// cancellation into every network call and every long-lived loop"):
/// one interrupt stops the scroll/bulk workers of whichever task is
/// currently in flight, each releasing its cursor via `close_scroll`
/// before returning (spec.md §5, scenario E2E-5).
pub async fn run_tasks(cfg: &Config, tasks: &[&TaskSpec]) -> Result<()> {
    let cancelled = Arc::new(AtomicBool::new(false));
    {
        let cancelled = cancelled.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("received interrupt, cancelling in-flight scroll/bulk workers");
                cancelled.store(true, Ordering::Relaxed);
            }
        });
    }

    let mut adapters: HashMap<String, Arc<ClusterAdapter>> = HashMap::new();
    let mut first_err: Option<Error> = None;

    for task in tasks {
        tracing::info!(task_name = %task.name, action = %task.action, "starting task");
        if let Err(e) = run_task(cfg, task, &mut adapters, &cancelled).await {
            tracing::error!(task_name = %task.name, error = %e, "task failed");
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Cluster adapters are instantiated per distinct cluster ref and reused
/// across tasks that share it (spec.md §3 "Lifecycle").
async fn adapter_for(
    cfg: &Config,
    name: &str,
    cache: &mut HashMap<String, Arc<ClusterAdapter>>,
) -> Result<Arc<ClusterAdapter>> {
    if let Some(existing) = cache.get(name) {
        return Ok(existing.clone());
    }
    let cluster_cfg = cfg
        .elastics
        .get(name)
        .ok_or_else(|| Error::Config(format!("unknown cluster ref: {name}")))?;
    let adapter = Arc::new(ClusterAdapter::connect(cluster_cfg).await?);
    cache.insert(name.to_string(), adapter.clone());
    Ok(adapter)
}

async fn run_task(
    cfg: &Config,
    task: &TaskSpec,
    adapters: &mut HashMap<String, Arc<ClusterAdapter>>,
    cancelled: &Arc<AtomicBool>,
) -> Result<()> {
    let source = adapter_for(cfg, &task.source_es, adapters).await?;
    let target = adapter_for(cfg, &task.target_es, adapters).await?;

    let ctx = Context::with_cancellation(task.name.clone(), task.action.to_string(), cancelled.clone());
    let tuning = Tuning {
        scroll_time_minutes: task.scroll_time_minutes,
        slice_size: task.slice_size,
        buffer_count: task.buffer_count,
        write_parallel: task.write_parallelism,
        write_size_mib: task.write_size_mib,
    };

    let mut orchestrator = BulkOrchestrator::new(source, target, ctx)
        .with_parallelism(task.parallelism)
        .with_tuning(tuning)
        .with_index_pairs(task.index_pairs.clone());

    // TaskSpec's invariant (spec.md §3): a set `index_pattern` expands
    // into additional `(i, i)` pairs alongside any explicit ones.
    if let Some(pattern) = task.compiled_pattern()? {
        orchestrator = orchestrator.with_pattern_indexes(&pattern).await?;
    }

    match task.action {
        TaskAction::CopyIndex => orchestrator.copy_index_settings(task.force).await,
        TaskAction::Sync => orchestrator.sync(task.force).await,
        TaskAction::SyncDiff => {
            let (results, bag) = orchestrator.sync_diff().await;
            log_summary(&task.name, &results);
            bag.into_result()
        }
        TaskAction::Compare => {
            let (results, bag) = orchestrator.compare().await;
            log_summary(&task.name, &results);
            bag.into_result()
        }
    }
}

/// Logs counts and percent-changed per pair at info level, and the full
/// id lists at debug level (spec.md §4.6).
fn log_summary(task_name: &str, results: &HashMap<String, DiffResult>) {
    for (pair_key, diff) in results {
        tracing::info!(
            task_name,
            pair = %pair_key,
            total = diff.total(),
            create = diff.create_count,
            update = diff.update_count,
            delete = diff.delete_count,
            same = diff.same_count,
            percent_changed = diff.percent_changed(),
            "pair diff summary",
        );
        tracing::debug!(
            task_name,
            pair = %pair_key,
            create_ids = ?diff.create_ids,
            update_ids = ?diff.update_ids,
            delete_ids = ?diff.delete_ids,
            "pair diff ids",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffResult;

    #[test]
    fn log_summary_does_not_panic_on_empty_results() {
        log_summary("noop-task", &HashMap::new());
    }

    #[test]
    fn log_summary_handles_mixed_results() {
        let mut results = HashMap::new();
        results.insert(
            "a:a".to_string(),
            DiffResult {
                create_count: 1,
                create_ids: vec!["1".into()],
                ..Default::default()
            },
        );
        log_summary("mixed-task", &results);
    }
}
