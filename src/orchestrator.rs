//! Bulk Orchestrator: accumulates index pairs and tuning knobs, then fans
//! a bounded worker pool of per-pair [`Migrator`]s out over them
//! (spec.md §4.5). Grounded on `service/bulkmigrator.go`'s `Bulk` builder
//! in the original tool, whose `With*` chain this mirrors.
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;
use tokio::sync::Semaphore;

use crate::concurrency::await_all_logged;
use crate::config::IndexPair;
use crate::context::Context;
use crate::diff::DiffResult;
use crate::error::{ErrorBag, Result};
use crate::es::ClusterAdapter;
use crate::migrator::{Migrator, Tuning};

/// A value object built by a chain of with-style transformations
/// (spec.md §4.5). Unlike the original Go builder, each transformation
/// here copies the pair map rather than sharing it by reference — the
/// "copy on each mutation" option spec.md §9's design note recommends
/// over documenting an aliasing contract.
#[derive(Clone)]
pub struct BulkOrchestrator {
    source: Arc<ClusterAdapter>,
    target: Arc<ClusterAdapter>,
    pairs: HashMap<String, IndexPair>,
    tuning: Tuning,
    parallelism: usize,
    ctx: Context,
}

impl BulkOrchestrator {
    /// `parallelism` defaults to 12 and tuning to the defaults table in
    /// spec.md §4.5; both are overridable via `with_parallelism`/`with_tuning`.
    pub fn new(source: Arc<ClusterAdapter>, target: Arc<ClusterAdapter>, ctx: Context) -> Self {
        Self {
            source,
            target,
            pairs: HashMap::new(),
            tuning: Tuning::default(),
            parallelism: 12,
            ctx,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Adds unique pairs by key (spec.md §4.5 `with_index_pairs`).
    pub fn with_index_pairs(mut self, pairs: impl IntoIterator<Item = IndexPair>) -> Self {
        for pair in pairs {
            self.pairs.entry(pair.key()).or_insert(pair);
        }
        self
    }

    /// Fetches source indexes, filters by `pattern`, and adds `(i, i)`
    /// for each match (spec.md §4.5 `with_pattern_indexes`, §3 TaskSpec
    /// invariant).
    pub async fn with_pattern_indexes(mut self, pattern: &Regex) -> Result<Self> {
        let indexes = self.source.list_indexes().await?;
        for index in indexes {
            if pattern.is_match(&index) {
                let pair = IndexPair {
                    source_index: index.clone(),
                    target_index: index,
                };
                self.pairs.entry(pair.key()).or_insert(pair);
            }
        }
        Ok(self)
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// spec.md §4.5 `copy_index_settings(force)`.
    pub async fn copy_index_settings(&self, force: bool) -> Result<()> {
        let (_, bag) = self
            .parallel_run(move |m| async move { m.copy_index_settings(force).await })
            .await;
        bag.into_result()
    }

    /// spec.md §4.5 `sync(force)`.
    pub async fn sync(&self, force: bool) -> Result<()> {
        let (_, bag) = self.parallel_run(move |m| async move { m.sync(force).await }).await;
        bag.into_result()
    }

    /// spec.md §4.5 `compare() → map[pair-key]→DiffResult`. Only pairs
    /// whose result `has_diff` are retained.
    pub async fn compare(&self) -> (HashMap<String, DiffResult>, ErrorBag) {
        let (map, bag) = self.parallel_run(|m| async move { m.compare().await }).await;
        (retain_diffs(map), bag)
    }

    /// spec.md §4.5 `sync_diff() → map[pair-key]→DiffResult`.
    pub async fn sync_diff(&self) -> (HashMap<String, DiffResult>, ErrorBag) {
        let (map, bag) = self.parallel_run(|m| async move { m.sync_diff().await }).await;
        (retain_diffs(map), bag)
    }

    /// Spins up a worker pool of exactly `parallelism` workers (bounded
    /// via a semaphore rather than a fixed-size thread pool, the
    /// `tokio::spawn` idiom for bounded fan-out) and submits one task per
    /// index pair constructing a fresh [`Migrator`] and invoking `cb`.
    /// Results land in a concurrent map (spec.md §4.5, §5 "Shared
    /// resources": "store-on-write discipline; readers only after all
    /// workers finish").
    async fn parallel_run<T, F, Fut>(&self, cb: F) -> (HashMap<String, T>, ErrorBag)
    where
        F: Fn(Migrator) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Clone + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let results: Arc<DashMap<String, T>> = Arc::new(DashMap::new());
        let cb = Arc::new(cb);

        let mut handles = Vec::with_capacity(self.pairs.len());
        for pair in self.pairs.values().cloned() {
            let key = pair.key();
            let migrator = Migrator::new(
                self.source.clone(),
                self.target.clone(),
                pair,
                self.tuning.clone(),
                self.ctx.clone(),
            );
            let semaphore = semaphore.clone();
            let results = results.clone();
            let cb = cb.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("orchestrator semaphore is never closed");
                let value = cb(migrator).await?;
                results.insert(key, value);
                Ok(())
            }));
        }

        let (_, bag) = await_all_logged(handles, &self.ctx, "orchestrator pair").await;

        let results = Arc::try_unwrap(results)
            .unwrap_or_else(|arc| (*arc).clone())
            .into_iter()
            .collect();
        (results, bag)
    }
}

fn retain_diffs(map: HashMap<String, DiffResult>) -> HashMap<String, DiffResult> {
    map.into_iter().filter(|(_, diff)| diff.has_diff()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retains_only_pairs_with_diff() {
        let mut map = HashMap::new();
        map.insert(
            "a:a".to_string(),
            DiffResult {
                same_count: 4,
                ..Default::default()
            },
        );
        map.insert(
            "b:b".to_string(),
            DiffResult {
                same_count: 1,
                create_count: 1,
                create_ids: vec!["1".into()],
                ..Default::default()
            },
        );
        let retained = retain_diffs(map);
        assert_eq!(retained.len(), 1);
        assert!(retained.contains_key("b:b"));
    }

    #[test]
    fn with_index_pairs_dedupes_by_key() {
        let pairs = vec![
            IndexPair {
                source_index: "a".into(),
                target_index: "a".into(),
            },
            IndexPair {
                source_index: "a".into(),
                target_index: "a".into(),
            },
        ];
        let mut seen = HashMap::new();
        for pair in pairs {
            seen.entry(pair.key()).or_insert(pair);
        }
        assert_eq!(seen.len(), 1);
    }
}
