//! Diff Kernel: streaming two-cursor compare over unbounded id-streams
//! (spec.md §4.4.4) and the [`DiffResult`] it produces.
use std::collections::HashMap;

use tokio::sync::mpsc;

/// One hashed document as it arrives off either side's scroll.
#[derive(Debug, Clone)]
pub struct HashedDoc {
    pub id: String,
    pub hash: String,
}

/// Per-id classification counts and the ids behind each non-`Same`
/// bucket (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub same_count: u64,
    pub create_count: u64,
    pub update_count: u64,
    pub delete_count: u64,
    pub create_ids: Vec<String>,
    pub update_ids: Vec<String>,
    pub delete_ids: Vec<String>,
}

impl DiffResult {
    pub fn total(&self) -> u64 {
        self.same_count + self.create_count + self.update_count + self.delete_count
    }

    pub fn percent_changed(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (total - self.same_count) as f64 / total as f64
        }
    }

    pub fn has_diff(&self) -> bool {
        self.create_count > 0 || self.update_count > 0 || self.delete_count > 0
    }
}

fn classify(
    incoming: HashedDoc,
    own_pending: &mut HashMap<String, String>,
    other_pending: &mut HashMap<String, String>,
    result: &mut DiffResult,
    own_is_source: bool,
) {
    if let Some(other_hash) = other_pending.remove(&incoming.id) {
        if other_hash == incoming.hash {
            result.same_count += 1;
        } else {
            result.update_count += 1;
            result.update_ids.push(incoming.id);
        }
    } else {
        own_pending.insert(incoming.id, incoming.hash);
    }
    let _ = own_is_source;
}

/// Drives the pending-map reconciliation described in spec.md §4.4.4
/// step 3-4. Consumes both channels to exhaustion and drains residual
/// entries as `Create` (source-only) / `Delete` (target-only).
///
/// Order-independent by construction: classification only ever depends
/// on whether an id is currently present in the other side's pending
/// map, never on arrival order (spec.md §8 property 2).
pub async fn reconcile(
    mut source_rx: mpsc::Receiver<HashedDoc>,
    mut target_rx: mpsc::Receiver<HashedDoc>,
) -> DiffResult {
    let mut pending_source: HashMap<String, String> = HashMap::new();
    let mut pending_target: HashMap<String, String> = HashMap::new();
    let mut result = DiffResult::default();

    let mut source_done = false;
    let mut target_done = false;

    while !source_done || !target_done {
        tokio::select! {
            item = source_rx.recv(), if !source_done => {
                match item {
                    Some(doc) => classify(doc, &mut pending_source, &mut pending_target, &mut result, true),
                    None => source_done = true,
                }
            }
            item = target_rx.recv(), if !target_done => {
                match item {
                    Some(doc) => classify(doc, &mut pending_target, &mut pending_source, &mut result, false),
                    None => target_done = true,
                }
            }
        }
    }

    result.create_count += pending_source.len() as u64;
    result.create_ids.extend(pending_source.into_keys());
    result.delete_count += pending_target.len() as u64;
    result.delete_ids.extend(pending_target.into_keys());

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(source: Vec<HashedDoc>, target: Vec<HashedDoc>) -> DiffResult {
        let (stx, srx) = mpsc::channel(16);
        let (ttx, trx) = mpsc::channel(16);
        for doc in source {
            stx.send(doc).await.unwrap();
        }
        drop(stx);
        for doc in target {
            ttx.send(doc).await.unwrap();
        }
        drop(ttx);
        reconcile(srx, trx).await
    }

    fn doc(id: &str, hash: &str) -> HashedDoc {
        HashedDoc {
            id: id.to_string(),
            hash: hash.to_string(),
        }
    }

    #[tokio::test]
    async fn identical_sets_are_all_same() {
        let source = vec![doc("1", "a"), doc("2", "b")];
        let target = vec![doc("1", "a"), doc("2", "b")];
        let result = run(source, target).await;
        assert_eq!(result.same_count, 2);
        assert!(!result.has_diff());
    }

    #[tokio::test]
    async fn classifies_create_update_delete() {
        // source {1,2,3,4}, target {2,3,5}, 2 differs -> matches E2E-3
        let source = vec![doc("1", "h1"), doc("2", "h2a"), doc("3", "h3"), doc("4", "h4")];
        let target = vec![doc("2", "h2b"), doc("3", "h3"), doc("5", "h5")];
        let mut result = run(source, target).await;
        result.create_ids.sort();
        assert_eq!(result.create_ids, vec!["1".to_string(), "4".to_string()]);
        assert_eq!(result.update_ids, vec!["2".to_string()]);
        assert_eq!(result.delete_ids, vec!["5".to_string()]);
        assert_eq!(result.same_count, 1);
        assert_eq!(result.total(), 4);
    }

    #[tokio::test]
    async fn classification_is_order_independent() {
        let source_fwd = vec![doc("1", "a"), doc("2", "b"), doc("3", "c")];
        let target_fwd = vec![doc("2", "x"), doc("3", "c"), doc("4", "d")];

        let mut source_rev = source_fwd.clone();
        source_rev.reverse();
        let mut target_rev = target_fwd.clone();
        target_rev.reverse();

        let a = run(source_fwd, target_fwd).await;
        let b = run(source_rev, target_rev).await;

        assert_eq!(a.same_count, b.same_count);
        assert_eq!(a.update_count, b.update_count);
        assert_eq!(a.create_count, b.create_count);
        assert_eq!(a.delete_count, b.delete_count);
    }

    #[tokio::test]
    async fn empty_sets_produce_empty_result() {
        let result = run(vec![], vec![]).await;
        assert_eq!(result.total(), 0);
        assert!(!result.has_diff());
    }

    #[test]
    fn percent_changed_excludes_same() {
        let result = DiffResult {
            same_count: 1,
            create_count: 2,
            update_count: 1,
            delete_count: 0,
            ..Default::default()
        };
        assert_eq!(result.total(), 4);
        assert!((result.percent_changed() - 0.75).abs() < f64::EPSILON);
    }
}
