//! Migrator: owns the scroll→hash→compare→bulk pipeline for one
//! (source_index, target_index) pair (spec.md §4.4).
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::concurrency::await_all_logged;
use crate::config::IndexPair;
use crate::context::{Context, Progress};
use crate::diff::{DiffResult, HashedDoc};
use crate::error::{Error, ErrorBag, Result};
use crate::es::{BulkBuffer, ClusterAdapter, Doc, Op, ScrollOptions};
use crate::hash::hash_source;
use crate::{diff, es};

const DEFAULT_PAGE_SIZE: u32 = 1_000;

/// Tuning knobs threaded from the Bulk Orchestrator down into one
/// Migrator invocation (spec.md §4.4, §4.5 defaults table).
#[derive(Debug, Clone)]
pub struct Tuning {
    pub scroll_time_minutes: u32,
    pub slice_size: u32,
    pub buffer_count: usize,
    pub write_parallel: usize,
    pub write_size_mib: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            scroll_time_minutes: 10,
            slice_size: 20,
            buffer_count: 10_000,
            write_parallel: 10,
            write_size_mib: 5,
        }
    }
}

/// Drives one index pair's full scroll/hash/compare/bulk pipeline.
/// Constructed fresh per (task, index pair) execution; scroll cursors it
/// opens never outlive a single call (spec.md §3 "Lifecycle").
pub struct Migrator {
    source: Arc<ClusterAdapter>,
    target: Arc<ClusterAdapter>,
    pair: IndexPair,
    tuning: Tuning,
    ctx: Context,
}

impl Migrator {
    pub fn new(
        source: Arc<ClusterAdapter>,
        target: Arc<ClusterAdapter>,
        pair: IndexPair,
        tuning: Tuning,
        ctx: Context,
    ) -> Self {
        let ctx = ctx.with_pair(
            source.cluster_version(),
            target.cluster_version(),
            pair.source_index.clone(),
            pair.target_index.clone(),
        );
        Self {
            source,
            target,
            pair,
            tuning,
            ctx,
        }
    }

    pub fn ctx(&self) -> &Context {
        &self.ctx
    }

    /// spec.md §4.4.1.
    pub async fn copy_index_settings(&self, force: bool) -> Result<()> {
        let existed = self.target.index_exists(&self.pair.target_index).await?;
        if existed && !force {
            return Ok(());
        }
        if existed && force {
            self.target.delete_index(&self.pair.target_index).await?;
        }

        let source_settings = self
            .source
            .get_index_settings_and_mappings(&self.pair.source_index)
            .await?;
        let target_settings = es::translate(&source_settings, self.target.major(), &self.pair.target_index)?;
        self.target.create_index(&target_settings).await?;
        Ok(())
    }

    /// spec.md §4.4.2.
    pub async fn sync(&self, force: bool) -> Result<()> {
        self.copy_index_settings(force).await?;
        self.upsert(None, Op::Create).await
    }

    /// Keyword-field selection (spec.md §4.4.4 step 1). Best-effort: a
    /// `Data` failure degrades to an empty field list rather than
    /// propagating, per spec.md §7.
    async fn keyword_fields(&self) -> Vec<String> {
        let source_fields = self.index_field_types(&self.source, &self.pair.source_index).await;
        let target_fields = self.index_field_types(&self.target, &self.pair.target_index).await;
        let (Ok(source_fields), Ok(target_fields)) = (source_fields, target_fields) else {
            return Vec::new();
        };

        source_fields
            .into_iter()
            .filter(|(name, type_)| type_ == "keyword" && target_fields.contains_key(name))
            .map(|(name, _)| name)
            .collect()
    }

    async fn index_field_types(&self, adapter: &ClusterAdapter, index: &str) -> Result<HashMap<String, String>> {
        let settings = adapter.get_index_settings_and_mappings(index).await?;
        let properties = extract_properties(&settings.mappings, index)
            .ok_or_else(|| Error::Data(format!("no properties in mapping for {index}")))?;
        Ok(properties
            .iter()
            .filter_map(|(name, attrs)| {
                attrs
                    .get("type")
                    .and_then(Value::as_str)
                    .map(|t| (name.clone(), t.to_string()))
            })
            .collect())
    }

    /// spec.md §4.4.3 + §4.4.4: sliced, parallel, streaming two-cursor
    /// compare. Per-slice scroll errors are logged and do not fail the
    /// whole compare, matching the original's `Compare`, which never
    /// propagates per-slice scroll errors.
    pub async fn compare(&self) -> Result<DiffResult> {
        let sort_fields = self.keyword_fields().await;
        self.compare_with_sort(sort_fields).await
    }

    async fn compare_with_sort(&self, sort_fields: Vec<String>) -> Result<DiffResult> {
        let slice_count = self.tuning.slice_size.max(1);
        let (source_tx, source_rx) = mpsc::channel::<HashedDoc>(self.tuning.buffer_count);
        let (target_tx, target_rx) = mpsc::channel::<HashedDoc>(self.tuning.buffer_count);

        let source_progress = Progress::new("source_scroll");
        let target_progress = Progress::new("target_scroll");

        let mut handles: Vec<JoinHandle<Result<()>>> = Vec::new();
        for slice_id in 0..slice_count {
            let slice = if slice_count > 1 { Some((slice_id, slice_count)) } else { None };
            handles.push(self.spawn_hashed_scroll(
                self.source.clone(),
                self.pair.source_index.clone(),
                sort_fields.clone(),
                slice,
                true,
                source_tx.clone(),
                source_progress.clone(),
                target_progress.clone(),
            ));
        }
        for slice_id in 0..slice_count {
            let slice = if slice_count > 1 { Some((slice_id, slice_count)) } else { None };
            handles.push(self.spawn_hashed_scroll(
                self.target.clone(),
                self.pair.target_index.clone(),
                sort_fields.clone(),
                slice,
                false,
                target_tx.clone(),
                source_progress.clone(),
                target_progress.clone(),
            ));
        }
        drop(source_tx);
        drop(target_tx);

        let reconcile_handle = tokio::spawn(diff::reconcile(source_rx, target_rx));

        let (_, bag) = await_all_logged(handles, &self.ctx, "compare scroll slice").await;
        if !bag.is_empty() {
            tracing::warn!(errors = bag.len(), "compare: some scroll slices failed, result may be partial");
        }

        // Live same-count isn't observable mid-stream: the diff kernel only
        // knows a pair is "same" once both sides have delivered it, so
        // progress ticks during the scroll report 0 and the true count
        // arrives only in this final result.
        let result = reconcile_handle
            .await
            .map_err(|e| Error::Panic(e.to_string()))?;

        tracing::info!(
            task_name = %self.ctx.task_name,
            source_index = %self.pair.source_index,
            target_index = %self.pair.target_index,
            total = result.total(),
            create = result.create_count,
            update = result.update_count,
            delete = result.delete_count,
            same = result.same_count,
            "compare complete",
        );

        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_hashed_scroll(
        &self,
        adapter: Arc<ClusterAdapter>,
        index: String,
        sort_fields: Vec<String>,
        slice: Option<(u32, u32)>,
        is_source: bool,
        tx: mpsc::Sender<HashedDoc>,
        source_progress: Arc<Progress>,
        target_progress: Arc<Progress>,
    ) -> JoinHandle<Result<()>> {
        let ctx = self.ctx.clone();
        let tuning = self.tuning.clone();
        let progress = if is_source { source_progress.clone() } else { target_progress.clone() };
        tokio::spawn(async move {
            let opts = ScrollOptions {
                query: None,
                sort_fields,
                page_size: DEFAULT_PAGE_SIZE,
                keepalive_minutes: tuning.scroll_time_minutes,
                slice,
            };
            scroll_and_hash(adapter, index, opts, ctx, progress, source_progress, target_progress, tx).await
        })
    }

    /// spec.md §4.4.5.
    pub async fn sync_diff(&self) -> Result<DiffResult> {
        let diff_result = self.compare().await?;
        let mut bag = ErrorBag::new();

        if !diff_result.create_ids.is_empty() {
            let query = terms_query(&diff_result.create_ids);
            if let Err(e) = self.upsert(Some(query), Op::Create).await {
                bag.push(e);
            }
        }
        if !diff_result.update_ids.is_empty() {
            let query = terms_query(&diff_result.update_ids);
            if let Err(e) = self.upsert(Some(query), Op::Update).await {
                bag.push(e);
            }
        }
        if !diff_result.delete_ids.is_empty() {
            let query = terms_query(&diff_result.delete_ids);
            if let Err(e) = self.upsert(Some(query), Op::Delete).await {
                bag.push(e);
            }
        }

        if !bag.is_empty() {
            tracing::warn!(errors = bag.len(), "sync_diff: one or more reapply passes failed");
        }
        Ok(diff_result)
    }

    /// spec.md §4.4.6: bulk write pipeline. Scrolls the side appropriate
    /// to `op` (target for `Delete`, source otherwise), fans hashed-free
    /// `Doc`s with `op` set into a channel, and drains them through
    /// `write_parallel` bulk-writer workers.
    async fn upsert(&self, query: Option<Value>, op: Op) -> Result<()> {
        let (scroll_adapter, scroll_index) = match op {
            Op::Delete => (self.target.clone(), self.pair.target_index.clone()),
            _ => (self.source.clone(), self.pair.source_index.clone()),
        };

        let slice_count = self.tuning.slice_size.max(1);
        let (tx, rx) = mpsc::channel::<Doc>(self.tuning.buffer_count);

        let mut producer_handles: Vec<JoinHandle<Result<()>>> = Vec::new();
        for slice_id in 0..slice_count {
            let slice = if slice_count > 1 { Some((slice_id, slice_count)) } else { None };
            let adapter = scroll_adapter.clone();
            let index = scroll_index.clone();
            let query = query.clone();
            let ctx = self.ctx.clone();
            let tuning = self.tuning.clone();
            let tx = tx.clone();
            let progress = Progress::new("upsert_scroll");
            producer_handles.push(tokio::spawn(async move {
                let opts = ScrollOptions {
                    query,
                    sort_fields: Vec::new(),
                    page_size: DEFAULT_PAGE_SIZE,
                    keepalive_minutes: tuning.scroll_time_minutes,
                    slice,
                };
                scroll_into_doc_channel(adapter, index, opts, ctx, progress, op, tx).await
            }));
        }
        drop(tx);

        let write_parallel = self.tuning.write_parallel.max(1);
        let target = self.target.clone();
        let write_size_bytes = self.tuning.write_size_mib * 1024 * 1024;
        let target_index = self.pair.target_index.clone();

        let writer_handles = if write_parallel <= 1 {
            vec![tokio::spawn(bulk_writer(
                target,
                target_index,
                rx,
                write_size_bytes,
            ))]
        } else {
            let shared_rx = Arc::new(Mutex::new(rx));
            (0..write_parallel)
                .map(|_| {
                    tokio::spawn(bulk_writer_shared(
                        target.clone(),
                        target_index.clone(),
                        shared_rx.clone(),
                        write_size_bytes,
                    ))
                })
                .collect()
        };

        let (_, mut bag) = await_all_logged(producer_handles, &self.ctx, "upsert scroll producer").await;
        let (_, writer_bag) = await_all_logged(writer_handles, &self.ctx, "upsert bulk writer").await;
        bag.extend(writer_bag);

        bag.into_result()
    }
}

fn terms_query(ids: &[String]) -> Value {
    serde_json::json!({ "terms": { "_id": ids } })
}

fn extract_properties<'a>(mappings: &'a Value, index: &str) -> Option<&'a serde_json::Map<String, Value>> {
    mappings
        .pointer(&format!("/{index}/mappings/properties"))
        .and_then(Value::as_object)
}

async fn scroll_and_hash(
    adapter: Arc<ClusterAdapter>,
    index: String,
    opts: ScrollOptions,
    ctx: Context,
    progress: Arc<Progress>,
    source_progress: Arc<Progress>,
    target_progress: Arc<Progress>,
    tx: mpsc::Sender<HashedDoc>,
) -> Result<()> {
    let (cursor, first_page, total) = adapter.open_scroll(&index, &opts).await?;
    progress.total.fetch_add(total, Ordering::Relaxed);

    let mut cursor = cursor;
    let mut err: Option<Error> = None;

    if send_hashed(&first_page, &tx, &progress, &ctx, &source_progress, &target_progress).await {
        loop {
            if ctx.is_cancelled() {
                break;
            }
            match adapter.next_scroll(&mut cursor).await {
                Ok((docs, done)) => {
                    if done {
                        break;
                    }
                    if !send_hashed(&docs, &tx, &progress, &ctx, &source_progress, &target_progress).await {
                        break;
                    }
                }
                Err(e) => {
                    err = Some(e);
                    break;
                }
            }
        }
    }

    if let Err(close_err) = adapter.close_scroll(cursor).await {
        tracing::warn!(error = %close_err, "close_scroll failed");
    }

    if let Some(e) = err {
        return Err(e);
    }
    Ok(())
}

async fn send_hashed(
    docs: &[Doc],
    tx: &mpsc::Sender<HashedDoc>,
    progress: &Progress,
    ctx: &Context,
    source_progress: &Progress,
    target_progress: &Progress,
) -> bool {
    if docs.is_empty() {
        return true;
    }
    for doc in docs {
        let hashed = HashedDoc {
            id: doc.id.clone(),
            hash: hash_source(&doc.source),
        };
        if tx.send(hashed).await.is_err() {
            return false;
        }
    }
    progress.add(docs.len() as u64);
    ctx.progress_sink.on_tick(ctx, source_progress, target_progress, 0);
    true
}

async fn scroll_into_doc_channel(
    adapter: Arc<ClusterAdapter>,
    index: String,
    opts: ScrollOptions,
    ctx: Context,
    progress: Arc<Progress>,
    op: Op,
    tx: mpsc::Sender<Doc>,
) -> Result<()> {
    let (cursor, first_page, total) = adapter.open_scroll(&index, &opts).await?;
    progress.total.fetch_add(total, Ordering::Relaxed);

    let mut cursor = cursor;
    let mut err: Option<Error> = None;

    if !send_docs(first_page, op, &tx, &progress, &ctx).await {
        // receiver gone, stop quietly
    } else {
        loop {
            if ctx.is_cancelled() {
                break;
            }
            match adapter.next_scroll(&mut cursor).await {
                Ok((docs, done)) => {
                    if done {
                        break;
                    }
                    if !send_docs(docs, op, &tx, &progress, &ctx).await {
                        break;
                    }
                }
                Err(e) => {
                    err = Some(e);
                    break;
                }
            }
        }
    }

    if let Err(close_err) = adapter.close_scroll(cursor).await {
        tracing::warn!(error = %close_err, "close_scroll failed");
    }

    if let Some(e) = err {
        return Err(e);
    }
    Ok(())
}

async fn send_docs(docs: Vec<Doc>, op: Op, tx: &mpsc::Sender<Doc>, progress: &Progress, _ctx: &Context) -> bool {
    if docs.is_empty() {
        return true;
    }
    let count = docs.len() as u64;
    for mut doc in docs {
        doc.op = op;
        if tx.send(doc).await.is_err() {
            return false;
        }
    }
    progress.add(count);
    true
}

async fn bulk_writer(target: Arc<ClusterAdapter>, index: String, mut rx: mpsc::Receiver<Doc>, write_size_bytes: u64) -> Result<()> {
    let mut buffer = BulkBuffer::new();
    while let Some(doc) = rx.recv().await {
        target.append_bulk(&mut buffer, &index, &doc);
        if buffer.len_bytes() as u64 >= write_size_bytes {
            target.flush_bulk(&mut buffer).await?;
        }
    }
    if !buffer.is_empty() {
        target.flush_bulk(&mut buffer).await?;
    }
    Ok(())
}

async fn bulk_writer_shared(
    target: Arc<ClusterAdapter>,
    index: String,
    rx: Arc<Mutex<mpsc::Receiver<Doc>>>,
    write_size_bytes: u64,
) -> Result<()> {
    let mut buffer = BulkBuffer::new();
    loop {
        let doc = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        match doc {
            Some(doc) => {
                target.append_bulk(&mut buffer, &index, &doc);
                if buffer.len_bytes() as u64 >= write_size_bytes {
                    target.flush_bulk(&mut buffer).await?;
                }
            }
            None => break,
        }
    }
    if !buffer.is_empty() {
        target.flush_bulk(&mut buffer).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_query_shape() {
        let q = terms_query(&["1".to_string(), "2".to_string()]);
        assert_eq!(q["terms"]["_id"], serde_json::json!(["1", "2"]));
    }

    #[test]
    fn extract_properties_reads_typeless_mapping() {
        let mappings = serde_json::json!({
            "idx": { "mappings": { "properties": { "f": {"type": "keyword"} } } }
        });
        let props = extract_properties(&mappings, "idx").unwrap();
        assert!(props.contains_key("f"));
    }

    #[test]
    fn tuning_defaults_match_orchestrator_table() {
        let t = Tuning::default();
        assert_eq!(t.scroll_time_minutes, 10);
        assert_eq!(t.slice_size, 20);
        assert_eq!(t.buffer_count, 10_000);
        assert_eq!(t.write_parallel, 10);
        assert_eq!(t.write_size_mib, 5);
    }
}
