use std::cmp::Ordering as CmpOrdering;
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{error, info};

use shelfsync_core::{BackendFileRef, DocFingerprint, SyncDoc, SyncDocMap};
use shelfsync_store::{Datastore, FileWriteOpts};

use crate::EngineError;
use crate::events::{Consistency, DocSnapshotEvent, SnapshotListener};
use crate::progress::ProgressTracker;
use crate::queue::WorkQueue;

/// One synchronization endpoint: a storage back end plus its computed
/// inventory. The inventory is a read-only snapshot for the duration of a
/// run.
pub struct SyncOrigin {
    pub datastore: Arc<dyn Datastore>,
    pub sync_docs: SyncDocMap,
}

impl SyncOrigin {
    pub fn new(datastore: Arc<dyn Datastore>, sync_docs: SyncDocMap) -> Self {
        Self {
            datastore,
            sync_docs,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferMetrics {
    /// Candidates considered.
    pub total: usize,
    /// Actually written, post-dedup and post-arbitration.
    pub writes: usize,
}

/// Outcome of one one-directional transfer. Failed documents are counted
/// distinctly: they appear in `doc_meta.total` and `failed_docs` but never
/// in the write counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferResult {
    pub doc_meta: TransferMetrics,
    pub files: TransferMetrics,
    pub failed_docs: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    pub doc_concurrency: usize,
    pub file_concurrency: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            doc_concurrency: read_limit("SHELFSYNC_DOC_CONCURRENCY", 8),
            file_concurrency: read_limit("SHELFSYNC_FILE_CONCURRENCY", 4),
        }
    }
}

#[derive(Default)]
struct TransferCounters {
    docs_total: AtomicUsize,
    docs_writes: AtomicUsize,
    docs_failed: AtomicUsize,
    files_total: AtomicUsize,
    files_writes: AtomicUsize,
}

impl TransferCounters {
    fn snapshot(&self) -> TransferResult {
        TransferResult {
            doc_meta: TransferMetrics {
                total: self.docs_total.load(Ordering::Acquire),
                writes: self.docs_writes.load(Ordering::Acquire),
            },
            files: TransferMetrics {
                total: self.files_total.load(Ordering::Acquire),
                writes: self.files_writes.load(Ordering::Acquire),
            },
            failed_docs: self.docs_failed.load(Ordering::Acquire),
        }
    }
}

struct TransferCtx {
    source: Arc<dyn Datastore>,
    target: Arc<dyn Datastore>,
    counters: TransferCounters,
    tracker: ProgressTracker,
    listener: SnapshotListener,
    file_queue: WorkQueue,
    id: String,
}

/// One-directional reconciliation: copy missing or stale files and metadata
/// from `source` into `target`, file writes strictly before the metadata
/// write of the same document. Per-document failures are logged and
/// counted, and never stop the run.
pub async fn transfer(
    source: &SyncOrigin,
    target: &SyncOrigin,
    listener: SnapshotListener,
    id: &str,
) -> Result<TransferResult, EngineError> {
    transfer_with_config(source, target, listener, id, TransferConfig::default()).await
}

pub async fn transfer_with_config(
    source: &SyncOrigin,
    target: &SyncOrigin,
    listener: SnapshotListener,
    id: &str,
    config: TransferConfig,
) -> Result<TransferResult, EngineError> {
    let progress_id = format!(
        "transfer:source={},target={}",
        source.datastore.id(),
        target.datastore.id()
    );

    let ctx = Arc::new(TransferCtx {
        source: source.datastore.clone(),
        target: target.datastore.clone(),
        counters: TransferCounters::default(),
        tracker: ProgressTracker::new(source.sync_docs.len(), progress_id),
        listener,
        file_queue: WorkQueue::new(config.file_concurrency),
        id: id.to_string(),
    });

    // Target-side comparisons are computed once, against the inventory
    // snapshot, so the metadata queue is fully populated before execution.
    let doc_queue = WorkQueue::new(config.doc_concurrency);
    for (fingerprint, source_doc) in &source.sync_docs {
        let target_doc = target.sync_docs.get(fingerprint).cloned();
        let source_doc = source_doc.clone();
        let ctx = ctx.clone();

        doc_queue
            .enqueue(async move {
                if let Err(err) = reconcile_doc(&ctx, &source_doc, target_doc.as_ref()).await {
                    ctx.counters.docs_failed.fetch_add(1, Ordering::Relaxed);
                    error!(
                        fingerprint = %source_doc.fingerprint,
                        transfer = %ctx.id,
                        error = %err,
                        "unable to reconcile document between source and target"
                    );
                }
            })
            .await?;
    }
    doc_queue.close().await;

    let file_exec = {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.file_queue.execute().await })
    };

    let doc_exec = doc_queue.execute().await;
    ctx.file_queue.close().await;
    let file_exec = file_exec.await?;
    doc_exec?;
    file_exec?;

    let event = DocSnapshotEvent {
        origin: source.datastore.id().to_string(),
        progress: ctx.tracker.terminate(),
        consistency: Consistency::Committed,
        mutations: Vec::new(),
    };
    (ctx.listener)(event).await;

    Ok(ctx.counters.snapshot())
}

async fn reconcile_doc(
    ctx: &Arc<TransferCtx>,
    source_doc: &SyncDoc,
    target_doc: Option<&SyncDoc>,
) -> Result<(), EngineError> {
    ctx.counters.docs_total.fetch_add(1, Ordering::Relaxed);

    for file in &source_doc.files {
        if file.file_ref.name.is_empty() {
            continue;
        }
        let completion = ctx
            .file_queue
            .enqueue(copy_file(
                ctx.clone(),
                source_doc.fingerprint.clone(),
                file.clone(),
            ))
            .await?;
        completion.wait().await??;
    }

    let do_write = match target_doc {
        None => true,
        // The single point of conflict arbitration: only a target strictly
        // behind the source is overwritten. A tie is "no write needed".
        Some(target_doc) => target_doc.uuid.compare(&source_doc.uuid) == CmpOrdering::Less,
    };

    if do_write {
        let data = ctx
            .source
            .get_doc_meta(&source_doc.fingerprint)
            .await?
            .ok_or_else(|| EngineError::MissingDocMeta(source_doc.fingerprint.clone()))?;
        ctx.target
            .write(
                &source_doc.fingerprint,
                data,
                &source_doc.doc_meta_file_ref.doc_info,
            )
            .await?;
        ctx.counters.docs_writes.fetch_add(1, Ordering::Relaxed);
    }

    // Both files and metadata are durable in the target by now.
    let event = DocSnapshotEvent {
        origin: ctx.source.id().to_string(),
        progress: ctx.tracker.incr(),
        consistency: Consistency::Committed,
        mutations: Vec::new(),
    };
    (ctx.listener)(event).await;

    Ok(())
}

async fn copy_file(
    ctx: Arc<TransferCtx>,
    fingerprint: DocFingerprint,
    file: BackendFileRef,
) -> Result<(), EngineError> {
    ctx.counters.files_total.fetch_add(1, Ordering::Relaxed);

    if ctx.target.contains_file(file.backend, &file.file_ref).await? {
        return Ok(());
    }

    let handle = match ctx.source.get_file(file.backend, &file.file_ref).await {
        Ok(handle) => handle,
        Err(err) => {
            error!(
                fingerprint = %fingerprint,
                file = %file.file_ref.name,
                error = %err,
                "could not fetch file from source"
            );
            return Err(err.into());
        }
    };

    // The source listed the file but no longer holds it; nothing to copy.
    let Some(handle) = handle else {
        return Ok(());
    };

    let backend = handle.backend;
    ctx.target
        .write_file(
            backend,
            &file.file_ref,
            Some(handle.into_stream()),
            FileWriteOpts::default(),
        )
        .await?;
    ctx.counters.files_writes.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

/// Merge both origins so that they contain the same documents: older
/// versions are upgraded and missing documents are copied. At the end both
/// origins hold the union of both sets. Each pass is idempotent, so no
/// cycle detection is needed.
pub async fn merge(
    origin_a: &SyncOrigin,
    origin_b: &SyncOrigin,
    listener: SnapshotListener,
) -> Result<(TransferResult, TransferResult), EngineError> {
    let forward = transfer(origin_a, origin_b, listener.clone(), "merge:forward").await?;

    // now transfer the other way
    let reverse = transfer(origin_b, origin_a, listener, "merge:reverse").await?;

    Ok((forward, reverse))
}

/// Staged variant of [`merge`] with a fixed local-first direction order,
/// logging each phase for operator visibility.
pub async fn synchronize_origins(
    local: &SyncOrigin,
    cloud: &SyncOrigin,
    listener: SnapshotListener,
) -> Result<(TransferResult, TransferResult), EngineError> {
    info!("transferring from local to cloud");
    let local_to_cloud = transfer(local, cloud, listener.clone(), "local-to-cloud").await?;
    info!(
        docs = local_to_cloud.doc_meta.writes,
        files = local_to_cloud.files.writes,
        failed = local_to_cloud.failed_docs,
        "transferring from local to cloud done"
    );

    info!("transferring from cloud to local");
    let cloud_to_local = transfer(cloud, local, listener, "cloud-to-local").await?;
    info!(
        docs = cloud_to_local.doc_meta.writes,
        files = cloud_to_local.files.writes,
        failed = cloud_to_local.failed_docs,
        "transferring from cloud to local done"
    );

    Ok((local_to_cloud, cloud_to_local))
}

fn read_limit(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
