use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use shelfsync_core::{DocMeta, DocMetaRef, SyncDoc, SyncDocMap};
use shelfsync_store::Datastore;

use crate::EngineError;
use crate::events::ProgressListener;
use crate::progress::ProgressTracker;
use crate::queue::WorkQueue;
use crate::transfer::TransferConfig;

/// Build the inventory of a back end: one sync doc per document it
/// currently holds.
pub async fn to_sync_doc_map(
    datastore: Arc<dyn Datastore>,
    listener: &ProgressListener,
) -> Result<SyncDocMap, EngineError> {
    let refs = datastore.get_doc_meta_refs().await?;
    to_sync_doc_map_from_refs(datastore, refs, listener).await
}

/// Resolve a pre-listed set of references into a sync doc map. Documents
/// whose metadata cannot be resolved (deleted between listing and fetch, or
/// an unreadable body) are excluded; that race is tolerated, not an error.
pub async fn to_sync_doc_map_from_refs(
    datastore: Arc<dyn Datastore>,
    refs: Vec<DocMetaRef>,
    listener: &ProgressListener,
) -> Result<SyncDocMap, EngineError> {
    let tracker = Arc::new(ProgressTracker::new(
        refs.len(),
        format!("datastore:{}#to_sync_doc_map", datastore.id()),
    ));
    let map = Arc::new(Mutex::new(SyncDocMap::new()));
    let queue = WorkQueue::new(TransferConfig::default().doc_concurrency);

    for doc_meta_ref in refs {
        let datastore = datastore.clone();
        let map = map.clone();
        let tracker = tracker.clone();
        let listener = listener.clone();

        queue
            .enqueue(async move {
                let doc_meta = match resolve_doc_meta(&*datastore, &doc_meta_ref).await {
                    Ok(Some(doc_meta)) => doc_meta,
                    Ok(None) => return,
                    Err(err) => {
                        warn!(
                            fingerprint = %doc_meta_ref.fingerprint,
                            datastore = %datastore.id(),
                            error = %err,
                            "excluding unresolvable document from inventory"
                        );
                        return;
                    }
                };

                let sync_doc = SyncDoc::from_doc_info(&doc_meta.doc_info);
                map.lock()
                    .await
                    .insert(doc_meta_ref.fingerprint.clone(), sync_doc);
                listener(tracker.incr());
            })
            .await?;
    }

    queue.close().await;
    queue.execute().await?;

    listener(tracker.terminate());

    let map = std::mem::take(&mut *map.lock().await);
    Ok(map)
}

async fn resolve_doc_meta(
    datastore: &dyn Datastore,
    doc_meta_ref: &DocMetaRef,
) -> Result<Option<DocMeta>, EngineError> {
    if let Some(doc_meta) = &doc_meta_ref.doc_meta {
        return Ok(Some(doc_meta.clone()));
    }

    let Some(data) = datastore.get_doc_meta(&doc_meta_ref.fingerprint).await? else {
        return Ok(None);
    };
    Ok(Some(DocMeta::deserialize(&data, &doc_meta_ref.fingerprint)?))
}
