use std::sync::Arc;

use futures_util::future::join_all;
use tracing::info;

use shelfsync_core::{DocMeta, SyncDoc, Visibility};
use shelfsync_store::{Datastore, FileWriteOpts};

use crate::EngineError;

/// Change a document's sharing visibility on both its metadata and every
/// attached file. File writes are independent of each other (all-or-nothing
/// per file, not transactional across files); every write is awaited and
/// the first error is reported after they all settle.
pub async fn change_visibility(
    store: Arc<dyn Datastore>,
    doc_meta: &mut DocMeta,
    visibility: Visibility,
) -> Result<(), EngineError> {
    info!(
        fingerprint = %doc_meta.doc_info.fingerprint,
        visibility = visibility.as_str(),
        "changing document visibility"
    );

    doc_meta.doc_info.visibility = visibility;
    doc_meta.touch();

    let opts = FileWriteOpts {
        visibility: Some(visibility),
        update_meta: true,
    };
    let files = SyncDoc::from_doc_info(&doc_meta.doc_info).files;
    let file_writes = files.into_iter().map(|file| {
        let store = store.clone();
        async move {
            store
                .write_file(file.backend, &file.file_ref, None, opts)
                .await
        }
    });

    let (file_results, meta_result) =
        tokio::join!(join_all(file_writes), store.write_doc_meta(doc_meta));
    for result in file_results {
        result?;
    }
    meta_result?;

    info!(
        fingerprint = %doc_meta.doc_info.fingerprint,
        "document visibility changed"
    );
    Ok(())
}
