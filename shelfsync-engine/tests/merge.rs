use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::{FutureExt, StreamExt, stream};

use shelfsync_core::{Backend, DocInfo, DocMeta, FileRef, VersionMarker};
use shelfsync_engine::{
    SnapshotListener, SyncOrigin, merge, null_progress_listener, null_snapshot_listener,
    synchronize_origins, to_sync_doc_map,
};
use shelfsync_store::{Datastore, FileStream, FileWriteOpts, MemoryDatastore};

const M1: &str = "0000000000001-0000-00000001";
const M2: &str = "0000000000002-0000-00000002";

fn content_stream(data: &'static [u8]) -> FileStream {
    stream::iter([Ok(Bytes::from_static(data))]).boxed()
}

fn doc_info(fingerprint: &str, marker: &str, filename: Option<&str>) -> DocInfo {
    let mut doc_info = DocInfo::new(fingerprint);
    doc_info.uuid = VersionMarker::new(marker);
    doc_info.filename = filename.map(str::to_string);
    doc_info
}

async fn seed(
    store: &MemoryDatastore,
    fingerprint: &str,
    marker: &str,
    file: Option<(&str, &'static [u8])>,
) {
    let info = doc_info(fingerprint, marker, file.map(|(name, _)| name));
    if let Some((name, data)) = file {
        store
            .write_file(
                Backend::Stash,
                &FileRef::new(name),
                Some(content_stream(data)),
                FileWriteOpts::default(),
            )
            .await
            .unwrap();
    }
    store.write_doc_meta(&DocMeta::new(info)).await.unwrap();
}

async fn origin(store: &Arc<MemoryDatastore>) -> SyncOrigin {
    let datastore: Arc<dyn Datastore> = store.clone();
    let sync_docs = to_sync_doc_map(datastore.clone(), &null_progress_listener())
        .await
        .unwrap();
    SyncOrigin::new(datastore, sync_docs)
}

async fn marker_of(store: &MemoryDatastore, fingerprint: &str) -> VersionMarker {
    let data = store.get_doc_meta(fingerprint).await.unwrap().unwrap();
    DocMeta::deserialize(&data, fingerprint)
        .unwrap()
        .doc_info
        .uuid
}

#[tokio::test]
async fn merge_converges_both_origins_on_the_union() {
    let a = Arc::new(MemoryDatastore::new("a"));
    let b = Arc::new(MemoryDatastore::new("b"));

    // unique to a, unique to b, and a conflicting pair where b is newer
    seed(&a, "f1", M1, Some(("p1.pdf", b"one"))).await;
    seed(&b, "f2", M1, Some(("p2.pdf", b"two"))).await;
    seed(&a, "f3", M1, None).await;
    seed(&b, "f3", M2, None).await;

    merge(&origin(&a).await, &origin(&b).await, null_snapshot_listener())
        .await
        .unwrap();

    for fingerprint in ["f1", "f2", "f3"] {
        assert_eq!(
            marker_of(&a, fingerprint).await,
            marker_of(&b, fingerprint).await,
            "markers diverge for {fingerprint}"
        );
    }
    assert_eq!(marker_of(&a, "f3").await, VersionMarker::new(M2));

    assert_eq!(
        a.file_bytes(Backend::Stash, "p2.pdf").await.unwrap(),
        Bytes::from_static(b"two")
    );
    assert_eq!(
        b.file_bytes(Backend::Stash, "p1.pdf").await.unwrap(),
        Bytes::from_static(b"one")
    );
}

#[tokio::test]
async fn second_merge_performs_no_writes() {
    let a = Arc::new(MemoryDatastore::new("a"));
    let b = Arc::new(MemoryDatastore::new("b"));

    seed(&a, "f1", M1, Some(("p1.pdf", b"one"))).await;
    seed(&b, "f2", M2, None).await;

    merge(&origin(&a).await, &origin(&b).await, null_snapshot_listener())
        .await
        .unwrap();

    let (forward, reverse) = merge(&origin(&a).await, &origin(&b).await, null_snapshot_listener())
        .await
        .unwrap();

    assert_eq!(forward.doc_meta.writes, 0);
    assert_eq!(forward.files.writes, 0);
    assert_eq!(reverse.doc_meta.writes, 0);
    assert_eq!(reverse.files.writes, 0);
}

#[tokio::test]
async fn synchronize_origins_runs_local_first_then_cloud() {
    let local = Arc::new(MemoryDatastore::new("local"));
    let cloud = Arc::new(MemoryDatastore::new("cloud"));

    seed(&local, "f1", M1, None).await;
    seed(&cloud, "f2", M1, None).await;

    let origins: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let listener: SnapshotListener = {
        let origins = origins.clone();
        Arc::new(move |event| {
            let origins = origins.clone();
            async move {
                origins.lock().unwrap().push(event.origin);
            }
            .boxed()
        })
    };

    let (local_to_cloud, cloud_to_local) =
        synchronize_origins(&origin(&local).await, &origin(&cloud).await, listener)
            .await
            .unwrap();

    assert_eq!(local_to_cloud.doc_meta.writes, 1);
    assert_eq!(cloud_to_local.doc_meta.writes, 1);
    assert_eq!(local.doc_count().await, 2);
    assert_eq!(cloud.doc_count().await, 2);

    // the local pass finishes before the cloud pass starts
    let origins = origins.lock().unwrap();
    let first_cloud = origins.iter().position(|id| id == "cloud").unwrap();
    assert!(origins[..first_cloud].iter().all(|id| id == "local"));
    assert!(origins[first_cloud..].iter().all(|id| id == "cloud"));
}
