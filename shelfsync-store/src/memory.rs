use std::collections::BTreeMap;
use std::io;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{StreamExt, stream};
use tokio::sync::Mutex;

use shelfsync_core::{Backend, DocInfo, DocMetaRef, FileRef, Visibility};

use crate::datastore::{Datastore, FileHandle, FileStream, FileWriteOpts, StoreError};

struct StoredFile {
    content: Bytes,
    visibility: Visibility,
}

#[derive(Default)]
struct MemoryState {
    docs: BTreeMap<String, String>,
    files: BTreeMap<(Backend, String), StoredFile>,
}

/// In-process back end with the same observable semantics as the durable
/// ones. Embedders use it for dry runs; the engine tests are built on it.
pub struct MemoryDatastore {
    id: String,
    state: Mutex<MemoryState>,
}

impl MemoryDatastore {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub async fn file_bytes(&self, backend: Backend, name: &str) -> Option<Bytes> {
        let state = self.state.lock().await;
        state
            .files
            .get(&(backend, name.to_string()))
            .map(|file| file.content.clone())
    }

    pub async fn file_visibility(&self, backend: Backend, name: &str) -> Option<Visibility> {
        let state = self.state.lock().await;
        state
            .files
            .get(&(backend, name.to_string()))
            .map(|file| file.visibility)
    }

    pub async fn doc_count(&self) -> usize {
        self.state.lock().await.docs.len()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_doc_meta_refs(&self) -> Result<Vec<DocMetaRef>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .docs
            .keys()
            .map(|fingerprint| DocMetaRef::new(fingerprint.clone()))
            .collect())
    }

    async fn get_doc_meta(&self, fingerprint: &str) -> Result<Option<String>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.docs.get(fingerprint).cloned())
    }

    async fn write(
        &self,
        fingerprint: &str,
        data: String,
        _doc_info: &DocInfo,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.docs.insert(fingerprint.to_string(), data);
        Ok(())
    }

    async fn contains_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state.files.contains_key(&(backend, file_ref.name.clone())))
    }

    async fn get_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<Option<FileHandle>, StoreError> {
        let state = self.state.lock().await;
        let Some(file) = state.files.get(&(backend, file_ref.name.clone())) else {
            return Ok(None);
        };
        let stream: FileStream = stream::iter([Ok::<_, io::Error>(file.content.clone())]).boxed();
        Ok(Some(FileHandle::new(backend, file_ref.clone(), stream)))
    }

    async fn write_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
        content: Option<FileStream>,
        opts: FileWriteOpts,
    ) -> Result<(), StoreError> {
        let collected = match content {
            Some(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Some(buf.freeze())
            }
            None => None,
        };

        let mut state = self.state.lock().await;
        let key = (backend, file_ref.name.clone());
        match collected {
            Some(content) => {
                let visibility = opts.visibility.unwrap_or_else(|| {
                    state
                        .files
                        .get(&key)
                        .map(|file| file.visibility)
                        .unwrap_or_default()
                });
                state.files.insert(key, StoredFile { content, visibility });
            }
            None => {
                let Some(file) = state.files.get_mut(&key) else {
                    return Err(StoreError::MissingFile(file_ref.name.clone()));
                };
                if let Some(visibility) = opts.visibility {
                    file.visibility = visibility;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfsync_core::{DocInfo, DocMeta};

    fn content_stream(data: &'static [u8]) -> FileStream {
        stream::iter([Ok(Bytes::from_static(data))]).boxed()
    }

    #[tokio::test]
    async fn metadata_round_trip() {
        let store = MemoryDatastore::new("mem");
        let doc_meta = DocMeta::new(DocInfo::new("f1"));
        store.write_doc_meta(&doc_meta).await.unwrap();

        let refs = store.get_doc_meta_refs().await.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].fingerprint, "f1");

        let data = store.get_doc_meta("f1").await.unwrap().unwrap();
        let parsed = DocMeta::deserialize(&data, "f1").unwrap();
        assert_eq!(parsed.doc_info.uuid, doc_meta.doc_info.uuid);
        assert!(store.get_doc_meta("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_round_trip_and_visibility() {
        let store = MemoryDatastore::new("mem");
        let file_ref = FileRef::new("p1.pdf");

        store
            .write_file(
                Backend::Stash,
                &file_ref,
                Some(content_stream(b"hello")),
                FileWriteOpts::default(),
            )
            .await
            .unwrap();

        assert!(store.contains_file(Backend::Stash, &file_ref).await.unwrap());
        assert_eq!(
            store.file_bytes(Backend::Stash, "p1.pdf").await.unwrap(),
            Bytes::from_static(b"hello")
        );
        assert_eq!(
            store.file_visibility(Backend::Stash, "p1.pdf").await,
            Some(Visibility::Private)
        );

        store
            .write_file(
                Backend::Stash,
                &file_ref,
                None,
                FileWriteOpts {
                    visibility: Some(Visibility::Public),
                    update_meta: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(
            store.file_visibility(Backend::Stash, "p1.pdf").await,
            Some(Visibility::Public)
        );
    }

    #[tokio::test]
    async fn attrs_only_update_requires_existing_file() {
        let store = MemoryDatastore::new("mem");
        let err = store
            .write_file(
                Backend::Stash,
                &FileRef::new("ghost.pdf"),
                None,
                FileWriteOpts {
                    visibility: Some(Visibility::Public),
                    update_meta: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingFile(_)));
    }
}
