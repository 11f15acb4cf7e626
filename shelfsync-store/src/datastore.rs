use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

use shelfsync_core::{Backend, DocInfo, DocMeta, DocMetaError, DocMetaRef, FileRef, Visibility};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("metadata error: {0}")]
    Meta(#[from] DocMetaError),
    #[error("remote returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("base url cannot carry path segments")]
    BaseUrl,
    #[error("file name contains unsupported component: {0}")]
    UnsupportedFileName(String),
    #[error("file not found: {0}")]
    MissingFile(String),
}

/// Pull-based content stream with explicit end-of-stream and error
/// termination.
pub type FileStream = BoxStream<'static, io::Result<Bytes>>;

/// Handle to a file's content in a back end, resolved by `get_file`.
pub struct FileHandle {
    pub backend: Backend,
    pub file_ref: FileRef,
    stream: FileStream,
}

impl FileHandle {
    pub fn new(backend: Backend, file_ref: FileRef, stream: FileStream) -> Self {
        Self {
            backend,
            file_ref,
            stream,
        }
    }

    pub fn into_stream(self) -> FileStream {
        self.stream
    }
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("backend", &self.backend)
            .field("file_ref", &self.file_ref)
            .field("stream", &"<stream>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileWriteOpts {
    pub visibility: Option<Visibility>,
    /// Update the file's stored attributes even when no content is supplied.
    pub update_meta: bool,
}

/// Storage capability consumed by the reconciliation engine. Back ends are
/// injected by the caller and used polymorphically.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Stable human-readable identifier, used only in logs and progress
    /// labels.
    fn id(&self) -> &str;

    /// Every document reference currently known, without fetching metadata
    /// bodies.
    async fn get_doc_meta_refs(&self) -> Result<Vec<DocMetaRef>, StoreError>;

    /// The serialized metadata body, or `None` for a missing document.
    async fn get_doc_meta(&self, fingerprint: &str) -> Result<Option<String>, StoreError>;

    /// Durably persist metadata, overwriting any previous version. The body
    /// is stored verbatim: replication must not re-mint version markers.
    async fn write(
        &self,
        fingerprint: &str,
        data: String,
        doc_info: &DocInfo,
    ) -> Result<(), StoreError>;

    async fn write_doc_meta(&self, doc_meta: &DocMeta) -> Result<(), StoreError> {
        let data = doc_meta.serialize()?;
        self.write(&doc_meta.doc_info.fingerprint, data, &doc_meta.doc_info)
            .await
    }

    /// Existence check; must not fetch content.
    async fn contains_file(&self, backend: Backend, file_ref: &FileRef)
    -> Result<bool, StoreError>;

    /// Resolve a file's content handle, or `None` when the back end does not
    /// hold the file.
    async fn get_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<Option<FileHandle>, StoreError>;

    /// Durably persist a file. `content: None` updates only the file's
    /// stored attributes (the file must already exist).
    async fn write_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
        content: Option<FileStream>,
        opts: FileWriteOpts,
    ) -> Result<(), StoreError>;
}
