use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::markers::VersionMarker;

/// Stable identifier for one logical document, independent of its content
/// version.
pub type DocFingerprint = String;

#[derive(Debug, Error)]
pub enum DocMetaError {
    #[error("metadata serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("metadata body is for fingerprint {actual}, expected {expected}")]
    FingerprintMismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Public => "public",
        }
    }
}

/// Storage category a file belongs to; routes writes to the right area of a
/// back end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Stash,
    Image,
    Video,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Stash => "stash",
            Backend::Image => "image",
            Backend::Video => "video",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
}

impl FileRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendFileRef {
    pub backend: Backend,
    #[serde(flatten)]
    pub file_ref: FileRef,
}

impl BackendFileRef {
    pub fn new(backend: Backend, name: impl Into<String>) -> Self {
        Self {
            backend,
            file_ref: FileRef::new(name),
        }
    }
}

/// Reconciliation-relevant header of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocInfo {
    pub fingerprint: DocFingerprint,
    pub uuid: VersionMarker,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Main document file in the stash backend, when one is attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default)]
    pub attachments: Vec<BackendFileRef>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(with = "time::serde::rfc3339")]
    pub added: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
}

impl DocInfo {
    pub fn new(fingerprint: impl Into<DocFingerprint>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            fingerprint: fingerprint.into(),
            uuid: VersionMarker::mint(),
            title: None,
            filename: None,
            attachments: Vec::new(),
            visibility: Visibility::default(),
            added: now,
            updated: now,
        }
    }
}

/// Full document metadata: the header plus the annotation payload, which is
/// carried opaquely through synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMeta {
    pub doc_info: DocInfo,
    #[serde(default)]
    pub pages: Value,
}

impl DocMeta {
    pub fn new(doc_info: DocInfo) -> Self {
        Self {
            doc_info,
            pages: Value::Null,
        }
    }

    pub fn serialize(&self) -> Result<String, DocMetaError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize a metadata body and check it belongs to the expected
    /// fingerprint.
    pub fn deserialize(data: &str, fingerprint: &str) -> Result<Self, DocMetaError> {
        let doc_meta: DocMeta = serde_json::from_str(data)?;
        if doc_meta.doc_info.fingerprint != fingerprint {
            return Err(DocMetaError::FingerprintMismatch {
                expected: fingerprint.to_string(),
                actual: doc_meta.doc_info.fingerprint,
            });
        }
        Ok(doc_meta)
    }

    /// Mark this metadata as rewritten: mints a fresh version marker and
    /// refreshes the update timestamp. Must be called by every author-side
    /// mutation before the metadata is persisted.
    pub fn touch(&mut self) {
        self.doc_info.uuid = VersionMarker::mint();
        self.doc_info.updated = OffsetDateTime::now_utc();
    }
}
