mod docmeta;
mod markers;
mod syncdoc;

pub use docmeta::{
    Backend, BackendFileRef, DocFingerprint, DocInfo, DocMeta, DocMetaError, FileRef, Visibility,
};
pub use markers::VersionMarker;
pub use syncdoc::{DocMetaFileRef, DocMetaRef, SyncDoc, SyncDocMap};
