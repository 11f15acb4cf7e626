use std::collections::BTreeMap;

use crate::docmeta::{Backend, BackendFileRef, DocFingerprint, DocInfo, DocMeta};
use crate::markers::VersionMarker;

/// Cheap listing entry for one document in a back end. The metadata body is
/// resident when the back end already had it loaded; otherwise it is fetched
/// by fingerprint.
#[derive(Debug, Clone)]
pub struct DocMetaRef {
    pub fingerprint: DocFingerprint,
    pub doc_meta: Option<DocMeta>,
}

impl DocMetaRef {
    pub fn new(fingerprint: impl Into<DocFingerprint>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            doc_meta: None,
        }
    }
}

/// Pointer from a sync doc back to its metadata file.
#[derive(Debug, Clone, PartialEq)]
pub struct DocMetaFileRef {
    pub fingerprint: DocFingerprint,
    pub doc_info: DocInfo,
}

/// Read-only projection of one document used during reconciliation. Rebuilt
/// per run and never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncDoc {
    pub fingerprint: DocFingerprint,
    pub uuid: VersionMarker,
    pub files: Vec<BackendFileRef>,
    pub doc_meta_file_ref: DocMetaFileRef,
}

/// Inventory of a back end: fingerprint to sync doc, with deterministic
/// iteration order.
pub type SyncDocMap = BTreeMap<DocFingerprint, SyncDoc>;

impl SyncDoc {
    /// Project a document header into its sync form. The main file (stash
    /// backend) leads the manifest, followed by attachments in order.
    pub fn from_doc_info(doc_info: &DocInfo) -> Self {
        let mut files = Vec::with_capacity(doc_info.attachments.len() + 1);
        if let Some(filename) = &doc_info.filename {
            files.push(BackendFileRef::new(Backend::Stash, filename.clone()));
        }
        files.extend(doc_info.attachments.iter().cloned());

        Self {
            fingerprint: doc_info.fingerprint.clone(),
            uuid: doc_info.uuid.clone(),
            files,
            doc_meta_file_ref: DocMetaFileRef {
                fingerprint: doc_info.fingerprint.clone(),
                doc_info: doc_info.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_file_leads_the_manifest() {
        let mut doc_info = DocInfo::new("f1");
        doc_info.filename = Some("p1.pdf".to_string());
        doc_info
            .attachments
            .push(BackendFileRef::new(Backend::Image, "shot.png"));

        let sync_doc = SyncDoc::from_doc_info(&doc_info);

        assert_eq!(sync_doc.fingerprint, "f1");
        assert_eq!(sync_doc.uuid, doc_info.uuid);
        assert_eq!(sync_doc.files.len(), 2);
        assert_eq!(sync_doc.files[0].backend, Backend::Stash);
        assert_eq!(sync_doc.files[0].file_ref.name, "p1.pdf");
        assert_eq!(sync_doc.files[1].backend, Backend::Image);
    }

    #[test]
    fn document_without_files_has_empty_manifest() {
        let doc_info = DocInfo::new("f2");
        let sync_doc = SyncDoc::from_doc_info(&doc_info);
        assert!(sync_doc.files.is_empty());
        assert_eq!(sync_doc.doc_meta_file_ref.fingerprint, "f2");
    }
}
