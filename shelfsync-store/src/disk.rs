use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use shelfsync_core::{Backend, DocInfo, DocMetaRef, FileRef, Visibility};

use crate::datastore::{Datastore, FileHandle, FileStream, FileWriteOpts, StoreError};

const META_DIR: &str = "meta";

#[derive(Debug, Serialize, Deserialize)]
struct FileAttrs {
    visibility: Visibility,
}

/// Local on-disk back end.
///
/// Layout under the root directory: `meta/<fingerprint>.json` holds metadata
/// bodies, `<backend>/<name>` holds file content and `<backend>/<name>.attrs.json`
/// the per-file attributes. All writes go through a partial file followed by
/// a rename, so readers never observe torn content.
pub struct DiskDatastore {
    id: String,
    root: PathBuf,
}

impl DiskDatastore {
    pub async fn open(
        id: impl Into<String>,
        root: impl Into<PathBuf>,
    ) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join(META_DIR)).await?;
        Ok(Self {
            id: id.into(),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn meta_path(&self, fingerprint: &str) -> Result<PathBuf, StoreError> {
        safe_child(&self.root.join(META_DIR), &format!("{fingerprint}.json"))
    }

    fn file_path(&self, backend: Backend, name: &str) -> Result<PathBuf, StoreError> {
        safe_child(&self.root.join(backend.as_str()), name)
    }

    fn attrs_path(&self, backend: Backend, name: &str) -> Result<PathBuf, StoreError> {
        safe_child(
            &self.root.join(backend.as_str()),
            &format!("{name}.attrs.json"),
        )
    }
}

#[async_trait]
impl Datastore for DiskDatastore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_doc_meta_refs(&self) -> Result<Vec<DocMetaRef>, StoreError> {
        let mut refs = Vec::new();
        let mut dir = match tokio::fs::read_dir(self.root.join(META_DIR)).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(refs),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(fingerprint) = name.strip_suffix(".json") else {
                continue;
            };
            if fingerprint.is_empty() {
                continue;
            }
            refs.push(DocMetaRef::new(fingerprint));
        }

        refs.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        Ok(refs)
    }

    async fn get_doc_meta(&self, fingerprint: &str) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.meta_path(fingerprint)?).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(
        &self,
        fingerprint: &str,
        data: String,
        _doc_info: &DocInfo,
    ) -> Result<(), StoreError> {
        write_atomic(&self.meta_path(fingerprint)?, data.as_bytes()).await
    }

    async fn contains_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<bool, StoreError> {
        match tokio::fs::metadata(self.file_path(backend, &file_ref.name)?).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn get_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<Option<FileHandle>, StoreError> {
        let file = match tokio::fs::File::open(self.file_path(backend, &file_ref.name)?).await {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let stream = ReaderStream::new(file).boxed();
        Ok(Some(FileHandle::new(backend, file_ref.clone(), stream)))
    }

    async fn write_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
        content: Option<FileStream>,
        opts: FileWriteOpts,
    ) -> Result<(), StoreError> {
        match content {
            Some(stream) => {
                write_stream(&self.file_path(backend, &file_ref.name)?, stream).await?;
            }
            None => {
                if !self.contains_file(backend, file_ref).await? {
                    return Err(StoreError::MissingFile(file_ref.name.clone()));
                }
            }
        }

        if let Some(visibility) = opts.visibility {
            let attrs = serde_json::to_vec(&FileAttrs { visibility })
                .map_err(shelfsync_core::DocMetaError::from)?;
            write_atomic(&self.attrs_path(backend, &file_ref.name)?, &attrs).await?;
        }

        Ok(())
    }
}

/// Names must be a single path component; anything that would escape the
/// backend directory is rejected.
fn safe_child(dir: &Path, name: &str) -> Result<PathBuf, StoreError> {
    if name.is_empty() {
        return Err(StoreError::UnsupportedFileName(name.to_string()));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) => Ok(dir.join(part)),
        _ => Err(StoreError::UnsupportedFileName(name.to_string())),
    }
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}

async fn write_atomic(target: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = partial_path(target);
    let mut file = tokio::fs::File::create(&partial).await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await?;
    tokio::fs::rename(partial, target).await?;
    Ok(())
}

async fn write_stream(target: &Path, stream: FileStream) -> Result<(), StoreError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = partial_path(target);
    if let Err(err) = copy_into(&partial, stream).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(err);
    }
    tokio::fs::rename(partial, target).await?;
    Ok(())
}

async fn copy_into(partial: &Path, mut stream: FileStream) -> Result<(), StoreError> {
    let mut file = tokio::fs::File::create(partial).await?;
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}
