use std::io;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::{Body, Client, StatusCode};
use serde::Deserialize;
use url::Url;

use shelfsync_core::{Backend, DocInfo, DocMetaRef, FileRef};

use crate::datastore::{Datastore, FileHandle, FileStream, FileWriteOpts, StoreError};

#[derive(Debug, Deserialize)]
struct DocRefEntry {
    fingerprint: String,
}

/// Remote object-store back end speaking a small REST surface:
/// `/v1/docs[/{fingerprint}]` for metadata and
/// `/v1/files/{backend}/{name}` for file content. File bodies stream in both
/// directions.
pub struct HttpDatastore {
    id: String,
    http: Client,
    base_url: Url,
    token: String,
}

impl HttpDatastore {
    pub fn new(
        id: impl Into<String>,
        base_url: &str,
        token: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::BaseUrl);
        }
        Ok(Self {
            id: id.into(),
            http: Client::new(),
            base_url,
            token: token.into(),
        })
    }

    fn docs_url(&self, fingerprint: Option<&str>) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| StoreError::BaseUrl)?;
            segments.pop_if_empty().extend(["v1", "docs"]);
            if let Some(fingerprint) = fingerprint {
                segments.push(fingerprint);
            }
        }
        Ok(url)
    }

    fn file_url(&self, backend: Backend, name: &str) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::BaseUrl)?
            .pop_if_empty()
            .extend(["v1", "files", backend.as_str(), name]);
        Ok(url)
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn api_error(response: reqwest::Response) -> StoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        StoreError::Api { status, body }
    }
}

#[async_trait]
impl Datastore for HttpDatastore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_doc_meta_refs(&self) -> Result<Vec<DocMetaRef>, StoreError> {
        let response = self
            .http
            .get(self.docs_url(None)?)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let entries: Vec<DocRefEntry> = response.json().await?;
        Ok(entries
            .into_iter()
            .map(|entry| DocMetaRef::new(entry.fingerprint))
            .collect())
    }

    async fn get_doc_meta(&self, fingerprint: &str) -> Result<Option<String>, StoreError> {
        let response = self
            .http
            .get(self.docs_url(Some(fingerprint))?)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.text().await?)),
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn write(
        &self,
        fingerprint: &str,
        data: String,
        doc_info: &DocInfo,
    ) -> Result<(), StoreError> {
        let mut url = self.docs_url(Some(fingerprint))?;
        url.query_pairs_mut()
            .append_pair("uuid", doc_info.uuid.as_str());
        let response = self
            .http
            .put(url)
            .header("Authorization", self.auth_header_value())
            .header("Content-Type", "application/json")
            .body(data)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(())
    }

    async fn contains_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<bool, StoreError> {
        let response = self
            .http
            .head(self.file_url(backend, &file_ref.name)?)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn get_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<Option<FileHandle>, StoreError> {
        let response = self
            .http
            .get(self.file_url(backend, &file_ref.name)?)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let stream = response.bytes_stream().map_err(io::Error::other).boxed();
                Ok(Some(FileHandle::new(backend, file_ref.clone(), stream)))
            }
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn write_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
        content: Option<FileStream>,
        opts: FileWriteOpts,
    ) -> Result<(), StoreError> {
        let mut url = self.file_url(backend, &file_ref.name)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(visibility) = opts.visibility {
                query.append_pair("visibility", visibility.as_str());
            }
            if opts.update_meta {
                query.append_pair("update_meta", "true");
            }
        }

        let mut request = self
            .http
            .put(url)
            .header("Authorization", self.auth_header_value());
        if let Some(stream) = content {
            request = request.body(Body::wrap_stream(stream));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(())
    }
}
