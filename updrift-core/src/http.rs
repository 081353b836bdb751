use std::path::Path;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use url::Url;

use crate::checkpoint::{CheckpointStore, PartRecord};
use crate::multipart::{ChunkedUploader, MultipartBackend};
use crate::transport::{ErrorKind, RemoteEntry, Transport, TransportError};

/// Adapter for an HTTP object-storage gateway: flat keys under `/o/`,
/// multipart sessions under `/mpu/`. Directories do not exist on the remote,
/// so both directory operations are no-ops.
pub struct HttpTransport {
    http: Client,
    base_url: Url,
    token: Option<String>,
    multipart_threshold: u64,
    uploader: ChunkedUploader,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        store: CheckpointStore,
        multipart_threshold: u64,
        part_bytes: u64,
    ) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| TransportError::new(ErrorKind::Other, format!("invalid base url: {err}")))?;
        Ok(Self {
            http: Client::new(),
            base_url,
            token,
            multipart_threshold,
            uploader: ChunkedUploader::new(store, part_bytes),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn object_url(&self, key: &str) -> Result<Url, TransportError> {
        self.url_under("o", key, &[])
    }

    fn mpu_url(&self, key: &str, trailing: &[&str]) -> Result<Url, TransportError> {
        self.url_under("mpu", key, trailing)
    }

    fn url_under(&self, route: &str, key: &str, trailing: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                TransportError::new(ErrorKind::Other, "base url cannot carry path segments")
            })?;
            segments.push(route);
            for part in key.split('/').filter(|part| !part.is_empty()) {
                segments.push(part);
            }
            for part in trailing {
                segments.push(part);
            }
        }
        Ok(url)
    }

    async fn fetch_list(&self, prefix: &str) -> Result<Vec<RemoteEntry>, TransportError> {
        let mut url = self.url_under("o", "", &[])?;
        url.query_pairs_mut().append_pair("prefix", prefix);
        let response = self.authorize(self.http.get(url)).send().await?;
        let payload: ListResponse = expect_success(response).await?.json().await?;
        Ok(payload.items)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.fetch_list("").await?;
        Ok(())
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let size = tokio::fs::metadata(local).await?.len();
        if self.multipart_threshold > 0 && size > self.multipart_threshold {
            return self
                .uploader
                .upload(self, local, remote)
                .await
                .map_err(TransportError::from);
        }
        let url = self.object_url(remote)?;
        let file = tokio::fs::File::open(local).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let response = self.authorize(self.http.put(url)).body(body).send().await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn upload_bytes(&self, payload: Vec<u8>, remote: &str) -> Result<(), TransportError> {
        let url = self.object_url(remote)?;
        let response = self
            .authorize(self.http.put(url))
            .body(payload)
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn delete(&self, remote: &str) -> Result<(), TransportError> {
        let url = self.object_url(remote)?;
        let response = self.authorize(self.http.delete(url)).send().await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn make_dir(&self, _remote: &str, _recursive: bool) -> Result<(), TransportError> {
        // Flat object store: directories do not exist remotely.
        Ok(())
    }

    async fn remove_dir(&self, _remote: &str, _recursive: bool) -> Result<(), TransportError> {
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Vec<RemoteEntry> {
        self.fetch_list(prefix).await.unwrap_or_default()
    }

    async fn close(&self) {
        // Stateless per-request client; nothing to tear down.
    }
}

#[async_trait]
impl MultipartBackend for HttpTransport {
    async fn create_session(&self, remote: &str) -> Result<String, TransportError> {
        let url = self.mpu_url(remote, &[])?;
        let response = self.authorize(self.http.post(url)).send().await?;
        let payload: CreateSessionResponse = expect_success(response).await?.json().await?;
        Ok(payload.upload_id)
    }

    async fn upload_part(
        &self,
        remote: &str,
        upload_id: &str,
        part_index: u32,
        payload: Vec<u8>,
    ) -> Result<String, TransportError> {
        let part_segment = part_index.to_string();
        let mut url = self.mpu_url(remote, &[part_segment.as_str()])?;
        url.query_pairs_mut().append_pair("upload_id", upload_id);
        let response = self
            .authorize(self.http.put(url))
            .body(payload)
            .send()
            .await?;
        let payload: PartResponse = expect_success(response).await?.json().await?;
        Ok(payload.part_tag)
    }

    async fn complete(
        &self,
        remote: &str,
        upload_id: &str,
        parts: &[PartRecord],
    ) -> Result<(), TransportError> {
        let mut url = self.mpu_url(remote, &["complete"])?;
        url.query_pairs_mut().append_pair("upload_id", upload_id);
        let response = self
            .authorize(self.http.post(url))
            .json(&CompleteRequest { parts })
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_connect() || err.is_timeout() {
            ErrorKind::Network
        } else {
            ErrorKind::Transfer
        };
        TransportError::new(kind, format!("request failed: {err}"))
    }
}

async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::new(
        classify_status(status),
        format!("gateway returned {status}: {body}"),
    ))
}

fn classify_status(status: StatusCode) -> ErrorKind {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ErrorKind::Auth
    } else if status == StatusCode::NOT_FOUND {
        ErrorKind::NotFound
    } else if status == StatusCode::CONFLICT {
        ErrorKind::AlreadyExists
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
        )
    {
        ErrorKind::Network
    } else {
        ErrorKind::Transfer
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    items: Vec<RemoteEntry>,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    upload_id: String,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    part_tag: String,
}

#[derive(Debug, Serialize)]
struct CompleteRequest<'a> {
    parts: &'a [PartRecord],
}
