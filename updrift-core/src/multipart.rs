use std::io::SeekFrom;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::checkpoint::{CheckpointError, CheckpointStore, PartRecord, UploadCheckpoint};
use crate::transport::{ErrorKind, TransportError};

pub const DEFAULT_PART_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum MultipartError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MultipartError> for TransportError {
    fn from(err: MultipartError) -> Self {
        match err {
            MultipartError::Transport(inner) => inner,
            MultipartError::Io(inner) => inner.into(),
            MultipartError::Checkpoint(inner) => TransportError::new(
                ErrorKind::Other,
                format!("checkpoint persistence failed: {inner}"),
            ),
        }
    }
}

/// Multipart session primitives an adapter exposes when its backend supports
/// chunked uploads. Part indices are 1-based; the returned part tag is an
/// opaque integrity token the backend wants echoed back at completion.
#[async_trait]
pub trait MultipartBackend: Send + Sync {
    async fn create_session(&self, remote: &str) -> Result<String, TransportError>;

    async fn upload_part(
        &self,
        remote: &str,
        upload_id: &str,
        part_index: u32,
        payload: Vec<u8>,
    ) -> Result<String, TransportError>;

    async fn complete(
        &self,
        remote: &str,
        upload_id: &str,
        parts: &[PartRecord],
    ) -> Result<(), TransportError>;
}

/// Drives a resumable chunked upload against any [`MultipartBackend`].
///
/// The checkpoint is persisted before the first part is sent and again after
/// every successful part, before the next one begins, so a crash loses at
/// most one in-flight part. Resuming skips every part index already
/// recorded. There is no automatic abort on failure: partial state is kept
/// so the upload can resume, and a checkpoint whose session the backend no
/// longer recognizes surfaces the backend's error unchanged.
pub struct ChunkedUploader {
    store: CheckpointStore,
    part_bytes: u64,
}

impl ChunkedUploader {
    pub fn new(store: CheckpointStore, part_bytes: u64) -> Self {
        Self {
            store,
            part_bytes: part_bytes.max(1),
        }
    }

    pub async fn upload<B>(
        &self,
        backend: &B,
        local: &Path,
        remote: &str,
    ) -> Result<(), MultipartError>
    where
        B: MultipartBackend + ?Sized,
    {
        let size = tokio::fs::metadata(local).await?.len();
        let part_count = size.div_ceil(self.part_bytes).max(1) as u32;

        let mut checkpoint = match self.store.load(remote).await {
            Some(existing) => existing,
            None => {
                let upload_id = backend.create_session(remote).await?;
                let fresh = UploadCheckpoint::new(upload_id);
                self.store.save(remote, &fresh).await?;
                fresh
            }
        };

        let mut file = tokio::fs::File::open(local).await?;
        for part_index in 1..=part_count {
            if checkpoint.has_part(part_index) {
                continue;
            }
            let offset = u64::from(part_index - 1) * self.part_bytes;
            let len = (size - offset).min(self.part_bytes) as usize;
            file.seek(SeekFrom::Start(offset)).await?;
            let mut payload = vec![0u8; len];
            file.read_exact(&mut payload).await?;

            let part_tag = backend
                .upload_part(remote, &checkpoint.upload_id, part_index, payload)
                .await?;
            checkpoint.record_part(part_index, part_tag);
            self.store.save(remote, &checkpoint).await?;
        }

        let parts = checkpoint.sorted_parts();
        backend.complete(remote, &checkpoint.upload_id, &parts).await?;
        self.store.remove(remote).await?;
        Ok(())
    }
}
