use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("XDG data directory is unavailable")]
    MissingDataDir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    pub part_index: u32,
    pub part_tag: String,
}

/// Persisted progress of one in-flight chunked upload. The checkpoint is the
/// single source of truth for which parts are already durably stored on the
/// remote; it is written before the next part begins and deleted only after
/// the backend confirms assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCheckpoint {
    pub upload_id: String,
    pub parts: Vec<PartRecord>,
}

impl UploadCheckpoint {
    pub fn new(upload_id: impl Into<String>) -> Self {
        Self {
            upload_id: upload_id.into(),
            parts: Vec::new(),
        }
    }

    pub fn has_part(&self, part_index: u32) -> bool {
        self.parts.iter().any(|part| part.part_index == part_index)
    }

    pub fn record_part(&mut self, part_index: u32, part_tag: impl Into<String>) {
        let part_tag = part_tag.into();
        if let Some(existing) = self
            .parts
            .iter_mut()
            .find(|part| part.part_index == part_index)
        {
            existing.part_tag = part_tag;
        } else {
            self.parts.push(PartRecord {
                part_index,
                part_tag,
            });
        }
    }

    pub fn sorted_parts(&self) -> Vec<PartRecord> {
        let mut parts = self.parts.clone();
        parts.sort_by_key(|part| part.part_index);
        parts
    }
}

/// One JSON record per in-progress upload, keyed by a filesystem-safe
/// encoding of the remote object key.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn new_default() -> Result<Self, CheckpointError> {
        let base = dirs::data_dir().ok_or(CheckpointError::MissingDataDir)?;
        Ok(Self::new(base.join("updrift").join("checkpoints")))
    }

    pub fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(file_name_for(key))
    }

    /// A missing or unreadable or corrupt record means the upload is
    /// uninitiated.
    pub async fn load(&self, key: &str) -> Option<UploadCheckpoint> {
        let bytes = tokio::fs::read(self.record_path(key)).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Durable write: the record is flushed to a temporary file, synced, then
    /// renamed over the final path.
    pub async fn save(&self, key: &str, checkpoint: &UploadCheckpoint) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.record_path(key);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(checkpoint)?;
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&payload).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), CheckpointError> {
        match tokio::fs::remove_file(self.record_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn file_name_for(key: &str) -> String {
    let digest = md5::compute(key.as_bytes());
    let safe: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(48)
        .collect();
    format!("{safe}-{digest:x}.json")
}
