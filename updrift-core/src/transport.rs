use std::io;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    NotFound,
    AlreadyExists,
    Network,
    Transfer,
    Other,
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::new(ErrorKind::Transfer, format!("I/O error: {err}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    pub size: u64,
}

/// Backend-agnostic operation set every remote storage adapter provides.
///
/// Heterogeneous backends (hierarchical stores vs. flat object stores) are
/// normalized behind this one capability set so callers never branch on
/// backend type; only adapters do.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish or validate the session. `ErrorKind::Auth` here is fatal at
    /// startup but only counted mid-run.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Whole-file transfer. Adapters may switch to the chunked protocol for
    /// payloads above their multipart threshold.
    async fn upload_file(&self, local: &Path, remote: &str) -> Result<(), TransportError>;

    /// Transfer from an in-memory buffer rather than a path on disk.
    async fn upload_bytes(&self, payload: Vec<u8>, remote: &str) -> Result<(), TransportError>;

    /// `ErrorKind::NotFound` is treated as success by callers.
    async fn delete(&self, remote: &str) -> Result<(), TransportError>;

    /// Must be a no-op returning success for backends with no directory
    /// concept.
    async fn make_dir(&self, remote: &str, recursive: bool) -> Result<(), TransportError>;

    /// Best-effort; callers swallow non-empty-directory failures.
    async fn remove_dir(&self, remote: &str, recursive: bool) -> Result<(), TransportError>;

    /// Entries under a prefix or directory; empty on error.
    async fn list(&self, prefix: &str) -> Vec<RemoteEntry>;

    /// Idempotent, never fails.
    async fn close(&self);
}
