use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::http::HttpTransport;
use crate::memory::MemoryTransport;
use crate::multipart::{DEFAULT_MULTIPART_THRESHOLD, DEFAULT_PART_BYTES};
use crate::transport::{Transport, TransportError};

/// Closed set of backend kinds. Unknown discriminators fail at
/// configuration-validation time, before anything is watched or connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Http,
    Memory,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown backend kind: {0}")]
    UnknownKind(String),
    #[error("backend {0:?} requires a base url")]
    MissingBaseUrl(BackendKind),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

impl FromStr for BackendKind {
    type Err = RegistryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "http" => Ok(BackendKind::Http),
            "memory" => Ok(BackendKind::Memory),
            other => Err(RegistryError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub kind: BackendKind,
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub multipart_threshold: u64,
    pub part_bytes: u64,
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::Memory,
            base_url: None,
            token: None,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            part_bytes: DEFAULT_PART_BYTES,
            checkpoint_dir: None,
        }
    }
}

/// Resolves the configured backend kind to a concrete adapter, once, at
/// startup.
pub fn build_transport(settings: &TransportSettings) -> Result<Arc<dyn Transport>, RegistryError> {
    match settings.kind {
        BackendKind::Memory => Ok(Arc::new(MemoryTransport::new())),
        BackendKind::Http => {
            let base_url = settings
                .base_url
                .as_deref()
                .ok_or(RegistryError::MissingBaseUrl(BackendKind::Http))?;
            let store = match &settings.checkpoint_dir {
                Some(dir) => CheckpointStore::new(dir.clone()),
                None => CheckpointStore::new_default()?,
            };
            let transport = HttpTransport::new(
                base_url,
                settings.token.clone(),
                store,
                settings.multipart_threshold,
                settings.part_bytes,
            )?;
            Ok(Arc::new(transport))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds() {
        assert_eq!("http".parse::<BackendKind>().unwrap(), BackendKind::Http);
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
    }

    #[test]
    fn unknown_kind_fails_fast() {
        let err = "gopher".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, RegistryError::UnknownKind(kind) if kind == "gopher"));
    }

    #[test]
    fn http_backend_requires_base_url() {
        let settings = TransportSettings {
            kind: BackendKind::Http,
            ..TransportSettings::default()
        };
        let err = match build_transport(&settings) {
            Ok(_) => panic!("expected MissingBaseUrl error"),
            Err(e) => e,
        };
        assert!(matches!(err, RegistryError::MissingBaseUrl(BackendKind::Http)));
    }

    #[test]
    fn builds_memory_backend() {
        let settings = TransportSettings::default();
        assert!(build_transport(&settings).is_ok());
    }
}
