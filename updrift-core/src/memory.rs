use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::checkpoint::PartRecord;
use crate::multipart::MultipartBackend;
use crate::transport::{ErrorKind, RemoteEntry, Transport, TransportError};

/// In-memory transport with hierarchical directory semantics. Backs the
/// contract tests and dry runs; also exercises the non-flat side of the
/// capability contract that the HTTP gateway adapter cannot.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
    reject_auth: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    sessions: HashMap<String, HashMap<u32, Vec<u8>>>,
    next_session: u64,
    closed: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variant whose `connect` always fails, for startup-failure tests.
    pub fn rejecting_auth() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            reject_auth: true,
        }
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn dir_exists(&self, key: &str) -> bool {
        self.lock().dirs.contains(key)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.reject_auth {
            return Err(TransportError::new(ErrorKind::Auth, "credentials rejected"));
        }
        Ok(())
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let payload = tokio::fs::read(local).await?;
        self.upload_bytes(payload, remote).await
    }

    async fn upload_bytes(&self, payload: Vec<u8>, remote: &str) -> Result<(), TransportError> {
        self.lock().objects.insert(remote.to_string(), payload);
        Ok(())
    }

    async fn delete(&self, remote: &str) -> Result<(), TransportError> {
        match self.lock().objects.remove(remote) {
            Some(_) => Ok(()),
            None => Err(TransportError::new(
                ErrorKind::NotFound,
                format!("{remote} does not exist"),
            )),
        }
    }

    async fn make_dir(&self, remote: &str, recursive: bool) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.dirs.contains(remote) {
            return Err(TransportError::new(
                ErrorKind::AlreadyExists,
                format!("{remote} already exists"),
            ));
        }
        if recursive {
            let mut prefix = String::new();
            for segment in remote.split('/').filter(|segment| !segment.is_empty()) {
                prefix.push('/');
                prefix.push_str(segment);
                state.dirs.insert(prefix.clone());
            }
        } else {
            state.dirs.insert(remote.to_string());
        }
        Ok(())
    }

    async fn remove_dir(&self, remote: &str, recursive: bool) -> Result<(), TransportError> {
        let mut state = self.lock();
        let child_prefix = format!("{}/", remote.trim_end_matches('/'));
        let occupied = state.objects.keys().any(|key| key.starts_with(&child_prefix))
            || state
                .dirs
                .iter()
                .any(|dir| dir.starts_with(&child_prefix));
        if occupied && !recursive {
            return Err(TransportError::new(
                ErrorKind::Transfer,
                format!("{remote} is not empty"),
            ));
        }
        if recursive {
            state.objects.retain(|key, _| !key.starts_with(&child_prefix));
            state.dirs.retain(|dir| !dir.starts_with(&child_prefix));
        }
        state.dirs.remove(remote);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Vec<RemoteEntry> {
        self.lock()
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, payload)| RemoteEntry {
                name: key.clone(),
                size: payload.len() as u64,
            })
            .collect()
    }

    async fn close(&self) {
        self.lock().closed = true;
    }
}

#[async_trait]
impl MultipartBackend for MemoryTransport {
    async fn create_session(&self, _remote: &str) -> Result<String, TransportError> {
        let mut state = self.lock();
        state.next_session += 1;
        let upload_id = format!("mem-session-{}", state.next_session);
        state.sessions.insert(upload_id.clone(), HashMap::new());
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _remote: &str,
        upload_id: &str,
        part_index: u32,
        payload: Vec<u8>,
    ) -> Result<String, TransportError> {
        let mut state = self.lock();
        let session = state.sessions.get_mut(upload_id).ok_or_else(|| {
            TransportError::new(ErrorKind::NotFound, format!("unknown session {upload_id}"))
        })?;
        session.insert(part_index, payload);
        Ok(format!("{upload_id}-{part_index}"))
    }

    async fn complete(
        &self,
        remote: &str,
        upload_id: &str,
        parts: &[PartRecord],
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        let session = state.sessions.remove(upload_id).ok_or_else(|| {
            TransportError::new(ErrorKind::NotFound, format!("unknown session {upload_id}"))
        })?;
        let mut assembled = Vec::new();
        for part in parts {
            let payload = session.get(&part.part_index).ok_or_else(|| {
                TransportError::new(
                    ErrorKind::Transfer,
                    format!("session {upload_id} is missing part {}", part.part_index),
                )
            })?;
            assembled.extend_from_slice(payload);
        }
        state.objects.insert(remote.to_string(), assembled);
        Ok(())
    }
}
