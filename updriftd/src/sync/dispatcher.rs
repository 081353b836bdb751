use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{OnceCell, Semaphore, mpsc};
use tokio::task::JoinHandle;
use updrift_core::{ErrorKind, Transport, TransportError, paths};

use super::coalescer::{PendingAction, WorkItem};
use super::stats::RunStatistics;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub remote_root: String,
    pub watch_root: PathBuf,
    pub concurrency: usize,
    pub max_file_bytes: Option<u64>,
    pub delete_remote: bool,
    pub strict: bool,
}

/// Raised over the fatal channel when strict mode catches a remote path
/// escaping the configured root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrictViolation {
    pub local_path: PathBuf,
    pub remote_path: String,
}

/// Drains flushed batches into a bounded pool of workers. The semaphore
/// permit released by a completing worker is what admits the next queued
/// item, so saturation is maintained without a polling loop.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    connected: OnceCell<()>,
    limit: Arc<Semaphore>,
    config: DispatcherConfig,
    stats: Arc<RunStatistics>,
    fatal_tx: mpsc::UnboundedSender<StrictViolation>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: DispatcherConfig,
        stats: Arc<RunStatistics>,
        fatal_tx: mpsc::UnboundedSender<StrictViolation>,
    ) -> Self {
        let limit = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            transport,
            connected: OnceCell::new(),
            limit,
            config,
            stats,
            fatal_tx,
        }
    }

    /// Lazily establishes the one shared connection. Concurrent callers
    /// during establishment all await the same in-flight connect.
    pub async fn ensure_connected(&self) -> Result<(), TransportError> {
        self.connected
            .get_or_try_init(|| async { self.transport.connect().await })
            .await?;
        Ok(())
    }

    /// Feeds a flushed batch into the pool, FIFO. The returned handle
    /// resolves once every item of this batch has completed.
    pub fn spawn_batch(self: &Arc<Self>, batch: Vec<WorkItem>) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut workers = Vec::with_capacity(batch.len());
            for item in batch {
                let permit = match dispatcher.limit.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let dispatcher = Arc::clone(&dispatcher);
                workers.push(tokio::spawn(async move {
                    dispatcher.execute(item).await;
                    drop(permit);
                }));
            }
            for worker in workers {
                let _ = worker.await;
            }
        })
    }

    /// Worker boundary: every failure is converted into a counter increment
    /// plus a log line and never aborts sibling items.
    async fn execute(&self, item: WorkItem) {
        if let Err(err) = self.run_item(&item).await {
            self.stats.record_error();
            eprintln!(
                "[updriftd] {} failed for {}: {err}",
                verb(item.action),
                item.local_path.display()
            );
        }
    }

    async fn run_item(&self, item: &WorkItem) -> Result<(), TransportError> {
        let Some(remote) = paths::remote_path_for(
            &self.config.remote_root,
            &item.local_path,
            &self.config.watch_root,
        ) else {
            self.flag_unsafe(item, "<outside watch root>");
            return Ok(());
        };
        if !paths::is_within_root(&self.config.remote_root, &remote) {
            self.flag_unsafe(item, &remote);
            return Ok(());
        }

        match item.action {
            PendingAction::Upload => {
                // Size is re-read at dispatch time: the file may have grown
                // or shrunk during the debounce window.
                if let Some(limit) = self.config.max_file_bytes {
                    match tokio::fs::metadata(&item.local_path).await {
                        Ok(meta) if meta.len() > limit => {
                            self.stats.record_skipped_large();
                            eprintln!(
                                "[updriftd] skipped oversized file {} ({} bytes)",
                                item.local_path.display(),
                                meta.len()
                            );
                            return Ok(());
                        }
                        Ok(_) => {}
                        Err(_) => {
                            eprintln!(
                                "[updriftd] skipped vanished file {}",
                                item.local_path.display()
                            );
                            return Ok(());
                        }
                    }
                }
                self.ensure_connected().await?;
                if let Some(parent) = paths::parent_dir(&remote)
                    && paths::is_within_root(&self.config.remote_root, parent)
                {
                    if let Err(err) = self.transport.make_dir(parent, true).await
                        && err.kind != ErrorKind::AlreadyExists
                    {
                        eprintln!("[updriftd] parent directory for {remote} not created: {err}");
                    }
                }
                self.transport.upload_file(&item.local_path, &remote).await?;
                self.stats.record_upload();
                eprintln!(
                    "[updriftd] uploaded {} -> {remote}",
                    item.local_path.display()
                );
            }
            PendingAction::Delete => {
                if !self.config.delete_remote {
                    eprintln!("[updriftd] remote deletes disabled, skipping {remote}");
                    return Ok(());
                }
                self.ensure_connected().await?;
                match self.transport.delete(&remote).await {
                    Ok(()) => {}
                    Err(err) if err.kind == ErrorKind::NotFound => {}
                    Err(err) => return Err(err),
                }
                self.stats.record_delete();
                eprintln!("[updriftd] deleted {remote}");
            }
            PendingAction::MakeDir => {
                self.ensure_connected().await?;
                match self.transport.make_dir(&remote, true).await {
                    Ok(()) => {}
                    Err(err) if err.kind == ErrorKind::AlreadyExists => {}
                    Err(err) => return Err(err),
                }
                self.stats.record_dir_created();
                eprintln!("[updriftd] created directory {remote}");
            }
            PendingAction::RemoveDir => {
                self.ensure_connected().await?;
                match self.transport.remove_dir(&remote, true).await {
                    Ok(()) => {
                        self.stats.record_dir_removed();
                        eprintln!("[updriftd] removed directory {remote}");
                    }
                    Err(err) => {
                        eprintln!("[updriftd] directory {remote} not removed: {err}");
                    }
                }
            }
        }
        Ok(())
    }

    fn flag_unsafe(&self, item: &WorkItem, remote: &str) {
        self.stats.record_safety_violation();
        eprintln!(
            "[updriftd] refusing {} outside remote root {}: {remote}",
            verb(item.action),
            self.config.remote_root
        );
        // Only delete and rmdir take the strict-mode fatal path.
        if self.config.strict
            && matches!(
                item.action,
                PendingAction::Delete | PendingAction::RemoveDir
            )
        {
            let _ = self.fatal_tx.send(StrictViolation {
                local_path: item.local_path.clone(),
                remote_path: remote.to_string(),
            });
        }
    }
}

fn verb(action: PendingAction) -> &'static str {
    match action {
        PendingAction::Upload => "upload",
        PendingAction::Delete => "delete",
        PendingAction::MakeDir => "mkdir",
        PendingAction::RemoveDir => "rmdir",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;
    use updrift_core::{MemoryTransport, RemoteEntry};

    /// Counts transport calls and tracks the peak number of concurrent
    /// uploads, delegating to an in-memory store.
    #[derive(Default)]
    struct GaugeTransport {
        inner: MemoryTransport,
        calls: AtomicUsize,
        connects: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        fail_uploads_containing: Option<&'static str>,
    }

    #[async_trait]
    impl Transport for GaugeTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.inner.connect().await
        }

        async fn upload_file(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let result = if let Some(marker) = self.fail_uploads_containing
                && remote.contains(marker)
            {
                Err(TransportError::new(ErrorKind::Network, "injected failure"))
            } else {
                self.inner.upload_file(local, remote).await
            };
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn upload_bytes(&self, payload: Vec<u8>, remote: &str) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.upload_bytes(payload, remote).await
        }

        async fn delete(&self, remote: &str) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.delete(remote).await
        }

        async fn make_dir(&self, remote: &str, recursive: bool) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.make_dir(remote, recursive).await
        }

        async fn remove_dir(&self, remote: &str, recursive: bool) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.remove_dir(remote, recursive).await
        }

        async fn list(&self, prefix: &str) -> Vec<RemoteEntry> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.list(prefix).await
        }

        async fn close(&self) {
            self.inner.close().await;
        }
    }

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        transport: Arc<GaugeTransport>,
        stats: Arc<RunStatistics>,
        fatal_rx: mpsc::UnboundedReceiver<StrictViolation>,
        _watch: tempfile::TempDir,
    }

    fn harness(configure: impl FnOnce(&mut DispatcherConfig)) -> Harness {
        harness_with(GaugeTransport::default(), configure)
    }

    fn harness_with(
        transport: GaugeTransport,
        configure: impl FnOnce(&mut DispatcherConfig),
    ) -> Harness {
        let watch = tempdir().unwrap();
        let mut config = DispatcherConfig {
            remote_root: "/var/www/app".to_string(),
            watch_root: watch.path().to_path_buf(),
            concurrency: 2,
            max_file_bytes: None,
            delete_remote: true,
            strict: false,
        };
        configure(&mut config);
        let transport = Arc::new(transport);
        let stats = Arc::new(RunStatistics::default());
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            config,
            Arc::clone(&stats),
            fatal_tx,
        ));
        Harness {
            dispatcher,
            transport,
            stats,
            fatal_rx,
            _watch: watch,
        }
    }

    fn upload_item(harness: &Harness, name: &str, contents: &[u8]) -> WorkItem {
        let path = harness._watch.path().join(name);
        std::fs::write(&path, contents).unwrap();
        WorkItem {
            local_path: path,
            action: PendingAction::Upload,
        }
    }

    #[tokio::test]
    async fn never_exceeds_configured_concurrency() {
        let h = harness(|config| config.concurrency = 2);
        let batch: Vec<WorkItem> = (0..5)
            .map(|i| upload_item(&h, &format!("f{i}.txt"), b"data"))
            .collect();

        h.dispatcher.spawn_batch(batch).await.unwrap();

        assert!(h.transport.max_active.load(Ordering::SeqCst) <= 2);
        assert_eq!(h.stats.snapshot().uploaded, 5);
        assert_eq!(h.transport.inner.object_count(), 5);
    }

    #[tokio::test]
    async fn empty_batch_starts_no_workers() {
        let h = harness(|_| {});
        h.dispatcher.spawn_batch(Vec::new()).await.unwrap();
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn delete_of_missing_remote_counts_as_success() {
        let h = harness(|_| {});
        let item = WorkItem {
            local_path: h._watch.path().join("gone.txt"),
            action: PendingAction::Delete,
        };
        h.dispatcher.spawn_batch(vec![item]).await.unwrap();

        let snapshot = h.stats.snapshot();
        assert_eq!(snapshot.deleted, 1);
        assert_eq!(snapshot.errors, 0);
    }

    #[tokio::test]
    async fn disabled_remote_deletes_make_no_transport_call() {
        let h = harness(|config| config.delete_remote = false);
        let item = WorkItem {
            local_path: h._watch.path().join("a.txt"),
            action: PendingAction::Delete,
        };
        h.dispatcher.spawn_batch(vec![item]).await.unwrap();

        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
        let snapshot = h.stats.snapshot();
        assert_eq!(snapshot.deleted, 0);
        assert_eq!(snapshot.errors, 0);
    }

    #[tokio::test]
    async fn oversized_upload_is_skipped_without_transport_call() {
        let h = harness(|config| config.max_file_bytes = Some(4));
        let item = upload_item(&h, "big.txt", b"0123456789");
        h.dispatcher.spawn_batch(vec![item]).await.unwrap();

        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
        let snapshot = h.stats.snapshot();
        assert_eq!(snapshot.skipped_large, 1);
        assert_eq!(snapshot.uploaded, 0);
    }

    #[tokio::test]
    async fn strict_delete_violation_requests_termination() {
        let mut h = harness(|config| config.strict = true);
        let item = WorkItem {
            local_path: h._watch.path().join("a/../../evil.txt"),
            action: PendingAction::Delete,
        };
        h.dispatcher.spawn_batch(vec![item]).await.unwrap();

        assert_eq!(h.stats.snapshot().safety_violations, 1);
        assert_eq!(h.stats.snapshot().deleted, 0);
        assert!(h.fatal_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn upload_violation_is_skipped_but_never_fatal() {
        let mut h = harness(|config| config.strict = true);
        let item = WorkItem {
            local_path: h._watch.path().join("a/../../evil.txt"),
            action: PendingAction::Upload,
        };
        h.dispatcher.spawn_batch(vec![item]).await.unwrap();

        assert_eq!(h.stats.snapshot().safety_violations, 1);
        assert!(h.fatal_rx.try_recv().is_err());
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_failing_item_never_aborts_siblings() {
        let transport = GaugeTransport {
            fail_uploads_containing: Some("boom"),
            ..GaugeTransport::default()
        };
        let h = harness_with(transport, |_| {});
        let batch = vec![
            upload_item(&h, "ok.txt", b"fine"),
            upload_item(&h, "boom.txt", b"bad"),
        ];
        h.dispatcher.spawn_batch(batch).await.unwrap();

        let snapshot = h.stats.snapshot();
        assert_eq!(snapshot.uploaded, 1);
        assert_eq!(snapshot.errors, 1);
    }

    #[tokio::test]
    async fn upload_ensures_parent_directory_first() {
        let h = harness(|_| {});
        std::fs::create_dir_all(h._watch.path().join("a/b")).unwrap();
        let path = h._watch.path().join("a/b/c.txt");
        std::fs::write(&path, b"x").unwrap();
        let item = WorkItem {
            local_path: path,
            action: PendingAction::Upload,
        };
        h.dispatcher.spawn_batch(vec![item]).await.unwrap();

        assert!(h.transport.inner.dir_exists("/var/www/app/a/b"));
        assert!(h.transport.inner.object("/var/www/app/a/b/c.txt").is_some());
    }

    #[tokio::test]
    async fn connect_happens_once_across_items() {
        let h = harness(|_| {});
        let batch: Vec<WorkItem> = (0..4)
            .map(|i| upload_item(&h, &format!("f{i}.txt"), b"data"))
            .collect();
        h.dispatcher.spawn_batch(batch).await.unwrap();

        assert_eq!(h.transport.connects.load(Ordering::SeqCst), 1);
        assert_eq!(h.stats.snapshot().uploaded, 4);
    }
}
