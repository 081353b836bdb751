use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use updrift_core::{
    BackendKind, DEFAULT_MULTIPART_THRESHOLD, DEFAULT_PART_BYTES, Transport, TransportSettings,
    build_transport,
};

use crate::sync::coalescer::Coalescer;
use crate::sync::dispatcher::{Dispatcher, DispatcherConfig, StrictViolation};
use crate::sync::filter::IgnoreFilter;
use crate::sync::stats::RunStatistics;
use crate::sync::watcher::start_notify_watcher;

const DEFAULT_REMOTE_ROOT: &str = "/";
const DEFAULT_DEBOUNCE_MS: u64 = 500;
const DEFAULT_CONCURRENCY: u64 = 2;

pub const EXIT_STRICT_VIOLATION: u8 = 2;
pub const EXIT_STARTUP_FAILURE: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Clean,
    StrictViolation,
}

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub watch_root: PathBuf,
    pub remote_root: String,
    pub backend: BackendKind,
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub debounce: Duration,
    pub concurrency: usize,
    pub max_file_bytes: Option<u64>,
    pub multipart_threshold: u64,
    pub part_bytes: u64,
    pub strict: bool,
    pub delete_remote: bool,
    pub ignore_patterns: Vec<String>,
    pub checkpoint_dir: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let watch_root = std::env::var("UPDRIFT_WATCH_DIR")
            .context("UPDRIFT_WATCH_DIR is not set")
            .map(|value| expand_with_home(&value, &home))?;
        let remote_root = std::env::var("UPDRIFT_REMOTE_ROOT")
            .unwrap_or_else(|_| DEFAULT_REMOTE_ROOT.to_string());
        let backend: BackendKind = std::env::var("UPDRIFT_BACKEND")
            .unwrap_or_else(|_| "http".to_string())
            .parse()?;
        let base_url = std::env::var("UPDRIFT_BASE_URL").ok();
        let token = std::env::var("UPDRIFT_TOKEN").ok();
        let debounce =
            Duration::from_millis(read_u64_env("UPDRIFT_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS));
        let concurrency = read_u64_env("UPDRIFT_CONCURRENCY", DEFAULT_CONCURRENCY) as usize;
        let max_file_bytes = std::env::var("UPDRIFT_MAX_FILE_BYTES")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0);
        let multipart_threshold = read_u64_env(
            "UPDRIFT_MULTIPART_THRESHOLD_BYTES",
            DEFAULT_MULTIPART_THRESHOLD,
        );
        let part_bytes = read_u64_env("UPDRIFT_PART_BYTES", DEFAULT_PART_BYTES);
        let strict = read_bool_env("UPDRIFT_STRICT", false);
        let delete_remote = read_bool_env("UPDRIFT_DELETE_REMOTE", true);
        let ignore_patterns = parse_patterns(std::env::var("UPDRIFT_IGNORE").ok().as_deref());
        let checkpoint_dir = std::env::var("UPDRIFT_CHECKPOINT_DIR")
            .ok()
            .map(|value| expand_with_home(&value, &home));

        Ok(Self {
            watch_root,
            remote_root,
            backend,
            base_url,
            token,
            debounce,
            concurrency,
            max_file_bytes,
            multipart_threshold,
            part_bytes,
            strict,
            delete_remote,
            ignore_patterns,
            checkpoint_dir,
        })
    }
}

pub struct DaemonRuntime {
    config: DaemonConfig,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<RunStatistics>,
    fatal_rx: mpsc::UnboundedReceiver<StrictViolation>,
}

impl DaemonRuntime {
    pub async fn bootstrap(config: DaemonConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.watch_root)
            .await
            .with_context(|| format!("failed to create watch root at {:?}", config.watch_root))?;

        let settings = TransportSettings {
            kind: config.backend,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            multipart_threshold: config.multipart_threshold,
            part_bytes: config.part_bytes,
            checkpoint_dir: config.checkpoint_dir.clone(),
        };
        let transport = build_transport(&settings).context("failed to build transport backend")?;

        let stats = Arc::new(RunStatistics::default());
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&transport),
            DispatcherConfig {
                remote_root: config.remote_root.clone(),
                watch_root: config.watch_root.clone(),
                concurrency: config.concurrency,
                max_file_bytes: config.max_file_bytes,
                delete_remote: config.delete_remote,
                strict: config.strict,
            },
            Arc::clone(&stats),
            fatal_tx,
        ));
        dispatcher
            .ensure_connected()
            .await
            .context("failed to connect to remote backend")?;

        Ok(Self {
            config,
            transport,
            dispatcher,
            stats,
            fatal_rx,
        })
    }

    pub async fn run(mut self) -> anyhow::Result<RunOutcome> {
        eprintln!(
            "[updriftd] started: watch_root={}, remote_root={}, backend={:?}, concurrency={}, strict={}",
            self.config.watch_root.display(),
            self.config.remote_root,
            self.config.backend,
            self.config.concurrency.max(1),
            self.config.strict,
        );

        let (watcher, mut event_rx) = start_notify_watcher(&self.config.watch_root)
            .context("failed to start filesystem watcher")?;
        let filter = IgnoreFilter::new(&self.config.ignore_patterns);

        let mut coalescer = Coalescer::default();
        let mut sleeper: Option<Pin<Box<Sleep>>> = None;
        let mut batches: Vec<JoinHandle<()>> = Vec::new();
        let mut outcome = RunOutcome::Clean;

        loop {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    res.context("failed waiting for shutdown signal")?;
                    eprintln!("[updriftd] shutdown requested");
                    break;
                }
                Some(violation) = self.fatal_rx.recv() => {
                    eprintln!(
                        "[updriftd] strict safety violation: {} resolves to {} outside {}",
                        violation.local_path.display(),
                        violation.remote_path,
                        self.config.remote_root,
                    );
                    outcome = RunOutcome::StrictViolation;
                    break;
                }
                maybe_event = event_rx.recv() => {
                    let Some(event) = maybe_event else {
                        eprintln!("[updriftd] watcher channel closed");
                        break;
                    };
                    if filter.is_ignored(&event.path) {
                        continue;
                    }
                    coalescer.insert(event);
                    // One shared timer: every insertion re-arms the same
                    // deadline, so a burst flushes as a single batch.
                    sleeper = Some(Box::pin(tokio::time::sleep(self.config.debounce)));
                }
                _ = async { if let Some(timer) = sleeper.as_mut() { timer.as_mut().await } }, if sleeper.is_some() => {
                    sleeper = None;
                    let batch = coalescer.drain();
                    batches.retain(|handle| !handle.is_finished());
                    if !batch.is_empty() {
                        eprintln!("[updriftd] flushing {} pending action(s)", batch.len());
                        batches.push(self.dispatcher.spawn_batch(batch));
                    }
                }
            }
        }

        // The debounce timer dies here; in-flight workers run to completion.
        drop(sleeper);
        drop(watcher);
        for handle in batches {
            let _ = handle.await;
        }
        self.transport.close().await;

        let summary = self.stats.snapshot();
        eprintln!("[updriftd] summary: {summary}");
        Ok(outcome)
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    match value.strip_prefix("~/") {
        Some(stripped) => home.join(stripped),
        None => PathBuf::from(value),
    }
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn read_bool_env(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn parse_patterns(value: Option<&str>) -> Vec<String> {
    value
        .map(|raw| {
            raw.split(',')
                .map(|pattern| pattern.trim().to_string())
                .filter(|pattern| !pattern.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
