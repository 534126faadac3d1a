//! Tracked entry set and the current worker.

use crate::error::BrokerError;
use crate::worker::{WorkerHandle, WorkerSpawner};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct BrokerState {
    /// Entry ids the current worker was started with.
    tracked: BTreeSet<String>,
    worker: Option<Box<dyn WorkerHandle>>,
}

/// Owns the worker process and the entries it serves.
///
/// The tracked set only grows until [`Broker::reset`]; a restart spawns the
/// new worker with every entry tracked so far.
pub struct Broker {
    spawner: Arc<dyn WorkerSpawner>,
    cwd: PathBuf,
    worker_port: u16,
    state: Mutex<BrokerState>,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("cwd", &self.cwd)
            .field("worker_port", &self.worker_port)
            .field("state", &"<Mutex>")
            .finish_non_exhaustive()
    }
}

impl Broker {
    #[must_use]
    pub fn new(spawner: Arc<dyn WorkerSpawner>, cwd: impl Into<PathBuf>, worker_port: u16) -> Self {
        Self {
            spawner,
            cwd: cwd.into(),
            worker_port,
            state: Mutex::new(BrokerState {
                tracked: BTreeSet::new(),
                worker: None,
            }),
        }
    }

    #[must_use]
    pub fn worker_port(&self) -> u16 {
        self.worker_port
    }

    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Make sure a worker is serving every entry in `targets`.
    ///
    /// Returns `true` when a new worker was spawned and `false` when the
    /// running one already covers `targets`. A worker that exited on its own
    /// is replaced even if nothing new was requested.
    pub async fn ensure_worker<S: AsRef<str>>(&self, targets: &[S]) -> Result<bool, BrokerError> {
        let mut state = self.state.lock().await;

        if let Some(worker) = state.worker.as_mut() {
            if !worker.is_alive() {
                warn!(pid = worker.id().unwrap_or(0), "worker died, respawning");
                state.worker = None;
            }
        }

        let covered = targets
            .iter()
            .all(|t| state.tracked.contains(t.as_ref()));
        if covered && (state.worker.is_some() || state.tracked.is_empty()) {
            debug!("reusing worker");
            return Ok(false);
        }

        for target in targets {
            state.tracked.insert(target.as_ref().to_string());
        }
        if let Some(mut old) = state.worker.take() {
            info!(pid = old.id().unwrap_or(0), "restarting worker for new entries");
            old.kill();
        }

        let entries: Vec<String> = state.tracked.iter().cloned().collect();
        let worker = self
            .spawner
            .spawn(&entries, self.worker_port, &self.cwd)
            .map_err(|source| BrokerError::Spawn {
                entries: entries.join(","),
                source,
            })?;
        state.worker = Some(worker);
        Ok(true)
    }

    /// Entry ids the current worker serves, sorted.
    pub async fn tracked(&self) -> Vec<String> {
        self.state.lock().await.tracked.iter().cloned().collect()
    }

    pub async fn has_worker(&self) -> bool {
        self.state.lock().await.worker.is_some()
    }

    /// Kill the worker and forget every tracked entry.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.tracked.clear();
        if let Some(mut worker) = state.worker.take() {
            worker.kill();
        }
    }
}
