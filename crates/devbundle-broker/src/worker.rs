//! Bundler worker processes.
//!
//! The broker owns at most one worker at a time. A worker is told which entry
//! targets to build through [`ENTRIES_ENV_VAR`] and which port to listen on
//! through [`WORKER_PORT_ENV_VAR`].

use devbundle_core::entries::{join_entry_list, ENTRIES_ENV_VAR};
use std::io;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Environment variable carrying the port the worker must listen on.
pub const WORKER_PORT_ENV_VAR: &str = "DEVBUNDLE_WORKER_PORT";

/// A live worker process.
pub trait WorkerHandle: Send + Sync {
    /// OS process id, if known.
    fn id(&self) -> Option<u32>;

    /// Whether the process is still running.
    fn is_alive(&mut self) -> bool;

    /// Kill the process without waiting for it to exit.
    fn kill(&mut self);
}

/// Starts worker processes.
pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self, entries: &[String], port: u16, cwd: &Path) -> io::Result<Box<dyn WorkerHandle>>;
}

/// Runs the configured bundler command.
#[derive(Debug, Clone)]
pub struct CommandSpawner {
    pub command: String,
    pub args: Vec<String>,
}

impl CommandSpawner {
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

impl WorkerSpawner for CommandSpawner {
    fn spawn(&self, entries: &[String], port: u16, cwd: &Path) -> io::Result<Box<dyn WorkerHandle>> {
        let entry_list = join_entry_list(entries.iter().map(String::as_str));
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .current_dir(cwd)
            .env(ENTRIES_ENV_VAR, &entry_list)
            .env(WORKER_PORT_ENV_VAR, port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("failed to capture stderr"))?;

        // Both pipes must be drained or the bundler blocks once the buffer fills.
        let drains = [
            drain_lines(stdout, "stdout"),
            drain_lines(stderr, "stderr"),
        ];

        info!(
            pid = child.id().unwrap_or(0),
            entries = %entry_list,
            port,
            "spawned worker"
        );

        Ok(Box::new(CommandWorker {
            child,
            _drains: drains,
        }))
    }
}

fn drain_lines<R>(pipe: R, stream: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "devbundle::worker", stream, "{line}");
        }
    })
}

/// Worker started by [`CommandSpawner`].
struct CommandWorker {
    child: Child,
    _drains: [JoinHandle<()>; 2],
}

impl WorkerHandle for CommandWorker {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn kill(&mut self) {
        let pid = self.child.id().unwrap_or(0);
        match self.child.start_kill() {
            Ok(()) => debug!(pid, "killed worker"),
            Err(e) => warn!(pid, "failed to kill worker: {e}"),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_command_worker_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = CommandSpawner::new("sleep", vec!["30".to_string()]);
        let mut worker = spawner
            .spawn(&["index.js".to_string()], 4999, dir.path())
            .unwrap();
        assert!(worker.id().is_some());
        assert!(worker.is_alive());

        worker.kill();
        let mut alive = true;
        for _ in 0..50 {
            if !worker.is_alive() {
                alive = false;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!alive);
    }

    #[tokio::test]
    async fn test_worker_receives_entry_list() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("env.txt");
        let script = format!(
            "printf '%s|%s' \"${ENTRIES_ENV_VAR}\" \"${WORKER_PORT_ENV_VAR}\" > {}",
            out.display()
        );
        let spawner = CommandSpawner::new("sh", vec!["-c".to_string(), script]);
        let mut worker = spawner
            .spawn(&["a.js".to_string(), "b.js".to_string()], 4123, dir.path())
            .unwrap();

        for _ in 0..100 {
            if !worker.is_alive() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "a.js,b.js|4123");
    }

    #[test]
    fn test_missing_command_fails_to_spawn() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let dir = tempfile::tempdir().unwrap();
        let spawner = CommandSpawner::new("devbundle-no-such-bundler", Vec::new());
        assert!(spawner.spawn(&[], 4000, dir.path()).is_err());
    }
}
