//! Worker launcher backed by a child process.
//!
//! The child speaks the line protocol in [`protocol`] over stdin/stdout;
//! stderr lines are forwarded to the log. A worker counts as started once it
//! prints `ready`. If it prints `startup_failed` or closes stdout first, the
//! launch fails with [`StartError::Application`] and the resulting
//! `ProcessExited` signal is left to report it.

mod io;
pub mod protocol;

#[cfg(all(test, unix))]
mod tests;

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use glance_worker::TaskClass;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use self::io::{Outbound, Startup};
use crate::config::WorkerConfig;
use crate::worker::{SignalSender, StartError, WorkerError, WorkerHandle, WorkerLauncher};

/// How long a worker may take to exit after `shutdown` before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Launches workers as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
	config: WorkerConfig,
}

impl ProcessLauncher {
	pub fn new(config: WorkerConfig) -> Self {
		Self { config }
	}

	fn spawn_child(&self, executable: &Path) -> Result<Child, StartError> {
		let (program, args) = self.config.command_line(executable);
		let mut cmd = Command::new(&program);
		cmd.args(&args)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);

		for (key, value) in &self.config.env {
			cmd.env(key, value);
		}

		if let Some(dir) = executable.parent().filter(|dir| !dir.as_os_str().is_empty()) {
			cmd.current_dir(dir);
		}

		cmd.spawn()
			.map_err(|err| StartError::Other(format!("failed to spawn {}: {err}", program.display())))
	}
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
	async fn launch(&self, executable: &Path, signals: SignalSender) -> Result<Arc<dyn WorkerHandle>, StartError> {
		let probe = executable.to_path_buf();
		let exists = glance_worker::spawn_blocking(TaskClass::IoBlocking, move || probe.exists())
			.await
			.map_err(|err| StartError::Other(err.to_string()))?;
		if !exists {
			return Err(StartError::NotFound {
				path: executable.to_path_buf(),
			});
		}

		let generation = signals.generation();
		let mut child = self.spawn_child(executable)?;
		let stdin = child.stdin.take().ok_or_else(|| StartError::Other("failed to capture stdin".into()))?;
		let stdout = child.stdout.take().ok_or_else(|| StartError::Other("failed to capture stdout".into()))?;
		if let Some(stderr) = child.stderr.take() {
			glance_worker::spawn(TaskClass::Background, io::forward_stderr(generation, stderr));
		}

		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (startup_tx, startup_rx) = oneshot::channel();
		let ready = Arc::new(AtomicBool::new(false));
		glance_worker::spawn(
			TaskClass::Signal,
			io::run_worker_io(stdin, stdout, outbound_rx, startup_tx, signals, Arc::clone(&ready)),
		);

		let worker = ProcessWorker {
			generation,
			outbound: outbound_tx,
			ready,
			child: tokio::sync::Mutex::new(Some(child)),
		};

		let timeout = self.config.ready_timeout();
		match tokio::time::timeout(timeout, startup_rx).await {
			Ok(Ok(Startup::Ready)) => {
				info!(generation, executable = %executable.display(), "preview.process.ready");
				Ok(Arc::new(worker))
			}
			Ok(Ok(Startup::Failed(message))) => {
				worker.kill().await;
				Err(StartError::Application(message))
			}
			Ok(Ok(Startup::Closed)) | Ok(Err(_)) => {
				worker.kill().await;
				Err(StartError::Application("worker exited before it was ready".into()))
			}
			Err(_) => {
				warn!(generation, timeout_secs = timeout.as_secs(), "preview.process.ready_timeout");
				worker.kill().await;
				Err(StartError::Other(format!("worker did not become ready within {}s", timeout.as_secs())))
			}
		}
	}
}

/// Handle to a running worker process.
struct ProcessWorker {
	generation: u64,
	outbound: mpsc::UnboundedSender<Outbound>,
	ready: Arc<AtomicBool>,
	child: tokio::sync::Mutex<Option<Child>>,
}

impl ProcessWorker {
	async fn kill(&self) {
		self.ready.store(false, Ordering::Release);
		let Some(mut child) = self.child.lock().await.take() else {
			return;
		};
		let _ = child.start_kill();
		let _ = tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await;
	}
}

#[async_trait]
impl WorkerHandle for ProcessWorker {
	fn is_ready(&self) -> bool {
		self.ready.load(Ordering::Acquire) && !self.outbound.is_closed()
	}

	async fn update(&self, text: &str) -> Result<(), WorkerError> {
		let (written, rx) = oneshot::channel();
		self.outbound
			.send(Outbound::Update {
				text: text.to_string(),
				written,
			})
			.map_err(|_| WorkerError::Stopped)?;
		rx.await.map_err(|_| WorkerError::Stopped)?
	}

	async fn stop(&self) {
		self.ready.store(false, Ordering::Release);
		let Some(mut child) = self.child.lock().await.take() else {
			return;
		};
		let _ = self.outbound.send(Outbound::Shutdown);
		match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
			Ok(status) => debug!(generation = self.generation, ?status, "preview.process.exited"),
			Err(_) => {
				warn!(generation = self.generation, "preview.process.kill");
				let _ = child.start_kill();
				let _ = tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await;
			}
		}
	}
}
