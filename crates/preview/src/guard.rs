//! Process lifecycle guard.
//!
//! [`LifecycleGuard`] is the only owner of the worker handle. Start, stop and
//! reap sequences each run under one binary permit, so no two of them ever
//! interleave and at most one worker exists at a time. The handle itself sits
//! behind a read/write lock that is only written while the permit is held;
//! document pushes take a snapshot read and never wait on the permit.
//!
//! Each start mints a new generation. Signals from the launched worker are
//! tagged with it, and teardown cancels the generation before stopping the
//! worker so nothing it says afterwards reaches the session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glance_worker::{GenerationClock, GenerationToken};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::worker::{SignalEnvelope, SignalSender, StartError, WorkerError, WorkerHandle, WorkerLauncher};

/// Shared pause flag read by the guard before every start.
#[derive(Debug, Clone, Default)]
pub struct PauseFlag(Arc<AtomicBool>);

impl PauseFlag {
	pub fn new(paused: bool) -> Self {
		Self(Arc::new(AtomicBool::new(paused)))
	}

	pub fn get(&self) -> bool {
		self.0.load(Ordering::Acquire)
	}

	pub fn set(&self, paused: bool) {
		self.0.store(paused, Ordering::Release);
	}
}

/// Result of [`LifecycleGuard::start_or_noop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
	/// The worker is up and received the full document.
	Started { generation: u64 },
	/// The session is paused; nothing was spawned.
	SkippedPaused,
	/// The worker's application failed during startup. Reporting is left to
	/// the signal path, which stays attached to `generation`.
	Suppressed { generation: u64, message: String },
	/// The start failed and no worker is live.
	Failed(StartError),
}

struct LiveWorker {
	token: GenerationToken,
	executable: PathBuf,
	/// `None` after a suppressed startup failure, where only the signal
	/// subscription is kept.
	handle: Option<Arc<dyn WorkerHandle>>,
}

/// Single owner of the worker handle.
pub struct LifecycleGuard {
	launcher: Arc<dyn WorkerLauncher>,
	paused: PauseFlag,
	clock: GenerationClock,
	signals: mpsc::UnboundedSender<SignalEnvelope>,
	permit: tokio::sync::Mutex<()>,
	live: RwLock<Option<LiveWorker>>,
}

impl std::fmt::Debug for LifecycleGuard {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LifecycleGuard")
			.field("paused", &self.paused.get())
			.field("live_generation", &self.live_generation())
			.finish_non_exhaustive()
	}
}

impl LifecycleGuard {
	pub fn new(launcher: Arc<dyn WorkerLauncher>, paused: PauseFlag, signals: mpsc::UnboundedSender<SignalEnvelope>) -> Self {
		Self {
			launcher,
			paused,
			clock: GenerationClock::new(),
			signals,
			permit: tokio::sync::Mutex::new(()),
			live: RwLock::new(None),
		}
	}

	/// Starts a worker for `executable` unless paused.
	///
	/// Any previous worker is torn down first. On success the current value
	/// of `document` is pushed before the permit is released.
	pub async fn start_or_noop(&self, executable: &Path, document: &watch::Receiver<String>) -> StartOutcome {
		let _permit = self.permit.lock().await;
		if self.paused.get() {
			debug!(executable = %executable.display(), "preview.guard.start_skipped_paused");
			return StartOutcome::SkippedPaused;
		}

		self.teardown_locked().await;

		let token = GenerationToken::mint(&self.clock);
		let generation = token.generation();
		let signals = SignalSender::new(token.child(), self.signals.clone());
		info!(generation, executable = %executable.display(), "preview.guard.start");

		match self.launcher.launch(executable, signals).await {
			Ok(handle) => {
				*self.live.write() = Some(LiveWorker {
					token,
					executable: executable.to_path_buf(),
					handle: Some(Arc::clone(&handle)),
				});

				let text = document.borrow().clone();
				if let Err(err) = handle.update(&text).await {
					warn!(generation, error = %err, "preview.guard.initial_push_failed");
					self.teardown_locked().await;
					return StartOutcome::Failed(StartError::Other(err.to_string()));
				}
				debug!(generation, len = text.len(), "preview.guard.started");
				StartOutcome::Started { generation }
			}
			Err(StartError::Application(message)) => {
				debug!(generation, %message, "preview.guard.startup_failure_suppressed");
				*self.live.write() = Some(LiveWorker {
					token,
					executable: executable.to_path_buf(),
					handle: None,
				});
				StartOutcome::Suppressed { generation, message }
			}
			Err(err) => {
				token.cancel();
				warn!(generation, error = %err, "preview.guard.start_failed");
				StartOutcome::Failed(err)
			}
		}
	}

	/// Tears down the live worker, if any. Returns whether one existed.
	pub async fn stop(&self) -> bool {
		let _permit = self.permit.lock().await;
		self.teardown_locked().await
	}

	/// Drops the worker of `generation` after its process exited.
	///
	/// Does nothing when a different generation is live.
	pub async fn reap(&self, generation: u64) -> bool {
		let _permit = self.permit.lock().await;
		if self.live_generation() != Some(generation) {
			trace!(generation, "preview.guard.reap_stale");
			return false;
		}
		debug!(generation, "preview.guard.reap");
		self.teardown_locked().await
	}

	/// Pushes `text` to the live worker if it is ready.
	///
	/// Returns `Ok(false)` when skipped. Does not take the permit.
	pub async fn push(&self, text: &str) -> Result<bool, WorkerError> {
		let Some((generation, handle)) = self.ready_handle() else {
			trace!("preview.guard.push_skipped");
			return Ok(false);
		};
		handle.update(text).await?;
		trace!(generation, len = text.len(), "preview.guard.push");
		Ok(true)
	}

	/// Generation of the live worker, including a suppressed one.
	pub fn live_generation(&self) -> Option<u64> {
		self.live.read().as_ref().map(|live| live.token.generation())
	}

	pub fn live_executable(&self) -> Option<PathBuf> {
		self.live.read().as_ref().map(|live| live.executable.clone())
	}

	/// Whether a worker handle exists and accepts updates.
	pub fn is_ready(&self) -> bool {
		self.ready_handle().is_some()
	}

	fn ready_handle(&self) -> Option<(u64, Arc<dyn WorkerHandle>)> {
		let live = self.live.read();
		let live = live.as_ref()?;
		let handle = live.handle.as_ref().filter(|handle| handle.is_ready())?;
		Some((live.token.generation(), Arc::clone(handle)))
	}

	/// Caller must hold the permit.
	async fn teardown_locked(&self) -> bool {
		let Some(live) = self.live.write().take() else {
			return false;
		};
		let generation = live.token.generation();
		live.token.cancel();
		if let Some(handle) = live.handle {
			handle.stop().await;
		}
		debug!(generation, executable = %live.executable.display(), "preview.guard.teardown");
		true
	}
}
