//! Preview session handle.
//!
//! A [`Session`] is cheap to call into from any task: every operation is a
//! message to the session's driver task, which owns all mutable state. Read
//! accessors ([`Session::state`], [`Session::targets`], ...) are snapshot
//! reads of watch channels the driver publishes to.
//!
//! ```text
//! Stopped ──start──▶ Starting ──frame──▶ Running
//!                     │   ▲                 │
//!       error or exit │   │ resume          │ exit
//!                     ▼   │                 ▼
//!                    Failed ◀───────────────┘
//!
//! pause from any started state ──▶ Paused ──resume──▶ Starting
//! ```

mod driver;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use glance_worker::TaskClass;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use self::driver::{Command, Driver};
pub use self::state::SessionState;
use crate::config::PreviewConfig;
use crate::display::DisplaySurface;
use crate::error::SessionError;
use crate::guard::PauseFlag;
use crate::metadata::{CompletionMetadata, MetadataBuilder, MetadataCache};
use crate::targets::{ProjectModel, RunTarget, TargetSelection};
use crate::worker::WorkerLauncher;

/// External collaborators a session drives.
pub struct SessionDeps {
	pub launcher: Arc<dyn WorkerLauncher>,
	pub metadata: Arc<dyn MetadataBuilder>,
	pub display: Arc<dyn DisplaySurface>,
	pub projects: Arc<dyn ProjectModel>,
}

/// Live-preview session for one document.
pub struct Session {
	commands: mpsc::UnboundedSender<Command>,
	state: watch::Receiver<SessionState>,
	targets: watch::Receiver<TargetSelection>,
	paused: PauseFlag,
	metadata: Arc<MetadataCache>,
	cancel: CancellationToken,
	driver: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("state", &*self.state.borrow())
			.field("paused", &self.paused.get())
			.field("disposed", &self.cancel.is_cancelled())
			.finish_non_exhaustive()
	}
}

impl Session {
	/// Creates an unstarted session and spawns its driver.
	///
	/// Must be called within a tokio runtime.
	pub fn new(config: PreviewConfig, deps: SessionDeps) -> Self {
		let (commands_tx, commands_rx) = mpsc::unbounded_channel();
		let (state_tx, state) = watch::channel(SessionState::default());
		let (targets_tx, targets) = watch::channel(TargetSelection::default());
		let cancel = CancellationToken::new();

		let (driver, signals) = Driver::new(config, deps, state_tx, targets_tx);
		let paused = driver.paused();
		let metadata = driver.metadata();
		let task = glance_worker::spawn(TaskClass::Interactive, driver.run(commands_rx, signals, cancel.clone()));

		Self {
			commands: commands_tx,
			state,
			targets,
			paused,
			metadata,
			cancel,
			driver: Mutex::new(Some(task)),
		}
	}

	/// Starts the session for `document_path`, owned by `project`.
	///
	/// `text` carries the document's full text; its current value is the
	/// initial document. Fails with [`SessionError::AlreadyStarted`] on a
	/// second call.
	pub async fn start(&self, project: impl Into<String>, document_path: impl Into<PathBuf>, text: watch::Receiver<String>) -> Result<(), SessionError> {
		let project = project.into();
		let document = document_path.into();
		self.request(|reply| Command::Start {
			project,
			document,
			text,
			reply,
		})
		.await?
	}

	pub fn is_paused(&self) -> bool {
		self.paused.get()
	}

	/// Pauses or resumes the preview. Before [`Session::start`] this only
	/// records the flag.
	pub async fn set_paused(&self, paused: bool) -> Result<(), SessionError> {
		self.request(|reply| Command::SetPaused { paused, reply }).await
	}

	/// Selects `target`, restarting the worker if its executable differs.
	pub async fn select_target(&self, target: RunTarget) -> Result<(), SessionError> {
		self.request(|reply| Command::SelectTarget { target, reply }).await?
	}

	/// Re-resolves targets after the project graph may have changed.
	pub async fn notify_graph_changed(&self) -> Result<(), SessionError> {
		self.request(|reply| Command::GraphChanged { reply }).await
	}

	/// Rebinds the session to a new document path.
	///
	/// Completion metadata cached for the old path is dropped.
	pub async fn document_renamed(&self, document_path: impl Into<PathBuf>) -> Result<(), SessionError> {
		let document = document_path.into();
		self.request(|reply| Command::DocumentRenamed { document, reply }).await
	}

	/// Drops cached completion metadata. Meant to be called while paused,
	/// e.g. before rebuilding the project.
	pub fn invalidate_completion_metadata(&self) {
		self.metadata.invalidate();
	}

	pub fn completion_metadata(&self) -> Option<CompletionMetadata> {
		self.metadata.get()
	}

	pub fn state(&self) -> SessionState {
		self.state.borrow().clone()
	}

	pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
		self.state.clone()
	}

	pub fn targets(&self) -> Vec<RunTarget> {
		self.targets.borrow().targets.clone()
	}

	pub fn selected_target(&self) -> Option<RunTarget> {
		self.targets.borrow().selected.clone()
	}

	/// Notifies on every change of the target set or selection.
	pub fn subscribe_targets(&self) -> watch::Receiver<TargetSelection> {
		self.targets.clone()
	}

	pub fn is_disposed(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Tears the session down and waits for the driver to finish.
	///
	/// The throttle is disposed and the worker detached and stopped before
	/// this returns. Later calls are no-ops.
	pub async fn dispose(&self) {
		self.cancel.cancel();
		let task = self.driver.lock().take();
		if let Some(task) = task
			&& let Err(err) = task.await
			&& let Some(message) = glance_worker::join_error_panic_message(err)
		{
			warn!(%message, "preview.session.driver_panicked");
		}
	}

	async fn request<R>(&self, command: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R, SessionError> {
		if self.cancel.is_cancelled() {
			return Err(SessionError::Disposed);
		}
		let (reply, rx) = oneshot::channel();
		self.commands.send(command(reply)).map_err(|_| SessionError::Disposed)?;
		rx.await.map_err(|_| SessionError::Disposed)
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}
