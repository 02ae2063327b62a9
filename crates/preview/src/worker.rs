//! Contract between the session and a rendering worker.
//!
//! A [`WorkerLauncher`] turns an executable path into a running worker and a
//! [`WorkerHandle`] to talk to it. Everything the worker reports afterwards
//! (frames, render errors, exit) flows back through the [`SignalSender`]
//! handed to `launch`, tagged with the worker's generation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use glance_worker::GenerationToken;
use tokio::sync::mpsc;

/// Render error reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderError {
	pub message: String,
	/// 1-based line in the document, when the worker knows it.
	pub line: Option<u32>,
}

impl RenderError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			line: None,
		}
	}

	pub fn at_line(mut self, line: u32) -> Self {
		self.line = Some(line);
		self
	}
}

impl std::fmt::Display for RenderError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.line {
			Some(line) => write!(f, "line {line}: {}", self.message),
			None => f.write_str(&self.message),
		}
	}
}

/// Asynchronous signal raised by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerSignal {
	/// The worker rendered a frame.
	FrameReceived,
	/// The worker's current render error changed; `None` clears it.
	ErrorChanged(Option<RenderError>),
	/// The worker process is gone.
	ProcessExited,
}

/// A [`WorkerSignal`] stamped with the generation of the worker that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEnvelope {
	pub generation: u64,
	pub signal: WorkerSignal,
}

/// Sending half of a worker's signal subscription.
///
/// Detached once the owning generation is cancelled: later sends are dropped,
/// so a worker being torn down can no longer reach its session.
#[derive(Debug, Clone)]
pub struct SignalSender {
	token: GenerationToken,
	tx: mpsc::UnboundedSender<SignalEnvelope>,
}

impl SignalSender {
	pub fn new(token: GenerationToken, tx: mpsc::UnboundedSender<SignalEnvelope>) -> Self {
		Self { token, tx }
	}

	pub fn generation(&self) -> u64 {
		self.token.generation()
	}

	pub fn is_detached(&self) -> bool {
		self.token.is_cancelled() || self.tx.is_closed()
	}

	/// Sends `signal` unless detached. Returns whether it was delivered.
	pub fn send(&self, signal: WorkerSignal) -> bool {
		if self.token.is_cancelled() {
			tracing::trace!(generation = self.generation(), ?signal, "preview.signal.detached");
			return false;
		}
		self.tx
			.send(SignalEnvelope {
				generation: self.generation(),
				signal,
			})
			.is_ok()
	}

	/// Resolves once this subscription is detached.
	pub async fn detached(&self) {
		self.token.cancelled().await;
	}
}

/// Why a worker could not be started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
	/// The executable does not exist; the project has to be built first.
	#[error("executable not found: {}", path.display())]
	NotFound { path: PathBuf },
	/// The worker started but its application failed during startup.
	#[error("worker startup failed: {0}")]
	Application(String),
	/// Anything else.
	#[error("{0}")]
	Other(String),
}

impl From<std::io::Error> for StartError {
	fn from(err: std::io::Error) -> Self {
		Self::Other(err.to_string())
	}
}

/// Errors talking to a running worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
	#[error("worker is not running")]
	Stopped,
	#[error("worker i/o failed: {0}")]
	Io(#[from] std::io::Error),
	#[error("failed to encode message: {0}")]
	Encode(#[from] serde_json::Error),
}

/// Handle to one running worker.
#[async_trait]
pub trait WorkerHandle: Send + Sync {
	/// Whether the worker accepts document updates.
	fn is_ready(&self) -> bool;

	/// Pushes the full document text.
	async fn update(&self, text: &str) -> Result<(), WorkerError>;

	/// Stops the worker. Must be idempotent.
	async fn stop(&self);
}

/// Starts workers bound to an executable.
#[async_trait]
pub trait WorkerLauncher: Send + Sync + 'static {
	/// Launches a worker for `executable` and waits until it is ready.
	///
	/// Signals raised by the worker, including ones raised while a failed
	/// startup unwinds, go through `signals`.
	async fn launch(&self, executable: &Path, signals: SignalSender) -> Result<Arc<dyn WorkerHandle>, StartError>;
}
