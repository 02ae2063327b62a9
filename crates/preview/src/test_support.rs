//! Mock collaborators for exercising a session without real processes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::time::{sleep, timeout};

use crate::display::{DisplayDirective, DisplaySurface};
use crate::metadata::{CompletionMetadata, MetadataBuilder, MetadataError};
use crate::targets::{ProjectGraph, ProjectModel};
use crate::worker::{SignalSender, StartError, WorkerError, WorkerHandle, WorkerLauncher, WorkerSignal};

/// Polls `condition` every 10ms, panicking after two seconds.
pub async fn wait_until<F>(name: &str, mut condition: F)
where
	F: FnMut() -> bool,
{
	timeout(Duration::from_secs(2), async move {
		loop {
			if condition() {
				return;
			}
			sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.unwrap_or_else(|_| panic!("timed out waiting for {name}"));
}

/// How [`MockLauncher`] responds to a launch of a given executable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LaunchBehavior {
	#[default]
	Ready,
	/// Fails with [`StartError::NotFound`].
	NotFound,
	/// Emits `ProcessExited`, then fails with [`StartError::Application`].
	Application(String),
	/// Fails with [`StartError::Other`].
	Other(String),
	/// Starts, but every update fails.
	RejectUpdates,
	/// Starts and accepts the initial document; later updates never complete.
	StallUpdates,
}

/// Worker launched by [`MockLauncher`].
#[derive(Debug)]
pub struct MockWorker {
	executable: PathBuf,
	updates: Mutex<Vec<String>>,
	stopped: AtomicBool,
	reject_updates: bool,
	stall_updates: bool,
	live: Arc<AtomicUsize>,
}

impl MockWorker {
	pub fn executable(&self) -> &Path {
		&self.executable
	}

	/// Every document text pushed so far, oldest first.
	pub fn updates(&self) -> Vec<String> {
		self.updates.lock().clone()
	}

	pub fn is_stopped(&self) -> bool {
		self.stopped.load(Ordering::Acquire)
	}
}

#[async_trait]
impl WorkerHandle for MockWorker {
	fn is_ready(&self) -> bool {
		!self.is_stopped()
	}

	async fn update(&self, text: &str) -> Result<(), WorkerError> {
		if self.is_stopped() || self.reject_updates {
			return Err(WorkerError::Stopped);
		}
		let stall = {
			let mut updates = self.updates.lock();
			let stall = self.stall_updates && !updates.is_empty();
			updates.push(text.to_string());
			stall
		};
		if stall {
			std::future::pending::<()>().await;
		}
		Ok(())
	}

	async fn stop(&self) {
		if !self.stopped.swap(true, Ordering::AcqRel) {
			self.live.fetch_sub(1, Ordering::AcqRel);
		}
	}
}

/// In-memory [`WorkerLauncher`] that records launches and counts live
/// workers.
#[derive(Debug, Default)]
pub struct MockLauncher {
	behaviors: Mutex<HashMap<PathBuf, LaunchBehavior>>,
	delay: Mutex<Duration>,
	launches: Mutex<Vec<PathBuf>>,
	workers: Mutex<Vec<Arc<MockWorker>>>,
	sinks: Mutex<Vec<SignalSender>>,
	live: Arc<AtomicUsize>,
	max_live: AtomicUsize,
}

impl MockLauncher {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_behavior(&self, executable: impl Into<PathBuf>, behavior: LaunchBehavior) {
		self.behaviors.lock().insert(executable.into(), behavior);
	}

	/// Delay applied inside every launch before it resolves.
	pub fn set_launch_delay(&self, delay: Duration) {
		*self.delay.lock() = delay;
	}

	pub fn launches(&self) -> Vec<PathBuf> {
		self.launches.lock().clone()
	}

	pub fn launch_count(&self) -> usize {
		self.launches.lock().len()
	}

	/// Workers launched and not yet stopped.
	pub fn live_count(&self) -> usize {
		self.live.load(Ordering::Acquire)
	}

	/// Highest number of simultaneously live workers observed.
	pub fn max_live(&self) -> usize {
		self.max_live.load(Ordering::Acquire)
	}

	pub fn workers(&self) -> Vec<Arc<MockWorker>> {
		self.workers.lock().clone()
	}

	pub fn last_worker(&self) -> Option<Arc<MockWorker>> {
		self.workers.lock().last().cloned()
	}

	/// Signal sender handed to the most recent launch, successful or not.
	pub fn last_sink(&self) -> Option<SignalSender> {
		self.sinks.lock().last().cloned()
	}

	/// Raises `signal` from the most recently launched worker.
	pub fn emit(&self, signal: WorkerSignal) -> bool {
		self.last_sink().is_some_and(|sink| sink.send(signal))
	}
}

#[async_trait]
impl WorkerLauncher for MockLauncher {
	async fn launch(&self, executable: &Path, signals: SignalSender) -> Result<Arc<dyn WorkerHandle>, StartError> {
		self.launches.lock().push(executable.to_path_buf());
		self.sinks.lock().push(signals.clone());

		let delay = *self.delay.lock();
		if !delay.is_zero() {
			sleep(delay).await;
		}

		let behavior = self.behaviors.lock().get(executable).cloned().unwrap_or_default();
		let (reject_updates, stall_updates) = match behavior {
			LaunchBehavior::Ready => (false, false),
			LaunchBehavior::RejectUpdates => (true, false),
			LaunchBehavior::StallUpdates => (false, true),
			LaunchBehavior::NotFound => {
				return Err(StartError::NotFound {
					path: executable.to_path_buf(),
				});
			}
			LaunchBehavior::Application(message) => {
				signals.send(WorkerSignal::ProcessExited);
				return Err(StartError::Application(message));
			}
			LaunchBehavior::Other(message) => return Err(StartError::Other(message)),
		};

		let live = self.live.fetch_add(1, Ordering::AcqRel) + 1;
		self.max_live.fetch_max(live, Ordering::AcqRel);
		let worker = Arc::new(MockWorker {
			executable: executable.to_path_buf(),
			updates: Mutex::default(),
			stopped: AtomicBool::new(false),
			reject_updates,
			stall_updates,
			live: Arc::clone(&self.live),
		});
		self.workers.lock().push(Arc::clone(&worker));
		Ok(worker)
	}
}

/// Display surface recording every directive it is asked to show.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
	directives: Mutex<Vec<DisplayDirective>>,
}

impl RecordingDisplay {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn directives(&self) -> Vec<DisplayDirective> {
		self.directives.lock().clone()
	}

	pub fn last(&self) -> Option<DisplayDirective> {
		self.directives.lock().last().cloned()
	}

	/// Heading of the last directive, if it is an error.
	pub fn last_error_heading(&self) -> Option<String> {
		match self.last()? {
			DisplayDirective::Error { heading, .. } => Some(heading),
			DisplayDirective::Preview => None,
		}
	}

	pub fn error_count(&self) -> usize {
		self.directives
			.lock()
			.iter()
			.filter(|d| matches!(d, DisplayDirective::Error { .. }))
			.count()
	}
}

impl DisplaySurface for RecordingDisplay {
	fn show_preview(&self) {
		self.directives.lock().push(DisplayDirective::Preview);
	}

	fn show_error(&self, heading: &str, message: &str) {
		self.directives.lock().push(DisplayDirective::error(heading, message));
	}
}

/// Metadata builder producing the executable path as metadata.
#[derive(Debug, Default)]
pub struct CountingMetadataBuilder {
	builds: AtomicUsize,
	failing: AtomicBool,
	delay: Duration,
}

impl CountingMetadataBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}

	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::Release);
	}

	/// Number of builds started.
	pub fn builds(&self) -> usize {
		self.builds.load(Ordering::Acquire)
	}
}

#[async_trait]
impl MetadataBuilder for CountingMetadataBuilder {
	async fn build(&self, executable: &Path) -> Result<CompletionMetadata, MetadataError> {
		self.builds.fetch_add(1, Ordering::AcqRel);
		if !self.delay.is_zero() {
			sleep(self.delay).await;
		}
		if self.failing.load(Ordering::Acquire) {
			return Err(MetadataError::Other("metadata unavailable".into()));
		}
		Ok(Arc::new(executable.to_path_buf()))
	}
}

/// Project model whose graph can be swapped by the test.
#[derive(Debug, Default)]
pub struct SharedProjectModel {
	graph: RwLock<ProjectGraph>,
}

impl SharedProjectModel {
	pub fn new(graph: ProjectGraph) -> Self {
		Self { graph: RwLock::new(graph) }
	}

	pub fn set(&self, graph: ProjectGraph) {
		*self.graph.write() = graph;
	}
}

impl ProjectModel for SharedProjectModel {
	fn snapshot(&self) -> ProjectGraph {
		self.graph.read().clone()
	}
}
