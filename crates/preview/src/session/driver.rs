//! Session driver task.
//!
//! The driver is the only writer of [`SessionState`] and of the target
//! selection. Commands from the [`Session`](super::Session) handle and
//! signals from the live worker are applied one at a time, and every
//! lifecycle call into the guard is awaited inline, so lifecycle operations
//! happen in the order their commands arrived.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use glance_worker::TaskClass;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{SessionDeps, SessionState};
use crate::config::PreviewConfig;
use crate::display::{DisplayDirective, DisplaySurface};
use crate::error::{FailureReason, SessionError};
use crate::guard::{LifecycleGuard, PauseFlag, StartOutcome};
use crate::metadata::MetadataCache;
use crate::targets::{ProjectModel, RunTarget, TargetResolver, TargetSelection, reselect};
use crate::throttle::Throttle;
use crate::worker::{SignalEnvelope, StartError, WorkerSignal};

const PROCESS_EXITED_MESSAGE: &str = "The preview process exited unexpectedly.";

/// Requests from the session handle.
pub(super) enum Command {
	Start {
		project: String,
		document: PathBuf,
		text: watch::Receiver<String>,
		reply: oneshot::Sender<Result<(), SessionError>>,
	},
	SetPaused {
		paused: bool,
		reply: oneshot::Sender<()>,
	},
	SelectTarget {
		target: RunTarget,
		reply: oneshot::Sender<Result<(), SessionError>>,
	},
	GraphChanged {
		reply: oneshot::Sender<()>,
	},
	DocumentRenamed {
		document: PathBuf,
		reply: oneshot::Sender<()>,
	},
}

/// Everything that exists only once the session has been started.
struct Attached {
	project: String,
	document: PathBuf,
	text: watch::Receiver<String>,
	throttle: Arc<Throttle<String>>,
	forward: CancellationToken,
}

pub(super) struct Driver {
	config: PreviewConfig,
	display: Arc<dyn DisplaySurface>,
	projects: Arc<dyn ProjectModel>,
	guard: Arc<LifecycleGuard>,
	metadata: Arc<MetadataCache>,
	paused: PauseFlag,
	resolver: TargetResolver,
	state: watch::Sender<SessionState>,
	targets: watch::Sender<TargetSelection>,
	attached: Option<Attached>,
	/// Whether the live worker produced a frame since it was started.
	has_frame: bool,
	last_display: Option<DisplayDirective>,
}

impl Driver {
	pub(super) fn new(
		config: PreviewConfig,
		deps: SessionDeps,
		state: watch::Sender<SessionState>,
		targets: watch::Sender<TargetSelection>,
	) -> (Self, mpsc::UnboundedReceiver<SignalEnvelope>) {
		let (signals_tx, signals_rx) = mpsc::unbounded_channel();
		let paused = PauseFlag::default();
		let guard = Arc::new(LifecycleGuard::new(deps.launcher, paused.clone(), signals_tx));
		let resolver = TargetResolver::new(config.support_library.clone(), config.targets.stale_passes);
		let driver = Self {
			config,
			display: deps.display,
			projects: deps.projects,
			guard,
			metadata: Arc::new(MetadataCache::new(deps.metadata)),
			paused,
			resolver,
			state,
			targets,
			attached: None,
			has_frame: false,
			last_display: None,
		};
		(driver, signals_rx)
	}

	pub(super) fn paused(&self) -> PauseFlag {
		self.paused.clone()
	}

	pub(super) fn metadata(&self) -> Arc<MetadataCache> {
		Arc::clone(&self.metadata)
	}

	pub(super) async fn run(
		mut self,
		mut commands: mpsc::UnboundedReceiver<Command>,
		mut signals: mpsc::UnboundedReceiver<SignalEnvelope>,
		cancel: CancellationToken,
	) {
		loop {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				command = commands.recv() => match command {
					Some(command) => self.handle_command(command).await,
					None => break,
				},
				Some(envelope) = signals.recv() => self.handle_signal(envelope).await,
			}
		}
		self.shutdown().await;
	}

	async fn handle_command(&mut self, command: Command) {
		match command {
			Command::Start {
				project,
				document,
				text,
				reply,
			} => {
				let result = self.start(project, document, text).await;
				let _ = reply.send(result);
			}
			Command::SetPaused { paused, reply } => {
				self.set_paused(paused).await;
				let _ = reply.send(());
			}
			Command::SelectTarget { target, reply } => {
				let result = self.select_target(target).await;
				let _ = reply.send(result);
			}
			Command::GraphChanged { reply } => {
				self.graph_changed().await;
				let _ = reply.send(());
			}
			Command::DocumentRenamed { document, reply } => {
				self.document_renamed(document);
				let _ = reply.send(());
			}
		}
	}

	async fn start(&mut self, project: String, document: PathBuf, text: watch::Receiver<String>) -> Result<(), SessionError> {
		if let Some(attached) = &self.attached {
			warn!(
				project = %project,
				started_project = %attached.project,
				document = %document.display(),
				"preview.session.misuse"
			);
			return Err(SessionError::AlreadyStarted);
		}
		info!(project = %project, document = %document.display(), "preview.session.start");

		self.metadata.rekey(document.to_string_lossy());
		let throttle = Arc::new(self.build_throttle());
		let forward = CancellationToken::new();
		spawn_forwarder(text.clone(), Arc::clone(&throttle), forward.clone());
		self.attached = Some(Attached {
			project: project.clone(),
			document,
			text,
			throttle,
			forward,
		});

		self.set_state(SessionState::Starting);
		let graph = self.projects.snapshot();
		let targets = self.resolver.resolve(&project, &graph);
		let selected = reselect(self.selected().as_ref(), &targets);
		self.publish_targets(targets, selected.clone());

		match selected {
			None => self.fail(FailureReason::NoExecutable),
			Some(_) if self.paused.get() => self.set_state(SessionState::Paused),
			Some(target) => self.attempt_start(target.executable_path()).await,
		}
		Ok(())
	}

	fn build_throttle(&self) -> Throttle<String> {
		let guard = Arc::clone(&self.guard);
		Throttle::new(self.config.throttle_window(), move |text: String| {
			let guard = Arc::clone(&guard);
			async move {
				if let Err(err) = guard.push(&text).await {
					warn!(error = %err, "preview.session.push_failed");
				}
			}
		})
	}

	async fn set_paused(&mut self, paused: bool) {
		if self.attached.is_none() {
			debug!(paused, "preview.session.pause_recorded");
			self.paused.set(paused);
			return;
		}

		if paused {
			if self.paused.get() {
				return;
			}
			self.paused.set(true);
			self.guard.stop().await;
			self.metadata.invalidate();
			self.set_state(SessionState::Paused);
			return;
		}

		let state = self.current_state();
		if !matches!(state, SessionState::Paused | SessionState::Failed(_)) {
			self.paused.set(false);
			return;
		}
		self.paused.set(false);
		self.metadata.invalidate();
		match self.selected() {
			Some(target) => self.attempt_start(target.executable_path()).await,
			None => self.fail(FailureReason::NoExecutable),
		}
	}

	async fn select_target(&mut self, target: RunTarget) -> Result<(), SessionError> {
		let current = self.targets.borrow().clone();
		if !current.contains(&target) {
			return Err(SessionError::UnknownTarget(target.to_string()));
		}
		if current.selected.as_ref() == Some(&target) {
			return Ok(());
		}
		self.publish_targets(current.targets, Some(target.clone()));
		self.selection_changed(current.selected, Some(target)).await;
		Ok(())
	}

	async fn graph_changed(&mut self) {
		let Some(project) = self.attached.as_ref().map(|attached| attached.project.clone()) else {
			debug!("preview.session.graph_change_ignored");
			return;
		};

		let graph = self.projects.snapshot();
		let targets = self.resolver.resolve(&project, &graph);
		let previous = self.selected();
		let selected = reselect(previous.as_ref(), &targets);
		debug!(targets = targets.len(), selected = ?selected.as_ref().map(RunTarget::name), "preview.session.targets_resolved");
		self.publish_targets(targets, selected.clone());

		if selected != previous {
			self.selection_changed(previous, selected).await;
		}
	}

	fn document_renamed(&mut self, document: PathBuf) {
		self.metadata.rekey(document.to_string_lossy());
		if let Some(attached) = &mut self.attached {
			debug!(from = %attached.document.display(), to = %document.display(), "preview.session.document_renamed");
			attached.document = document;
		}
	}

	async fn selection_changed(&mut self, previous: Option<RunTarget>, next: Option<RunTarget>) {
		if self.attached.is_none() {
			return;
		}

		match self.current_state() {
			SessionState::Starting | SessionState::Running => {
				let previous_path = previous.as_ref().map(RunTarget::executable_path);
				if previous_path == next.as_ref().map(RunTarget::executable_path) {
					return;
				}
				info!(
					from = ?previous.as_ref().map(RunTarget::name),
					to = ?next.as_ref().map(RunTarget::name),
					"preview.session.target_switch"
				);
				self.guard.stop().await;
				match next {
					Some(target) => self.attempt_start(target.executable_path()).await,
					None => self.fail(FailureReason::NoExecutable),
				}
			}
			SessionState::Failed(FailureReason::NoExecutable) if !self.paused.get() => {
				if let Some(target) = next {
					self.attempt_start(target.executable_path()).await;
				}
			}
			SessionState::Failed(_) if next.is_none() && !self.paused.get() => self.fail(FailureReason::NoExecutable),
			state => debug!(state = state.as_str(), "preview.session.target_recorded"),
		}
	}

	async fn attempt_start(&mut self, executable: &Path) {
		let Some(attached) = &self.attached else {
			return;
		};
		self.has_frame = false;
		self.set_state(SessionState::Starting);

		let outcome = self.guard.start_or_noop(executable, &attached.text).await;
		match outcome {
			StartOutcome::Started { generation } => {
				debug!(generation, "preview.session.worker_started");
				self.metadata.ensure_built(executable);
			}
			StartOutcome::SkippedPaused => self.set_state(SessionState::Paused),
			StartOutcome::Suppressed { generation, message } => {
				debug!(generation, %message, "preview.session.awaiting_exit_signal");
			}
			StartOutcome::Failed(StartError::NotFound { path }) => {
				self.fail(FailureReason::BuildRequired(format!(
					"{} does not exist. Build the project to preview this document.",
					path.display()
				)));
			}
			StartOutcome::Failed(err) => self.fail(FailureReason::Generic(err.to_string())),
		}
	}

	async fn handle_signal(&mut self, envelope: SignalEnvelope) {
		let SignalEnvelope { generation, signal } = envelope;
		if self.guard.live_generation() != Some(generation) {
			trace!(generation, ?signal, "preview.session.stale_signal");
			return;
		}

		let state = self.current_state();
		match signal {
			WorkerSignal::FrameReceived => match state {
				SessionState::Starting | SessionState::Running | SessionState::Failed(FailureReason::InvalidMarkup(_)) => {
					self.has_frame = true;
					self.set_state(SessionState::Running);
					self.show(DisplayDirective::Preview);
				}
				state => trace!(generation, state = state.as_str(), "preview.session.frame_ignored"),
			},
			WorkerSignal::ErrorChanged(Some(error)) => match state {
				SessionState::Starting | SessionState::Running if !self.has_frame => {
					self.fail(FailureReason::InvalidMarkup(error.to_string()));
				}
				SessionState::Starting | SessionState::Running => {
					debug!(generation, error = %error, "preview.session.runtime_error");
				}
				state => trace!(generation, state = state.as_str(), "preview.session.error_ignored"),
			},
			WorkerSignal::ErrorChanged(None) => match state {
				SessionState::Starting | SessionState::Running => self.show(DisplayDirective::Preview),
				SessionState::Failed(FailureReason::InvalidMarkup(_)) => {
					let next = if self.has_frame { SessionState::Running } else { SessionState::Starting };
					self.set_state(next);
					self.show(DisplayDirective::Preview);
				}
				_ => {}
			},
			WorkerSignal::ProcessExited => {
				if self.paused.get() {
					debug!(generation, "preview.session.exit_while_paused");
				} else if state.is_active() {
					self.fail(FailureReason::ProcessExited(PROCESS_EXITED_MESSAGE.to_string()));
				}
				self.guard.reap(generation).await;
			}
		}
	}

	async fn shutdown(&mut self) {
		if let Some(attached) = self.attached.take() {
			attached.forward.cancel();
			attached.throttle.dispose().await;
		}
		self.guard.stop().await;
		self.metadata.dispose();
		self.set_state(SessionState::Stopped);
		info!("preview.session.disposed");
	}

	fn fail(&mut self, reason: FailureReason) {
		warn!(reason = %reason, "preview.session.failed");
		let directive = DisplayDirective::error(reason.heading(), reason.message());
		self.set_state(SessionState::Failed(reason));
		self.show(directive);
	}

	fn show(&mut self, directive: DisplayDirective) {
		if self.last_display.as_ref() == Some(&directive) {
			return;
		}
		directive.apply(self.display.as_ref());
		self.last_display = Some(directive);
	}

	fn current_state(&self) -> SessionState {
		self.state.borrow().clone()
	}

	fn set_state(&self, next: SessionState) {
		self.state.send_if_modified(|state| {
			if *state == next {
				return false;
			}
			debug!(from = %state, to = %next, "preview.session.transition");
			*state = next;
			true
		});
	}

	fn selected(&self) -> Option<RunTarget> {
		self.targets.borrow().selected.clone()
	}

	fn publish_targets(&self, targets: Vec<RunTarget>, selected: Option<RunTarget>) {
		let next = TargetSelection { targets, selected };
		self.targets.send_if_modified(|current| {
			if *current == next {
				return false;
			}
			*current = next;
			true
		});
	}
}

/// Feeds every text change into the throttle until cancelled.
fn spawn_forwarder(mut text: watch::Receiver<String>, throttle: Arc<Throttle<String>>, cancel: CancellationToken) {
	text.mark_unchanged();
	glance_worker::spawn(TaskClass::Interactive, async move {
		loop {
			tokio::select! {
				_ = cancel.cancelled() => break,
				changed = text.changed() => {
					if changed.is_err() {
						debug!("preview.session.text_source_closed");
						break;
					}
					let latest = text.borrow_and_update().clone();
					throttle.queue(latest);
				}
			}
		}
	});
}
