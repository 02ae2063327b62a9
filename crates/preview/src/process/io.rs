use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use super::protocol::{self, HostMessage, WorkerMessage};
use crate::worker::{RenderError, SignalSender, WorkerError, WorkerSignal};

/// Outbound request to the I/O loop.
pub(super) enum Outbound {
	Update {
		text: String,
		written: oneshot::Sender<Result<(), WorkerError>>,
	},
	Shutdown,
}

/// How the worker's startup ended.
#[derive(Debug)]
pub(super) enum Startup {
	Ready,
	Failed(String),
	/// Stdout closed before the worker reported anything.
	Closed,
}

/// Runs the I/O loop for one worker process.
///
/// Outbound writes are handled in order. The loop ends on EOF, on a failed
/// write, or once the handle side of `outbound_rx` is gone.
pub(super) async fn run_worker_io(
	mut stdin: ChildStdin,
	stdout: ChildStdout,
	mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
	startup: oneshot::Sender<Startup>,
	signals: SignalSender,
	ready: Arc<AtomicBool>,
) {
	let generation = signals.generation();
	let mut lines = BufReader::new(stdout).lines();
	let mut startup = Some(startup);

	loop {
		tokio::select! {
			out = outbound_rx.recv() => match out {
				Some(Outbound::Update { text, written }) => {
					let result = write_message(&mut stdin, &HostMessage::Update { text }).await;
					let failed = result.is_err();
					let _ = written.send(result);
					if failed {
						warn!(generation, "preview.process.write_failed");
						break;
					}
				}
				Some(Outbound::Shutdown) => {
					if let Err(err) = write_message(&mut stdin, &HostMessage::Shutdown).await {
						debug!(generation, error = %err, "preview.process.shutdown_write_failed");
					}
				}
				None => break,
			},

			line = lines.next_line() => match line {
				Ok(Some(line)) => handle_line(generation, &line, &mut startup, &signals, &ready),
				Ok(None) => {
					debug!(generation, "preview.process.eof");
					break;
				}
				Err(err) => {
					warn!(generation, error = %err, "preview.process.read_failed");
					break;
				}
			},
		}
	}

	ready.store(false, Ordering::Release);
	if let Some(startup) = startup.take() {
		let _ = startup.send(Startup::Closed);
	}
	signals.send(WorkerSignal::ProcessExited);
}

fn handle_line(generation: u64, line: &str, startup: &mut Option<oneshot::Sender<Startup>>, signals: &SignalSender, ready: &AtomicBool) {
	if line.trim().is_empty() {
		return;
	}
	let message = match protocol::decode(line) {
		Ok(message) => message,
		Err(err) => {
			warn!(generation, error = %err, line, "preview.process.malformed_message");
			return;
		}
	};
	trace!(generation, ?message, "preview.process.message");

	match message {
		WorkerMessage::Ready => {
			if let Some(startup) = startup.take() {
				ready.store(true, Ordering::Release);
				let _ = startup.send(Startup::Ready);
			}
		}
		WorkerMessage::StartupFailed { message } => match startup.take() {
			Some(startup) => {
				let _ = startup.send(Startup::Failed(message));
			}
			None => warn!(generation, %message, "preview.process.late_startup_failure"),
		},
		WorkerMessage::Frame => {
			signals.send(WorkerSignal::FrameReceived);
		}
		WorkerMessage::Error { message, line } => {
			signals.send(WorkerSignal::ErrorChanged(Some(RenderError { message, line })));
		}
		WorkerMessage::ErrorCleared => {
			signals.send(WorkerSignal::ErrorChanged(None));
		}
	}
}

async fn write_message(stdin: &mut ChildStdin, message: &HostMessage) -> Result<(), WorkerError> {
	let line = protocol::encode(message)?;
	stdin.write_all(line.as_bytes()).await?;
	stdin.flush().await?;
	Ok(())
}

/// Forwards the worker's stderr to the log, one event per line.
pub(super) async fn forward_stderr(generation: u64, stderr: ChildStderr) {
	let mut lines = BufReader::new(stderr).lines();
	while let Ok(Some(line)) = lines.next_line().await {
		warn!(generation, line = %line, "preview.process.stderr");
	}
}
