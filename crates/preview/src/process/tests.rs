use std::path::PathBuf;

use glance_worker::{GenerationClock, GenerationToken};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::*;
use crate::config::PreviewConfig;
use crate::worker::{RenderError, SignalEnvelope, WorkerSignal};

/// Replies to every update with a frame, or with a render error when the
/// update mentions `Broken`.
const ECHO_WORKER: &str = r#"
echo '{"type":"ready"}'
while IFS= read -r line; do
	case "$line" in
		*'"shutdown"'*) exit 0 ;;
		*Broken*) echo '{"type":"error","message":"unknown element Broken","line":2}' ;;
		*) echo '{"type":"frame"}'; echo '{"type":"error_cleared"}' ;;
	esac
done
"#;

fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
	let path = dir.path().join(name);
	std::fs::write(&path, body).unwrap();
	path
}

fn launcher(ready_timeout_secs: u64) -> ProcessLauncher {
	ProcessLauncher::new(WorkerConfig {
		command: Some("sh".into()),
		args: vec!["{executable}".into()],
		ready_timeout_secs,
		..WorkerConfig::default()
	})
}

fn signals() -> (SignalSender, GenerationToken, mpsc::UnboundedReceiver<SignalEnvelope>) {
	let token = GenerationToken::mint(&GenerationClock::new());
	let (tx, rx) = mpsc::unbounded_channel();
	(SignalSender::new(token.child(), tx), token, rx)
}

async fn next_signal(rx: &mut mpsc::UnboundedReceiver<SignalEnvelope>) -> WorkerSignal {
	timeout(Duration::from_secs(5), rx.recv())
		.await
		.expect("timed out waiting for signal")
		.expect("signal channel closed")
		.signal
}

#[tokio::test]
async fn missing_executable_is_not_found() {
	let dir = tempfile::tempdir().unwrap();
	let (sink, _token, _rx) = signals();
	let missing = dir.path().join("App");

	match launcher(5).launch(&missing, sink).await {
		Err(StartError::NotFound { path }) => assert_eq!(path, missing),
		Err(other) => panic!("expected NotFound, got {other:?}"),
		Ok(_) => panic!("expected NotFound, got a worker"),
	}
}

#[tokio::test]
async fn updates_produce_frames_and_errors() {
	let dir = tempfile::tempdir().unwrap();
	let exe = script(&dir, "echo.sh", ECHO_WORKER);
	let (sink, _token, mut rx) = signals();

	let worker = launcher(5).launch(&exe, sink).await.unwrap();
	assert!(worker.is_ready());

	worker.update("<Window/>").await.unwrap();
	assert_eq!(next_signal(&mut rx).await, WorkerSignal::FrameReceived);
	assert_eq!(next_signal(&mut rx).await, WorkerSignal::ErrorChanged(None));

	worker.update("<Broken/>").await.unwrap();
	assert_eq!(
		next_signal(&mut rx).await,
		WorkerSignal::ErrorChanged(Some(RenderError::new("unknown element Broken").at_line(2)))
	);

	worker.stop().await;
	assert!(!worker.is_ready());
	assert!(worker.update("late").await.is_err());
	worker.stop().await;
}

#[tokio::test]
async fn startup_failure_is_application_error_then_exit() {
	let dir = tempfile::tempdir().unwrap();
	let exe = script(&dir, "fail.sh", "echo '{\"type\":\"startup_failed\",\"message\":\"no display\"}'\nsleep 30\n");
	let (sink, _token, mut rx) = signals();

	match launcher(5).launch(&exe, sink).await {
		Err(StartError::Application(message)) => assert_eq!(message, "no display"),
		Err(other) => panic!("expected Application, got {other:?}"),
		Ok(_) => panic!("expected Application, got a worker"),
	}
	assert_eq!(next_signal(&mut rx).await, WorkerSignal::ProcessExited);
}

#[tokio::test]
async fn exit_before_ready_is_application_error() {
	let dir = tempfile::tempdir().unwrap();
	let exe = script(&dir, "exit.sh", "echo 'starting' >&2\nexit 3\n");
	let (sink, _token, mut rx) = signals();

	let result = launcher(5).launch(&exe, sink).await;
	assert!(matches!(result, Err(StartError::Application(_))));
	assert_eq!(next_signal(&mut rx).await, WorkerSignal::ProcessExited);
}

#[tokio::test]
async fn silent_worker_times_out() {
	let dir = tempfile::tempdir().unwrap();
	let exe = script(&dir, "silent.sh", "sleep 30\n");
	let (sink, _token, _rx) = signals();

	let result = launcher(1).launch(&exe, sink).await;
	assert!(matches!(result, Err(StartError::Other(_))));
}

#[tokio::test]
async fn crash_after_ready_signals_exit() {
	let dir = tempfile::tempdir().unwrap();
	let exe = script(&dir, "crash.sh", "echo '{\"type\":\"ready\"}'\nread -r line\nexit 1\n");
	let (sink, _token, mut rx) = signals();

	let worker = launcher(5).launch(&exe, sink).await.unwrap();
	let _ = worker.update("<Window/>").await;
	assert_eq!(next_signal(&mut rx).await, WorkerSignal::ProcessExited);
	assert!(!worker.is_ready());
}

#[tokio::test]
async fn detached_worker_signals_are_dropped() {
	let dir = tempfile::tempdir().unwrap();
	let exe = script(&dir, "echo.sh", ECHO_WORKER);
	let (sink, token, mut rx) = signals();

	let worker = launcher(5).launch(&exe, sink).await.unwrap();
	token.cancel();
	worker.update("<Window/>").await.unwrap();
	worker.stop().await;

	let received = timeout(Duration::from_millis(200), rx.recv()).await;
	assert!(!matches!(received, Ok(Some(_))), "detached worker leaked {received:?}");
}

#[tokio::test]
async fn worker_runs_in_executable_directory() {
	let dir = tempfile::tempdir().unwrap();
	std::fs::write(dir.path().join("marker"), "").unwrap();
	let exe = script(
		&dir,
		"cwd.sh",
		"if [ -f marker ]; then echo '{\"type\":\"ready\"}'; else echo '{\"type\":\"startup_failed\",\"message\":\"wrong dir\"}'; fi\nread -r line\n",
	);
	let (sink, _token, _rx) = signals();

	let worker = launcher(5).launch(&exe, sink).await.unwrap();
	worker.stop().await;
}

#[tokio::test]
async fn default_config_waits_for_a_slow_worker() {
	let dir = tempfile::tempdir().unwrap();
	let exe = script(&dir, "slow.sh", "sleep 1\necho '{\"type\":\"ready\"}'\nread -r line\n");
	let (sink, _token, _rx) = signals();
	let launcher = ProcessLauncher::new(WorkerConfig {
		command: Some("sh".into()),
		args: vec!["{executable}".into()],
		..PreviewConfig::default().worker
	});

	let worker = launcher.launch(&exe, sink).await.unwrap();
	assert!(worker.is_ready());
	worker.stop().await;
}
