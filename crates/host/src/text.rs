//! Document text source polling a file on disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use glance_worker::TaskClass;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Publishes the content of `path` on a watch channel, re-reading it every
/// `interval` until `cancel` fires.
///
/// The first read happens before returning so the receiver starts with the
/// current document.
pub async fn watch_document(path: &Path, interval: Duration, cancel: CancellationToken) -> anyhow::Result<watch::Receiver<String>> {
	let initial = tokio::fs::read_to_string(path)
		.await
		.with_context(|| format!("failed to read document {}", path.display()))?;
	let (tx, rx) = watch::channel(initial);
	glance_worker::spawn(TaskClass::Background, poll(path.to_path_buf(), interval, tx, cancel));
	Ok(rx)
}

async fn poll(path: PathBuf, interval: Duration, tx: watch::Sender<String>, cancel: CancellationToken) {
	let mut ticks = tokio::time::interval(interval);
	ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
	loop {
		tokio::select! {
			_ = cancel.cancelled() => break,
			_ = tx.closed() => break,
			_ = ticks.tick() => {}
		}

		match tokio::fs::read_to_string(&path).await {
			Ok(text) => {
				let changed = tx.send_if_modified(|current| {
					if *current == text {
						return false;
					}
					*current = text;
					true
				});
				if changed {
					debug!(path = %path.display(), "glance.document.changed");
				}
			}
			Err(err) => warn!(path = %path.display(), error = %err, "glance.document.read_failed"),
		}
	}
}
