//! Completion metadata cache.
//!
//! One slot per session, keyed by the document it serves. Building metadata
//! from a run target's assembly is slow and left to a [`MetadataBuilder`];
//! the cache only decides when to build and whether a finished build is
//! still wanted. Missing metadata degrades completion but never fails the
//! session, so build errors are logged and dropped.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use glance_worker::TaskClass;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Opaque metadata handle handed to completion providers.
pub type CompletionMetadata = Arc<dyn Any + Send + Sync>;

/// Errors building completion metadata.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
	#[error("assembly not found: {}", path.display())]
	NotFound { path: PathBuf },
	#[error("failed to read assembly: {0}")]
	Io(#[from] std::io::Error),
	#[error("{0}")]
	Other(String),
}

/// Builds completion metadata from a run target's executable.
#[async_trait]
pub trait MetadataBuilder: Send + Sync + 'static {
	async fn build(&self, executable: &Path) -> Result<CompletionMetadata, MetadataError>;
}

#[derive(Default)]
struct Slot {
	document_key: Option<String>,
	metadata: Option<CompletionMetadata>,
	/// Cancels the build in flight, if any.
	in_flight: Option<CancellationToken>,
	/// Bumped on every invalidation; a build only lands if it still matches.
	epoch: u64,
}

impl Slot {
	fn clear(&mut self) {
		self.metadata = None;
		self.epoch = self.epoch.wrapping_add(1);
		if let Some(build) = self.in_flight.take() {
			build.cancel();
		}
	}
}

/// Single-slot cache of completion metadata.
pub struct MetadataCache {
	builder: Arc<dyn MetadataBuilder>,
	slot: Arc<Mutex<Slot>>,
	cancel: CancellationToken,
}

impl std::fmt::Debug for MetadataCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let slot = self.slot.lock();
		f.debug_struct("MetadataCache")
			.field("document_key", &slot.document_key)
			.field("cached", &slot.metadata.is_some())
			.field("building", &slot.in_flight.is_some())
			.field("epoch", &slot.epoch)
			.finish()
	}
}

impl MetadataCache {
	pub fn new(builder: Arc<dyn MetadataBuilder>) -> Self {
		Self {
			builder,
			slot: Arc::default(),
			cancel: CancellationToken::new(),
		}
	}

	pub fn get(&self) -> Option<CompletionMetadata> {
		self.slot.lock().metadata.clone()
	}

	pub fn document_key(&self) -> Option<String> {
		self.slot.lock().document_key.clone()
	}

	pub fn is_building(&self) -> bool {
		self.slot.lock().in_flight.is_some()
	}

	/// Binds the slot to `document_key`, clearing it if the key changed.
	pub fn rekey(&self, document_key: impl Into<String>) {
		let document_key = document_key.into();
		let mut slot = self.slot.lock();
		if slot.document_key.as_deref() == Some(document_key.as_str()) {
			return;
		}
		debug!(from = ?slot.document_key, to = %document_key, "preview.metadata.rekey");
		slot.clear();
		slot.document_key = Some(document_key);
	}

	/// Drops cached metadata and abandons any build in flight.
	pub fn invalidate(&self) {
		let mut slot = self.slot.lock();
		slot.clear();
		debug!(epoch = slot.epoch, "preview.metadata.invalidate");
	}

	/// Starts a background build from `executable` if the slot is empty and
	/// no build is running. Returns whether a build was started.
	///
	/// Must be called within a tokio runtime.
	pub fn ensure_built(&self, executable: &Path) -> bool {
		let (epoch, build) = {
			let mut slot = self.slot.lock();
			if self.cancel.is_cancelled() || slot.metadata.is_some() || slot.in_flight.is_some() {
				return false;
			}
			let build = self.cancel.child_token();
			slot.in_flight = Some(build.clone());
			(slot.epoch, build)
		};

		let builder = Arc::clone(&self.builder);
		let slot = Arc::clone(&self.slot);
		let executable = executable.to_path_buf();
		debug!(epoch, executable = %executable.display(), "preview.metadata.build");
		glance_worker::spawn(TaskClass::Background, async move {
			let result = tokio::select! {
				_ = build.cancelled() => {
					debug!(epoch, "preview.metadata.build_cancelled");
					return;
				}
				result = builder.build(&executable) => result,
			};

			let mut slot = slot.lock();
			if slot.epoch != epoch {
				debug!(epoch, current = slot.epoch, "preview.metadata.build_discarded");
				return;
			}
			slot.in_flight = None;
			match result {
				Ok(metadata) => {
					slot.metadata = Some(metadata);
					debug!(epoch, "preview.metadata.built");
				}
				Err(err) => {
					warn!(epoch, executable = %executable.display(), error = %err, "preview.metadata.build_failed");
				}
			}
		});
		true
	}

	/// Cancels every build and refuses new ones.
	pub fn dispose(&self) {
		self.cancel.cancel();
		self.slot.lock().clear();
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::test_support::{CountingMetadataBuilder, wait_until};

	fn cache(builder: &Arc<CountingMetadataBuilder>) -> MetadataCache {
		let builder: Arc<dyn MetadataBuilder> = builder.clone();
		MetadataCache::new(builder)
	}

	#[tokio::test]
	async fn builds_once_and_caches() {
		let builder = Arc::new(CountingMetadataBuilder::new());
		let cache = cache(&builder);

		assert!(cache.ensure_built(Path::new("/out/App")));
		assert!(!cache.ensure_built(Path::new("/out/App")));
		wait_until("metadata built", || cache.get().is_some()).await;
		assert!(!cache.ensure_built(Path::new("/out/App")));
		assert_eq!(builder.builds(), 1);

		let built = cache.get().unwrap();
		assert_eq!(built.downcast_ref::<PathBuf>(), Some(&PathBuf::from("/out/App")));
	}

	#[tokio::test]
	async fn invalidate_discards_in_flight_build() {
		let builder = Arc::new(CountingMetadataBuilder::new().with_delay(Duration::from_millis(50)));
		let cache = cache(&builder);

		cache.ensure_built(Path::new("/out/A"));
		cache.invalidate();
		assert!(!cache.is_building());
		tokio::time::sleep(Duration::from_millis(100)).await;
		assert!(cache.get().is_none());

		assert!(cache.ensure_built(Path::new("/out/B")));
		wait_until("rebuilt", || cache.get().is_some()).await;
		assert_eq!(cache.get().unwrap().downcast_ref::<PathBuf>(), Some(&PathBuf::from("/out/B")));
	}

	#[tokio::test]
	async fn build_failure_is_swallowed() {
		let builder = Arc::new(CountingMetadataBuilder::new());
		builder.set_failing(true);
		let cache = cache(&builder);

		cache.ensure_built(Path::new("/out/A"));
		wait_until("build settled", || !cache.is_building()).await;
		assert!(cache.get().is_none());

		builder.set_failing(false);
		assert!(cache.ensure_built(Path::new("/out/A")));
		wait_until("metadata built", || cache.get().is_some()).await;
	}

	#[tokio::test]
	async fn rekey_clears_only_on_identity_change() {
		let builder = Arc::new(CountingMetadataBuilder::new());
		let cache = cache(&builder);
		cache.rekey("/docs/Main.axaml");
		cache.ensure_built(Path::new("/out/A"));
		wait_until("metadata built", || cache.get().is_some()).await;

		cache.rekey("/docs/Main.axaml");
		assert!(cache.get().is_some());
		cache.rekey("/docs/Other.axaml");
		assert!(cache.get().is_none());
		assert_eq!(cache.document_key().as_deref(), Some("/docs/Other.axaml"));
	}

	#[tokio::test]
	async fn dispose_refuses_new_builds() {
		let builder = Arc::new(CountingMetadataBuilder::new());
		let cache = cache(&builder);
		cache.dispose();
		assert!(!cache.ensure_built(Path::new("/out/A")));
		assert_eq!(builder.builds(), 0);
	}
}
