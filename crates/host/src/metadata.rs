//! Completion metadata taken from the run target's file on disk.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use glance_preview::{CompletionMetadata, MetadataBuilder, MetadataError};

/// What the host knows about a built assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyInfo {
	pub path: PathBuf,
	pub len: u64,
	pub modified: Option<SystemTime>,
}

/// Builds [`AssemblyInfo`] from file metadata.
#[derive(Debug, Default)]
pub struct FileMetadataBuilder;

#[async_trait]
impl MetadataBuilder for FileMetadataBuilder {
	async fn build(&self, executable: &Path) -> Result<CompletionMetadata, MetadataError> {
		let meta = tokio::fs::metadata(executable).await.map_err(|err| match err.kind() {
			ErrorKind::NotFound => MetadataError::NotFound {
				path: executable.to_path_buf(),
			},
			_ => MetadataError::Io(err),
		})?;
		Ok(Arc::new(AssemblyInfo {
			path: executable.to_path_buf(),
			len: meta.len(),
			modified: meta.modified().ok(),
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn reads_file_metadata() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("App");
		std::fs::write(&path, b"assembly").unwrap();

		let metadata = FileMetadataBuilder.build(&path).await.unwrap();
		let info = metadata.downcast_ref::<AssemblyInfo>().unwrap();
		assert_eq!(info.path, path);
		assert_eq!(info.len, 8);
	}

	#[tokio::test]
	async fn missing_file_is_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let result = FileMetadataBuilder.build(&dir.path().join("missing")).await;
		assert!(matches!(result, Err(MetadataError::NotFound { .. })));
	}
}
