//! Session configuration loaded from TOML.
//!
//! ```toml
//! throttle_ms = 300
//! support_library = "Avalonia"
//!
//! [targets]
//! stale_passes = 1
//!
//! [worker]
//! command = "dotnet"
//! args = ["exec", "--runtimeconfig", "app.runtimeconfig.json", "{executable}"]
//! ready_timeout_secs = 30
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder in [`WorkerConfig::args`] replaced by the run target's executable.
pub const EXECUTABLE_PLACEHOLDER: &str = "{executable}";

/// Errors loading a [`PreviewConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to parse config: {0}")]
	Parse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level preview configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewConfig {
	/// Minimum interval between document pushes, in milliseconds.
	#[serde(default = "default_throttle_ms")]
	pub throttle_ms: u64,
	/// Assembly a project must reference to be a preview candidate.
	#[serde(default = "default_support_library")]
	pub support_library: String,
	#[serde(default)]
	pub targets: TargetsConfig,
	#[serde(default)]
	pub worker: WorkerConfig,
}

/// Run target resolution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetsConfig {
	/// Consecutive resolver passes a target may be missing from the project
	/// graph before it is dropped. `0` keeps only targets in the latest graph.
	#[serde(default = "default_stale_passes")]
	pub stale_passes: u32,
}

/// How worker processes are spawned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
	/// Host program. When unset the run target's executable is spawned directly.
	#[serde(default)]
	pub command: Option<String>,
	/// Arguments; `{executable}` is replaced by the run target's executable.
	#[serde(default)]
	pub args: Vec<String>,
	/// Extra environment variables.
	#[serde(default)]
	pub env: HashMap<String, String>,
	/// How long a worker may take to report readiness, in seconds.
	#[serde(default = "default_ready_timeout")]
	pub ready_timeout_secs: u64,
}

fn default_throttle_ms() -> u64 {
	300
}

fn default_support_library() -> String {
	"Avalonia".to_string()
}

fn default_stale_passes() -> u32 {
	1
}

fn default_ready_timeout() -> u64 {
	30
}

impl Default for PreviewConfig {
	fn default() -> Self {
		Self {
			throttle_ms: default_throttle_ms(),
			support_library: default_support_library(),
			targets: TargetsConfig::default(),
			worker: WorkerConfig::default(),
		}
	}
}

impl Default for TargetsConfig {
	fn default() -> Self {
		Self {
			stale_passes: default_stale_passes(),
		}
	}
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			command: None,
			args: Vec::new(),
			env: HashMap::new(),
			ready_timeout_secs: default_ready_timeout(),
		}
	}
}

impl PreviewConfig {
	/// Reads and parses a config file.
	pub fn load(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml(&text)
	}

	pub fn from_toml(text: &str) -> Result<Self> {
		Ok(toml::from_str(text)?)
	}

	pub fn throttle_window(&self) -> Duration {
		Duration::from_millis(self.throttle_ms)
	}
}

impl WorkerConfig {
	pub fn ready_timeout(&self) -> Duration {
		Duration::from_secs(self.ready_timeout_secs)
	}

	/// Program and arguments for a worker bound to `executable`.
	///
	/// With a host `command` and no `{executable}` placeholder, the executable
	/// is appended as the last argument.
	pub fn command_line(&self, executable: &Path) -> (PathBuf, Vec<String>) {
		let exe = executable.to_string_lossy();
		let mut args: Vec<String> = self.args.iter().map(|arg| arg.replace(EXECUTABLE_PLACEHOLDER, &exe)).collect();
		match &self.command {
			Some(command) => {
				if !self.args.iter().any(|arg| arg.contains(EXECUTABLE_PLACEHOLDER)) {
					args.push(exe.into_owned());
				}
				(PathBuf::from(command), args)
			}
			None => (executable.to_path_buf(), args),
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_document_uses_defaults() {
		let config = PreviewConfig::from_toml("").unwrap();
		assert_eq!(config, PreviewConfig::default());
		assert_eq!(config.throttle_window(), Duration::from_millis(300));
		assert_eq!(config.worker.ready_timeout(), Duration::from_secs(30));
	}

	#[test]
	fn worker_table_without_timeout_keeps_default_timeout() {
		assert_eq!(WorkerConfig::default().ready_timeout_secs, 30);
		let config = PreviewConfig::from_toml("[worker]\ncommand = \"dotnet\"\n").unwrap();
		assert_eq!(config.worker.ready_timeout(), Duration::from_secs(30));
		assert_eq!(config.worker.command.as_deref(), Some("dotnet"));
	}

	#[test]
	fn parses_full_document() {
		let config = PreviewConfig::from_toml(
			r#"
			throttle_ms = 50
			support_library = "Designer.Support"

			[targets]
			stale_passes = 0

			[worker]
			command = "dotnet"
			args = ["exec", "{executable}", "--preview"]
			env = { PREVIEW = "1" }
			ready_timeout_secs = 5
			"#,
		)
		.unwrap();

		assert_eq!(config.throttle_ms, 50);
		assert_eq!(config.support_library, "Designer.Support");
		assert_eq!(config.targets.stale_passes, 0);
		assert_eq!(config.worker.command.as_deref(), Some("dotnet"));
		assert_eq!(config.worker.env.get("PREVIEW").map(String::as_str), Some("1"));
		assert_eq!(config.worker.ready_timeout_secs, 5);
	}

	#[test]
	fn rejects_malformed_document() {
		assert!(matches!(PreviewConfig::from_toml("throttle_ms = \"fast\""), Err(ConfigError::Parse(_))));
	}

	#[test]
	fn load_reports_missing_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("missing.toml");
		match PreviewConfig::load(&path) {
			Err(ConfigError::Read { path: reported, .. }) => assert_eq!(reported, path),
			other => panic!("expected read error, got {other:?}"),
		}
	}

	#[test]
	fn command_line_substitutes_placeholder() {
		let worker = WorkerConfig {
			command: Some("dotnet".into()),
			args: vec!["exec".into(), "{executable}".into()],
			..WorkerConfig::default()
		};
		let (program, args) = worker.command_line(Path::new("/out/App.dll"));
		assert_eq!(program, PathBuf::from("dotnet"));
		assert_eq!(args, vec!["exec".to_string(), "/out/App.dll".to_string()]);
	}

	#[test]
	fn command_line_appends_executable_to_host_command() {
		let worker = WorkerConfig {
			command: Some("host".into()),
			args: vec!["--quiet".into()],
			..WorkerConfig::default()
		};
		let (_, args) = worker.command_line(Path::new("/out/App"));
		assert_eq!(args, vec!["--quiet".to_string(), "/out/App".to_string()]);
	}

	#[test]
	fn command_line_runs_executable_directly_without_command() {
		let (program, args) = WorkerConfig::default().command_line(Path::new("/out/App"));
		assert_eq!(program, PathBuf::from("/out/App"));
		assert!(args.is_empty());
	}
}
