//! Project graph read from a TOML manifest.
//!
//! ```toml
//! [[project]]
//! name = "App"
//! referenced_assemblies = ["Avalonia"]
//! runnable_outputs = { "net8.0" = "bin/Debug/net8.0/App" }
//!
//! [[project]]
//! name = "App.Desktop"
//! project_references = ["App"]
//! referenced_assemblies = ["Avalonia"]
//! runnable_outputs = { "net8.0" = "desktop/bin/Debug/net8.0/App.Desktop" }
//! ```
//!
//! Relative output paths are resolved against the manifest's directory.

use std::path::{Path, PathBuf};

use anyhow::Context;
use glance_preview::{ProjectGraph, ProjectModel};
use parking_lot::RwLock;
use tracing::info;

/// [`ProjectModel`] backed by a manifest file, re-read on [`reload`].
///
/// [`reload`]: FileProjectModel::reload
#[derive(Debug)]
pub struct FileProjectModel {
	path: PathBuf,
	graph: RwLock<ProjectGraph>,
}

impl FileProjectModel {
	pub fn load(path: &Path) -> anyhow::Result<Self> {
		let graph = read_manifest(path)?;
		Ok(Self {
			path: path.to_path_buf(),
			graph: RwLock::new(graph),
		})
	}

	/// Re-reads the manifest. The previous graph is kept if reading fails.
	pub fn reload(&self) -> anyhow::Result<()> {
		let graph = read_manifest(&self.path)?;
		info!(path = %self.path.display(), projects = graph.projects.len(), "glance.projects.reloaded");
		*self.graph.write() = graph;
		Ok(())
	}
}

impl ProjectModel for FileProjectModel {
	fn snapshot(&self) -> ProjectGraph {
		self.graph.read().clone()
	}
}

fn read_manifest(path: &Path) -> anyhow::Result<ProjectGraph> {
	let text = std::fs::read_to_string(path).with_context(|| format!("failed to read project manifest {}", path.display()))?;
	let mut graph: ProjectGraph = toml::from_str(&text).with_context(|| format!("failed to parse project manifest {}", path.display()))?;

	let base = path.parent().unwrap_or_else(|| Path::new(""));
	for project in &mut graph.projects {
		for executable in project.runnable_outputs.values_mut() {
			if executable.is_relative() {
				*executable = base.join(&*executable);
			}
		}
	}
	Ok(graph)
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	const MANIFEST: &str = r#"
[[project]]
name = "App"
referenced_assemblies = ["Avalonia"]
runnable_outputs = { "net8.0" = "bin/App" }
"#;

	#[test]
	fn resolves_relative_outputs_against_manifest_dir() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("projects.toml");
		std::fs::write(&path, MANIFEST).unwrap();

		let model = FileProjectModel::load(&path).unwrap();
		let graph = model.snapshot();
		let app = graph.project("App").unwrap();
		assert_eq!(app.runnable_outputs.get("net8.0"), Some(&dir.path().join("bin/App")));
	}

	#[test]
	fn failed_reload_keeps_previous_graph() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("projects.toml");
		std::fs::write(&path, MANIFEST).unwrap();
		let model = FileProjectModel::load(&path).unwrap();

		std::fs::write(&path, "[[project]]\nname = 3\n").unwrap();
		assert!(model.reload().is_err());
		assert_eq!(model.snapshot().projects.len(), 1);

		std::fs::write(&path, format!("{MANIFEST}\n[[project]]\nname = \"Lib\"\n")).unwrap();
		model.reload().unwrap();
		assert_eq!(model.snapshot().projects.len(), 2);
	}
}
