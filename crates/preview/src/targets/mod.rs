//! Run target resolution.
//!
//! A document can be previewed through any runnable output of its own
//! project, or of a project referencing it, as long as that project also
//! references the rendering support library. [`TargetResolver`] computes that
//! set from a [`ProjectGraph`] snapshot and merges it with what it resolved
//! before, so a target that drops out of one transient snapshot is not lost.
//!
//! Ordering is the same everywhere: the document's own project first, then by
//! name, then by the target's string form.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(test)]
mod tests;

/// A candidate executable able to host the worker for a document.
///
/// Equality and hashing consider only the name and executable path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTarget {
	name: String,
	executable_path: PathBuf,
	is_containing_project: bool,
}

impl RunTarget {
	pub fn new(name: impl Into<String>, executable_path: impl Into<PathBuf>, is_containing_project: bool) -> Self {
		Self {
			name: name.into(),
			executable_path: executable_path.into(),
			is_containing_project,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn executable_path(&self) -> &Path {
		&self.executable_path
	}

	/// Whether the target belongs to the document's own project.
	pub fn is_containing_project(&self) -> bool {
		self.is_containing_project
	}
}

impl PartialEq for RunTarget {
	fn eq(&self, other: &Self) -> bool {
		self.name == other.name && self.executable_path == other.executable_path
	}
}

impl Eq for RunTarget {}

impl Hash for RunTarget {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.name.hash(state);
		self.executable_path.hash(state);
	}
}

impl std::fmt::Display for RunTarget {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} ({})", self.name, self.executable_path.display())
	}
}

/// Target set ordering: containing project first, then name, then string form.
pub fn compare_targets(a: &RunTarget, b: &RunTarget) -> Ordering {
	b.is_containing_project
		.cmp(&a.is_containing_project)
		.then_with(|| a.name.cmp(&b.name))
		.then_with(|| a.to_string().cmp(&b.to_string()))
}

/// One project as seen by the build model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
	pub name: String,
	/// Names of projects this project references.
	#[serde(default)]
	pub project_references: BTreeSet<String>,
	/// Names of assemblies this project references.
	#[serde(default)]
	pub referenced_assemblies: BTreeSet<String>,
	/// Runnable outputs by output key (e.g. target framework).
	#[serde(default)]
	pub runnable_outputs: BTreeMap<String, PathBuf>,
}

impl ProjectSnapshot {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Self::default()
		}
	}

	pub fn references_project(mut self, project: impl Into<String>) -> Self {
		self.project_references.insert(project.into());
		self
	}

	pub fn references_assembly(mut self, assembly: impl Into<String>) -> Self {
		self.referenced_assemblies.insert(assembly.into());
		self
	}

	pub fn output(mut self, key: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
		self.runnable_outputs.insert(key.into(), executable.into());
		self
	}
}

/// Read-only snapshot of every known project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectGraph {
	#[serde(default, rename = "project")]
	pub projects: Vec<ProjectSnapshot>,
}

impl ProjectGraph {
	pub fn new(projects: impl IntoIterator<Item = ProjectSnapshot>) -> Self {
		Self {
			projects: projects.into_iter().collect(),
		}
	}

	pub fn project(&self, name: &str) -> Option<&ProjectSnapshot> {
		self.projects.iter().find(|p| p.name == name)
	}
}

/// Source of project graph snapshots.
pub trait ProjectModel: Send + Sync {
	fn snapshot(&self) -> ProjectGraph;
}

impl ProjectModel for ProjectGraph {
	fn snapshot(&self) -> ProjectGraph {
		self.clone()
	}
}

/// Targets offered for selection, and the current pick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSelection {
	pub targets: Vec<RunTarget>,
	pub selected: Option<RunTarget>,
}

impl TargetSelection {
	pub fn contains(&self, target: &RunTarget) -> bool {
		self.targets.contains(target)
	}
}

/// Targets the graph offers for `owner`, ordered and deduplicated.
pub fn candidate_targets(owner: &str, graph: &ProjectGraph, support_library: &str) -> Vec<RunTarget> {
	let mut candidates: Vec<&ProjectSnapshot> = graph
		.projects
		.iter()
		.filter(|p| (p.name == owner || p.project_references.contains(owner)) && p.referenced_assemblies.contains(support_library))
		.collect();
	candidates.sort_by(|a, b| (b.name == owner).cmp(&(a.name == owner)).then_with(|| a.name.cmp(&b.name)));

	let mut targets: Vec<RunTarget> = Vec::new();
	for project in candidates {
		for (key, executable) in &project.runnable_outputs {
			let target = RunTarget::new(format!("{} [{}]", project.name, key), executable, project.name == owner);
			if !targets.contains(&target) {
				targets.push(target);
			}
		}
	}
	targets
}

/// Picks the target to use after the target set changed.
///
/// Keeps `current` while it is still offered, otherwise falls back to the
/// first target.
pub fn reselect(current: Option<&RunTarget>, targets: &[RunTarget]) -> Option<RunTarget> {
	match current {
		Some(current) if targets.contains(current) => Some(current.clone()),
		_ => targets.first().cloned(),
	}
}

#[derive(Debug, Clone)]
struct Tracked {
	target: RunTarget,
	/// Consecutive passes this target was missing from the graph.
	misses: u32,
}

/// Stateful resolver merging each pass with the previous target set.
#[derive(Debug, Clone)]
pub struct TargetResolver {
	support_library: String,
	stale_passes: u32,
	known: Vec<Tracked>,
}

impl TargetResolver {
	pub fn new(support_library: impl Into<String>, stale_passes: u32) -> Self {
		Self {
			support_library: support_library.into(),
			stale_passes,
			known: Vec::new(),
		}
	}

	/// Resolves targets for `owner` and merges them with earlier passes.
	///
	/// A target missing from more than `stale_passes` consecutive snapshots
	/// is dropped.
	pub fn resolve(&mut self, owner: &str, graph: &ProjectGraph) -> Vec<RunTarget> {
		let fresh = candidate_targets(owner, graph, &self.support_library);

		let mut merged: Vec<Tracked> = fresh.iter().cloned().map(|target| Tracked { target, misses: 0 }).collect();
		for old in self.known.drain(..) {
			if fresh.contains(&old.target) {
				continue;
			}
			let misses = old.misses.saturating_add(1);
			if misses > self.stale_passes {
				debug!(run_target = %old.target, misses, "preview.targets.expired");
				continue;
			}
			merged.push(Tracked { target: old.target, misses });
		}
		merged.sort_by(|a, b| compare_targets(&a.target, &b.target));

		self.known = merged;
		self.targets()
	}

	/// The merged target set from the last pass.
	pub fn targets(&self) -> Vec<RunTarget> {
		self.known.iter().map(|t| t.target.clone()).collect()
	}

	/// Forgets everything resolved so far.
	pub fn reset(&mut self) {
		self.known.clear();
	}
}
