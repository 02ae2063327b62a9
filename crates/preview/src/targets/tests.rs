use std::collections::HashSet;

use pretty_assertions::assert_eq;

use super::*;

const SUPPORT: &str = "Avalonia";

fn app() -> ProjectSnapshot {
	ProjectSnapshot::new("App").references_assembly(SUPPORT).output("net8.0", "/out/App/net8.0/App")
}

fn names(targets: &[RunTarget]) -> Vec<&str> {
	targets.iter().map(RunTarget::name).collect()
}

#[test]
fn owner_targets_sort_before_referencing_projects() {
	let graph = ProjectGraph::new([
		ProjectSnapshot::new("Zeta.Host")
			.references_project("App")
			.references_assembly(SUPPORT)
			.output("net8.0", "/out/Zeta/Zeta"),
		ProjectSnapshot::new("Alpha.Host")
			.references_project("App")
			.references_assembly(SUPPORT)
			.output("net8.0", "/out/Alpha/Alpha"),
		app().output("net6.0", "/out/App/net6.0/App"),
	]);

	let targets = candidate_targets("App", &graph, SUPPORT);
	assert_eq!(names(&targets), vec!["App [net6.0]", "App [net8.0]", "Alpha.Host [net8.0]", "Zeta.Host [net8.0]"]);
	assert!(targets[0].is_containing_project());
	assert!(targets[1].is_containing_project());
	assert!(!targets[2].is_containing_project());
}

#[test]
fn projects_without_support_library_or_reference_are_skipped() {
	let graph = ProjectGraph::new([
		app(),
		ProjectSnapshot::new("Console").references_project("App").output("net8.0", "/out/Console"),
		ProjectSnapshot::new("Unrelated").references_assembly(SUPPORT).output("net8.0", "/out/Unrelated"),
	]);

	let targets = candidate_targets("App", &graph, SUPPORT);
	assert_eq!(names(&targets), vec!["App [net8.0]"]);
}

#[test]
fn owner_without_outputs_yields_nothing() {
	let graph = ProjectGraph::new([ProjectSnapshot::new("Lib").references_assembly(SUPPORT)]);
	assert!(candidate_targets("Lib", &graph, SUPPORT).is_empty());
}

#[test]
fn equality_ignores_containing_flag() {
	let a = RunTarget::new("App [net8.0]", "/out/App", true);
	let b = RunTarget::new("App [net8.0]", "/out/App", false);
	let c = RunTarget::new("App [net8.0]", "/out/Other", true);
	assert_eq!(a, b);
	assert_ne!(a, c);

	let set: HashSet<_> = [a, b, c].into_iter().collect();
	assert_eq!(set.len(), 2);
}

#[test]
fn resolve_never_yields_duplicates() {
	let mut resolver = TargetResolver::new(SUPPORT, 3);
	let graph = ProjectGraph::new([
		app(),
		ProjectSnapshot::new("Host")
			.references_project("App")
			.references_assembly(SUPPORT)
			.output("net8.0", "/out/Host"),
	]);

	for _ in 0..4 {
		let targets = resolver.resolve("App", &graph);
		let unique: HashSet<_> = targets.iter().collect();
		assert_eq!(unique.len(), targets.len());
		assert_eq!(targets.len(), 2);
	}
}

#[test]
fn missing_target_survives_transient_snapshot_then_expires() {
	let mut resolver = TargetResolver::new(SUPPORT, 1);
	let host = ProjectSnapshot::new("Host")
		.references_project("App")
		.references_assembly(SUPPORT)
		.output("net8.0", "/out/Host");
	let full = ProjectGraph::new([app(), host.clone()]);
	let partial = ProjectGraph::new([app()]);

	assert_eq!(resolver.resolve("App", &full).len(), 2);
	assert_eq!(names(&resolver.resolve("App", &partial)), vec!["App [net8.0]", "Host [net8.0]"]);
	assert_eq!(names(&resolver.resolve("App", &full)), vec!["App [net8.0]", "Host [net8.0]"]);

	resolver.resolve("App", &partial);
	assert_eq!(names(&resolver.resolve("App", &partial)), vec!["App [net8.0]"]);
}

#[test]
fn zero_stale_passes_tracks_latest_graph_only() {
	let mut resolver = TargetResolver::new(SUPPORT, 0);
	resolver.resolve("App", &ProjectGraph::new([app().output("net6.0", "/out/App6")]));
	let targets = resolver.resolve("App", &ProjectGraph::new([app()]));
	assert_eq!(names(&targets), vec!["App [net8.0]"]);
}

#[test]
fn retained_targets_keep_global_ordering() {
	let mut resolver = TargetResolver::new(SUPPORT, 5);
	let b_host = ProjectSnapshot::new("B")
		.references_project("App")
		.references_assembly(SUPPORT)
		.output("net8.0", "/out/B");
	let a_host = ProjectSnapshot::new("A")
		.references_project("App")
		.references_assembly(SUPPORT)
		.output("net8.0", "/out/A");

	resolver.resolve("App", &ProjectGraph::new([b_host, app()]));
	let targets = resolver.resolve("App", &ProjectGraph::new([a_host, app()]));
	assert_eq!(names(&targets), vec!["App [net8.0]", "A [net8.0]", "B [net8.0]"]);
}

#[test]
fn ties_on_name_break_by_string_form() {
	let mut targets = vec![RunTarget::new("Host [x]", "/b", false), RunTarget::new("Host [x]", "/a", false)];
	targets.sort_by(compare_targets);
	assert_eq!(targets[0].executable_path(), Path::new("/a"));
}

#[test]
fn reselect_keeps_present_selection() {
	let targets = vec![RunTarget::new("A", "/a", true), RunTarget::new("B", "/b", false)];
	assert_eq!(reselect(Some(&targets[1]), &targets), Some(targets[1].clone()));
}

#[test]
fn reselect_falls_back_to_first_or_none() {
	let gone = RunTarget::new("Gone", "/gone", false);
	let targets = vec![RunTarget::new("A", "/a", true)];
	assert_eq!(reselect(Some(&gone), &targets), Some(targets[0].clone()));
	assert_eq!(reselect(None, &targets), Some(targets[0].clone()));
	assert_eq!(reselect(Some(&gone), &[]), None);
}

#[test]
fn graph_deserializes_from_toml() {
	let graph: ProjectGraph = toml::from_str(
		r#"
		[[project]]
		name = "App"
		referenced_assemblies = ["Avalonia"]
		runnable_outputs = { "net8.0" = "/out/App" }

		[[project]]
		name = "Host"
		project_references = ["App"]
		"#,
	)
	.unwrap();

	assert_eq!(graph.projects.len(), 2);
	assert_eq!(graph.project("App").map(|p| p.runnable_outputs.len()), Some(1));
	assert!(graph.project("Host").is_some_and(|p| p.project_references.contains("App")));
}
