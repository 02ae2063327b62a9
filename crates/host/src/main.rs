//! Glance preview host.
//!
//! Runs one live-preview session for a document on disk. The document is
//! polled for changes, the project graph comes from a TOML manifest and
//! display directives are printed to stdout. Commands are read from stdin,
//! one per line (`help` lists them).

mod commands;
mod display;
mod metadata;
mod projects;
mod text;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use glance_preview::{PreviewConfig, ProcessLauncher, Session, SessionDeps};
use glance_worker::TaskClass;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::commands::{HELP, HostCommand};
use crate::display::StdoutDisplay;
use crate::metadata::{AssemblyInfo, FileMetadataBuilder};
use crate::projects::FileProjectModel;

/// Host command line arguments.
#[derive(Parser, Debug)]
#[command(name = "glance")]
#[command(about = "Live preview of a markup document rendered by its project's executable")]
struct Args {
	/// Document to preview
	#[arg(value_name = "DOCUMENT")]
	document: PathBuf,

	/// Project that owns the document
	#[arg(short, long)]
	project: String,

	/// Project manifest
	#[arg(long, value_name = "PATH", default_value = "projects.toml")]
	projects: PathBuf,

	/// Preview config file
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// How often the document is re-read, in milliseconds
	#[arg(long, default_value_t = 100)]
	poll_ms: u64,

	/// Start paused
	#[arg(long)]
	paused: bool,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	let config = match &args.config {
		Some(path) => PreviewConfig::load(path)?,
		None => PreviewConfig::default(),
	};
	info!(document = %args.document.display(), project = %args.project, throttle_ms = config.throttle_ms, "starting glance");

	let projects = Arc::new(FileProjectModel::load(&args.projects)?);
	let shutdown = CancellationToken::new();
	let document = text::watch_document(&args.document, Duration::from_millis(args.poll_ms), shutdown.clone()).await?;

	let session = Session::new(
		config.clone(),
		SessionDeps {
			launcher: Arc::new(ProcessLauncher::new(config.worker.clone())),
			metadata: Arc::new(FileMetadataBuilder),
			display: Arc::new(StdoutDisplay),
			projects: projects.clone(),
		},
	);
	glance_worker::spawn(TaskClass::Background, print_states(session.subscribe_state()));

	if args.paused {
		session.set_paused(true).await?;
	}
	session
		.start(args.project.clone(), args.document.clone(), document)
		.await
		.context("failed to start preview session")?;
	println!("{HELP}");

	let result = run_commands(&session, &projects).await;

	session.dispose().await;
	shutdown.cancel();
	info!("glance stopped");
	result
}

/// Reads commands from stdin until `quit`, EOF or Ctrl-C.
async fn run_commands(session: &Session, projects: &FileProjectModel) -> anyhow::Result<()> {
	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	loop {
		let line = tokio::select! {
			_ = tokio::signal::ctrl_c() => return Ok(()),
			line = lines.next_line() => line.context("failed to read stdin")?,
		};
		let Some(line) = line else {
			return Ok(());
		};
		if line.trim().is_empty() {
			continue;
		}

		let command = match line.parse::<HostCommand>() {
			Ok(command) => command,
			Err(err) => {
				println!("{err}\n{HELP}");
				continue;
			}
		};
		if command == HostCommand::Quit {
			return Ok(());
		}
		if let Err(err) = execute(session, projects, command).await {
			println!("{err:#}");
		}
	}
}

async fn execute(session: &Session, projects: &FileProjectModel, command: HostCommand) -> anyhow::Result<()> {
	match command {
		HostCommand::Pause => session.set_paused(true).await?,
		HostCommand::Resume => session.set_paused(false).await?,
		HostCommand::Targets => {
			let selected = session.selected_target();
			for (index, target) in session.targets().iter().enumerate() {
				let marker = if selected.as_ref() == Some(target) { '*' } else { ' ' };
				println!("{marker} {index}: {target}");
			}
		}
		HostCommand::Select(index) => {
			let target = session
				.targets()
				.get(index)
				.cloned()
				.with_context(|| format!("no run target at index {index}"))?;
			session.select_target(target).await?;
		}
		HostCommand::Reload => {
			projects.reload()?;
			session.notify_graph_changed().await?;
		}
		HostCommand::Invalidate => session.invalidate_completion_metadata(),
		HostCommand::Status => print_status(session),
		HostCommand::Help => println!("{HELP}"),
		HostCommand::Quit => {}
	}
	Ok(())
}

fn print_status(session: &Session) {
	println!("state: {}", session.state());
	println!("paused: {}", session.is_paused());
	match session.selected_target() {
		Some(target) => println!("target: {target}"),
		None => println!("target: none"),
	}

	let metadata = session.completion_metadata();
	match metadata.as_deref().and_then(|m| m.downcast_ref::<AssemblyInfo>()) {
		Some(info) => {
			let age = info
				.modified
				.and_then(|modified| modified.elapsed().ok())
				.map(|age| format!(", built {}s ago", age.as_secs()))
				.unwrap_or_default();
			println!("metadata: {} ({} bytes{age})", info.path.display(), info.len);
		}
		None => println!("metadata: not built"),
	}
}

async fn print_states(mut states: tokio::sync::watch::Receiver<glance_preview::SessionState>) {
	while states.changed().await.is_ok() {
		let state = states.borrow_and_update().clone();
		println!("[state] {state}");
	}
}

fn setup_tracing(verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::prelude::*;

	let filter = EnvFilter::try_from_env("GLANCE_LOG")
		.or_else(|_| EnvFilter::try_from_default_env())
		.unwrap_or_else(|_| {
			if verbose {
				EnvFilter::new("glance=trace,glance_preview=trace,debug")
			} else {
				EnvFilter::new("glance=debug,glance_preview=debug,info")
			}
		});

	if let Some(log_dir) = std::env::var("GLANCE_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("glance.{}.log", std::process::id()));

		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let file_layer = tracing_subscriber::fmt::layer().with_writer(file).with_ansi(false).with_target(true);

			tracing_subscriber::registry().with(filter).with(file_layer).init();

			info!(path = ?log_path, "glance tracing initialized");
			return;
		}
	}

	// Stderr keeps stdout free for directives.
	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.init();
}
