//! Interactive commands read from stdin.

use std::str::FromStr;

use anyhow::{anyhow, bail};

/// One line of user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
	Pause,
	Resume,
	/// List the resolved run targets.
	Targets,
	/// Select a run target by its index in `targets` output.
	Select(usize),
	/// Re-read the project manifest and re-resolve targets.
	Reload,
	/// Drop cached completion metadata.
	Invalidate,
	Status,
	Help,
	Quit,
}

pub const HELP: &str = "commands: pause | resume | targets | select <n> | reload | invalidate | status | help | quit";

impl FromStr for HostCommand {
	type Err = anyhow::Error;

	fn from_str(line: &str) -> anyhow::Result<Self> {
		let mut words = line.split_whitespace();
		let Some(verb) = words.next() else {
			bail!("empty command");
		};
		let command = match verb.to_ascii_lowercase().as_str() {
			"pause" | "p" => Self::Pause,
			"resume" | "r" => Self::Resume,
			"targets" | "t" => Self::Targets,
			"select" | "s" => {
				let index = words.next().ok_or_else(|| anyhow!("select needs a target index"))?;
				Self::Select(index.parse().map_err(|_| anyhow!("invalid target index `{index}`"))?)
			}
			"reload" => Self::Reload,
			"invalidate" => Self::Invalidate,
			"status" => Self::Status,
			"help" | "?" => Self::Help,
			"quit" | "q" | "exit" => Self::Quit,
			other => bail!("unknown command `{other}`"),
		};
		if let Some(extra) = words.next() {
			bail!("unexpected argument `{extra}`");
		}
		Ok(command)
	}
}
