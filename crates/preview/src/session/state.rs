use crate::error::FailureReason;

/// Lifecycle state of a preview session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
	/// Not started yet, or disposed.
	#[default]
	Stopped,
	/// A worker start was attempted and no frame has arrived yet.
	Starting,
	/// The worker produced at least one frame.
	Running,
	/// Paused by the user; no worker is running.
	Paused,
	Failed(FailureReason),
}

impl SessionState {
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Stopped => "stopped",
			Self::Starting => "starting",
			Self::Running => "running",
			Self::Paused => "paused",
			Self::Failed(_) => "failed",
		}
	}

	/// Starting or running.
	pub const fn is_active(&self) -> bool {
		matches!(self, Self::Starting | Self::Running)
	}

	pub const fn is_failed(&self) -> bool {
		matches!(self, Self::Failed(_))
	}

	pub fn failure(&self) -> Option<&FailureReason> {
		match self {
			Self::Failed(reason) => Some(reason),
			_ => None,
		}
	}
}

impl std::fmt::Display for SessionState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Failed(reason) => write!(f, "failed ({reason})"),
			other => f.write_str(other.as_str()),
		}
	}
}
