//! Failure taxonomy and caller-facing errors.

/// Why a session is in the `Failed` state.
///
/// Every reason maps to a fixed display heading; the message is shown under
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
	/// The run target's executable is missing.
	BuildRequired(String),
	/// The worker reported a render error before producing any frame.
	InvalidMarkup(String),
	/// The worker died while the session was not paused.
	ProcessExited(String),
	/// No run target could be resolved for the document.
	NoExecutable,
	/// Any other start or runtime failure.
	Generic(String),
}

impl FailureReason {
	pub const fn heading(&self) -> &'static str {
		match self {
			Self::BuildRequired(_) => "Build Required",
			Self::InvalidMarkup(_) => "Invalid Markup",
			Self::ProcessExited(_) => "Process Exited",
			Self::NoExecutable => "No Executable",
			Self::Generic(_) => "Error",
		}
	}

	pub fn message(&self) -> &str {
		match self {
			Self::BuildRequired(msg) | Self::InvalidMarkup(msg) | Self::ProcessExited(msg) | Self::Generic(msg) => msg,
			Self::NoExecutable => "No executable project references this document. Add a runnable project that references it.",
		}
	}
}

impl std::fmt::Display for FailureReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}: {}", self.heading(), self.message())
	}
}

/// Errors returned to callers of [`crate::Session`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
	/// `start` was called on a session that is already started.
	#[error("session already started")]
	AlreadyStarted,
	/// The session has been disposed.
	#[error("session disposed")]
	Disposed,
	/// The requested target is not in the session's target set.
	#[error("unknown run target: {0}")]
	UnknownTarget(String),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn headings_are_stable() {
		assert_eq!(FailureReason::BuildRequired(String::new()).heading(), "Build Required");
		assert_eq!(FailureReason::InvalidMarkup(String::new()).heading(), "Invalid Markup");
		assert_eq!(FailureReason::ProcessExited(String::new()).heading(), "Process Exited");
		assert_eq!(FailureReason::NoExecutable.heading(), "No Executable");
		assert_eq!(FailureReason::Generic(String::new()).heading(), "Error");
	}

	#[test]
	fn display_joins_heading_and_message() {
		let reason = FailureReason::Generic("boom".into());
		assert_eq!(reason.to_string(), "Error: boom");
	}
}
