/// Execution classes used for task observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Work on the edit-to-frame path (throttle fires, text forwarding).
	Interactive,
	/// Work nobody waits on (metadata builds, log forwarding, file polling).
	Background,
	/// Worker process I/O loops relaying signals into a session.
	Signal,
	/// Blocking filesystem work.
	IoBlocking,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Background => "background",
			Self::Signal => "signal",
			Self::IoBlocking => "io_blocking",
		}
	}
}
