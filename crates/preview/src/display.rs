//! Display directive sent to the presentation layer.

/// Presentation surface showing either the preview or an error banner.
pub trait DisplaySurface: Send + Sync {
	fn show_preview(&self);
	fn show_error(&self, heading: &str, message: &str);
}

/// What the presentation layer should currently show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayDirective {
	Preview,
	Error { heading: String, message: String },
}

impl DisplayDirective {
	pub fn error(heading: impl Into<String>, message: impl Into<String>) -> Self {
		Self::Error {
			heading: heading.into(),
			message: message.into(),
		}
	}

	pub fn apply(&self, surface: &dyn DisplaySurface) {
		match self {
			Self::Preview => surface.show_preview(),
			Self::Error { heading, message } => surface.show_error(heading, message),
		}
	}
}
