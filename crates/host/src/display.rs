//! Display surface printing directives to stdout.

use glance_preview::DisplaySurface;

#[derive(Debug, Default)]
pub struct StdoutDisplay;

impl DisplaySurface for StdoutDisplay {
	fn show_preview(&self) {
		println!("[preview] showing rendered document");
	}

	fn show_error(&self, heading: &str, message: &str) {
		println!("[{heading}] {message}");
	}
}
