//! Newline-delimited JSON messages exchanged with a worker process.
//!
//! Each message is one JSON object on its own line, tagged by `type`:
//!
//! ```text
//! host -> worker   {"type":"update","text":"<Window/>"}
//!                  {"type":"shutdown"}
//! worker -> host   {"type":"ready"}
//!                  {"type":"frame"}
//!                  {"type":"error","message":"...","line":3}
//!                  {"type":"error_cleared"}
//!                  {"type":"startup_failed","message":"..."}
//! ```

use serde::{Deserialize, Serialize};

/// Message sent to the worker's stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
	/// Replace the rendered document with `text`.
	Update { text: String },
	/// Exit cleanly.
	Shutdown,
}

/// Message read from the worker's stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
	Ready,
	Frame,
	Error {
		message: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		line: Option<u32>,
	},
	ErrorCleared,
	/// The hosted application failed before the worker became ready.
	StartupFailed { message: String },
}

/// Encodes `message` as one line, including the trailing newline.
pub fn encode(message: &HostMessage) -> serde_json::Result<String> {
	let mut line = serde_json::to_string(message)?;
	line.push('\n');
	Ok(line)
}

pub fn decode(line: &str) -> serde_json::Result<WorkerMessage> {
	serde_json::from_str(line.trim())
}
