//! Task runtime primitives shared by the preview session.
//!
//! Every background task a session starts (throttle fires, signal
//! forwarding, metadata builds, text forwarding) goes through [`spawn`] so it
//! carries a [`TaskClass`] in traces. Worker processes are tagged with a
//! generation from [`GenerationClock`] so late signals from a torn-down
//! worker can be told apart from the live one.

mod class;
mod spawn;
mod token;


pub use class::TaskClass;
pub use spawn::{spawn, spawn_blocking};
pub use token::{GenerationClock, GenerationToken};

/// Extracts the panic message carried by a failed join, if the task panicked.
///
/// Returns `None` for cancelled tasks.
pub fn join_error_panic_message(err: tokio::task::JoinError) -> Option<String> {
	if !err.is_panic() {
		return None;
	}
	let payload = err.into_panic();
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		return Some((*msg).to_string());
	}
	if let Some(msg) = payload.downcast_ref::<String>() {
		return Some(msg.clone());
	}
	Some("non-string panic payload".to_string())
}
