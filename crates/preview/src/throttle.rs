//! Fixed-rate coalescing of rapid updates.
//!
//! [`Throttle::queue`] stores the latest value and arms a timer if none is
//! armed. When the timer fires the consumer runs once with whatever value is
//! pending at that moment. Queueing while armed only replaces the value; the
//! fire time is not pushed back, so a steady stream of edits still produces
//! one push per window.
//!
//! # Disposal
//!
//! Once [`Throttle::dispose`] returns no invocation is running and none will
//! start. An invocation still in flight is dropped at its next await point
//! rather than waited out, so a consumer that never completes cannot hold
//! disposal. The consumer must never await `dispose` on its own throttle.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use glance_worker::TaskClass;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

type Consumer<T> = Box<dyn Fn(T) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Last-value-wins pending entry.
struct Slot<T> {
	pending: Option<T>,
	armed: bool,
	disposed: bool,
}

struct Inner<T> {
	window: Duration,
	slot: Mutex<Slot<T>>,
	/// Held for the whole consumer invocation.
	firing: tokio::sync::Mutex<()>,
	consumer: Consumer<T>,
	cancel: CancellationToken,
}

/// Coalesces values into at most one consumer call per window.
pub struct Throttle<T> {
	inner: Arc<Inner<T>>,
}

impl<T> std::fmt::Debug for Throttle<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let slot = self.inner.slot.lock();
		f.debug_struct("Throttle")
			.field("window", &self.inner.window)
			.field("armed", &slot.armed)
			.field("disposed", &slot.disposed)
			.finish_non_exhaustive()
	}
}

impl<T: Send + 'static> Throttle<T> {
	pub fn new<F, Fut>(window: Duration, consumer: F) -> Self
	where
		F: Fn(T) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		Self {
			inner: Arc::new(Inner {
				window,
				slot: Mutex::new(Slot {
					pending: None,
					armed: false,
					disposed: false,
				}),
				firing: tokio::sync::Mutex::new(()),
				consumer: Box::new(move |value| Box::pin(consumer(value))),
				cancel: CancellationToken::new(),
			}),
		}
	}

	pub fn window(&self) -> Duration {
		self.inner.window
	}

	/// Records `value` as the pending payload, arming the timer if needed.
	///
	/// Must be called within a tokio runtime. Ignored after disposal.
	pub fn queue(&self, value: T) {
		{
			let mut slot = self.inner.slot.lock();
			if slot.disposed {
				return;
			}
			slot.pending = Some(value);
			if slot.armed {
				trace!("throttle.coalesced");
				return;
			}
			slot.armed = true;
		}

		let inner = Arc::clone(&self.inner);
		glance_worker::spawn(TaskClass::Interactive, async move { inner.fire_after_window().await });
	}

	/// Whether a timer is currently armed.
	pub fn is_armed(&self) -> bool {
		self.inner.slot.lock().armed
	}

	/// Cancels any armed timer and abandons a running invocation.
	pub async fn dispose(&self) {
		{
			let mut slot = self.inner.slot.lock();
			slot.disposed = true;
			slot.pending = None;
			slot.armed = false;
		}
		self.inner.cancel.cancel();
		let _firing = self.inner.firing.lock().await;
	}
}

impl<T> Inner<T> {
	async fn fire_after_window(&self) {
		tokio::select! {
			_ = self.cancel.cancelled() => return,
			_ = tokio::time::sleep(self.window) => {}
		}

		let _firing = self.firing.lock().await;
		let value = {
			let mut slot = self.slot.lock();
			if slot.disposed {
				return;
			}
			slot.armed = false;
			slot.pending.take()
		};
		if let Some(value) = value {
			trace!("throttle.fire");
			tokio::select! {
				_ = self.cancel.cancelled() => trace!("throttle.abandoned"),
				_ = (self.consumer)(value) => {}
			}
		}
	}
}

impl<T> Drop for Throttle<T> {
	fn drop(&mut self) {
		self.inner.slot.lock().disposed = true;
		self.inner.cancel.cancel();
	}
}
