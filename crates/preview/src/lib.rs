//! Live-preview session orchestration.
//!
//! A [`Session`] keeps one external rendering worker in step with a document
//! being edited. It decides when the worker is started, stopped or restarted,
//! pushes document text to it at a bounded rate, and turns the worker's
//! signals into a two-state display directive.
//!
//! # Architecture
//!
//! ```text
//! text source ──▶ Throttle ──────────────────────────────┐
//!                                                         ▼
//! commands ───▶ session driver ──▶ LifecycleGuard ──▶ worker process
//!                 ▲       │             (permit)          │
//!                 │       ▼                               │
//!                 │   DisplaySurface                      │
//!                 └────────────── WorkerSignal ◀──────────┘
//! ```
//!
//! - [`Throttle`] coalesces edits into at most one push per window.
//! - [`TargetResolver`] turns a [`ProjectGraph`] into the ordered run targets
//!   a document can be previewed with.
//! - [`LifecycleGuard`] owns the single worker handle; every start, stop and
//!   reap runs under one permit.
//! - The session driver is the only writer of [`SessionState`]; commands and
//!   worker signals are applied one at a time.
//! - [`MetadataCache`] holds completion metadata built in the background.
//!
//! ## Cargo features
//!
//! - `process`: [`ProcessLauncher`], a child-process worker speaking
//!   newline-delimited JSON. *Enabled by default.*
//! - `test-support`: mock collaborators in [`test_support`].

pub mod config;
pub mod display;
pub mod error;
pub mod guard;
pub mod metadata;
pub mod session;
pub mod targets;
pub mod throttle;
pub mod worker;

#[cfg(feature = "process")]
pub mod process;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::{ConfigError, PreviewConfig, TargetsConfig, WorkerConfig};
pub use display::{DisplayDirective, DisplaySurface};
pub use error::{FailureReason, SessionError};
pub use guard::{LifecycleGuard, PauseFlag, StartOutcome};
pub use metadata::{CompletionMetadata, MetadataBuilder, MetadataCache, MetadataError};
#[cfg(feature = "process")]
pub use process::ProcessLauncher;
pub use session::{Session, SessionDeps, SessionState};
pub use targets::{ProjectGraph, ProjectModel, ProjectSnapshot, RunTarget, TargetResolver, TargetSelection};
pub use throttle::Throttle;
pub use worker::{RenderError, SignalEnvelope, SignalSender, StartError, WorkerError, WorkerHandle, WorkerLauncher, WorkerSignal};
