//! Engine handle collaborators for kibitz.
//!
//! This crate implements the layer below the session: the `EngineHandle` and
//! `HandleFactory` traits, a child-process backend that drives any UCI binary
//! over stdin/stdout, a scripted in-process mock backend for tests and
//! demos, host capability queries, and prerequisite checking.

pub mod handle;
pub mod host;
pub mod mock;
pub mod prereq;
pub mod process;

pub use handle::{select_factory, EngineHandle, HandleFactory, HandleState};
pub use host::available_cores;
pub use mock::{MockFactory, MockLog, MockScript};
pub use prereq::{check_engine_prereqs, format_missing, MissingPrereq};
pub use process::ProcessFactory;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("failed to start engine '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },
    #[error("engine handle is not accepting commands (state: {0})")]
    NotRunning(HandleState),
    #[error("engine input channel is closed")]
    Closed,
}
