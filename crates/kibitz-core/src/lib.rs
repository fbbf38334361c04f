//! Exclusive-access engine lifecycle management for kibitz.
//!
//! This crate owns the hard part of talking to an analysis engine: the
//! `NativeSession` state machine that brings one engine up through the UCI
//! handshake and mediates every command to it, the `AccessManager` that
//! arbitrates a single live session between competing owners, and the
//! `Capability` shim that swaps in an `UnsupportedSession` when no engine
//! can run on the host. It also provides engine configuration presets and
//! the TOML settings file.

pub mod capability;
pub mod config;
pub mod lifecycle;
pub mod manager;
pub mod session;
pub mod settings;
pub mod shutdown;

pub use capability::{Capability, UnsupportedSession};
pub use config::{list_presets, EngineConfig, PresetInfo};
pub use lifecycle::{validate_transition, SessionState};
pub use manager::{AccessManager, SHARED_OWNER};
pub use session::{AnalysisSession, NativeSession, PositionEval, SessionTimeouts};
pub use settings::{default_path, Settings, SettingsError, ENGINE_PATH_ENV};
pub use shutdown::{install_signal_handler, ShutdownSignal};

use kibitz_runtime::{HandleState, RuntimeError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("engine did not finish starting within {0:?}")]
    StartupTimeout(Duration),
    #[error("engine reported '{0}' while starting")]
    HandleFailed(HandleState),
    #[error("engine did not acknowledge the uci handshake within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("engine output stream was already taken")]
    OutputUnavailable,
    #[error("the analysis engine is not supported on this platform")]
    UnsupportedPlatform,
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
}
