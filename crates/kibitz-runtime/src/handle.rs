use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Lifecycle of the underlying engine as the handle itself reports it.
///
/// The session reads this to decide whether commands may be sent; a handle
/// may move to `Disposed` or `Error` at any time (the process can die).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HandleState {
    Starting,
    Ready,
    Disposed,
    Error,
}

impl HandleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, HandleState::Disposed | HandleState::Error)
    }
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleState::Starting => write!(f, "starting"),
            HandleState::Ready => write!(f, "ready"),
            HandleState::Disposed => write!(f, "disposed"),
            HandleState::Error => write!(f, "error"),
        }
    }
}

/// One live engine instance.
pub trait EngineHandle: Send + Sync {
    fn state(&self) -> HandleState;

    /// The engine's output lines. Yields the receiver once; later calls
    /// return `None`, so there is only ever one consumer of the stream.
    fn take_output(&self) -> Option<mpsc::UnboundedReceiver<String>>;

    /// Queue one command line for the engine's input. Commands are written
    /// in the order they are queued.
    fn send(&self, command: &str) -> Result<(), RuntimeError>;

    /// Release the engine. Safe to call more than once.
    fn dispose(&self);
}

/// Creates engine handles for one kind of backend.
pub trait HandleFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this backend can run on the current host at all.
    fn available(&self) -> bool;

    /// Start a new engine. Must be called from within a tokio runtime; the
    /// returned handle reports `Starting` until the engine is up.
    fn spawn(&self) -> Result<Box<dyn EngineHandle>, RuntimeError>;
}

pub fn select_factory(
    name: &str,
    program: &str,
    args: &[String],
) -> Result<Arc<dyn HandleFactory>, RuntimeError> {
    match name {
        "process" => Ok(Arc::new(crate::process::ProcessFactory::new(program, args))),
        "mock" => Ok(Arc::new(crate::mock::MockFactory::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}

/// Shared, poison-tolerant state cell used by the handle implementations.
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<Mutex<HandleState>>);

impl StateCell {
    pub(crate) fn new(initial: HandleState) -> Self {
        Self(Arc::new(Mutex::new(initial)))
    }

    pub(crate) fn get(&self) -> HandleState {
        self.0.lock().map_or(HandleState::Error, |s| *s)
    }

    pub(crate) fn set(&self, next: HandleState) {
        if let Ok(mut s) = self.0.lock() {
            *s = next;
        }
    }

    /// Move to `next` unless the handle already reached a terminal state.
    pub(crate) fn advance(&self, next: HandleState) {
        if let Ok(mut s) = self.0.lock() {
            if !s.is_terminal() {
                *s = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_valid_factories() {
        assert_eq!(select_factory("process", "stockfish", &[]).unwrap().name(), "process");
        assert_eq!(select_factory("mock", "", &[]).unwrap().name(), "mock");
    }

    #[test]
    fn select_invalid_factory_fails() {
        assert!(matches!(
            select_factory("wasm", "stockfish", &[]),
            Err(RuntimeError::BackendUnavailable(name)) if name == "wasm"
        ));
    }

    #[test]
    fn state_cell_does_not_leave_terminal_states() {
        let cell = StateCell::new(HandleState::Starting);
        cell.advance(HandleState::Ready);
        assert_eq!(cell.get(), HandleState::Ready);

        cell.set(HandleState::Disposed);
        cell.advance(HandleState::Ready);
        assert_eq!(cell.get(), HandleState::Disposed);
    }
}
