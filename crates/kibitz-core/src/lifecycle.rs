use crate::CoreError;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Analyzing,
    Error,
    Disposed,
}

impl SessionState {
    /// Ready for commands, searching or not.
    pub fn is_live(self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Analyzing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::Initializing => write!(f, "initializing"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Analyzing => write!(f, "analyzing"),
            SessionState::Error => write!(f, "error"),
            SessionState::Disposed => write!(f, "disposed"),
        }
    }
}

pub fn validate_transition(from: SessionState, to: SessionState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (
            SessionState::Uninitialized | SessionState::Error | SessionState::Disposed,
            SessionState::Initializing
        ) | (
            SessionState::Initializing,
            SessionState::Ready | SessionState::Error
        ) | (SessionState::Ready, SessionState::Analyzing)
            | (SessionState::Analyzing, SessionState::Ready)
            | (
                SessionState::Uninitialized
                    | SessionState::Initializing
                    | SessionState::Ready
                    | SessionState::Analyzing
                    | SessionState::Error,
                SessionState::Disposed
            )
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
