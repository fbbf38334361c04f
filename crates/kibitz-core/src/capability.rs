use crate::config::EngineConfig;
use crate::lifecycle::SessionState;
use crate::session::{closed_events, AnalysisSession, NativeSession, PositionEval, SessionTimeouts};
use crate::CoreError;
use async_trait::async_trait;
use kibitz_protocol::EngineEvent;
use kibitz_runtime::HandleFactory;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Which session implementation this host gets, decided once at startup.
#[derive(Clone)]
pub enum Capability {
    Native(Arc<dyn HandleFactory>),
    Unsupported { reason: String },
}

impl Capability {
    pub fn detect(factory: Arc<dyn HandleFactory>) -> Self {
        if factory.available() {
            info!("using '{}' engine backend", factory.name());
            Capability::Native(factory)
        } else {
            let reason = format!("engine backend '{}' is not available", factory.name());
            warn!("{reason}, engine features disabled");
            Capability::Unsupported { reason }
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Capability::Native(_))
    }

    pub fn new_session(
        &self,
        config: EngineConfig,
        timeouts: SessionTimeouts,
    ) -> Arc<dyn AnalysisSession> {
        match self {
            Capability::Native(factory) => {
                Arc::new(NativeSession::new(Arc::clone(factory), config, timeouts))
            }
            Capability::Unsupported { .. } => Arc::new(UnsupportedSession::new(config)),
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Native(factory) => write!(f, "Native({})", factory.name()),
            Capability::Unsupported { reason } => write!(f, "Unsupported({reason})"),
        }
    }
}

/// Stand-in session for hosts that cannot run an engine. Anything that
/// would need the engine fails with `UnsupportedPlatform`; teardown and
/// probing calls are harmless.
pub struct UnsupportedSession {
    config: Arc<EngineConfig>,
    state: watch::Sender<SessionState>,
}

impl UnsupportedSession {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: watch::channel(SessionState::Uninitialized).0,
        }
    }
}

#[async_trait]
impl AnalysisSession for UnsupportedSession {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        closed_events()
    }

    fn config(&self) -> Arc<EngineConfig> {
        Arc::clone(&self.config)
    }

    fn engine_name(&self) -> Option<String> {
        None
    }

    async fn initialize(&self) -> Result<(), CoreError> {
        Err(CoreError::UnsupportedPlatform)
    }

    async fn update_config(&self, _config: EngineConfig) -> Result<(), CoreError> {
        Err(CoreError::UnsupportedPlatform)
    }

    async fn set_position(&self, _fen: &str, _moves: &[String]) -> Result<(), CoreError> {
        Err(CoreError::UnsupportedPlatform)
    }

    async fn start_analysis(
        &self,
        _depth: Option<u32>,
        _move_time_ms: Option<u64>,
    ) -> Result<(), CoreError> {
        Err(CoreError::UnsupportedPlatform)
    }

    async fn new_game(&self) -> Result<(), CoreError> {
        Err(CoreError::UnsupportedPlatform)
    }

    async fn stop(&self) {}

    async fn evaluate_position(&self, _fen: &str, _depth: u32) -> Option<PositionEval> {
        None
    }

    async fn dispose(&self) {
        self.state.send_replace(SessionState::Disposed);
    }
}
