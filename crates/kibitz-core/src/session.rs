use crate::config::EngineConfig;
use crate::lifecycle::{validate_transition, SessionState};
use crate::CoreError;
use async_trait::async_trait;
use kibitz_protocol::{decode, EngineEvent, Evaluation, HandshakeLine, SearchLimit, Side, UciCommand};
use kibitz_runtime::{EngineHandle, HandleFactory, HandleState};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 256;

/// Bounds on every wait a session performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// Overall wait for the handle to report `Ready` after spawning.
    pub startup: Duration,
    /// Interval between handle state polls during startup.
    pub poll_interval: Duration,
    /// Wait for `uciok` after `uci`.
    pub handshake: Duration,
    /// Wait for `readyok` after applying options. Expiry is not an error.
    pub sync: Duration,
    /// Overall budget of [`AnalysisSession::evaluate_position`].
    pub evaluate: Duration,
    /// Pause after `stop` so in-flight output drains before the next command.
    pub stop_grace: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            startup: Duration::from_secs(10),
            poll_interval: Duration::from_millis(50),
            handshake: Duration::from_secs(10),
            sync: Duration::from_secs(5),
            evaluate: Duration::from_secs(10),
            stop_grace: Duration::from_millis(50),
        }
    }
}

/// Result of a one-shot evaluation. Scores are relative to the side to
/// move in the evaluated position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PositionEval {
    pub evaluation: Option<Evaluation>,
    pub best_move: Option<String>,
    pub ponder: Option<String>,
    pub depth: u32,
}

impl PositionEval {
    fn into_partial(self) -> Option<Self> {
        (self.evaluation.is_some() || self.best_move.is_some()).then_some(self)
    }
}

/// The command surface shared by the native session and the stand-in used
/// on hosts without an engine.
///
/// Only [`initialize`](AnalysisSession::initialize) reports engine failures.
/// Steady-state commands on a native session never fail: they do nothing
/// when the engine is absent or not accepting commands.
#[async_trait]
pub trait AnalysisSession: Send + Sync {
    fn state(&self) -> SessionState;

    fn watch_state(&self) -> watch::Receiver<SessionState>;

    /// Decoded engine output. The receiver reports `Closed` once the session
    /// is disposed.
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;

    fn config(&self) -> Arc<EngineConfig>;

    /// The `id name` the engine announced during the handshake.
    fn engine_name(&self) -> Option<String>;

    /// Whether commands would reach a running engine right now.
    fn is_ready(&self) -> bool {
        self.state().is_live()
    }

    async fn initialize(&self) -> Result<(), CoreError>;

    async fn update_config(&self, config: EngineConfig) -> Result<(), CoreError>;

    async fn set_position(&self, fen: &str, moves: &[String]) -> Result<(), CoreError>;

    async fn start_analysis(
        &self,
        depth: Option<u32>,
        move_time_ms: Option<u64>,
    ) -> Result<(), CoreError>;

    async fn new_game(&self) -> Result<(), CoreError>;

    async fn stop(&self);

    async fn evaluate_position(&self, fen: &str, depth: u32) -> Option<PositionEval>;

    async fn dispose(&self);
}

#[derive(Default)]
struct Inner {
    handle: Option<Arc<dyn EngineHandle>>,
    pump: Option<JoinHandle<()>>,
}

impl Inner {
    /// The handle, if it is currently accepting commands.
    fn accepting(&self) -> Option<&dyn EngineHandle> {
        self.handle
            .as_deref()
            .filter(|handle| handle.state() == HandleState::Ready)
    }
}

/// Owns one engine handle and mediates every interaction with it.
///
/// Commands are serialized through an async mutex around the handle, so
/// they reach the engine in the order they were issued.
pub struct NativeSession {
    factory: Arc<dyn HandleFactory>,
    timeouts: SessionTimeouts,
    inner: tokio::sync::Mutex<Inner>,
    /// The current handle, readable without waiting on `inner`.
    liveness: Mutex<Option<Arc<dyn EngineHandle>>>,
    state: watch::Sender<SessionState>,
    config: Mutex<Arc<EngineConfig>>,
    engine_name: Mutex<Option<String>>,
    events: Mutex<Option<broadcast::Sender<EngineEvent>>>,
    lines: broadcast::Sender<String>,
    perspective: watch::Sender<Side>,
}

impl NativeSession {
    pub fn new(
        factory: Arc<dyn HandleFactory>,
        config: EngineConfig,
        timeouts: SessionTimeouts,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        let (perspective, _) = watch::channel(Side::White);
        let (lines, _) = broadcast::channel(EVENT_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            factory,
            timeouts,
            inner: tokio::sync::Mutex::new(Inner::default()),
            liveness: Mutex::new(None),
            state,
            config: Mutex::new(Arc::new(config)),
            engine_name: Mutex::new(None),
            events: Mutex::new(Some(events)),
            lines,
            perspective,
        }
    }

    /// The engine can die underneath a live session; the session state alone
    /// does not show that.
    fn handle_alive(&self) -> bool {
        self.liveness
            .lock()
            .ok()
            .and_then(|handle| handle.as_ref().map(|h| h.state() == HandleState::Ready))
            .unwrap_or(false)
    }

    fn track_handle(&self, handle: Option<Arc<dyn EngineHandle>>) {
        if let Ok(mut slot) = self.liveness.lock() {
            *slot = handle;
        }
    }

    fn transition(&self, to: SessionState) -> Result<(), CoreError> {
        let from = self.state();
        validate_transition(from, to)?;
        debug!("session {from} -> {to}");
        self.state.send_replace(to);
        Ok(())
    }

    fn event_sender(&self) -> broadcast::Sender<EngineEvent> {
        let mut events = self.events.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        events
            .get_or_insert_with(|| broadcast::channel(EVENT_CAPACITY).0)
            .clone()
    }

    fn close_events(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.take();
        }
    }

    async fn bring_up(&self, inner: &mut Inner) -> Result<(), CoreError> {
        let handle: Arc<dyn EngineHandle> = Arc::from(self.factory.spawn()?);
        self.track_handle(Some(Arc::clone(&handle)));
        let handle: &dyn EngineHandle = &**inner.handle.insert(handle);
        self.await_handle_ready(handle).await?;

        let output = handle.take_output().ok_or(CoreError::OutputUnavailable)?;
        inner.pump = Some(tokio::spawn(pump(
            output,
            self.lines.clone(),
            self.event_sender(),
            self.perspective.subscribe(),
        )));

        self.handshake(handle).await?;
        let config = self.config();
        self.apply_config(handle, &config).await;
        Ok(())
    }

    async fn await_handle_ready(&self, handle: &dyn EngineHandle) -> Result<(), CoreError> {
        let deadline = Instant::now() + self.timeouts.startup;
        loop {
            match handle.state() {
                HandleState::Ready => return Ok(()),
                state @ (HandleState::Disposed | HandleState::Error) => {
                    return Err(CoreError::HandleFailed(state));
                }
                HandleState::Starting => {}
            }
            if Instant::now() >= deadline {
                return Err(CoreError::StartupTimeout(self.timeouts.startup));
            }
            tokio::time::sleep(self.timeouts.poll_interval).await;
        }
    }

    async fn handshake(&self, handle: &dyn EngineHandle) -> Result<(), CoreError> {
        let mut lines = self.lines.subscribe();
        handle.send(&UciCommand::Uci.to_string())?;

        let mut name = None;
        let acknowledged = wait_for_line(&mut lines, self.timeouts.handshake, |line| {
            match HandshakeLine::parse(line) {
                Some(HandshakeLine::UciOk) => true,
                Some(HandshakeLine::IdName(id)) => {
                    name = Some(id);
                    false
                }
                _ => false,
            }
        })
        .await;
        if !acknowledged {
            return Err(CoreError::HandshakeTimeout(self.timeouts.handshake));
        }

        if let Some(name) = &name {
            info!("engine identified as {name}");
        }
        if let Ok(mut slot) = self.engine_name.lock() {
            *slot = name;
        }
        Ok(())
    }

    async fn apply_config(&self, handle: &dyn EngineHandle, config: &EngineConfig) {
        for command in config.option_commands() {
            send(handle, &command);
        }
        self.sync(handle).await;
    }

    /// `isready` round trip. Expiry is logged and otherwise ignored.
    async fn sync(&self, handle: &dyn EngineHandle) {
        let mut lines = self.lines.subscribe();
        if !send(handle, &UciCommand::IsReady) {
            return;
        }
        let confirmed = wait_for_line(&mut lines, self.timeouts.sync, |line| {
            HandshakeLine::parse(line) == Some(HandshakeLine::ReadyOk)
        })
        .await;
        if !confirmed {
            warn!(
                "engine did not confirm readiness within {:?}, continuing",
                self.timeouts.sync
            );
        }
    }

    fn set_position_locked(&self, inner: &Inner, fen: &str, moves: &[String]) {
        let Some(handle) = inner.accepting() else {
            return;
        };
        let to_move = if fen.trim() == "startpos" {
            Side::White
        } else {
            Side::from_fen(fen).unwrap_or_default()
        };
        self.perspective.send_replace(to_move.after_moves(moves.len()));
        send(handle, &UciCommand::position(fen, moves));
    }

    async fn start_analysis_locked(
        &self,
        inner: &Inner,
        depth: Option<u32>,
        move_time_ms: Option<u64>,
    ) {
        if inner.accepting().is_none() {
            return;
        }
        self.stop_locked(inner).await;
        let Some(handle) = inner.accepting() else {
            return;
        };
        if self.transition(SessionState::Analyzing).is_err() {
            return;
        }
        let limit = SearchLimit::choose(depth, move_time_ms, self.config().max_depth());
        send(handle, &UciCommand::Go(limit));
    }

    async fn stop_locked(&self, inner: &Inner) {
        if self.state() != SessionState::Analyzing {
            return;
        }
        if let Some(handle) = inner.accepting() {
            send(handle, &UciCommand::Stop);
        }
        let _ = self.transition(SessionState::Ready);
        tokio::time::sleep(self.timeouts.stop_grace).await;
    }

    fn teardown(inner: &mut Inner) {
        if let Some(pump) = inner.pump.take() {
            pump.abort();
        }
        if let Some(handle) = inner.handle.take() {
            handle.dispose();
        }
    }
}

#[async_trait]
impl AnalysisSession for NativeSession {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        match self.events.lock().ok().and_then(|events| events.clone()) {
            Some(events) => events.subscribe(),
            None => closed_events(),
        }
    }

    fn config(&self) -> Arc<EngineConfig> {
        self.config
            .lock()
            .map_or_else(|_| Arc::new(EngineConfig::default()), |c| Arc::clone(&*c))
    }

    fn engine_name(&self) -> Option<String> {
        self.engine_name.lock().ok().and_then(|name| name.clone())
    }

    fn is_ready(&self) -> bool {
        self.state().is_live() && self.handle_alive()
    }

    async fn initialize(&self) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        if self.state().is_live() {
            return Ok(());
        }
        self.transition(SessionState::Initializing)?;
        info!("initializing engine session ({} backend)", self.factory.name());

        match self.bring_up(&mut inner).await {
            Ok(()) => {
                self.transition(SessionState::Ready)?;
                info!("engine session ready");
                Ok(())
            }
            Err(e) => {
                warn!("engine initialization failed: {e}");
                Self::teardown(&mut inner);
                self.track_handle(None);
                self.transition(SessionState::Error)?;
                Err(e)
            }
        }
    }

    async fn update_config(&self, config: EngineConfig) -> Result<(), CoreError> {
        let inner = self.inner.lock().await;
        let config = Arc::new(config);
        if let Ok(mut slot) = self.config.lock() {
            *slot = Arc::clone(&config);
        }
        if !self.state().is_live() {
            return Ok(());
        }
        self.stop_locked(&inner).await;
        if let Some(handle) = inner.accepting() {
            self.apply_config(handle, &config).await;
        }
        Ok(())
    }

    async fn set_position(&self, fen: &str, moves: &[String]) -> Result<(), CoreError> {
        let inner = self.inner.lock().await;
        self.set_position_locked(&inner, fen, moves);
        Ok(())
    }

    async fn start_analysis(
        &self,
        depth: Option<u32>,
        move_time_ms: Option<u64>,
    ) -> Result<(), CoreError> {
        let inner = self.inner.lock().await;
        self.start_analysis_locked(&inner, depth, move_time_ms).await;
        Ok(())
    }

    async fn new_game(&self) -> Result<(), CoreError> {
        let inner = self.inner.lock().await;
        if inner.accepting().is_none() {
            return Ok(());
        }
        self.stop_locked(&inner).await;
        if let Some(handle) = inner.accepting() {
            if send(handle, &UciCommand::UciNewGame) {
                self.sync(handle).await;
            }
        }
        Ok(())
    }

    async fn stop(&self) {
        let inner = self.inner.lock().await;
        self.stop_locked(&inner).await;
    }

    async fn evaluate_position(&self, fen: &str, depth: u32) -> Option<PositionEval> {
        // The session lock is only held while issuing commands so that a
        // concurrent dispose can end the wait below.
        let mut events = {
            let inner = self.inner.lock().await;
            inner.accepting()?;
            self.stop_locked(&inner).await;
            let events = self.subscribe();
            self.set_position_locked(&inner, fen, &[]);
            self.start_analysis_locked(&inner, Some(depth.max(1)), None)
                .await;
            events
        };

        let deadline = Instant::now() + self.timeouts.evaluate;
        let mut result = PositionEval::default();
        loop {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Ok(EngineEvent::PrincipalVariation(pv))) if pv.rank == 1 => {
                    result.evaluation = Some(pv.evaluation);
                    result.depth = pv.depth;
                    if let Some(first) = pv.first_move() {
                        result.best_move = Some(first.to_owned());
                    }
                }
                Ok(Ok(EngineEvent::BestMove { best, ponder })) => {
                    result.best_move = Some(best);
                    result.ponder = ponder;
                    return Some(result);
                }
                Ok(Ok(_) | Err(RecvError::Lagged(_))) => {}
                Ok(Err(RecvError::Closed)) => {
                    debug!("event stream closed during evaluation");
                    return result.into_partial();
                }
                Err(_) => {
                    debug!(
                        "evaluation timed out after {:?}, returning partial result",
                        self.timeouts.evaluate
                    );
                    return result.into_partial();
                }
            }
        }
    }

    async fn dispose(&self) {
        let mut inner = self.inner.lock().await;
        if self.state() == SessionState::Disposed {
            return;
        }
        self.stop_locked(&inner).await;
        if let Some(handle) = inner.accepting() {
            send(handle, &UciCommand::Quit);
        }
        Self::teardown(&mut inner);
        self.track_handle(None);
        self.close_events();
        if let Err(e) = self.transition(SessionState::Disposed) {
            debug!("{e}");
        }
        info!("engine session disposed");
    }
}

impl Drop for NativeSession {
    fn drop(&mut self) {
        Self::teardown(self.inner.get_mut());
    }
}

/// Forward every engine line to the raw line channel and, once decoded, to
/// the public event channel. The only reader of the handle's output.
async fn pump(
    mut output: mpsc::UnboundedReceiver<String>,
    lines: broadcast::Sender<String>,
    events: broadcast::Sender<EngineEvent>,
    perspective: watch::Receiver<Side>,
) {
    while let Some(line) = output.recv().await {
        let side = *perspective.borrow();
        if let Some(event) = decode(&line, side) {
            let _ = events.send(event);
        }
        let _ = lines.send(line);
    }
    debug!("engine output stream ended");
}

/// Best-effort send; returns whether the handle took the command.
fn send(handle: &dyn EngineHandle, command: &UciCommand) -> bool {
    match handle.send(&command.to_string()) {
        Ok(()) => true,
        Err(e) => {
            debug!("dropped engine command '{command}': {e}");
            false
        }
    }
}

async fn wait_for_line(
    lines: &mut broadcast::Receiver<String>,
    limit: Duration,
    mut matches: impl FnMut(&str) -> bool + Send,
) -> bool {
    let wait = async {
        loop {
            match lines.recv().await {
                Ok(line) if matches(line.as_str()) => return true,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return false,
            }
        }
    };
    tokio::time::timeout(limit, wait).await.unwrap_or(false)
}

pub(crate) fn closed_events() -> broadcast::Receiver<EngineEvent> {
    let (_, receiver) = broadcast::channel(1);
    receiver
}
