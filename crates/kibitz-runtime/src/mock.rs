use crate::handle::{EngineHandle, HandleFactory, HandleState, StateCell};
use crate::RuntimeError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Depth the mock reports for `go movetime` searches.
const MOVETIME_DEPTH: u32 = 8;
/// Depth the mock reports before waiting for `stop` on `go infinite`.
const INFINITE_DEPTH: u32 = 3;

/// Behaviour knobs for the scripted engine.
#[derive(Debug, Clone)]
pub struct MockScript {
    pub engine_name: String,
    pub available: bool,
    pub startup_delay: Duration,
    /// State the handle settles in after `startup_delay`. `Starting` means
    /// it never comes up.
    pub startup_outcome: HandleState,
    pub answer_uci: bool,
    pub answer_isready: bool,
    /// Whether `go` produces any `info` lines.
    pub emit_info: bool,
    pub emit_bestmove: bool,
    pub best_move: String,
    pub ponder_move: String,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            engine_name: "kibitz-mock".to_owned(),
            available: true,
            startup_delay: Duration::from_millis(20),
            startup_outcome: HandleState::Ready,
            answer_uci: true,
            answer_isready: true,
            emit_info: true,
            emit_bestmove: true,
            best_move: "e2e4".to_owned(),
            ponder_move: "e7e5".to_owned(),
        }
    }
}

impl MockScript {
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    #[must_use]
    pub fn never_ready(mut self) -> Self {
        self.startup_outcome = HandleState::Starting;
        self
    }

    #[must_use]
    pub fn fail_startup(mut self) -> Self {
        self.startup_outcome = HandleState::Error;
        self
    }

    #[must_use]
    pub fn silent_handshake(mut self) -> Self {
        self.answer_uci = false;
        self
    }

    #[must_use]
    pub fn silent_sync(mut self) -> Self {
        self.answer_isready = false;
        self
    }

    #[must_use]
    pub fn withhold_bestmove(mut self) -> Self {
        self.emit_bestmove = false;
        self
    }

    /// Searches print nothing at all, not even a best move.
    #[must_use]
    pub fn silent_search(mut self) -> Self {
        self.emit_info = false;
        self.emit_bestmove = false;
        self
    }
}

/// Everything the mock engines created by one factory have observed.
#[derive(Debug, Default)]
pub struct MockLog {
    spawns: AtomicUsize,
    disposals: AtomicUsize,
    commands: Mutex<Vec<String>>,
    engines: Mutex<Vec<StateCell>>,
}

impl MockLog {
    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn dispose_count(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    /// All commands received, in arrival order, across every handle.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of received commands equal to `command` or starting with
    /// `command` followed by a space.
    pub fn count(&self, command: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| *c == command || c.starts_with(&format!("{command} ")))
            .count()
    }

    /// Make every engine spawned so far die as if its process had exited.
    /// Engines spawned afterwards are unaffected.
    pub fn crash_engines(&self) {
        if let Ok(engines) = self.engines.lock() {
            for state in engines.iter() {
                state.advance(HandleState::Error);
            }
        }
    }

    pub fn clear(&self) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.clear();
        }
    }

    fn track(&self, state: &StateCell) {
        if let Ok(mut engines) = self.engines.lock() {
            engines.push(state.clone());
        }
    }

    fn record(&self, command: &str) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command.to_owned());
        }
    }
}

/// Factory for scripted in-process engines that speak enough UCI to drive a
/// session through its whole lifecycle.
pub struct MockFactory {
    script: MockScript,
    log: Arc<MockLog>,
}

impl Default for MockFactory {
    fn default() -> Self {
        Self::with_script(MockScript::default())
    }
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: MockScript) -> Self {
        Self {
            script,
            log: Arc::new(MockLog::default()),
        }
    }

    pub fn log(&self) -> Arc<MockLog> {
        Arc::clone(&self.log)
    }
}

impl HandleFactory for MockFactory {
    fn name(&self) -> &str {
        "mock"
    }

    fn available(&self) -> bool {
        self.script.available
    }

    fn spawn(&self) -> Result<Box<dyn EngineHandle>, RuntimeError> {
        if !self.script.available {
            return Err(RuntimeError::BackendUnavailable("mock".to_owned()));
        }
        self.log.spawns.fetch_add(1, Ordering::SeqCst);

        let state = StateCell::new(HandleState::Starting);
        self.log.track(&state);
        let (output_tx, output_rx) = mpsc::unbounded_channel();

        let outcome = self.script.startup_outcome;
        let delay = self.script.startup_delay;
        let startup_state = state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if outcome != HandleState::Starting {
                startup_state.advance(outcome);
            }
        });

        Ok(Box::new(MockHandle {
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            state,
            output_tx: Mutex::new(Some(output_tx)),
            output_rx: Mutex::new(Some(output_rx)),
            searching: AtomicBool::new(false),
            released: AtomicBool::new(false),
        }))
    }
}

pub struct MockHandle {
    script: MockScript,
    log: Arc<MockLog>,
    state: StateCell,
    output_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    output_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    searching: AtomicBool,
    released: AtomicBool,
}

impl MockHandle {
    fn emit(&self, line: impl Into<String>) {
        if let Ok(tx) = self.output_tx.lock() {
            if let Some(tx) = tx.as_ref() {
                let _ = tx.send(line.into());
            }
        }
    }

    fn emit_search(&self, depth: u32) {
        if !self.script.emit_info {
            return;
        }
        for d in 1..=depth {
            self.emit(format!(
                "info depth {d} seldepth {} multipv 1 score cp {} nodes {} nps 500000 time {} pv {} {}",
                d + 2,
                10 + d,
                u64::from(d) * 1000,
                u64::from(d) * 2,
                self.script.best_move,
                self.script.ponder_move,
            ));
        }
    }

    fn emit_bestmove(&self) {
        if self.script.emit_bestmove {
            self.emit(format!(
                "bestmove {} ponder {}",
                self.script.best_move, self.script.ponder_move
            ));
        }
    }

    fn go(&self, args: &[&str]) {
        match args {
            ["depth", depth, ..] => {
                self.emit_search(depth.parse().unwrap_or(1));
                self.emit_bestmove();
            }
            ["movetime", ..] => {
                self.emit_search(MOVETIME_DEPTH);
                self.emit_bestmove();
            }
            _ => {
                self.searching.store(true, Ordering::SeqCst);
                self.emit_search(INFINITE_DEPTH);
            }
        }
    }
}

impl EngineHandle for MockHandle {
    fn state(&self) -> HandleState {
        self.state.get()
    }

    fn take_output(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.output_rx.lock().ok()?.take()
    }

    fn send(&self, command: &str) -> Result<(), RuntimeError> {
        let state = self.state.get();
        if state != HandleState::Ready {
            return Err(RuntimeError::NotRunning(state));
        }
        debug!("mock engine <- {command}");
        self.log.record(command);

        let tokens: Vec<&str> = command.split_whitespace().collect();
        match tokens.as_slice() {
            ["uci"] if self.script.answer_uci => {
                self.emit(format!("id name {}", self.script.engine_name));
                self.emit("id author kibitz");
                self.emit("option name Hash type spin default 16 min 1 max 33554432");
                self.emit("option name Threads type spin default 1 min 1 max 1024");
                self.emit("option name MultiPV type spin default 1 min 1 max 500");
                self.emit("uciok");
            }
            ["isready"] if self.script.answer_isready => self.emit("readyok"),
            ["go", args @ ..] => self.go(args),
            ["stop"] => {
                if self.searching.swap(false, Ordering::SeqCst) {
                    self.emit_bestmove();
                }
            }
            ["quit"] => {
                self.state.set(HandleState::Disposed);
                if let Ok(mut tx) = self.output_tx.lock() {
                    tx.take();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn dispose(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.log.disposals.fetch_add(1, Ordering::SeqCst);
        }
        self.state.set(HandleState::Disposed);
        if let Ok(mut tx) = self.output_tx.lock() {
            tx.take();
        }
    }
}
