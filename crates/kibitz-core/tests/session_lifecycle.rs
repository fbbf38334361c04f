use kibitz_core::{AnalysisSession, CoreError, EngineConfig, NativeSession, SessionState, SessionTimeouts};
use kibitz_protocol::{EngineEvent, Score, Side};
use kibitz_runtime::{EngineHandle, HandleFactory, HandleState, MockFactory, MockLog, MockScript, RuntimeError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

const FEN_BLACK: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

fn session_with(script: MockScript) -> (Arc<NativeSession>, Arc<MockLog>) {
    let factory = MockFactory::with_script(script);
    let log = factory.log();
    let session = NativeSession::new(
        Arc::new(factory),
        EngineConfig::default(),
        SessionTimeouts::default(),
    );
    (Arc::new(session), log)
}

/// Fails every spawn until `failures` attempts have been made.
struct FlakyFactory {
    failures: usize,
    attempts: AtomicUsize,
    healthy: MockFactory,
    broken: MockFactory,
}

impl HandleFactory for FlakyFactory {
    fn name(&self) -> &str {
        "flaky"
    }

    fn available(&self) -> bool {
        true
    }

    fn spawn(&self) -> Result<Box<dyn EngineHandle>, RuntimeError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) < self.failures {
            self.broken.spawn()
        } else {
            self.healthy.spawn()
        }
    }
}

#[tokio::test(start_paused = true)]
async fn dispose_is_idempotent() {
    let (session, log) = session_with(MockScript::default());
    session.initialize().await.unwrap();

    session.dispose().await;
    session.dispose().await;
    session.dispose().await;

    assert_eq!(session.state(), SessionState::Disposed);
    assert_eq!(log.count("quit"), 1);
    assert_eq!(log.dispose_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn dispose_while_analyzing_stops_first() {
    let (session, log) = session_with(MockScript::default());
    session.initialize().await.unwrap();
    session.set_position("startpos", &[]).await.unwrap();
    session.start_analysis(None, None).await.unwrap();
    assert_eq!(session.state(), SessionState::Analyzing);
    assert_eq!(log.count("go"), 1);

    session.dispose().await;
    let commands = log.commands();
    let tail: Vec<&str> = commands.iter().rev().take(2).rev().map(String::as_str).collect();
    assert_eq!(tail, vec!["stop", "quit"]);
}

#[tokio::test(start_paused = true)]
async fn dispose_without_initialize_skips_quit() {
    let (session, log) = session_with(MockScript::default());
    session.dispose().await;
    assert_eq!(session.state(), SessionState::Disposed);
    assert!(log.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_flips_state_before_grace_elapses() {
    let (session, log) = session_with(MockScript::default());
    session.initialize().await.unwrap();
    session.start_analysis(None, None).await.unwrap();

    let mut state = session.watch_state();
    let started = Instant::now();
    let stopping = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.stop().await })
    };

    state.wait_for(|s| *s == SessionState::Ready).await.unwrap();
    assert!(!stopping.is_finished());

    stopping.await.unwrap();
    assert!(started.elapsed() >= SessionTimeouts::default().stop_grace);
    assert_eq!(log.count("stop"), 1);

    // Not analyzing any more, so a second stop does nothing.
    session.stop().await;
    assert_eq!(log.count("stop"), 1);
}

#[tokio::test(start_paused = true)]
async fn search_mode_precedence() {
    let (session, log) = session_with(MockScript::default());
    session.update_config(EngineConfig::default().with_max_depth(14)).await.unwrap();
    session.initialize().await.unwrap();

    session.start_analysis(Some(6), Some(300)).await.unwrap();
    session.start_analysis(Some(6), None).await.unwrap();
    session.start_analysis(None, None).await.unwrap();
    session.start_analysis(Some(0), None).await.unwrap();

    let gos: Vec<String> = log
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("go"))
        .collect();
    assert_eq!(
        gos,
        vec!["go movetime 300", "go depth 6", "go depth 14", "go infinite"]
    );
}

#[tokio::test(start_paused = true)]
async fn position_with_moves_flips_perspective() {
    let (session, log) = session_with(MockScript::default());
    session.initialize().await.unwrap();
    let mut events = session.subscribe();

    let moves = vec!["e2e4".to_owned()];
    session.set_position("startpos", &moves).await.unwrap();
    session.start_analysis(Some(1), None).await.unwrap();
    assert!(log.commands().contains(&"position startpos moves e2e4".to_owned()));

    match events.recv().await.unwrap() {
        EngineEvent::PrincipalVariation(pv) => assert_eq!(pv.evaluation.side, Side::Black),
        other => panic!("expected principal variation, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn startup_timeout_lands_in_error() {
    let (session, log) = session_with(MockScript::default().never_ready());
    let started = Instant::now();
    let err = session.initialize().await.unwrap_err();

    assert!(matches!(err, CoreError::StartupTimeout(_)));
    assert!(started.elapsed() >= SessionTimeouts::default().startup);
    assert_eq!(session.state(), SessionState::Error);
    assert_eq!(log.dispose_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn handle_error_during_startup_is_fatal() {
    let (session, _log) = session_with(MockScript::default().fail_startup());
    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, CoreError::HandleFailed(HandleState::Error)));
    assert_eq!(session.state(), SessionState::Error);
}

#[tokio::test(start_paused = true)]
async fn session_recovers_after_failed_initialize() {
    let factory = FlakyFactory {
        failures: 1,
        attempts: AtomicUsize::new(0),
        healthy: MockFactory::new(),
        broken: MockFactory::with_script(MockScript::default().silent_handshake()),
    };
    let session = NativeSession::new(
        Arc::new(factory),
        EngineConfig::default(),
        SessionTimeouts::default(),
    );

    assert!(matches!(
        session.initialize().await,
        Err(CoreError::HandshakeTimeout(_))
    ));
    assert_eq!(session.state(), SessionState::Error);

    session.initialize().await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test(start_paused = true)]
async fn disposed_session_can_initialize_again() {
    let (session, log) = session_with(MockScript::default());
    session.initialize().await.unwrap();
    session.dispose().await;

    session.initialize().await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(log.spawn_count(), 2);

    let mut events = session.subscribe();
    session.start_analysis(Some(1), None).await.unwrap();
    assert!(events.recv().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn evaluate_position_returns_best_move() {
    let (session, log) = session_with(MockScript::default());
    session.initialize().await.unwrap();

    let eval = session.evaluate_position(FEN_BLACK, 4).await.unwrap();
    assert_eq!(eval.best_move.as_deref(), Some("e2e4"));
    assert_eq!(eval.ponder.as_deref(), Some("e7e5"));
    assert_eq!(eval.depth, 4);
    let evaluation = eval.evaluation.unwrap();
    assert_eq!(evaluation.score, Score::Centipawns(14));
    assert_eq!(evaluation.side, Side::Black);
    assert!(log.commands().contains(&format!("position fen {FEN_BLACK}")));
    assert_eq!(log.count("go depth 4"), 1);
}

#[tokio::test(start_paused = true)]
async fn evaluate_position_interrupts_running_analysis() {
    let (session, log) = session_with(MockScript::default());
    session.initialize().await.unwrap();
    session.start_analysis(None, None).await.unwrap();

    let eval = session.evaluate_position("startpos", 2).await.unwrap();
    assert_eq!(eval.depth, 2);
    assert_eq!(eval.best_move.as_deref(), Some("e2e4"));
    assert_eq!(log.count("stop"), 1);
}

#[tokio::test(start_paused = true)]
async fn evaluate_position_timeout_returns_partial() {
    let (session, _log) = session_with(MockScript::default().withhold_bestmove());
    session.initialize().await.unwrap();

    let started = Instant::now();
    let eval = session.evaluate_position("startpos", 3).await.unwrap();
    assert!(started.elapsed() >= SessionTimeouts::default().evaluate);
    assert_eq!(eval.evaluation.map(|e| e.score), Some(Score::Centipawns(13)));
    assert_eq!(eval.best_move.as_deref(), Some("e2e4"));
    assert!(eval.ponder.is_none());
}

#[tokio::test(start_paused = true)]
async fn evaluate_position_without_engine_is_none() {
    let (session, _log) = session_with(MockScript::default());
    assert!(session.evaluate_position("startpos", 3).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn evaluate_position_timeout_without_output_is_none() {
    let (session, log) = session_with(MockScript::default().silent_search());
    session.initialize().await.unwrap();

    let started = Instant::now();
    assert!(session.evaluate_position("startpos", 3).await.is_none());
    assert!(started.elapsed() >= SessionTimeouts::default().evaluate);
    assert_eq!(log.count("go"), 1);
}

#[tokio::test(start_paused = true)]
async fn dead_engine_is_reported_and_commands_are_dropped() {
    let (session, log) = session_with(MockScript::default());
    session.initialize().await.unwrap();
    assert!(session.is_ready());

    log.crash_engines();
    assert!(!session.is_ready());
    log.clear();

    session.set_position("startpos", &[]).await.unwrap();
    session.start_analysis(Some(4), None).await.unwrap();
    assert!(log.commands().is_empty());
    assert!(session.evaluate_position("startpos", 4).await.is_none());

    session.dispose().await;
    assert_eq!(session.state(), SessionState::Disposed);
    assert_eq!(log.dispose_count(), 1);
}
