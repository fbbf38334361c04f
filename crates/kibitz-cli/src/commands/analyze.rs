use super::{acquire, colorize_score, engine_manager, json_line, EXIT_SUCCESS};
use crate::AnalyzeArgs;
use kibitz_core::{AnalysisSession, Settings, ShutdownSignal};
use kibitz_protocol::{EngineEvent, PvInfo};
use kibitz_runtime::available_cores;
use tokio::sync::broadcast::error::RecvError;

const OWNER: &str = "cli-analyze";

pub async fn run(
    settings: &Settings,
    args: &AnalyzeArgs,
    shutdown: &ShutdownSignal,
    json_output: bool,
) -> Result<u8, String> {
    let mut settings = settings.clone();
    if let Some(preset) = &args.preset {
        settings.analysis.preset.clone_from(preset);
    }
    let config = settings
        .engine_config(available_cores())
        .map_err(|e| format!("settings error: {e}"))?;

    let manager = engine_manager(&settings)?;
    let session = acquire(&manager, OWNER, config, json_output).await?;
    let mut events = session.subscribe();

    let started = async {
        session
            .set_position(&args.fen, &args.moves)
            .await
            .map_err(|e| e.to_string())?;
        session
            .start_analysis(args.depth, args.movetime)
            .await
            .map_err(|e| e.to_string())
    };
    if let Err(e) = started.await {
        manager.release(OWNER).await;
        return Err(e);
    }

    let outcome = stream(session.as_ref(), &mut events, shutdown, json_output).await;
    manager.release(OWNER).await;
    outcome.map(|()| EXIT_SUCCESS)
}

async fn stream(
    session: &dyn AnalysisSession,
    events: &mut tokio::sync::broadcast::Receiver<EngineEvent>,
    shutdown: &ShutdownSignal,
    json_output: bool,
) -> Result<(), String> {
    loop {
        let event = tokio::select! {
            received = events.recv() => received,
            () = shutdown.wait() => {
                session.stop().await;
                // The engine answers `stop` with its move; the session has
                // already let it through by the time `stop` returns.
                while let Ok(event) = events.try_recv() {
                    let done = matches!(event, EngineEvent::BestMove { .. });
                    print_event(&event, json_output)?;
                    if done {
                        break;
                    }
                }
                return Ok(());
            }
        };
        match event {
            Ok(event) => {
                print_event(&event, json_output)?;
                if matches!(event, EngineEvent::BestMove { .. }) {
                    return Ok(());
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("output fell behind, skipped {skipped} engine events");
            }
            Err(RecvError::Closed) => return Err("engine stopped unexpectedly".to_owned()),
        }
    }
}

fn print_event(event: &EngineEvent, json_output: bool) -> Result<(), String> {
    if json_output {
        println!("{}", json_line(event)?);
        return Ok(());
    }
    match event {
        EngineEvent::PrincipalVariation(pv) => println!("{}", format_pv(pv)),
        EngineEvent::BestMove { best, ponder } => match ponder {
            Some(ponder) => println!("bestmove {best} ponder {ponder}"),
            None => println!("bestmove {best}"),
        },
        EngineEvent::Stats(_) => {}
    }
    Ok(())
}

fn format_pv(pv: &PvInfo) -> String {
    let mut line = format!(
        "depth {:>2}  #{}  {:>7}  {}",
        pv.depth,
        pv.rank,
        colorize_score(pv.evaluation),
        pv.moves.join(" ")
    );
    if let Some(nodes) = pv.stats.nodes {
        line.push_str(&format!("  ({nodes} nodes)"));
    }
    line
}
