pub mod analyze;
pub mod completions;
pub mod doctor;
pub mod eval;
pub mod presets;

use indicatif::{ProgressBar, ProgressStyle};
use kibitz_core::{AccessManager, AnalysisSession, Settings};
use kibitz_protocol::{Evaluation, Score};
use std::sync::Arc;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_SETTINGS_ERROR: u8 = 2;
pub const EXIT_ENGINE_UNAVAILABLE: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn json_line(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_done(pb: &ProgressBar, ok: bool, msg: &str) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    let icon = if ok { "✓" } else { "✗" };
    pb.finish_with_message(format!("{icon} {msg}"));
}

/// Score from White's point of view, coloured by who is better.
pub fn colorize_score(evaluation: Evaluation) -> String {
    use console::Style;
    let score = evaluation.white_relative().score;
    let style = match score {
        Score::Centipawns(cp) if cp.abs() < 30 => Style::new(),
        Score::Centipawns(cp) if cp > 0 => Style::new().green(),
        Score::Mate(n) if n > 0 => Style::new().green().bold(),
        Score::Mate(_) => Style::new().red().bold(),
        Score::Centipawns(_) => Style::new().red(),
    };
    style.apply_to(score).to_string()
}

/// Build an access manager for the configured backend. Fails when the
/// backend cannot run here.
pub fn engine_manager(settings: &Settings) -> Result<AccessManager, String> {
    let factory = settings
        .factory()
        .map_err(|e| format!("engine unavailable: {e}"))?;
    let manager = AccessManager::detect(factory, settings.timeouts());
    if !manager.capability().is_supported() {
        let missing = kibitz_runtime::check_engine_prereqs(&settings.engine.path);
        let detail = if settings.engine.backend == "process" && !missing.is_empty() {
            kibitz_runtime::format_missing(&missing)
        } else {
            format!("backend '{}' cannot run on this host", settings.engine.backend)
        };
        return Err(format!("engine unavailable: {detail}"));
    }
    Ok(manager)
}

/// Acquire the engine for `owner`, with a spinner on interactive output.
pub async fn acquire(
    manager: &AccessManager,
    owner: &str,
    config: kibitz_core::EngineConfig,
    json_output: bool,
) -> Result<Arc<dyn AnalysisSession>, String> {
    let pb = (!json_output).then(|| spinner("starting engine..."));
    let acquired = manager.acquire(owner, Some(config)).await;
    match (&acquired, &pb) {
        (Ok(session), Some(pb)) => {
            let name = session.engine_name().unwrap_or_else(|| "engine".to_owned());
            spin_done(pb, true, &format!("{name} ready"));
        }
        (Err(_), Some(pb)) => spin_done(pb, false, "engine failed to start"),
        _ => {}
    }
    acquired.map_err(|e| format!("engine error: {e}"))
}
