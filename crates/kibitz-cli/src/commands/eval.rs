use super::{acquire, colorize_score, engine_manager, json_pretty, EXIT_SUCCESS};
use kibitz_core::Settings;
use kibitz_runtime::available_cores;

const OWNER: &str = "cli-eval";

pub async fn run(settings: &Settings, fen: &str, depth: u32, json_output: bool) -> Result<u8, String> {
    let config = settings
        .engine_config(available_cores())
        .map_err(|e| format!("settings error: {e}"))?;
    let manager = engine_manager(settings)?;
    let session = acquire(&manager, OWNER, config, json_output).await?;

    let result = session.evaluate_position(fen, depth).await;
    manager.release(OWNER).await;
    let eval = result.ok_or_else(|| format!("engine produced no evaluation for '{fen}'"))?;

    if json_output {
        println!("{}", json_pretty(&eval)?);
    } else {
        let score = eval
            .evaluation
            .map_or_else(|| "?".to_owned(), colorize_score);
        println!("score:     {score} (white)");
        println!("depth:     {}", eval.depth);
        if let Some(best) = &eval.best_move {
            println!("bestmove:  {best}");
        }
        if let Some(ponder) = &eval.ponder {
            println!("ponder:    {ponder}");
        }
    }
    Ok(EXIT_SUCCESS)
}
