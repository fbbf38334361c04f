mod commands;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_ENGINE_UNAVAILABLE, EXIT_FAILURE, EXIT_SETTINGS_ERROR};
use kibitz_core::{install_signal_handler, Settings};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "kibitz",
    version,
    about = "Drive a UCI chess engine through an exclusive-access session"
)]
struct Cli {
    /// Path to the settings file (default: ~/.config/kibitz/kibitz.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Engine binary to run, or `mock` for the built-in scripted engine.
    #[arg(long, global = true)]
    engine: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Stream analysis of a position until the engine picks a move.
    Analyze(AnalyzeArgs),
    /// Evaluate a position once and print the score and best move.
    Eval {
        /// Position as FEN, or `startpos`.
        fen: String,
        /// Search depth.
        #[arg(long, default_value_t = 16)]
        depth: u32,
    },
    /// List the built-in engine configuration presets.
    Presets,
    /// Check that the configured engine can be found and started.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Position as FEN, or `startpos`.
    pub fen: String,
    /// Moves played from the position, in long algebraic notation.
    #[arg(long, num_args = 1..)]
    pub moves: Vec<String>,
    /// Stop at this depth.
    #[arg(long)]
    pub depth: Option<u32>,
    /// Search for this many milliseconds. Takes precedence over --depth.
    #[arg(long)]
    pub movetime: Option<u64>,
    /// Configuration preset (see `kibitz presets`).
    #[arg(long)]
    pub preset: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("KIBITZ_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    if let Commands::Completions { shell } = cli.command {
        return ExitCode::from(commands::completions::run::<Cli>(shell));
    }
    if matches!(cli.command, Commands::Presets) {
        return finish(commands::presets::run(cli.json));
    }

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(msg) => return finish(Err(msg)),
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => return finish(Err(format!("failed to start async runtime: {e}"))),
    };

    let json_output = cli.json;
    let result = runtime.block_on(async {
        match cli.command {
            Commands::Analyze(args) => {
                let shutdown = install_signal_handler();
                commands::analyze::run(&settings, &args, &shutdown, json_output).await
            }
            Commands::Eval { fen, depth } => {
                commands::eval::run(&settings, &fen, depth, json_output).await
            }
            Commands::Doctor => commands::doctor::run(&settings, json_output).await,
            Commands::Presets | Commands::Completions { .. } => Ok(commands::EXIT_SUCCESS),
        }
    });
    finish(result)
}

fn load_settings(cli: &Cli) -> Result<Settings, String> {
    let mut settings = Settings::load_or_default(cli.config.as_deref())
        .map_err(|e| format!("settings error: {e}"))?
        .with_env_overrides();
    if let Some(engine) = &cli.engine {
        if engine == "mock" {
            "mock".clone_into(&mut settings.engine.backend);
        } else {
            "process".clone_into(&mut settings.engine.backend);
            settings.engine.path.clone_from(engine);
        }
    }
    Ok(settings)
}

fn finish(result: Result<u8, String>) -> ExitCode {
    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("settings error:") {
                EXIT_SETTINGS_ERROR
            } else if msg.starts_with("engine unavailable:") {
                EXIT_ENGINE_UNAVAILABLE
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
