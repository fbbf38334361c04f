use super::{json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use kibitz_core::{AccessManager, EngineConfig, Settings};
use kibitz_runtime::available_cores;
use serde::Serialize;

const OWNER: &str = "cli-doctor";

pub async fn run(settings: &Settings, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();

    checks.push(Check::info(
        "host_cores",
        &format!("{} cores available", available_cores()),
    ));
    match settings.engine_config(available_cores()) {
        Ok(_) => checks.push(Check::pass(
            "analysis_preset",
            &format!("Analysis preset '{}' is valid", settings.analysis.preset),
        )),
        Err(e) => checks.push(Check::fail("analysis_preset", &e.to_string())),
    }

    check_prereqs(settings, &mut checks);
    check_engine(settings, &mut checks).await;

    let all_pass = checks.iter().all(|c| c.status != "fail");
    print_results(&checks, all_pass, json_output)
}

fn check_prereqs(settings: &Settings, checks: &mut Vec<Check>) {
    if settings.engine.backend != "process" {
        checks.push(Check::info(
            "engine_prereqs",
            &format!("Backend '{}' has no external prerequisites", settings.engine.backend),
        ));
        return;
    }
    let missing = kibitz_runtime::check_engine_prereqs(&settings.engine.path);
    if missing.is_empty() {
        checks.push(Check::pass(
            "engine_prereqs",
            &format!("Engine binary '{}' found", settings.engine.path),
        ));
    } else {
        checks.push(Check::fail(
            "engine_prereqs",
            &format!(
                "Missing prerequisites: {}",
                kibitz_runtime::format_missing(&missing)
            ),
        ));
    }
}

/// Start the engine for real and report what it calls itself.
async fn check_engine(settings: &Settings, checks: &mut Vec<Check>) {
    let factory = match settings.factory() {
        Ok(factory) => factory,
        Err(e) => {
            checks.push(Check::fail("engine_backend", &e.to_string()));
            return;
        }
    };
    let manager = AccessManager::detect(factory, settings.timeouts());
    if !manager.capability().is_supported() {
        checks.push(Check::fail(
            "engine_handshake",
            "Engine cannot run on this host, analysis is disabled",
        ));
        return;
    }

    match manager.acquire(OWNER, Some(EngineConfig::default())).await {
        Ok(session) => {
            let name = session
                .engine_name()
                .unwrap_or_else(|| "unnamed engine".to_owned());
            checks.push(Check::pass(
                "engine_handshake",
                &format!("Engine handshake OK ({name})"),
            ));
        }
        Err(e) => checks.push(Check::fail(
            "engine_handshake",
            &format!("Engine failed to start: {e}"),
        )),
    }
    manager.force_release().await;
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let report = Report {
            healthy: all_pass,
            checks,
        };
        println!("{}", json_pretty(&report)?);
    } else {
        println!("kibitz doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

#[derive(Serialize)]
struct Report<'a> {
    healthy: bool,
    checks: &'a [Check],
}

#[derive(Serialize)]
struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }

    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }
}
