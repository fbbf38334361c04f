use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug, Serialize)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn is_executable_file(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Check that `program` can be launched as a UCI engine process.
/// Bare names are looked up on `PATH`; anything with a path separator must
/// point at an executable file. Empty list means the engine can be spawned.
pub fn check_engine_prereqs(program: &str) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if program.trim().is_empty() {
        missing.push(MissingPrereq {
            name: "engine path".to_owned(),
            purpose: "location of the UCI engine binary",
            install_hint: "set [engine] path in kibitz.toml or pass --engine",
        });
        return missing;
    }

    let found = if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        is_executable_file(Path::new(program))
    } else {
        command_exists(program)
    };

    if !found {
        missing.push(MissingPrereq {
            name: program.to_owned(),
            purpose: "UCI chess engine used for analysis",
            install_hint: "zypper install stockfish | apt install stockfish | dnf install stockfish | pacman -S stockfish",
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nkibitz needs a UCI engine binary to analyze positions.");
    msg
}
