use serde::{Deserialize, Serialize};
use std::fmt;

/// How long a `go` command lets the engine search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum SearchLimit {
    MoveTime(u64),
    Depth(u32),
    Infinite,
}

impl SearchLimit {
    /// Pick a search mode with strict precedence: a move time whenever one
    /// is given, then a positive depth (the explicit one, else
    /// `fallback_depth`), then an unbounded search.
    pub fn choose(depth: Option<u32>, move_time_ms: Option<u64>, fallback_depth: u32) -> Self {
        if let Some(ms) = move_time_ms {
            return SearchLimit::MoveTime(ms);
        }
        let depth = depth.unwrap_or(fallback_depth);
        if depth > 0 {
            SearchLimit::Depth(depth)
        } else {
            SearchLimit::Infinite
        }
    }
}

/// Commands sent from the GUI side to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciCommand {
    Uci,
    IsReady,
    UciNewGame,
    SetOption { name: String, value: String },
    Position { fen: Option<String>, moves: Vec<String> },
    Go(SearchLimit),
    Stop,
    Quit,
}

impl UciCommand {
    pub fn set_option(name: &str, value: impl fmt::Display) -> Self {
        UciCommand::SetOption {
            name: name.to_owned(),
            value: value.to_string(),
        }
    }

    /// `position fen ...`, or `position startpos ...` when `fen` is the
    /// literal `startpos`.
    pub fn position(fen: &str, moves: &[String]) -> Self {
        let fen = fen.trim();
        UciCommand::Position {
            fen: (fen != "startpos").then(|| fen.to_owned()),
            moves: moves.to_vec(),
        }
    }
}

impl fmt::Display for UciCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UciCommand::Uci => write!(f, "uci"),
            UciCommand::IsReady => write!(f, "isready"),
            UciCommand::UciNewGame => write!(f, "ucinewgame"),
            UciCommand::SetOption { name, value } => {
                write!(f, "setoption name {name} value {value}")
            }
            UciCommand::Position { fen, moves } => {
                match fen {
                    Some(fen) => write!(f, "position fen {fen}")?,
                    None => write!(f, "position startpos")?,
                }
                if !moves.is_empty() {
                    write!(f, " moves {}", moves.join(" "))?;
                }
                Ok(())
            }
            UciCommand::Go(SearchLimit::MoveTime(ms)) => write!(f, "go movetime {ms}"),
            UciCommand::Go(SearchLimit::Depth(depth)) => write!(f, "go depth {depth}"),
            UciCommand::Go(SearchLimit::Infinite) => write!(f, "go infinite"),
            UciCommand::Stop => write!(f, "stop"),
            UciCommand::Quit => write!(f, "quit"),
        }
    }
}
