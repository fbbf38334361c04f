use crate::types::Evaluation;
use serde::{Deserialize, Serialize};

/// Counters an engine attaches to its `info` lines. Every field is optional
/// because engines report them at their own discretion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nps: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashfull: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tbhits: Option<u64>,
}

/// One ranked candidate line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PvInfo {
    /// 1-based rank among the principal variations (`multipv`).
    pub rank: u32,
    pub depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seldepth: Option<u32>,
    pub evaluation: Evaluation,
    pub moves: Vec<String>,
    pub stats: SearchStats,
}

impl PvInfo {
    pub fn first_move(&self) -> Option<&str> {
        self.moves.first().map(String::as_str)
    }
}

/// Structured output published to session subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    BestMove {
        best: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ponder: Option<String>,
    },
    PrincipalVariation(PvInfo),
    Stats(SearchStats),
}
