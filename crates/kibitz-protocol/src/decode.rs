//! Stateless translation of engine output lines into [`EngineEvent`]s.
//!
//! Engines interleave structured output with free-form log text, so anything
//! that is not a well-formed `bestmove` or scored/depth-carrying `info` line
//! decodes to `None` instead of an error.

use crate::event::{EngineEvent, PvInfo, SearchStats};
use crate::types::{Evaluation, Score, Side};
use std::str::FromStr;

/// Tokens that open a new labeled group inside an `info` line.
const INFO_KEYWORDS: &[&str] = &[
    "info",
    "depth",
    "seldepth",
    "multipv",
    "score",
    "nodes",
    "nps",
    "time",
    "pv",
    "hashfull",
    "tbhits",
    "currmove",
    "currmovenumber",
    "string",
];

/// Move tokens meaning "there is no legal move".
const NO_MOVE_TOKENS: &[&str] = &["(none)", "0000"];

/// Decode one engine output line.
///
/// `perspective` is the side to move in the position being searched; it is
/// attached to every evaluation so callers can normalize scores later.
pub fn decode(line: &str, perspective: Side) -> Option<EngineEvent> {
    let mut tokens = line.split_whitespace();
    match tokens.next()? {
        "bestmove" => decode_bestmove(tokens),
        "info" => decode_info(line, perspective),
        _ => None,
    }
}

fn decode_bestmove<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Option<EngineEvent> {
    let best = tokens.next().filter(|m| !NO_MOVE_TOKENS.contains(m))?;
    let ponder = match tokens.next() {
        Some("ponder") => tokens
            .next()
            .filter(|m| !NO_MOVE_TOKENS.contains(m))
            .map(str::to_owned),
        _ => None,
    };
    Some(EngineEvent::BestMove {
        best: best.to_owned(),
        ponder,
    })
}

struct Group<'a> {
    label: &'a str,
    values: Vec<&'a str>,
}

fn group_tokens(line: &str) -> Vec<Group<'_>> {
    let mut groups: Vec<Group<'_>> = Vec::new();
    for token in line.split_whitespace() {
        if INFO_KEYWORDS.contains(&token) {
            groups.push(Group {
                label: token,
                values: Vec::new(),
            });
        } else if let Some(current) = groups.last_mut() {
            current.values.push(token);
        }
    }
    groups
}

fn find<'g, 'a>(groups: &'g [Group<'a>], label: &str) -> Option<&'g Group<'a>> {
    groups.iter().find(|g| g.label == label)
}

fn value<T: FromStr>(groups: &[Group<'_>], label: &str) -> Option<T> {
    find(groups, label)?.values.first()?.parse().ok()
}

fn parse_score(values: &[&str]) -> Option<Score> {
    let amount: i32 = values.get(1)?.parse().ok()?;
    match *values.first()? {
        "cp" => Some(Score::Centipawns(amount)),
        "mate" => Some(Score::Mate(amount)),
        _ => None,
    }
}

fn decode_info(line: &str, perspective: Side) -> Option<EngineEvent> {
    let groups = group_tokens(line);
    if find(&groups, "string").is_some() {
        return None;
    }

    let depth: u32 = value(&groups, "depth")?;
    let stats = SearchStats {
        depth: Some(depth),
        nodes: value(&groups, "nodes"),
        nps: value(&groups, "nps"),
        time_ms: value(&groups, "time"),
        hashfull: value(&groups, "hashfull"),
        tbhits: value(&groups, "tbhits"),
    };

    let score = match find(&groups, "score") {
        Some(group) => parse_score(&group.values)?,
        None => return Some(EngineEvent::Stats(stats)),
    };

    let moves = find(&groups, "pv")
        .map(|g| g.values.iter().map(|m| (*m).to_owned()).collect())
        .unwrap_or_default();

    Some(EngineEvent::PrincipalVariation(PvInfo {
        rank: value(&groups, "multipv").unwrap_or(1),
        depth,
        seldepth: value(&groups, "seldepth"),
        evaluation: Evaluation::new(score, perspective),
        moves,
        stats,
    }))
}

/// Lines exchanged during the `uci`/`isready` handshakes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeLine {
    UciOk,
    ReadyOk,
    IdName(String),
}

impl HandshakeLine {
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        match trimmed {
            "uciok" => Some(HandshakeLine::UciOk),
            "readyok" => Some(HandshakeLine::ReadyOk),
            _ => trimmed
                .strip_prefix("id name ")
                .map(|name| HandshakeLine::IdName(name.trim().to_owned())),
        }
    }
}
