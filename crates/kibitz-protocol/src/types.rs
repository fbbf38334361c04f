use serde::{Deserialize, Serialize};
use std::fmt;

/// The side a score is reported for. UCI engines always score from the
/// point of view of the side to move in the searched position.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    White,
    Black,
}

impl Side {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    /// Side to move according to the active-colour field of a FEN string.
    ///
    /// Returns `None` when the field is missing or is neither `w` nor `b`.
    /// Only the second field is inspected; the rest of the FEN is left to
    /// the engine to validate.
    pub fn from_fen(fen: &str) -> Option<Self> {
        match fen.split_whitespace().nth(1)? {
            "w" => Some(Side::White),
            "b" => Some(Side::Black),
            _ => None,
        }
    }

    /// Side to move after `plies` half-moves have been played from `self`.
    #[must_use]
    pub fn after_moves(self, plies: usize) -> Self {
        if plies % 2 == 0 {
            self
        } else {
            self.opposite()
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => write!(f, "white"),
            Side::Black => write!(f, "black"),
        }
    }
}

/// A raw engine score. Exactly one of the two forms is ever reported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Score {
    /// Material-style score in hundredths of a pawn.
    Centipawns(i32),
    /// Forced mate in N moves; negative when the scored side is being mated.
    Mate(i32),
}

impl Score {
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Score::Centipawns(cp) => Score::Centipawns(-cp),
            Score::Mate(n) => Score::Mate(-n),
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Centipawns(cp) => {
                let pawns = f64::from(*cp) / 100.0;
                write!(f, "{pawns:+.2}")
            }
            Score::Mate(n) if *n < 0 => write!(f, "-M{}", n.unsigned_abs()),
            Score::Mate(n) => write!(f, "M{n}"),
        }
    }
}

/// A score tagged with the side whose perspective it is reported from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Evaluation {
    pub score: Score,
    pub side: Side,
}

impl Evaluation {
    pub fn new(score: Score, side: Side) -> Self {
        Self { score, side }
    }

    /// The same evaluation expressed from White's point of view.
    #[must_use]
    pub fn white_relative(self) -> Self {
        match self.side {
            Side::White => self,
            Side::Black => Self {
                score: self.score.negate(),
                side: Side::White,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn side_from_fen() {
        assert_eq!(Side::from_fen(START_FEN), Some(Side::White));
        assert_eq!(
            Side::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"),
            Some(Side::Black)
        );
        assert_eq!(Side::from_fen("garbage"), None);
        assert_eq!(Side::from_fen("8/8/8/8/8/8/8/8 x - - 0 1"), None);
    }

    #[test]
    fn side_after_moves_flips_per_ply() {
        assert_eq!(Side::White.after_moves(0), Side::White);
        assert_eq!(Side::White.after_moves(1), Side::Black);
        assert_eq!(Side::Black.after_moves(3), Side::White);
    }

    #[test]
    fn white_relative_negates_black_scores() {
        let eval = Evaluation::new(Score::Centipawns(35), Side::Black);
        assert_eq!(
            eval.white_relative(),
            Evaluation::new(Score::Centipawns(-35), Side::White)
        );

        let mate = Evaluation::new(Score::Mate(3), Side::White);
        assert_eq!(mate.white_relative(), mate);
    }

    #[test]
    fn score_display() {
        assert_eq!(Score::Centipawns(35).to_string(), "+0.35");
        assert_eq!(Score::Centipawns(-120).to_string(), "-1.20");
        assert_eq!(Score::Mate(3).to_string(), "M3");
        assert_eq!(Score::Mate(-2).to_string(), "-M2");
    }

    #[test]
    fn score_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Score::Mate(3)).unwrap();
        assert_eq!(json, r#"{"kind":"mate","value":3}"#);
    }
}
