//! UCI protocol layer for kibitz.
//!
//! This crate is the leaf of the workspace: it turns raw engine output lines
//! into structured [`EngineEvent`]s (`decode`), renders outgoing commands to
//! their wire text (`UciCommand`), and defines the evaluation vocabulary
//! (`Side`, `Score`, `Evaluation`) shared by the session and its callers.
//! Nothing here performs I/O or holds state.

pub mod command;
pub mod decode;
pub mod event;
pub mod types;

pub use command::{SearchLimit, UciCommand};
pub use decode::{decode, HandshakeLine};
pub use event::{EngineEvent, PvInfo, SearchStats};
pub use types::{Evaluation, Score, Side};
