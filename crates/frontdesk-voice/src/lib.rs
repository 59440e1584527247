//! Voice channel: per-call state machine and lightweight NLU over
//! carrier transcripts. Booking side-effects all route through the same
//! tool executor as web chat — this crate implements no booking logic
//! of its own.

pub mod flow;
pub mod nlu;
pub mod session;

pub use flow::{TurnAction, VoiceFlow, VoiceTurn};
pub use session::{VoiceSession, VoiceSessionTable, VoiceState};
