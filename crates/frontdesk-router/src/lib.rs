//! Deterministic chat router: FSM flows, storefront FAQ, the email-OTP
//! gate, and datetime injection all run before any LLM call; the
//! response post-processor runs after.

pub mod faq;
pub mod fsm;
pub mod intent;
pub mod otp;
pub mod postprocess;
pub mod router;

pub use intent::{classify_intent, Intent};
pub use postprocess::{post_process, PostProcessContext};
pub use router::{ChatRouter, RouterDeps, RouterReply};
