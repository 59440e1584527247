//! Booking domain logic: deterministic datetime resolution, the
//! availability engine, the cancel-verification decider, and behavioural
//! risk scoring.

pub mod availability;
pub mod cancel;
pub mod resolver;
pub mod risk;

pub use availability::{AvailabilityEngine, AvailabilityResult, Slot};
pub use cancel::{verify_cancellation, CancelDecision, CancelInput, CancelMethod, CancelRefusal};
pub use resolver::{resolve_datetime, Confidence, ResolvedDateTime};
pub use risk::{RiskAction, RiskAssessment, RiskEngine};
