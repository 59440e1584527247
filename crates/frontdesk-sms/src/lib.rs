//! Outbound SMS pipeline: body builders, the carrier client (real and
//! simulator), the outbox worker, quiet-hours shifting, and carrier
//! status-webhook processing with signature validation.

pub mod body;
pub mod carrier;
pub mod quiet;
pub mod webhook;
pub mod worker;

pub use carrier::{
    carrier_from_config, CarrierErrorCategory, CarrierSendError, HttpCarrier, SendOutcome,
    SimulatorCarrier, SmsSender,
};
pub use worker::{OutboxWorker, WorkerDeps};
