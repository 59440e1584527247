//! Shared foundation for the frontdesk workspace: configuration, the
//! domain error taxonomy, the injectable clock, tenant/session types,
//! phone normalization, session tokens, and PII masking.

pub mod clock;
pub mod config;
pub mod error;
pub mod mask;
pub mod phone;
pub mod secretbox;
pub mod token;
pub mod types;

pub use clock::Clock;
pub use error::{FrontdeskError, Result};
