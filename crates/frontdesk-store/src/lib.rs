//! SQLite persistence for frontdesk.
//!
//! Every store wraps the shared `Arc<Mutex<Connection>>` handle. Slot
//! exclusion (one winner per overlapping hold/appointment) is enforced
//! with `BEGIN IMMEDIATE` transactions: SQLite's single-writer lock makes
//! the overlap check and the insert atomic.

pub mod appointments;
pub mod audit;
pub mod customers;
pub mod db;
pub mod error;
pub mod followups;
pub mod holds;
pub mod models;
pub mod optout;
pub mod outbox;
pub mod sessions;
pub mod tenants;
pub mod verification;
pub mod waitlist;

pub use db::{open_db, open_memory_db, Db};
pub use error::{Result, StoreError};
