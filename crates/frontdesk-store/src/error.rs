use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The requested row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The requested `[start, end)` range overlaps an active hold or a
    /// confirmed appointment for the same tenant.
    #[error("slot conflict: {0}")]
    SlotConflict(String),

    /// The hold exists but its expiry has passed.
    #[error("hold expired: {0}")]
    HoldExpired(String),

    /// Serialisation of a JSON column failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller supplied data the schema cannot hold.
    #[error("invalid record: {0}")]
    Invalid(String),
}

impl From<StoreError> for frontdesk_core::FrontdeskError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SlotConflict(msg) => frontdesk_core::FrontdeskError::SlotConflict(msg),
            StoreError::NotFound { entity, id } => {
                frontdesk_core::FrontdeskError::NotFound(format!("{entity} {id}"))
            }
            StoreError::HoldExpired(msg) => frontdesk_core::FrontdeskError::Booking(msg),
            other => frontdesk_core::FrontdeskError::Database(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
