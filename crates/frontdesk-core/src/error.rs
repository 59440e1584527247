use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontdeskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Booking error: {0}")]
    Booking(String),

    #[error("Slot conflict: {0}")]
    SlotConflict(String),

    #[error("Calendar read failed: {0}")]
    CalendarRead(String),

    #[error("Calendar write failed: {0}")]
    CalendarWrite(String),

    #[error("Carrier error: {0}")]
    Carrier(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("Policy denied '{action}': {reason}")]
    PolicyDenied { action: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Token rejected: {0}")]
    TokenRejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FrontdeskError {
    /// Stable error-code string. The tool executor prefixes its results
    /// with these, and the structured log line carries the same value, so
    /// what the agent reads and what ops greps for never drift apart.
    pub fn code(&self) -> &'static str {
        match self {
            FrontdeskError::Config(_) => "CONFIG_ERROR",
            FrontdeskError::Database(_) => "DATABASE_ERROR",
            FrontdeskError::Booking(_) => "BOOKING_ERROR",
            FrontdeskError::SlotConflict(_) => "SLOT_CONFLICT",
            FrontdeskError::CalendarRead(_) => "CALENDAR_UNAVAILABLE",
            FrontdeskError::CalendarWrite(_) => "CALENDAR_WRITE_FAILED",
            FrontdeskError::Carrier(_) => "CARRIER_ERROR",
            FrontdeskError::LlmProvider(_) => "LLM_PROVIDER_ERROR",
            FrontdeskError::PolicyDenied { .. } => "POLICY_DENIED",
            FrontdeskError::InvalidInput(_) => "INVALID_INPUT",
            FrontdeskError::TokenRejected(_) => "TOKEN_REJECTED",
            FrontdeskError::NotFound(_) => "NOT_FOUND",
            FrontdeskError::Serialization(_) => "SERIALIZATION_ERROR",
            FrontdeskError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, FrontdeskError>;
