//! Error classification: one function feeds both the user-facing error
//! prefix and the structured log code, so they can never drift apart.

use uuid::Uuid;

use frontdesk_core::FrontdeskError;

/// Map a domain error to its stable taxonomy prefix.
pub fn classify_code(e: &FrontdeskError) -> &'static str {
    match e {
        FrontdeskError::SlotConflict(_) => "SLOT_CONFLICT",
        FrontdeskError::CalendarRead(_) => "CALENDAR_UNAVAILABLE",
        FrontdeskError::Booking(_)
        | FrontdeskError::NotFound(_)
        | FrontdeskError::InvalidInput(_) => "BOOKING_ERROR",
        FrontdeskError::PolicyDenied { .. } => "BOOKING_ERROR",
        _ => "INTERNAL_ERROR",
    }
}

/// 12-hex-char correlation id, shared verbatim between the structured
/// log line and the user-facing INTERNAL_ERROR message.
pub fn correlation_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_errors_keep_their_prefix() {
        assert_eq!(
            classify_code(&FrontdeskError::SlotConflict("x".into())),
            "SLOT_CONFLICT"
        );
        assert_eq!(
            classify_code(&FrontdeskError::CalendarRead("x".into())),
            "CALENDAR_UNAVAILABLE"
        );
        assert_eq!(
            classify_code(&FrontdeskError::Booking("x".into())),
            "BOOKING_ERROR"
        );
    }

    #[test]
    fn unknown_errors_collapse_to_internal() {
        assert_eq!(
            classify_code(&FrontdeskError::Database("io".into())),
            "INTERNAL_ERROR"
        );
        assert_eq!(
            classify_code(&FrontdeskError::Internal("?".into())),
            "INTERNAL_ERROR"
        );
    }

    #[test]
    fn correlation_id_shape() {
        let id = correlation_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(correlation_id(), correlation_id());
    }
}
