//! Cancel-verification decider.
//!
//! A pure decision table answering one question: is this caller
//! authorized to cancel this reference? Negative outcomes are precise
//! internally but MUST be collapsed to one generic message by the caller
//! so a probing caller cannot learn whether a reference code exists.

use frontdesk_store::models::{Appointment, AppointmentStatus};

/// Everything known about the caller at decision time.
#[derive(Debug, Clone, Default)]
pub struct CancelInput<'a> {
    pub reference_code: Option<&'a str>,
    pub phone_last4: Option<&'a str>,
    /// Session completed an email-OTP round-trip.
    pub session_verified: bool,
    pub session_email: Option<&'a str>,
    pub session_phone: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelMethod {
    VerifiedSession,
    PhoneLast4,
}

impl CancelMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelMethod::VerifiedSession => "verified_session",
            CancelMethod::PhoneLast4 => "phone_last4",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelRefusal {
    MissingRefCode,
    ReferenceNotFound,
    InvalidLast4Format,
    NoPhoneOnBooking,
    PhoneLast4Mismatch,
    MissingVerification,
}

impl CancelRefusal {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelRefusal::MissingRefCode => "missing_ref_code",
            CancelRefusal::ReferenceNotFound => "reference_not_found",
            CancelRefusal::InvalidLast4Format => "invalid_last4_format",
            CancelRefusal::NoPhoneOnBooking => "no_phone_on_booking",
            CancelRefusal::PhoneLast4Mismatch => "phone_last4_mismatch",
            CancelRefusal::MissingVerification => "missing_verification",
        }
    }
}

#[derive(Debug, Clone)]
pub enum CancelDecision {
    Authorized {
        method: CancelMethod,
        booking: Box<Appointment>,
    },
    Refused {
        reason: CancelRefusal,
    },
}

/// Evaluate the decision table in order. `lookup` resolves a reference
/// code to an appointment of any status; the decider itself filters to
/// confirmed.
pub fn verify_cancellation<F>(input: &CancelInput<'_>, lookup: F) -> CancelDecision
where
    F: Fn(&str) -> Option<Appointment>,
{
    let reference = match input.reference_code.map(str::trim) {
        Some(r) if !r.is_empty() => r,
        _ => {
            return CancelDecision::Refused {
                reason: CancelRefusal::MissingRefCode,
            }
        }
    };

    let booking = match lookup(reference) {
        Some(b) if b.status == AppointmentStatus::Confirmed => b,
        // Missing and non-confirmed are indistinguishable downstream.
        _ => {
            return CancelDecision::Refused {
                reason: CancelRefusal::ReferenceNotFound,
            }
        }
    };

    if input.session_verified {
        let email_match = input
            .session_email
            .map(|e| e.eq_ignore_ascii_case(&booking.client_email))
            .unwrap_or(false);
        let phone_match = input
            .session_phone
            .map(|p| p == booking.client_phone)
            .unwrap_or(false);
        if email_match || phone_match {
            return CancelDecision::Authorized {
                method: CancelMethod::VerifiedSession,
                booking: Box::new(booking),
            };
        }
    }

    if let Some(last4) = input.phone_last4.map(str::trim) {
        let booking_phone = booking.client_phone.trim();
        let has_phone = !booking_phone.is_empty();

        if has_phone && !(last4.len() == 4 && last4.chars().all(|c| c.is_ascii_digit())) {
            return CancelDecision::Refused {
                reason: CancelRefusal::InvalidLast4Format,
            };
        }
        if !has_phone {
            return CancelDecision::Refused {
                reason: CancelRefusal::NoPhoneOnBooking,
            };
        }

        let digits: String = booking_phone
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        let booking_last4 = &digits[digits.len().saturating_sub(4)..];

        if booking_last4 != last4 {
            return CancelDecision::Refused {
                reason: CancelRefusal::PhoneLast4Mismatch,
            };
        }
        return CancelDecision::Authorized {
            method: CancelMethod::PhoneLast4,
            booking: Box::new(booking),
        };
    }

    CancelDecision::Refused {
        reason: CancelRefusal::MissingVerification,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use frontdesk_core::types::TenantId;

    fn booking(phone: &str, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: "a1".into(),
            tenant_id: TenantId::from("t1"),
            reference_code: "APT-REAL42".into(),
            client_name: "Dana Smith".into(),
            client_email: "dana@example.com".into(),
            client_phone: phone.into(),
            service: None,
            start_utc: Utc.with_ymd_and_hms(2026, 2, 12, 15, 0, 0).unwrap(),
            end_utc: Utc.with_ymd_and_hms(2026, 2, 12, 15, 30, 0).unwrap(),
            timezone: "America/New_York".into(),
            status,
            calendar_event_id: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn lookup_real(phone: &'static str) -> impl Fn(&str) -> Option<Appointment> {
        move |r: &str| {
            (r == "APT-REAL42").then(|| booking(phone, AppointmentStatus::Confirmed))
        }
    }

    fn refused(decision: CancelDecision) -> CancelRefusal {
        match decision {
            CancelDecision::Refused { reason } => reason,
            other => panic!("expected refusal, got {other:?}"),
        }
    }

    #[test]
    fn missing_reference() {
        let d = verify_cancellation(&CancelInput::default(), |_| None);
        assert_eq!(refused(d), CancelRefusal::MissingRefCode);
    }

    #[test]
    fn unknown_reference() {
        let input = CancelInput {
            reference_code: Some("APT-NONE"),
            ..Default::default()
        };
        let d = verify_cancellation(&input, |_| None);
        assert_eq!(refused(d), CancelRefusal::ReferenceNotFound);
    }

    #[test]
    fn cancelled_booking_reads_as_not_found() {
        let input = CancelInput {
            reference_code: Some("APT-REAL42"),
            phone_last4: Some("4567"),
            ..Default::default()
        };
        let d = verify_cancellation(&input, |_| {
            Some(booking("+15551234567", AppointmentStatus::Cancelled))
        });
        assert_eq!(refused(d), CancelRefusal::ReferenceNotFound);
    }

    #[test]
    fn verified_session_email_match_authorizes() {
        let input = CancelInput {
            reference_code: Some("APT-REAL42"),
            session_verified: true,
            session_email: Some("DANA@example.com"),
            ..Default::default()
        };
        match verify_cancellation(&input, lookup_real("+15551234567")) {
            CancelDecision::Authorized { method, .. } => {
                assert_eq!(method, CancelMethod::VerifiedSession)
            }
            other => panic!("expected authorized, got {other:?}"),
        }
    }

    #[test]
    fn verified_session_without_matching_identity_falls_through() {
        let input = CancelInput {
            reference_code: Some("APT-REAL42"),
            session_verified: true,
            session_email: Some("other@example.com"),
            ..Default::default()
        };
        let d = verify_cancellation(&input, lookup_real("+15551234567"));
        assert_eq!(refused(d), CancelRefusal::MissingVerification);
    }

    #[test]
    fn last4_format_checked_before_matching() {
        let input = CancelInput {
            reference_code: Some("APT-REAL42"),
            phone_last4: Some("45a7"),
            ..Default::default()
        };
        let d = verify_cancellation(&input, lookup_real("+15551234567"));
        assert_eq!(refused(d), CancelRefusal::InvalidLast4Format);

        let input = CancelInput {
            reference_code: Some("APT-REAL42"),
            phone_last4: Some("567"),
            ..Default::default()
        };
        let d = verify_cancellation(&input, lookup_real("+15551234567"));
        assert_eq!(refused(d), CancelRefusal::InvalidLast4Format);
    }

    #[test]
    fn booking_without_phone() {
        let input = CancelInput {
            reference_code: Some("APT-REAL42"),
            phone_last4: Some("4567"),
            ..Default::default()
        };
        let d = verify_cancellation(&input, lookup_real(""));
        assert_eq!(refused(d), CancelRefusal::NoPhoneOnBooking);
    }

    #[test]
    fn last4_mismatch_and_match() {
        let input = CancelInput {
            reference_code: Some("APT-REAL42"),
            phone_last4: Some("9999"),
            ..Default::default()
        };
        let d = verify_cancellation(&input, lookup_real("+15551234567"));
        assert_eq!(refused(d), CancelRefusal::PhoneLast4Mismatch);

        let input = CancelInput {
            reference_code: Some("APT-REAL42"),
            phone_last4: Some("4567"),
            ..Default::default()
        };
        match verify_cancellation(&input, lookup_real("+15551234567")) {
            CancelDecision::Authorized { method, booking } => {
                assert_eq!(method, CancelMethod::PhoneLast4);
                assert_eq!(booking.reference_code, "APT-REAL42");
            }
            other => panic!("expected authorized, got {other:?}"),
        }
    }

    #[test]
    fn no_proof_at_all_asks_for_verification() {
        let input = CancelInput {
            reference_code: Some("APT-REAL42"),
            ..Default::default()
        };
        let d = verify_cancellation(&input, lookup_real("+15551234567"));
        assert_eq!(refused(d), CancelRefusal::MissingVerification);
    }
}
