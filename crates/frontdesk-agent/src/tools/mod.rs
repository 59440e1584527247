//! The seven booking tools exposed to the LLM.
//!
//! Each module implements one handler; `tool_definitions` is the single
//! source of truth for the names and argument schemas on the wire.

pub mod cancel_booking;
pub mod check_availability;
pub mod confirm_booking;
pub mod followup;
pub mod hold_slot;
pub mod lookup_booking;
pub mod reschedule_booking;

use chrono::{DateTime, Utc};

use crate::executor::ToolError;
use crate::provider::ToolDefinition;

/// Required string argument, trimmed and non-empty.
pub(crate) fn require_str<'a>(
    input: &'a serde_json::Value,
    key: &str,
) -> Result<&'a str, ToolError> {
    match input.get(key).and_then(|v| v.as_str()).map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(ToolError::guardrail(
            "BOOKING_ERROR",
            format!("missing required argument '{key}'"),
        )),
    }
}

pub(crate) fn optional_str<'a>(input: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Parse an ISO-8601 instant ("2026-02-12T15:00:00Z" and offset forms).
pub(crate) fn parse_instant(value: &str, key: &str) -> Result<DateTime<Utc>, ToolError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            ToolError::guardrail(
                "BOOKING_ERROR",
                format!("'{key}' must be an ISO-8601 timestamp, got '{value}'"),
            )
        })
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "check_availability".into(),
            description: "List open appointment slots between two dates. \
                          Always call this before offering times to the customer."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "start_date": {"type": "string", "description": "ISO-8601 start of the search window"},
                    "end_date": {"type": "string", "description": "ISO-8601 end of the search window"},
                    "service_name": {"type": "string", "description": "Requested service, when the customer named one"}
                },
                "required": ["start_date", "end_date"]
            }),
        },
        ToolDefinition {
            name: "hold_slot".into(),
            description: "Reserve a specific slot for this conversation for five minutes. \
                          Required before confirm_booking."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "start_time": {"type": "string", "description": "ISO-8601 slot start"},
                    "end_time": {"type": "string", "description": "ISO-8601 slot end"},
                    "far_date_confirmed": {"type": "boolean", "description": "Set true only after the customer explicitly re-confirmed a far-future date"}
                },
                "required": ["start_time", "end_time"]
            }),
        },
        ToolDefinition {
            name: "confirm_booking".into(),
            description: "Convert a hold into a confirmed appointment. Requires the \
                          customer's verified email and a phone number."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "hold_id": {"type": "string"},
                    "client_name": {"type": "string"},
                    "client_email": {"type": "string"},
                    "client_phone": {"type": "string"},
                    "service_name": {"type": "string"}
                },
                "required": ["hold_id", "client_name", "client_email", "client_phone"]
            }),
        },
        ToolDefinition {
            name: "lookup_booking".into(),
            description: "Find confirmed bookings by reference code or email.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "reference_code": {"type": "string"},
                    "email": {"type": "string"}
                }
            }),
        },
        ToolDefinition {
            name: "reschedule_booking".into(),
            description: "Move an existing booking onto a newly held slot. \
                          Hold the new slot first."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "appointment_id": {"type": "string"},
                    "new_hold_id": {"type": "string"}
                },
                "required": ["appointment_id", "new_hold_id"]
            }),
        },
        ToolDefinition {
            name: "cancel_booking".into(),
            description: "Cancel a booking by reference code. Unverified callers must \
                          supply the last 4 digits of the phone number on the booking."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "reference_code": {"type": "string"},
                    "phone_last4": {"type": "string"}
                },
                "required": ["reference_code"]
            }),
        },
        ToolDefinition {
            name: "schedule_contact_followup".into(),
            description: "Schedule a human follow-up with the customer's consent.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "client_name": {"type": "string"},
                    "client_email": {"type": "string"},
                    "preferred_contact": {"type": "string", "enum": ["email", "sms", "either"]},
                    "reason": {"type": "string"},
                    "notes": {"type": "string"}
                },
                "required": ["client_name", "client_email", "preferred_contact", "reason"]
            }),
        },
    ]
}
