//! Message bodies built from structured data, never from LLM output.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

fn format_when(start: DateTime<Utc>, tz: Tz) -> String {
    // "Thu Feb 12, 10:00 AM"
    start
        .with_timezone(&tz)
        .format("%a %b %-d, %-I:%M %p")
        .to_string()
}

/// `Confirmed: <svc> on <when>. Ref: <code>. Reply CHANGE / CANCEL / STOP.`
pub fn confirmation(
    service: Option<&str>,
    start: DateTime<Utc>,
    tz: Tz,
    reference: &str,
) -> String {
    format!(
        "Confirmed: {} on {}. Ref: {}. Reply CHANGE / CANCEL / STOP.",
        service.unwrap_or("your appointment"),
        format_when(start, tz),
        reference
    )
}

pub fn reminder(
    service: Option<&str>,
    start: DateTime<Utc>,
    tz: Tz,
    reference: &str,
) -> String {
    format!(
        "Reminder: {} on {}. Ref: {}. Reply CHANGE / CANCEL / STOP.",
        service.unwrap_or("your appointment"),
        format_when(start, tz),
        reference
    )
}

pub fn cancellation(reference: &str) -> String {
    format!(
        "Your booking {reference} has been cancelled. Reply STOP to opt out."
    )
}

pub fn waitlist_notice(service: Option<&str>, start: DateTime<Utc>, tz: Tz) -> String {
    format!(
        "A slot just opened for {} on {}. Reply YES to grab it.",
        service.unwrap_or("your requested service"),
        format_when(start, tz)
    )
}

pub fn handoff_link(url: &str) -> String {
    format!("Continue your booking here: {url}. Reply STOP to opt out.")
}
