//! Deterministic natural-language date/time resolution.
//!
//! Maps utterances like "tomorrow at 3pm" to absolute instants in a
//! given timezone. Pure: same (utterance, now, tz) always yields the
//! same output. Returns `None` whenever the utterance lacks a date
//! token, or has a date but no usable time — the caller must ask the
//! customer instead of guessing.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::OnceLock;

use frontdesk_core::types::BusinessHours;

/// Default appointment length when the utterance gives only a start.
const DEFAULT_DURATION_MIN: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedDateTime {
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub confidence: Confidence,
    /// Machine-readable trace of which tokens drove the resolution.
    pub reasons: Vec<String>,
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,2}):(\d{2})\s*(am|pm)?\b|\b(\d{1,2})\s*(am|pm)\b").unwrap()
    })
}

fn bare_at_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bat\s+(\d{1,2})\b").unwrap())
}

/// Resolve an utterance to a concrete `[start, end)` in UTC.
///
/// `client_tz` wins over `tenant_tz` when it names a valid IANA zone.
/// `business_hours` only informs the "morning" period keyword.
pub fn resolve_datetime(
    utterance: &str,
    client_tz: Option<&str>,
    tenant_tz: Tz,
    business_hours: Option<&BusinessHours>,
    now: DateTime<Utc>,
) -> Option<ResolvedDateTime> {
    let tz: Tz = client_tz
        .and_then(|s| s.parse().ok())
        .unwrap_or(tenant_tz);

    let text = utterance.to_lowercase();
    let mut reasons = Vec::new();

    let local_now = now.with_timezone(&tz);
    let today = local_now.date_naive();

    // --- date token ---------------------------------------------------
    let date = if text.contains("day after tomorrow") {
        reasons.push("relative_day:day_after_tomorrow".to_string());
        Some(today + Duration::days(2))
    } else if text.contains("tomorrow") {
        reasons.push("relative_day:tomorrow".to_string());
        Some(today + Duration::days(1))
    } else if text.contains("today") || text.contains("tonight") {
        reasons.push("relative_day:today".to_string());
        Some(today)
    } else if let Some((weekday, next_qualified, name)) = find_weekday(&text) {
        let mut ahead = (weekday.num_days_from_monday() as i64
            - today.weekday().num_days_from_monday() as i64)
            .rem_euclid(7);
        if next_qualified && ahead == 0 {
            // "next monday" said on a Monday means a week out.
            ahead = 7;
        }
        reasons.push(format!("named_day:{name}"));
        Some(today + Duration::days(ahead))
    } else {
        None
    };

    // No date token: the caller must ask.
    let date = date?;

    // --- time token ---------------------------------------------------
    let (time, time_confidence) = match extract_time(&text, business_hours, &mut reasons) {
        Some(t) => t,
        // Date without a time is insufficient for booking.
        None => return None,
    };

    let naive = date.and_time(time);
    // DST gaps: take the earliest valid interpretation.
    let start_local = tz.from_local_datetime(&naive).earliest()?;
    let start_utc = start_local.with_timezone(&Utc);
    let end_utc = start_utc + Duration::minutes(DEFAULT_DURATION_MIN);

    Some(ResolvedDateTime {
        start_utc,
        end_utc,
        confidence: time_confidence,
        reasons,
    })
}

/// Weekday name scan, returning (weekday, was "next"-qualified, matched name).
fn find_weekday(text: &str) -> Option<(Weekday, bool, String)> {
    const DAYS: [(&str, Weekday); 7] = [
        ("monday", Weekday::Mon),
        ("tuesday", Weekday::Tue),
        ("wednesday", Weekday::Wed),
        ("thursday", Weekday::Thu),
        ("friday", Weekday::Fri),
        ("saturday", Weekday::Sat),
        ("sunday", Weekday::Sun),
    ];
    for (name, day) in DAYS {
        if let Some(pos) = text.find(name) {
            let before = &text[..pos];
            let next_qualified = before.trim_end().ends_with("next");
            return Some((day, next_qualified, name.to_string()));
        }
    }
    None
}

fn extract_time(
    text: &str,
    business_hours: Option<&BusinessHours>,
    reasons: &mut Vec<String>,
) -> Option<(NaiveTime, Confidence)> {
    // Explicit clock time: 10:30am, 3pm, 14:00.
    if let Some(caps) = time_re().captures(text) {
        if let (Some(h), Some(m)) = (caps.get(1), caps.get(2)) {
            let hour: u32 = h.as_str().parse().ok()?;
            let minute: u32 = m.as_str().parse().ok()?;
            let hour = apply_meridiem(hour, caps.get(3).map(|m| m.as_str()))?;
            reasons.push(format!("clock_time:{}:{minute:02}", hour));
            return Some((NaiveTime::from_hms_opt(hour, minute, 0)?, Confidence::High));
        }
        if let (Some(h), Some(mer)) = (caps.get(4), caps.get(5)) {
            let hour: u32 = h.as_str().parse().ok()?;
            let hour = apply_meridiem(hour, Some(mer.as_str()))?;
            reasons.push(format!("clock_time:{hour}:00"));
            return Some((NaiveTime::from_hms_opt(hour, 0, 0)?, Confidence::High));
        }
    }

    // Bare "at 2" — presumed PM when in the 1–7 range.
    if let Some(caps) = bare_at_re().captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        if (1..=7).contains(&hour) {
            reasons.push(format!("bare_hour_presumed_pm:{hour}"));
            return Some((NaiveTime::from_hms_opt(hour + 12, 0, 0)?, Confidence::Medium));
        }
        if hour <= 23 {
            reasons.push(format!("bare_hour:{hour}"));
            return Some((NaiveTime::from_hms_opt(hour, 0, 0)?, Confidence::Medium));
        }
        return None;
    }

    // Period keywords.
    if text.contains("morning") {
        let open = business_hours
            .and_then(|h| h.days.iter().flatten().next().map(|d| d.open))
            .unwrap_or_else(|| NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        reasons.push("period:morning".to_string());
        return Some((open, Confidence::Medium));
    }
    if text.contains("noon") || text.contains("midday") {
        reasons.push("period:noon".to_string());
        return Some((NaiveTime::from_hms_opt(12, 0, 0).unwrap(), Confidence::Medium));
    }
    if text.contains("afternoon") {
        reasons.push("period:afternoon".to_string());
        return Some((NaiveTime::from_hms_opt(14, 0, 0).unwrap(), Confidence::Medium));
    }
    if text.contains("evening") {
        reasons.push("period:evening".to_string());
        return Some((NaiveTime::from_hms_opt(17, 0, 0).unwrap(), Confidence::Medium));
    }

    None
}

fn apply_meridiem(hour: u32, meridiem: Option<&str>) -> Option<u32> {
    match meridiem {
        Some("pm") if hour < 12 => Some(hour + 12),
        Some("pm") => Some(hour),
        Some("am") if hour == 12 => Some(0),
        Some("am") => Some(hour),
        None if hour <= 23 => Some(hour),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    // Wednesday 2026-02-11, 15:00 UTC = 10:00 ET.
    fn wed_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 11, 15, 0, 0).unwrap()
    }

    fn resolve(utterance: &str, now: DateTime<Utc>) -> Option<ResolvedDateTime> {
        resolve_datetime(utterance, None, New_York, None, now)
    }

    #[test]
    fn tomorrow_at_ten() {
        let r = resolve("Can I book tomorrow at 10am?", wed_morning()).unwrap();
        assert_eq!(
            r.start_utc,
            Utc.with_ymd_and_hms(2026, 2, 12, 15, 0, 0).unwrap()
        );
        assert_eq!(r.confidence, Confidence::High);
        assert_eq!(r.end_utc - r.start_utc, Duration::minutes(60));
    }

    #[test]
    fn today_at_3pm_in_client_zone_ignores_claims_about_the_day() {
        // Tuesday 2026-02-17, 15:00 UTC.
        let now = Utc.with_ymd_and_hms(2026, 2, 17, 15, 0, 0).unwrap();
        let r = resolve_datetime(
            "today at 3pm",
            Some("America/New_York"),
            chrono_tz::UTC,
            None,
            now,
        )
        .unwrap();
        assert_eq!(
            r.start_utc,
            Utc.with_ymd_and_hms(2026, 2, 17, 20, 0, 0).unwrap()
        );
    }

    #[test]
    fn deterministic() {
        let a = resolve("friday at 2:30pm", wed_morning()).unwrap();
        let b = resolve("friday at 2:30pm", wed_morning()).unwrap();
        assert_eq!(a.start_utc, b.start_utc);
        assert_eq!(a.reasons, b.reasons);
    }

    #[test]
    fn bare_weekday_same_day_when_matching() {
        // 2026-02-11 is a Wednesday.
        let r = resolve("wednesday at 2pm", wed_morning()).unwrap();
        assert_eq!(
            r.start_utc,
            Utc.with_ymd_and_hms(2026, 2, 11, 19, 0, 0).unwrap()
        );
    }

    #[test]
    fn bare_weekday_rolls_forward_otherwise() {
        // Next Monday from Wed 02-11 is 02-16.
        let r = resolve("monday at 9am", wed_morning()).unwrap();
        assert_eq!(
            r.start_utc,
            Utc.with_ymd_and_hms(2026, 2, 16, 14, 0, 0).unwrap()
        );
    }

    #[test]
    fn next_weekday_on_that_weekday_means_a_week_out() {
        let r = resolve("next wednesday at 10am", wed_morning()).unwrap();
        assert_eq!(
            r.start_utc,
            Utc.with_ymd_and_hms(2026, 2, 18, 15, 0, 0).unwrap()
        );
    }

    #[test]
    fn bare_at_two_is_presumed_pm() {
        let r = resolve("tomorrow at 2", wed_morning()).unwrap();
        assert_eq!(
            r.start_utc,
            Utc.with_ymd_and_hms(2026, 2, 12, 19, 0, 0).unwrap()
        );
        assert_eq!(r.confidence, Confidence::Medium);
        assert!(r.reasons.iter().any(|s| s.starts_with("bare_hour_presumed_pm")));
    }

    #[test]
    fn twenty_four_hour_clock() {
        let r = resolve("tomorrow at 14:00", wed_morning()).unwrap();
        assert_eq!(
            r.start_utc,
            Utc.with_ymd_and_hms(2026, 2, 12, 19, 0, 0).unwrap()
        );
    }

    #[test]
    fn period_keywords() {
        let r = resolve("tomorrow afternoon", wed_morning()).unwrap();
        // 14:00 ET = 19:00 UTC.
        assert_eq!(
            r.start_utc,
            Utc.with_ymd_and_hms(2026, 2, 12, 19, 0, 0).unwrap()
        );

        let r = resolve("tomorrow evening", wed_morning()).unwrap();
        assert_eq!(
            r.start_utc,
            Utc.with_ymd_and_hms(2026, 2, 12, 22, 0, 0).unwrap()
        );
    }

    #[test]
    fn morning_uses_business_open_hour() {
        let hours = BusinessHours::weekdays(
            NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        );
        let r = resolve_datetime(
            "tomorrow morning",
            None,
            New_York,
            Some(&hours),
            wed_morning(),
        )
        .unwrap();
        // 08:30 ET = 13:30 UTC.
        assert_eq!(
            r.start_utc,
            Utc.with_ymd_and_hms(2026, 2, 12, 13, 30, 0).unwrap()
        );
    }

    #[test]
    fn no_date_token_is_none() {
        assert!(resolve("at 3pm please", wed_morning()).is_none());
        assert!(resolve("what are your prices?", wed_morning()).is_none());
    }

    #[test]
    fn date_without_time_is_none() {
        assert!(resolve("can I come in tomorrow?", wed_morning()).is_none());
        assert!(resolve("next friday works", wed_morning()).is_none());
    }

    #[test]
    fn invalid_client_tz_falls_back_to_tenant() {
        let r = resolve_datetime(
            "tomorrow at 10am",
            Some("Not/AZone"),
            New_York,
            None,
            wed_morning(),
        )
        .unwrap();
        assert_eq!(
            r.start_utc,
            Utc.with_ymd_and_hms(2026, 2, 12, 15, 0, 0).unwrap()
        );
    }

    #[test]
    fn day_after_tomorrow() {
        let r = resolve("day after tomorrow at 10am", wed_morning()).unwrap();
        assert_eq!(
            r.start_utc,
            Utc.with_ymd_and_hms(2026, 2, 13, 15, 0, 0).unwrap()
        );
    }
}
