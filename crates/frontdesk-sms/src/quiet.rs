//! Quiet-hours shifting: messages due inside the tenant's local quiet
//! window are deferred to the next window close.

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;

use frontdesk_core::types::QuietHours;

/// If `at` falls inside quiet hours (tenant-local), return the next
/// instant the window opens; otherwise `None` (send now).
pub fn next_send_time(
    quiet: &QuietHours,
    tz: Tz,
    at: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let local = at.with_timezone(&tz);
    if !quiet.contains(local.time()) {
        return None;
    }

    // The window ends at quiet.end — today if still ahead, else tomorrow.
    let mut end_date = local.date_naive();
    if local.time() >= quiet.end {
        end_date = end_date + Duration::days(1);
    }
    let naive = end_date.and_time(quiet.end);
    let resumed = tz.from_local_datetime(&naive).earliest()?;
    Some(resumed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use chrono_tz::America::New_York;

    fn quiet_9to8() -> QuietHours {
        QuietHours {
            start: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn daytime_sends_immediately() {
        // 15:00 UTC = 10:00 ET.
        let at = Utc.with_ymd_and_hms(2026, 2, 11, 15, 0, 0).unwrap();
        assert!(next_send_time(&quiet_9to8(), New_York, at).is_none());
    }

    #[test]
    fn late_evening_defers_to_next_morning() {
        // 02:30 UTC Feb 12 = 21:30 ET Feb 11 — inside the window.
        let at = Utc.with_ymd_and_hms(2026, 2, 12, 2, 30, 0).unwrap();
        let resumed = next_send_time(&quiet_9to8(), New_York, at).unwrap();
        // 08:00 ET Feb 12 = 13:00 UTC.
        assert_eq!(
            resumed,
            Utc.with_ymd_and_hms(2026, 2, 12, 13, 0, 0).unwrap()
        );
    }

    #[test]
    fn early_morning_defers_to_same_morning() {
        // 08:30 UTC = 03:30 ET — inside the window, before today's 08:00.
        let at = Utc.with_ymd_and_hms(2026, 2, 11, 8, 30, 0).unwrap();
        let resumed = next_send_time(&quiet_9to8(), New_York, at).unwrap();
        assert_eq!(
            resumed,
            Utc.with_ymd_and_hms(2026, 2, 11, 13, 0, 0).unwrap()
        );
    }
}
