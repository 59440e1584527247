use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Injectable "now". Every time read in the workspace goes through a
/// `Clock` so availability math, hold expiry, and the datetime resolver
/// can be pinned in tests.
///
/// Cheap to clone; share as `Arc<Clock>` across stores and workers.
#[derive(Debug, Clone)]
pub struct Clock {
    fixed: Option<DateTime<Utc>>,
}

impl Clock {
    /// Wall-clock time.
    pub fn system() -> Self {
        Self { fixed: None }
    }

    /// Frozen time for deterministic tests.
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self { fixed: Some(at) }
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        self.fixed.unwrap_or_else(Utc::now)
    }

    /// Now projected into an IANA timezone.
    pub fn now_in(&self, tz: Tz) -> DateTime<Tz> {
        self.now_utc().with_timezone(&tz)
    }

    /// The current calendar date as seen in `tz`.
    pub fn today_in(&self, tz: Tz) -> NaiveDate {
        self.now_in(tz).date_naive()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}
