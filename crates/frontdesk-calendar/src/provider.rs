use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use frontdesk_core::types::CalendarBinding;

/// `[start, end)` window during which the external calendar marks time
/// unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyRange {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }
}

/// An event to mirror onto the external calendar after a confirm.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarEvent {
    pub summary: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("calendar read failed: {0}")]
    Read(String),

    #[error("calendar write failed: {0}")]
    Write(String),

    #[error("calendar auth failed: {0}")]
    Auth(String),
}

impl From<CalendarError> for frontdesk_core::FrontdeskError {
    fn from(e: CalendarError) -> Self {
        match e {
            CalendarError::Read(m) | CalendarError::Auth(m) => {
                frontdesk_core::FrontdeskError::CalendarRead(m)
            }
            CalendarError::Write(m) => frontdesk_core::FrontdeskError::CalendarWrite(m),
        }
    }
}

/// Common interface for calendar backends. The implementation is chosen
/// once at startup from `calendar.mode`; there is no runtime switching.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Busy windows for `[from, to)`. Events marked transparent/free must
    /// not produce ranges.
    async fn get_busy_ranges(
        &self,
        binding: &CalendarBinding,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BusyRange>, CalendarError>;

    /// Create an event, returning the provider's event id.
    async fn create_event(
        &self,
        binding: &CalendarBinding,
        event: &CalendarEvent,
    ) -> Result<String, CalendarError>;

    async fn delete_event(
        &self,
        binding: &CalendarBinding,
        event_id: &str,
    ) -> Result<(), CalendarError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn overlap_is_half_open() {
        let t = |h| Utc.with_ymd_and_hms(2026, 2, 11, h, 0, 0).unwrap();
        let busy = BusyRange {
            start: t(10),
            end: t(11),
        };
        assert!(busy.overlaps(t(10), t(11)));
        assert!(busy.overlaps(t(9), t(11)));
        // Touching endpoints do not overlap.
        assert!(!busy.overlaps(t(11), t(12)));
        assert!(!busy.overlaps(t(9), t(10)));
    }
}
