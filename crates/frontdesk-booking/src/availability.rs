//! Free-slot computation: candidates from business hours minus external
//! busy ranges, confirmed appointments, and active holds.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use frontdesk_calendar::{BusyRangeCache, CalendarProvider};
use frontdesk_core::types::Tenant;
use frontdesk_core::{Clock, FrontdeskError, Result};
use frontdesk_store::appointments::AppointmentStore;
use frontdesk_store::holds::HoldStore;

/// One candidate slot with its availability flag. Callers filter before
/// presenting; returning the full set keeps the engine's output stable
/// for diagnostics.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityResult {
    pub slots: Vec<Slot>,
    /// Whether every conflict source was consulted successfully.
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_error: Option<String>,
}

pub struct AvailabilityEngine {
    appointments: Arc<AppointmentStore>,
    holds: Arc<HoldStore>,
    calendar: Arc<dyn CalendarProvider>,
    cache: Arc<BusyRangeCache>,
    clock: Clock,
    /// Strict mode: a provider failure aborts the check instead of
    /// degrading to db-only results.
    read_required: bool,
}

impl AvailabilityEngine {
    pub fn new(
        appointments: Arc<AppointmentStore>,
        holds: Arc<HoldStore>,
        calendar: Arc<dyn CalendarProvider>,
        cache: Arc<BusyRangeCache>,
        clock: Clock,
        read_required: bool,
    ) -> Self {
        Self {
            appointments,
            holds,
            calendar,
            cache,
            clock,
            read_required,
        }
    }

    /// Compute slots in `[from, to)` for a tenant.
    ///
    /// A tenant without a calendar binding is always strict-verified —
    /// there is nothing external to consult.
    pub async fn get_available_slots(
        &self,
        tenant: &Tenant,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<AvailabilityResult> {
        if from >= to {
            return Err(FrontdeskError::InvalidInput(
                "availability range is empty".into(),
            ));
        }

        let now = self.clock.now_utc();
        let candidates = candidate_slots(tenant, from, to, now);

        // External busy ranges, through the TTL cache.
        let (busy, verified, calendar_source, calendar_error) = match &tenant.calendar {
            None => (Vec::new(), true, None, None),
            Some(binding) => {
                if let Some(cached) = self.cache.get(&tenant.id, from, to, now) {
                    debug!(tenant = %tenant.id, "busy cache hit");
                    (cached, true, Some(self.calendar.name().to_string()), None)
                } else {
                    match self.calendar.get_busy_ranges(binding, from, to).await {
                        Ok(ranges) => {
                            self.cache.put(&tenant.id, from, to, ranges.clone(), now);
                            (ranges, true, Some(self.calendar.name().to_string()), None)
                        }
                        Err(e) if self.read_required => {
                            return Err(FrontdeskError::CalendarRead(e.to_string()));
                        }
                        Err(e) => {
                            warn!(tenant = %tenant.id, error = %e, "calendar read failed, degrading to db-only");
                            (
                                Vec::new(),
                                false,
                                Some("db_only".to_string()),
                                Some(e.to_string()),
                            )
                        }
                    }
                }
            }
        };

        let appointments = self.appointments.confirmed_in_range(&tenant.id, from, to)?;
        let holds = self.holds.active_in_range(&tenant.id, from, to)?;

        let slots: Vec<Slot> = candidates
            .into_iter()
            .map(|(start, end)| {
                let conflicted = busy.iter().any(|b| b.overlaps(start, end))
                    || appointments
                        .iter()
                        .any(|a| a.start_utc < end && a.end_utc > start)
                    || holds
                        .iter()
                        .any(|h| h.start_utc < end && h.end_utc > start);
                Slot {
                    start,
                    end,
                    available: !conflicted,
                }
            })
            .collect();

        Ok(AvailabilityResult {
            slots,
            verified,
            calendar_source,
            calendar_error,
        })
    }
}

/// Candidate slot starts at slot-duration granularity inside business
/// hours, skipping anything already in the past.
fn candidate_slots(
    tenant: &Tenant,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let tz = tenant.timezone;
    let step = Duration::minutes(tenant.slot_minutes as i64);
    let mut out = Vec::new();

    let mut day = from.with_timezone(&tz).date_naive();
    let last_day = to.with_timezone(&tz).date_naive();

    while day <= last_day {
        if let Some(hours) = tenant.hours.for_weekday(day.weekday()) {
            let mut cursor = day.and_time(hours.open);
            let close = day.and_time(hours.close);
            loop {
                let slot_end_naive = cursor + step;
                if slot_end_naive > close {
                    break;
                }
                // Skip DST gap times rather than guessing.
                if let Some(start_local) = tz.from_local_datetime(&cursor).earliest() {
                    let start = start_local.with_timezone(&Utc);
                    let end = start + step;
                    if start >= from && start < to && start >= now {
                        out.push((start, end));
                    }
                }
                cursor = slot_end_naive;
            }
        }
        day = day + Duration::days(1);
    }
    out
}
