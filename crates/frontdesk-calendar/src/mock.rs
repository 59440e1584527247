//! Programmable in-memory calendar for tests and `calendar.mode = "mock"`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use frontdesk_core::types::CalendarBinding;

use crate::provider::{BusyRange, CalendarError, CalendarEvent, CalendarProvider};

#[derive(Default)]
pub struct MockCalendar {
    busy: Mutex<Vec<BusyRange>>,
    created: Mutex<Vec<(String, CalendarEvent)>>,
    deleted: Mutex<Vec<String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    next_id: AtomicU64,
}

impl MockCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_busy(ranges: Vec<BusyRange>) -> Self {
        let cal = Self::default();
        *cal.busy.lock().unwrap() = ranges;
        cal
    }

    pub fn set_busy(&self, ranges: Vec<BusyRange>) {
        *self.busy.lock().unwrap() = ranges;
    }

    /// Make every read fail with `CalendarError::Read`.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn created_events(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn deleted_events(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarProvider for MockCalendar {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_busy_ranges(
        &self,
        _binding: &CalendarBinding,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BusyRange>, CalendarError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CalendarError::Read("mock read failure".into()));
        }
        Ok(self
            .busy
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.overlaps(from, to))
            .copied()
            .collect())
    }

    async fn create_event(
        &self,
        _binding: &CalendarBinding,
        event: &CalendarEvent,
    ) -> Result<String, CalendarError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CalendarError::Write("mock write failure".into()));
        }
        let id = format!("mock-evt-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.created
            .lock()
            .unwrap()
            .push((id.clone(), event.clone()));
        // The created event blocks future availability too.
        self.busy.lock().unwrap().push(BusyRange {
            start: event.start,
            end: event.end,
        });
        Ok(id)
    }

    async fn delete_event(
        &self,
        _binding: &CalendarBinding,
        event_id: &str,
    ) -> Result<(), CalendarError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CalendarError::Write("mock write failure".into()));
        }
        self.deleted.lock().unwrap().push(event_id.to_string());
        Ok(())
    }
}
