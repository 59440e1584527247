use chrono::{DateTime, Utc};

use frontdesk_core::types::TenantId;
use frontdesk_store::models::{Appointment, Hold};

/// Domain events emitted by the booking stores and sweeps.
#[derive(Debug, Clone)]
pub enum Event {
    BookingCreated {
        appointment: Appointment,
    },
    BookingCancelled {
        appointment: Appointment,
    },
    BookingRescheduled {
        old_reference: String,
        appointment: Appointment,
    },
    HoldExpired {
        hold: Hold,
    },
    /// A previously blocked `[start, end)` window became free.
    SlotOpened {
        tenant_id: TenantId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        service: Option<String>,
    },
    /// Best-effort mirror to the external calendar failed after confirm.
    CalendarWriteFailed {
        tenant_id: TenantId,
        appointment_id: String,
        error: String,
    },
}

/// Dispatch key for handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BookingCreated,
    BookingCancelled,
    BookingRescheduled,
    HoldExpired,
    SlotOpened,
    CalendarWriteFailed,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::BookingCreated { .. } => EventKind::BookingCreated,
            Event::BookingCancelled { .. } => EventKind::BookingCancelled,
            Event::BookingRescheduled { .. } => EventKind::BookingRescheduled,
            Event::HoldExpired { .. } => EventKind::HoldExpired,
            Event::SlotOpened { .. } => EventKind::SlotOpened,
            Event::CalendarWriteFailed { .. } => EventKind::CalendarWriteFailed,
        }
    }
}
