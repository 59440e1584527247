//! Process-local table of in-flight calls.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use frontdesk_core::types::{SessionId, TenantId};

/// Per-call conversation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Greeting,
    CollectingIntent,
    CollectingService,
    CollectingDate,
    CollectingSlotChoice,
    CollectingName,
    CollectingEmail,
    ConfirmingBooking,
    CollectingReference,
    Completed,
}

/// Everything gathered so far on a call.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    pub intent: Option<crate::nlu::CallIntent>,
    pub service: Option<String>,
    pub offered_slots: Vec<(DateTime<Utc>, DateTime<Utc>, String)>,
    pub hold_id: Option<String>,
    pub slot_label: Option<String>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub reference_code: Option<String>,
    /// Set when the flow is rescheduling an existing appointment.
    pub reschedule_appointment_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VoiceSession {
    pub call_id: String,
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    /// Caller's number from the carrier, E.164.
    pub caller_phone: Option<String>,
    pub state: VoiceState,
    pub collected: Collected,
    /// Consecutive failed parses in the current state.
    pub retries: u32,
    pub turns: u32,
    pub started_at: DateTime<Utc>,
}

impl VoiceSession {
    pub fn new(
        call_id: &str,
        tenant_id: TenantId,
        session_id: SessionId,
        caller_phone: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            call_id: call_id.to_string(),
            tenant_id,
            session_id,
            caller_phone,
            state: VoiceState::Greeting,
            collected: Collected::default(),
            retries: 0,
            turns: 0,
            started_at: now,
        }
    }
}

/// In-process call table keyed by call id. Evicted on call end and by a
/// periodic age sweep so abandoned calls do not accumulate.
pub struct VoiceSessionTable {
    calls: DashMap<String, VoiceSession>,
    max_age: Duration,
}

impl VoiceSessionTable {
    pub fn new(max_age_secs: i64) -> Self {
        Self {
            calls: DashMap::new(),
            max_age: Duration::seconds(max_age_secs),
        }
    }

    pub fn insert(&self, session: VoiceSession) {
        self.calls.insert(session.call_id.clone(), session);
    }

    pub fn get(&self, call_id: &str) -> Option<VoiceSession> {
        self.calls.get(call_id).map(|s| s.clone())
    }

    pub fn update(&self, session: VoiceSession) {
        self.calls.insert(session.call_id.clone(), session);
    }

    pub fn remove(&self, call_id: &str) {
        self.calls.remove(call_id);
    }

    /// Drop calls older than the age cap. Returns how many were evicted.
    pub fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let before = self.calls.len();
        self.calls
            .retain(|_, s| now - s.started_at < self.max_age);
        before - self.calls.len()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
