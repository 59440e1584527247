//! Stock event handlers. Each one enqueues durable work; the outbox
//! worker and sweeps do the actual I/O later.

use std::sync::Arc;

use chrono::Duration;
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use frontdesk_core::config::SmsConfig;
use frontdesk_core::mask::phone_last4;
use frontdesk_core::Clock;
use frontdesk_sms::body;
use frontdesk_store::audit::AuditStore;
use frontdesk_store::models::{MessageType, WaitlistStatus};
use frontdesk_store::outbox::{EnqueueSms, OutboxStore};
use frontdesk_store::sessions::SessionStore;
use frontdesk_store::followups::FollowupStore;
use frontdesk_store::waitlist::WaitlistStore;

use crate::bus::EventHandler;
use crate::policy::PolicyEngine;
use crate::types::Event;

fn parse_tz(tag: &str) -> Tz {
    tag.parse().unwrap_or(chrono_tz::UTC)
}

/// On `BookingCreated`: enqueue the confirmation SMS plus 24h/2h
/// reminders, gated by policy and phone presence.
pub struct BookingSmsHandler {
    pub outbox: Arc<OutboxStore>,
    pub audit: Arc<AuditStore>,
    pub policy: Arc<PolicyEngine>,
    pub clock: Clock,
    pub sms: SmsConfig,
    pub sms_enabled: bool,
}

impl EventHandler for BookingSmsHandler {
    fn name(&self) -> &str {
        "booking_sms"
    }

    fn handle(&self, event: &Event) -> frontdesk_core::Result<()> {
        let appointment = match event {
            Event::BookingCreated { appointment }
            | Event::BookingRescheduled { appointment, .. } => appointment,
            _ => return Ok(()),
        };

        if !self.sms_enabled {
            debug!("sms feature disabled, skipping confirmation");
            return Ok(());
        }

        let decision = self.policy.evaluate(
            Some(&appointment.tenant_id),
            "send_sms_confirmation",
            &serde_json::json!({ "reference": appointment.reference_code }),
        );
        if !decision.allowed {
            info!(reason = %decision.reason, "confirmation SMS blocked by policy");
            return Ok(());
        }

        if appointment.client_phone.trim().is_empty() {
            debug!("booking has no phone, skipping confirmation SMS");
            return Ok(());
        }

        let tz = parse_tz(&appointment.timezone);
        let now = self.clock.now_utc();

        let enqueue = |message_type: MessageType,
                       body_text: String,
                       run_at: chrono::DateTime<chrono::Utc>|
         -> frontdesk_core::Result<()> {
            self.outbox
                .enqueue(&EnqueueSms {
                    tenant_id: appointment.tenant_id.clone(),
                    to_phone: appointment.client_phone.clone(),
                    body: body_text,
                    message_type,
                    booking_reference: Some(appointment.reference_code.clone()),
                    run_at,
                    max_attempts: self.sms.max_attempts,
                })
                .map_err(|e| {
                    self.audit.append_best_effort(
                        &appointment.tenant_id,
                        "sms.booking_confirmation_failed",
                        Some("appointment"),
                        Some(&appointment.id),
                        "event_handler",
                        serde_json::json!({
                            "phone_last4": phone_last4(&appointment.client_phone),
                            "error": e.to_string(),
                        }),
                    );
                    e.into()
                })
                .map(|_| ())
        };

        enqueue(
            MessageType::BookingConfirmation,
            body::confirmation(
                appointment.service.as_deref(),
                appointment.start_utc,
                tz,
                &appointment.reference_code,
            ),
            now,
        )?;

        // Reminders only when the lead time still exists.
        let reminder_24h = appointment.start_utc - Duration::hours(24);
        if reminder_24h > now {
            enqueue(
                MessageType::Reminder24h,
                body::reminder(
                    appointment.service.as_deref(),
                    appointment.start_utc,
                    tz,
                    &appointment.reference_code,
                ),
                reminder_24h,
            )?;
        }
        let reminder_2h = appointment.start_utc - Duration::hours(2);
        if reminder_2h > now {
            enqueue(
                MessageType::Reminder2h,
                body::reminder(
                    appointment.service.as_deref(),
                    appointment.start_utc,
                    tz,
                    &appointment.reference_code,
                ),
                reminder_2h,
            )?;
        }
        Ok(())
    }
}

/// On `BookingCancelled`: a courtesy cancellation text.
pub struct CancellationSmsHandler {
    pub outbox: Arc<OutboxStore>,
    pub clock: Clock,
    pub sms: SmsConfig,
    pub sms_enabled: bool,
}

impl EventHandler for CancellationSmsHandler {
    fn name(&self) -> &str {
        "cancellation_sms"
    }

    fn handle(&self, event: &Event) -> frontdesk_core::Result<()> {
        let appointment = match event {
            Event::BookingCancelled { appointment } => appointment,
            _ => return Ok(()),
        };
        if !self.sms_enabled || appointment.client_phone.trim().is_empty() {
            return Ok(());
        }

        self.outbox.enqueue(&EnqueueSms {
            tenant_id: appointment.tenant_id.clone(),
            to_phone: appointment.client_phone.clone(),
            body: body::cancellation(&appointment.reference_code),
            message_type: MessageType::Cancellation,
            booking_reference: Some(appointment.reference_code.clone()),
            run_at: self.clock.now_utc(),
            max_attempts: self.sms.max_attempts,
        })?;
        Ok(())
    }
}

/// On `SlotOpened`: notify the oldest waiting waitlist entry whose
/// contact is a phone number.
pub struct WaitlistHandler {
    pub waitlist: Arc<WaitlistStore>,
    pub outbox: Arc<OutboxStore>,
    pub clock: Clock,
    pub sms: SmsConfig,
}

impl EventHandler for WaitlistHandler {
    fn name(&self) -> &str {
        "waitlist_notify"
    }

    fn handle(&self, event: &Event) -> frontdesk_core::Result<()> {
        let (tenant_id, start, service) = match event {
            Event::SlotOpened {
                tenant_id,
                start,
                service,
                ..
            } => (tenant_id, *start, service.clone()),
            _ => return Ok(()),
        };

        let waiting = self.waitlist.waiting(tenant_id)?;
        let Some(entry) = waiting
            .iter()
            .find(|e| frontdesk_core::phone::normalize_phone(&e.contact).is_some())
        else {
            return Ok(());
        };
        let phone = frontdesk_core::phone::normalize_phone(&entry.contact)
            .expect("filtered to normalizable");

        self.outbox.enqueue(&EnqueueSms {
            tenant_id: tenant_id.clone(),
            to_phone: phone,
            body: body::waitlist_notice(
                entry.service.as_deref().or(service.as_deref()),
                start,
                chrono_tz::UTC,
            ),
            message_type: MessageType::WaitlistNotice,
            booking_reference: None,
            run_at: self.clock.now_utc(),
            max_attempts: self.sms.max_attempts,
        })?;
        self.waitlist.set_status(&entry.id, WaitlistStatus::Notified)?;
        info!(waitlist_id = %entry.id, "waitlist entry notified");
        Ok(())
    }
}

/// On `HoldExpired`: a courtesy follow-up, strictly policy-gated
/// (default deny) and only for sessions with a verified email.
pub struct HoldExpiryHandler {
    pub sessions: Arc<SessionStore>,
    pub followups: Arc<FollowupStore>,
    pub audit: Arc<AuditStore>,
    pub policy: Arc<PolicyEngine>,
}

impl EventHandler for HoldExpiryHandler {
    fn name(&self) -> &str {
        "hold_expiry_followup"
    }

    fn handle(&self, event: &Event) -> frontdesk_core::Result<()> {
        let hold = match event {
            Event::HoldExpired { hold } => hold,
            _ => return Ok(()),
        };

        let session = match self.sessions.get(&hold.session_id)? {
            Some(s) => s,
            None => return Ok(()),
        };
        let Some(email) = session.verified_email.clone() else {
            return Ok(());
        };

        let decision = self.policy.evaluate(
            Some(&hold.tenant_id),
            "hold_expiry_followup",
            &serde_json::json!({ "email_verified": session.email_verified }),
        );
        if !decision.allowed {
            debug!(reason = %decision.reason, "hold-expiry follow-up not allowed");
            return Ok(());
        }

        self.followups.record(
            &hold.tenant_id,
            &hold.session_id,
            &email,
            "email",
            "hold_expired",
            None,
        )?;
        self.audit.append_best_effort(
            &hold.tenant_id,
            "followup.scheduled",
            Some("hold"),
            Some(&hold.id),
            "event_handler",
            serde_json::json!({
                "email_hash": frontdesk_core::mask::email_hash(&email),
                "reason": "hold_expired",
            }),
        );
        Ok(())
    }
}

/// On `CalendarWriteFailed`: record the miss so ops can reconcile.
pub struct CalendarWriteFailureHandler {
    pub audit: Arc<AuditStore>,
}

impl EventHandler for CalendarWriteFailureHandler {
    fn name(&self) -> &str {
        "calendar_write_failure"
    }

    fn handle(&self, event: &Event) -> frontdesk_core::Result<()> {
        if let Event::CalendarWriteFailed {
            tenant_id,
            appointment_id,
            error,
        } = event
        {
            warn!(appointment_id, error, "calendar mirror write failed");
            self.audit.append_best_effort(
                tenant_id,
                "booking.calendar_write_failed",
                Some("appointment"),
                Some(appointment_id),
                "event_handler",
                serde_json::json!({ "error": error }),
            );
        }
        Ok(())
    }
}
