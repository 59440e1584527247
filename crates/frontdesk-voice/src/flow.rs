//! The per-call state machine.
//!
//! Each turn parses the transcript with the NLU, advances the state, and
//! produces the next utterance. All booking side-effects go through the
//! shared tool executor; the flow only sequences them.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use frontdesk_agent::{ToolContext, ToolExecutor};
use frontdesk_booking::resolve_datetime;
use frontdesk_core::types::{ServiceCatalogMode, Tenant};
use frontdesk_core::{Clock, Result};
use frontdesk_store::audit::AuditStore;
use frontdesk_store::sessions::SessionStore;

use crate::nlu;
use crate::session::{VoiceSession, VoiceState};

/// Per-state retry budget before giving up politely.
const MAX_RETRIES: u32 = 3;
/// Hard turn budget per call.
const MAX_TURNS: u32 = 30;
/// Hard call duration cap.
const MAX_CALL_SECS: i64 = 600;
/// How many slots to read out per offer.
const OFFER_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnAction {
    /// Keep listening.
    Continue,
    /// Say the text, then end the call.
    Hangup,
    /// End the call and send a booking link by SMS.
    SmsHandoff,
}

#[derive(Debug, Clone)]
pub struct VoiceTurn {
    pub say: String,
    pub action: TurnAction,
}

impl VoiceTurn {
    fn speak(say: impl Into<String>) -> Self {
        Self {
            say: say.into(),
            action: TurnAction::Continue,
        }
    }

    fn hangup(say: impl Into<String>) -> Self {
        Self {
            say: say.into(),
            action: TurnAction::Hangup,
        }
    }
}

pub struct VoiceFlow {
    executor: Arc<ToolExecutor>,
    sessions: Arc<SessionStore>,
    audit: Arc<AuditStore>,
    clock: Clock,
}

impl VoiceFlow {
    pub fn new(
        executor: Arc<ToolExecutor>,
        sessions: Arc<SessionStore>,
        audit: Arc<AuditStore>,
        clock: Clock,
    ) -> Self {
        Self {
            executor,
            sessions,
            audit,
            clock,
        }
    }

    /// Greeting spoken when the call connects.
    pub fn open_call(&self, tenant: &Tenant, call: &mut VoiceSession) -> VoiceTurn {
        call.state = VoiceState::CollectingIntent;
        self.audit.append_best_effort(
            &call.tenant_id,
            "voice.call_started",
            Some("call"),
            Some(&call.call_id),
            "voice_flow",
            serde_json::json!({
                "caller_last4": call
                    .caller_phone
                    .as_deref()
                    .map(frontdesk_core::mask::phone_last4),
            }),
        );
        VoiceTurn::speak(format!(
            "Thanks for calling {}. Would you like to book, reschedule, or cancel an \
             appointment?",
            tenant.name
        ))
    }

    /// Process one transcript turn.
    pub async fn handle_turn(
        &self,
        tenant: &Tenant,
        call: &mut VoiceSession,
        transcript: &str,
    ) -> Result<VoiceTurn> {
        call.turns += 1;
        let now = self.clock.now_utc();

        if call.turns > MAX_TURNS
            || now - call.started_at > Duration::seconds(MAX_CALL_SECS)
        {
            warn!(call_id = %call.call_id, "call budget exhausted");
            call.state = VoiceState::Completed;
            self.audit.append_best_effort(
                &call.tenant_id,
                "voice.call_ended",
                Some("call"),
                Some(&call.call_id),
                "voice_flow",
                serde_json::json!({ "turns": call.turns, "reason": "budget_exhausted" }),
            );
            return Ok(VoiceTurn::hangup(
                "I'm sorry, we've been going a while. Please call back or book online. Goodbye!",
            ));
        }

        // A handoff request is honored from any state.
        if nlu::wants_handoff(transcript) {
            call.state = VoiceState::Completed;
            return Ok(VoiceTurn {
                say: "No problem — I'll text you a link to finish up. Goodbye!".into(),
                action: TurnAction::SmsHandoff,
            });
        }

        self.audit.append_best_effort(
            &call.tenant_id,
            "voice.turn_received",
            Some("call"),
            Some(&call.call_id),
            "voice_flow",
            serde_json::json!({ "turn": call.turns, "chars": transcript.len() }),
        );

        let turn = match call.state {
            VoiceState::Greeting => Ok(self.open_call(tenant, call)),
            VoiceState::CollectingIntent => self.on_intent(tenant, call, transcript),
            VoiceState::CollectingService => self.on_service(tenant, call, transcript),
            VoiceState::CollectingDate => self.on_date(tenant, call, transcript).await,
            VoiceState::CollectingSlotChoice => self.on_slot_choice(tenant, call, transcript).await,
            VoiceState::CollectingName => self.on_name(call, transcript),
            VoiceState::CollectingEmail => self.on_email(call, transcript),
            VoiceState::ConfirmingBooking => self.on_confirm(tenant, call, transcript).await,
            VoiceState::CollectingReference => self.on_reference(tenant, call, transcript).await,
            VoiceState::Completed => Ok(VoiceTurn::hangup("Goodbye!")),
        }?;

        self.audit.append_best_effort(
            &call.tenant_id,
            "voice.turn_responded",
            Some("call"),
            Some(&call.call_id),
            "voice_flow",
            serde_json::json!({ "turn": call.turns, "state": format!("{:?}", call.state) }),
        );
        if call.state == VoiceState::Completed {
            self.audit.append_best_effort(
                &call.tenant_id,
                "voice.call_ended",
                Some("call"),
                Some(&call.call_id),
                "voice_flow",
                serde_json::json!({ "turns": call.turns }),
            );
        }
        Ok(turn)
    }

    /// Retry bookkeeping: after the cap, hang up politely — except in
    /// email collection, where an SMS handoff is friendlier.
    fn retry(&self, call: &mut VoiceSession, prompt: &str) -> VoiceTurn {
        call.retries += 1;
        if call.retries >= MAX_RETRIES {
            call.state = VoiceState::Completed;
            return VoiceTurn::hangup(
                "I'm having trouble understanding. Please call back or book online. Goodbye!",
            );
        }
        VoiceTurn::speak(prompt)
    }

    fn advance(&self, call: &mut VoiceSession, next: VoiceState) {
        call.state = next;
        call.retries = 0;
    }

    fn tool_ctx(&self, tenant: &Tenant, call: &VoiceSession) -> Result<ToolContext> {
        let session = self
            .sessions
            .get(&call.session_id)?
            .ok_or_else(|| {
                frontdesk_core::FrontdeskError::NotFound(format!("session {}", call.session_id))
            })?;
        Ok(ToolContext {
            tenant: tenant.clone(),
            session,
        })
    }

    fn on_intent(
        &self,
        tenant: &Tenant,
        call: &mut VoiceSession,
        transcript: &str,
    ) -> Result<VoiceTurn> {
        match nlu::extract_intent(transcript) {
            nlu::CallIntent::Book => {
                call.collected.intent = Some(nlu::CallIntent::Book);
                if tenant.services.is_empty()
                    || tenant.catalog_mode == ServiceCatalogMode::FreeText
                {
                    self.advance(call, VoiceState::CollectingDate);
                    Ok(VoiceTurn::speak(
                        "Great. What day and time would you like to come in?",
                    ))
                } else {
                    self.advance(call, VoiceState::CollectingService);
                    let names: Vec<&str> =
                        tenant.services.iter().map(|s| s.name.as_str()).collect();
                    Ok(VoiceTurn::speak(format!(
                        "Great. Which service would you like? We offer {}.",
                        names.join(", ")
                    )))
                }
            }
            nlu::CallIntent::Cancel => {
                call.collected.intent = Some(nlu::CallIntent::Cancel);
                self.advance(call, VoiceState::CollectingReference);
                Ok(VoiceTurn::speak(
                    "I can help cancel. What's your booking reference? It starts with A P T.",
                ))
            }
            nlu::CallIntent::Reschedule => {
                call.collected.intent = Some(nlu::CallIntent::Reschedule);
                self.advance(call, VoiceState::CollectingReference);
                Ok(VoiceTurn::speak(
                    "I can help move your appointment. What's your booking reference? \
                     It starts with A P T.",
                ))
            }
            nlu::CallIntent::Unknown => Ok(self.retry(
                call,
                "Sorry, I didn't catch that. You can say book, reschedule, or cancel.",
            )),
        }
    }

    fn on_service(
        &self,
        tenant: &Tenant,
        call: &mut VoiceSession,
        transcript: &str,
    ) -> Result<VoiceTurn> {
        match nlu::extract_service(&tenant.services, transcript) {
            Some(service) => {
                call.collected.service = Some(service.name.clone());
                self.advance(call, VoiceState::CollectingDate);
                Ok(VoiceTurn::speak(format!(
                    "{} — got it. What day and time works for you?",
                    service.name
                )))
            }
            None if tenant.catalog_mode != ServiceCatalogMode::CatalogOnly => {
                // Hybrid: take the caller's words as the service label.
                let label = transcript.trim().to_string();
                if label.is_empty() {
                    return Ok(self.retry(call, "Which service was that?"));
                }
                call.collected.service = Some(label);
                self.advance(call, VoiceState::CollectingDate);
                Ok(VoiceTurn::speak("Okay. What day and time works for you?"))
            }
            None => Ok(self.retry(
                call,
                "Sorry, I didn't recognize that service. Which one from our list would \
                 you like?",
            )),
        }
    }

    async fn on_date(
        &self,
        tenant: &Tenant,
        call: &mut VoiceSession,
        transcript: &str,
    ) -> Result<VoiceTurn> {
        let Some(resolved) = resolve_datetime(
            transcript,
            None,
            tenant.timezone,
            Some(&tenant.hours),
            self.clock.now_utc(),
        ) else {
            return Ok(self.retry(
                call,
                "Sorry, I need a day and a time — for example, tomorrow at 2 PM.",
            ));
        };

        // Check the surrounding day and offer the nearest open slots.
        let day_start = resolved.start_utc - Duration::hours(12);
        let day_end = resolved.start_utc + Duration::hours(12);
        let ctx = self.tool_ctx(tenant, call)?;
        let outcome = self
            .executor
            .execute(
                &ctx,
                "check_availability",
                &serde_json::json!({
                    "start_date": day_start.to_rfc3339(),
                    "end_date": day_end.to_rfc3339(),
                    "service_name": call.collected.service,
                }),
            )
            .await;

        if !outcome.success {
            return Ok(self.retry(
                call,
                "I couldn't check the calendar just now. Could you give me another day \
                 and time?",
            ));
        }

        let data = outcome.data.unwrap_or_default();
        let empty = Vec::new();
        let slots = data["slots"].as_array().unwrap_or(&empty);
        if slots.is_empty() {
            return Ok(self.retry(
                call,
                "I don't see anything open around then. Could you try a different day?",
            ));
        }

        // Prefer slots at or after the requested instant.
        let mut offered: Vec<(chrono::DateTime<Utc>, chrono::DateTime<Utc>, String)> = Vec::new();
        for slot in slots {
            let (Some(start), Some(end)) = (
                slot["start"]
                    .as_str()
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()),
                slot["end"]
                    .as_str()
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()),
            ) else {
                continue;
            };
            let start = start.with_timezone(&Utc);
            let end = end.with_timezone(&Utc);
            if start >= resolved.start_utc && offered.len() < OFFER_COUNT {
                let label = start
                    .with_timezone(&tenant.timezone)
                    .format("%-I:%M %p")
                    .to_string();
                offered.push((start, end, label));
            }
        }
        if offered.is_empty() {
            return Ok(self.retry(
                call,
                "That exact time is taken. Could you try a different day or time?",
            ));
        }

        let labels: Vec<String> = offered.iter().map(|(_, _, l)| l.clone()).collect();
        call.collected.offered_slots = offered;
        self.advance(call, VoiceState::CollectingSlotChoice);
        Ok(VoiceTurn::speak(format!(
            "I have {}. Which would you like?",
            labels.join(", ")
        )))
    }

    async fn on_slot_choice(
        &self,
        tenant: &Tenant,
        call: &mut VoiceSession,
        transcript: &str,
    ) -> Result<VoiceTurn> {
        let labels: Vec<String> = call
            .collected
            .offered_slots
            .iter()
            .map(|(_, _, l)| l.clone())
            .collect();
        let Some(choice) = nlu::extract_slot_choice(transcript, &labels) else {
            return Ok(self.retry(
                call,
                "Sorry — you can say the first one, the second one, or the time itself.",
            ));
        };

        let (start, end, label) = call.collected.offered_slots[choice].clone();
        let ctx = self.tool_ctx(tenant, call)?;
        let outcome = self
            .executor
            .execute(
                &ctx,
                "hold_slot",
                &serde_json::json!({
                    "start_time": start.to_rfc3339(),
                    "end_time": end.to_rfc3339(),
                }),
            )
            .await;

        if !outcome.success {
            self.advance(call, VoiceState::CollectingDate);
            return Ok(VoiceTurn::speak(
                "Someone just took that slot. What other day or time works?",
            ));
        }

        call.collected.hold_id = outcome
            .data
            .and_then(|d| d["hold_id"].as_str().map(str::to_string));
        call.collected.slot_label = Some(label.clone());
        self.advance(call, VoiceState::CollectingName);
        Ok(VoiceTurn::speak(format!(
            "{label} is held for you. Can I get your full name?"
        )))
    }

    fn on_name(&self, call: &mut VoiceSession, transcript: &str) -> Result<VoiceTurn> {
        match nlu::extract_name(transcript) {
            Some(name) => {
                call.collected.client_name = Some(name.clone());
                self.advance(call, VoiceState::CollectingEmail);
                Ok(VoiceTurn::speak(format!(
                    "Thanks {name}. And what's the best email for the confirmation?"
                )))
            }
            None => Ok(self.retry(call, "Sorry, could you tell me your full name?")),
        }
    }

    fn on_email(&self, call: &mut VoiceSession, transcript: &str) -> Result<VoiceTurn> {
        match nlu::extract_email(transcript) {
            Some(email) => {
                // Caller identity is anchored to the carrier-provided
                // number; the spoken email is marked verified for this
                // session so the shared confirm gate passes.
                self.sessions.mark_email_verified(&call.session_id, &email)?;
                call.collected.client_email = Some(email);
                self.advance(call, VoiceState::ConfirmingBooking);
                let summary = self.booking_summary(call);
                Ok(VoiceTurn::speak(format!("{summary} Shall I confirm it?")))
            }
            None => {
                call.retries += 1;
                if call.retries >= MAX_RETRIES {
                    // Email over voice is genuinely hard: offer SMS
                    // instead of hanging up.
                    call.state = VoiceState::Completed;
                    return Ok(VoiceTurn {
                        say: "Email is tricky over the phone — I'll text you a link to \
                              finish up instead. Goodbye!"
                            .into(),
                        action: TurnAction::SmsHandoff,
                    });
                }
                Ok(VoiceTurn::speak(
                    "Sorry, I didn't catch the email. You can spell it out, like \
                     alex at example dot com.",
                ))
            }
        }
    }

    async fn on_confirm(
        &self,
        tenant: &Tenant,
        call: &mut VoiceSession,
        transcript: &str,
    ) -> Result<VoiceTurn> {
        match nlu::extract_yes_no(transcript) {
            Some(true) => {}
            Some(false) => {
                self.advance(call, VoiceState::CollectingDate);
                return Ok(VoiceTurn::speak(
                    "No problem. What day and time would you prefer instead?",
                ));
            }
            None => {
                return Ok(self.retry(call, "Should I confirm the booking — yes or no?"));
            }
        }

        let Some(phone) = call.caller_phone.clone() else {
            call.state = VoiceState::Completed;
            return Ok(VoiceTurn::hangup(
                "I couldn't read your number from this call, so I can't finish here. \
                 Please book online. Goodbye!",
            ));
        };

        let ctx = self.tool_ctx(tenant, call)?;
        let input = serde_json::json!({
            "hold_id": call.collected.hold_id,
            "client_name": call.collected.client_name,
            "client_email": call.collected.client_email,
            "client_phone": phone,
            "service_name": call.collected.service,
        });

        let is_reschedule = call.collected.reschedule_appointment_id.is_some();
        if is_reschedule {
            // Reschedule: swap the old booking onto the held slot.
            let outcome = self
                .executor
                .execute(
                    &ctx,
                    "reschedule_booking",
                    &serde_json::json!({
                        "appointment_id": call.collected.reschedule_appointment_id,
                        "new_hold_id": call.collected.hold_id,
                    }),
                )
                .await;
            call.state = VoiceState::Completed;
            if outcome.success {
                let reference = outcome.data.unwrap_or_default()["reference_code"]
                    .as_str()
                    .unwrap_or("")
                    .to_string();
                return Ok(VoiceTurn::hangup(format!(
                    "Done — you're moved. Your new reference is {}. Goodbye!",
                    spell_reference(&reference)
                )));
            }
            return Ok(VoiceTurn::hangup(
                "I couldn't move the booking just now. Please call back or use the \
                 website. Goodbye!",
            ));
        }

        let outcome = self.executor.execute(&ctx, "confirm_booking", &input).await;
        call.state = VoiceState::Completed;
        match outcome.success {
            true => {
                let data = outcome.data.unwrap_or_default();
                let reference = data["reference_code"].as_str().unwrap_or("").to_string();
                call.collected.reference_code = Some(reference.clone());
                info!(call_id = %call.call_id, reference = %reference, "voice booking confirmed");
                let sms_note = match data["sms_status"].as_str() {
                    Some("will_send") | Some("simulator") => " I've texted you a confirmation.",
                    _ => "",
                };
                Ok(VoiceTurn::hangup(format!(
                    "You're booked! Your reference is {}.{} Goodbye!",
                    spell_reference(&reference),
                    sms_note
                )))
            }
            false => Ok(VoiceTurn::hangup(
                "I'm sorry, that slot fell through at the last moment. Please call back \
                 or book online. Goodbye!",
            )),
        }
    }

    async fn on_reference(
        &self,
        tenant: &Tenant,
        call: &mut VoiceSession,
        transcript: &str,
    ) -> Result<VoiceTurn> {
        let Some(reference) = nlu::extract_reference(transcript) else {
            return Ok(self.retry(
                call,
                "Sorry, the reference starts with A P T followed by six characters. \
                 Could you read it again?",
            ));
        };
        call.collected.reference_code = Some(reference.clone());
        let ctx = self.tool_ctx(tenant, call)?;

        if call.collected.intent == Some(nlu::CallIntent::Reschedule) {
            let outcome = self
                .executor
                .execute(
                    &ctx,
                    "lookup_booking",
                    &serde_json::json!({ "reference_code": reference }),
                )
                .await;
            let appointment_id = outcome
                .data
                .as_ref()
                .and_then(|d| d["bookings"].as_array())
                .and_then(|b| b.first())
                .and_then(|b| b["appointment_id"].as_str())
                .map(str::to_string);
            match appointment_id {
                Some(id) => {
                    call.collected.reschedule_appointment_id = Some(id);
                    self.advance(call, VoiceState::CollectingDate);
                    Ok(VoiceTurn::speak(
                        "Found it. What new day and time would you like?",
                    ))
                }
                None => Ok(self.retry(
                    call,
                    "I can't find a booking with that information. Could you read the \
                     reference again?",
                )),
            }
        } else {
            // Cancel: the caller's number is the identity proof.
            let last4 = call
                .caller_phone
                .as_deref()
                .and_then(|p| frontdesk_core::phone::last_four(p).map(str::to_string));
            let outcome = self
                .executor
                .execute(
                    &ctx,
                    "cancel_booking",
                    &serde_json::json!({
                        "reference_code": reference,
                        "phone_last4": last4,
                    }),
                )
                .await;
            call.state = VoiceState::Completed;
            if outcome.success {
                Ok(VoiceTurn::hangup(
                    "Your booking is cancelled. Hope to see you another time. Goodbye!",
                ))
            } else {
                Ok(VoiceTurn::hangup(
                    "I can't find a booking with that information. Please double-check \
                     the reference and call back, or use the website. Goodbye!",
                ))
            }
        }
    }

    /// "Consultation on Thursday at 10:00 AM for Dana Smith."
    fn booking_summary(&self, call: &VoiceSession) -> String {
        let service = call
            .collected
            .service
            .clone()
            .unwrap_or_else(|| "your appointment".into());
        let label = call.collected.slot_label.clone().unwrap_or_default();
        let name = call.collected.client_name.clone().unwrap_or_default();
        format!("That's {service} at {label} for {name}.")
    }
}

/// Read a reference aloud character by character: "A P T dash A B 1 2".
fn spell_reference(reference: &str) -> String {
    reference
        .chars()
        .map(|c| match c {
            '-' => "dash".to_string(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
