use tracing::info;

use frontdesk_booking::RiskAction;
use frontdesk_calendar::CalendarEvent;
use frontdesk_core::mask::{email_hash, mask_email, phone_last4, phone_prefix};
use frontdesk_core::phone::normalize_phone;
use frontdesk_events::Event;
use frontdesk_store::appointments::ConfirmRequest;

use crate::executor::{ExecutorDeps, ToolContext, ToolError};
use crate::tools::{check_availability::resolve_service, optional_str, require_str};

/// What the agent may truthfully say about the confirmation SMS.
fn sms_status(deps: &ExecutorDeps, ctx: &ToolContext, phone: &str) -> &'static str {
    if !deps.features.sms {
        return "disabled";
    }
    if phone.is_empty() {
        return "no_phone";
    }
    let decision = deps.policy.evaluate(
        Some(&ctx.tenant.id),
        "send_sms_confirmation",
        &serde_json::json!({}),
    );
    if !decision.allowed {
        return "unavailable";
    }
    if !deps.carrier_configured {
        return "simulator";
    }
    "will_send"
}

pub(crate) async fn run(
    deps: &ExecutorDeps,
    ctx: &ToolContext,
    input: &serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let hold_id = require_str(input, "hold_id")?;
    let client_name = require_str(input, "client_name")?;
    let client_email = require_str(input, "client_email")?;

    // Identity gate: the session must have completed the OTP round-trip,
    // and the booking email must be the one that was verified.
    if !ctx.session.email_verified {
        return Err(ToolError::guardrail(
            "EMAIL_VERIFICATION_REQUIRED",
            "the customer's email has not been verified yet; ask them to complete the \
             verification code step first",
        ));
    }
    let verified = ctx.session.verified_email.as_deref().unwrap_or_default();
    if !verified.eq_ignore_ascii_case(client_email) {
        return Err(ToolError::guardrail(
            "EMAIL_MISMATCH",
            format!(
                "client_email {} does not match the verified email {}; re-verify or use \
                 the verified address",
                mask_email(client_email),
                mask_email(verified)
            ),
        ));
    }

    let raw_phone = optional_str(input, "client_phone").unwrap_or_default();
    if raw_phone.is_empty() {
        return Err(ToolError::guardrail(
            "PHONE_REQUIRED",
            "a phone number is required to confirm; ask the customer for one",
        ));
    }
    let phone = normalize_phone(raw_phone).ok_or_else(|| {
        ToolError::guardrail(
            "INVALID_PHONE",
            format!("'{raw_phone}' is not a dialable phone number; ask the customer to restate it"),
        )
    })?;

    // Behavioural risk gate.
    let assessment = deps.risk.assess(&ctx.session);
    deps.audit.append_best_effort(
        &ctx.tenant.id,
        "booking.risk_assessed",
        Some("session"),
        Some(ctx.session.id.as_str()),
        "tool_executor",
        serde_json::json!({
            "score": assessment.score,
            "action": assessment.action,
            "signals": assessment.signals,
        }),
    );
    match assessment.action {
        RiskAction::Cooldown => {
            return Err(ToolError::guardrail(
                "RISK_COOLDOWN",
                "too many bookings from this conversation; ask the customer to try again later",
            ))
        }
        RiskAction::Reverify => {
            return Err(ToolError::guardrail(
                "RISK_REVERIFY",
                "ask the customer to re-verify their email before another booking",
            ))
        }
        RiskAction::Allow => {}
    }

    let service = resolve_service(&ctx.tenant, optional_str(input, "service_name"))?;

    let appointment = deps
        .appointments
        .confirm_from_hold(&ConfirmRequest {
            tenant_id: ctx.tenant.id.clone(),
            hold_id: hold_id.to_string(),
            client_name: client_name.to_string(),
            client_email: client_email.to_string(),
            client_phone: phone.clone(),
            service,
            timezone: ctx.tenant.timezone.name().to_string(),
        })
        .map_err(|e| match e {
            frontdesk_store::StoreError::SlotConflict(msg) => ToolError::guardrail(
                "SLOT_CONFLICT",
                format!("{msg}; the customer will need a different time"),
            ),
            frontdesk_store::StoreError::NotFound { .. }
            | frontdesk_store::StoreError::HoldExpired(_) => ToolError::guardrail(
                "BOOKING_ERROR",
                "the hold is gone or expired; check availability and hold a slot again",
            ),
            other => ToolError::from(other),
        })?;

    // The slot layout changed: cached busy ranges are stale.
    deps.cache.invalidate_tenant(&ctx.tenant.id);

    deps.audit.append_best_effort(
        &ctx.tenant.id,
        "booking.created",
        Some("appointment"),
        Some(&appointment.id),
        "tool_executor",
        serde_json::json!({
            "reference": appointment.reference_code,
            "email_hash": email_hash(client_email),
            "phone_last4": phone_last4(&phone),
            "start": appointment.start_utc.to_rfc3339(),
        }),
    );
    deps.audit.append_best_effort(
        &ctx.tenant.id,
        "booking.phone_captured",
        Some("appointment"),
        Some(&appointment.id),
        "tool_executor",
        serde_json::json!({ "phone_prefix": phone_prefix(&phone) }),
    );

    // Customer identity bookkeeping.
    if let Ok(customer) =
        deps.customers
            .get_or_create(&ctx.tenant.id, Some(&phone), Some(client_email), Some(client_name))
    {
        let _ = deps.customers.increment_booking_count(&customer.id);
        let _ = deps.sessions.link_customer(&ctx.session.id, &customer.id);
    }
    let _ = deps.sessions.increment_booking_count(&ctx.session.id);

    // Mirror to the external calendar, best effort: a write failure is
    // reported as an event, never as a booking failure.
    if let Some(binding) = &ctx.tenant.calendar {
        let event = CalendarEvent {
            summary: format!(
                "{} — {}",
                appointment.service.as_deref().unwrap_or("Appointment"),
                client_name
            ),
            description: format!("Ref {}", appointment.reference_code),
            start: appointment.start_utc,
            end: appointment.end_utc,
        };
        match deps.calendar.create_event(binding, &event).await {
            Ok(event_id) => {
                let _ = deps.appointments.set_calendar_event(&appointment.id, &event_id);
            }
            Err(e) => {
                deps.bus.emit(&Event::CalendarWriteFailed {
                    tenant_id: ctx.tenant.id.clone(),
                    appointment_id: appointment.id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    deps.bus.emit(&Event::BookingCreated {
        appointment: appointment.clone(),
    });

    info!(
        tenant = %ctx.tenant.id,
        reference = %appointment.reference_code,
        "booking confirmed via tool"
    );

    Ok(serde_json::json!({
        "reference_code": appointment.reference_code,
        "client_name": appointment.client_name,
        "service": appointment.service,
        "start_time": appointment.start_utc.to_rfc3339(),
        "end_time": appointment.end_utc.to_rfc3339(),
        "timezone": appointment.timezone,
        "sms_status": sms_status(deps, ctx, &appointment.client_phone),
    }))
}
