use tracing::info;

use frontdesk_booking::{verify_cancellation, CancelDecision, CancelInput, CancelRefusal};
use frontdesk_events::Event;

use crate::executor::{ExecutorDeps, ToolContext, ToolError};
use crate::tools::{optional_str, require_str};

/// Single user-facing message for every negative outcome. Anything more
/// specific would let a caller enumerate valid reference codes.
const GENERIC_REFUSAL: &str =
    "I can't find a booking with that information. Please double-check the reference \
     code and try again.";

pub(crate) fn run(
    deps: &ExecutorDeps,
    ctx: &ToolContext,
    input: &serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let reference = require_str(input, "reference_code")?;
    let phone_last4 = optional_str(input, "phone_last4");

    // The session's customer phone participates in verified-session proof.
    let session_phone = ctx
        .session
        .customer_id
        .as_ref()
        .and_then(|cid| deps.customers.get(cid).ok().flatten())
        .and_then(|c| c.phone);

    let cancel_input = CancelInput {
        reference_code: Some(reference),
        phone_last4,
        session_verified: ctx.session.email_verified,
        session_email: ctx.session.verified_email.as_deref(),
        session_phone: session_phone.as_deref(),
    };

    deps.audit.append_best_effort(
        &ctx.tenant.id,
        "booking.verification_attempted",
        Some("session"),
        Some(ctx.session.id.as_str()),
        "tool_executor",
        serde_json::json!({
            "has_last4": cancel_input.phone_last4.is_some(),
            "session_verified": cancel_input.session_verified,
        }),
    );

    let decision = verify_cancellation(&cancel_input, |code| {
        deps.appointments
            .get_by_reference(&ctx.tenant.id, code)
            .ok()
            .flatten()
    });

    match decision {
        CancelDecision::Refused { reason } => {
            deps.audit.append_best_effort(
                &ctx.tenant.id,
                "booking.verification_failed",
                Some("session"),
                Some(ctx.session.id.as_str()),
                "tool_executor",
                serde_json::json!({ "reason": reason.as_str() }),
            );
            match reason {
                // The one negative that asks for more input instead of
                // collapsing: the agent should collect the last 4 digits.
                CancelRefusal::MissingVerification => Err(ToolError::guardrail(
                    "CANCELLATION_NEEDS_IDENTITY",
                    "to cancel, ask the customer for the last 4 digits of the phone \
                     number on the booking",
                )),
                _ => Err(ToolError::guardrail("CANCELLATION_FAILED", GENERIC_REFUSAL)),
            }
        }
        CancelDecision::Authorized { method, booking } => {
            deps.audit.append_best_effort(
                &ctx.tenant.id,
                "booking.verification_succeeded",
                Some("appointment"),
                Some(&booking.id),
                "tool_executor",
                serde_json::json!({ "method": method.as_str() }),
            );

            let cancelled = deps
                .appointments
                .cancel(&ctx.tenant.id, &booking.id)
                .map_err(|_| {
                    // A racing cancel got there first; same collapsed answer.
                    ToolError::guardrail("CANCELLATION_FAILED", GENERIC_REFUSAL)
                })?;

            deps.cache.invalidate_tenant(&ctx.tenant.id);

            deps.audit.append_best_effort(
                &ctx.tenant.id,
                "booking.cancelled",
                Some("appointment"),
                Some(&cancelled.id),
                "tool_executor",
                serde_json::json!({
                    "reference": cancelled.reference_code,
                    "method": method.as_str(),
                }),
            );

            deps.bus.emit(&Event::BookingCancelled {
                appointment: cancelled.clone(),
            });
            deps.bus.emit(&Event::SlotOpened {
                tenant_id: ctx.tenant.id.clone(),
                start: cancelled.start_utc,
                end: cancelled.end_utc,
                service: cancelled.service.clone(),
            });

            info!(
                tenant = %ctx.tenant.id,
                reference = %cancelled.reference_code,
                method = method.as_str(),
                "booking cancelled via tool"
            );

            Ok(serde_json::json!({
                "cancelled": true,
                "reference_code": cancelled.reference_code,
                "verification_method": method.as_str(),
            }))
        }
    }
}
