use chrono::Duration;

use frontdesk_core::mask::email_hash;

use crate::executor::{ExecutorDeps, ToolContext, ToolError};
use crate::tools::{optional_str, require_str};

/// Free-text marker the agent includes in `notes` after the customer
/// explicitly agreed to another follow-up.
pub const CONFIRMED_SENTINEL: &str = "[customer-confirmed]";

pub(crate) fn run(
    deps: &ExecutorDeps,
    ctx: &ToolContext,
    input: &serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let client_name = require_str(input, "client_name")?;
    let client_email = require_str(input, "client_email")?;
    let preferred_contact = require_str(input, "preferred_contact")?;
    let reason = require_str(input, "reason")?;
    let notes = optional_str(input, "notes").unwrap_or_default();

    if !matches!(preferred_contact, "email" | "sms" | "either") {
        return Err(ToolError::guardrail(
            "BOOKING_ERROR",
            "preferred_contact must be one of email, sms, either",
        ));
    }

    let contact = client_email.to_lowercase();

    // Per-session cap.
    let session_count = deps.followups.count_for_session(&ctx.session.id)?;
    if session_count >= deps.followup.max_per_booking {
        deps.audit.append_best_effort(
            &ctx.tenant.id,
            "followup.limit_reached",
            Some("session"),
            Some(ctx.session.id.as_str()),
            "tool_executor",
            serde_json::json!({ "count": session_count }),
        );
        return Err(ToolError::guardrail(
            "BOOKING_ERROR",
            format!(
                "the follow-up limit ({}) for this conversation is reached; do not offer more",
                deps.followup.max_per_booking
            ),
        ));
    }

    // After the first follow-up the customer must explicitly agree again.
    if session_count >= 1 && !notes.contains(CONFIRMED_SENTINEL) {
        return Err(ToolError::guardrail(
            "CONFIRMATION_REQUIRED",
            format!(
                "a follow-up is already scheduled; ask the customer to explicitly confirm \
                 they want another, then include {CONFIRMED_SENTINEL} in notes"
            ),
        ));
    }

    // Cross-session cooldown per contact.
    if let Some(last) = deps.followups.last_for_contact(&ctx.tenant.id, &contact)? {
        let elapsed = deps.clock.now_utc() - last;
        let cooldown = Duration::minutes(deps.followup.cooldown_minutes);
        if elapsed < cooldown {
            deps.audit.append_best_effort(
                &ctx.tenant.id,
                "followup.cooldown_blocked",
                Some("session"),
                Some(ctx.session.id.as_str()),
                "tool_executor",
                serde_json::json!({
                    "email_hash": email_hash(&contact),
                    "minutes_since_last": elapsed.num_minutes(),
                }),
            );
            return Err(ToolError::guardrail(
                "BOOKING_ERROR",
                format!(
                    "this contact was reached out to {} minutes ago; wait at least {} minutes \
                     between follow-ups",
                    elapsed.num_minutes(),
                    deps.followup.cooldown_minutes
                ),
            ));
        }
    }

    let record = deps.followups.record(
        &ctx.tenant.id,
        &ctx.session.id,
        &contact,
        preferred_contact,
        reason,
        None,
    )?;

    deps.audit.append_best_effort(
        &ctx.tenant.id,
        "followup.scheduled",
        Some("followup"),
        Some(&record.id),
        "tool_executor",
        serde_json::json!({
            "email_hash": email_hash(&contact),
            "channel": preferred_contact,
            "reason": reason,
        }),
    );

    Ok(serde_json::json!({
        "scheduled": true,
        "followup_id": record.id,
        "client_name": client_name,
        "preferred_contact": preferred_contact,
    }))
}
