use chrono::Duration;

use crate::executor::{ExecutorDeps, ToolContext, ToolError};
use crate::tools::{parse_instant, require_str};

pub(crate) async fn run(
    deps: &ExecutorDeps,
    ctx: &ToolContext,
    input: &serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let start = parse_instant(require_str(input, "start_time")?, "start_time")?;
    let end = parse_instant(require_str(input, "end_time")?, "end_time")?;
    let far_date_confirmed = input
        .get("far_date_confirmed")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let now = deps.clock.now_utc();
    if start <= now {
        return Err(ToolError::guardrail(
            "BOOKING_ERROR",
            "that time is already in the past",
        ));
    }

    // Far-date gate: protects against typo'd bookings months out. The
    // LLM must re-confirm the date with the customer, then retry with
    // far_date_confirmed=true.
    let far_threshold = Duration::days(deps.booking.far_date_confirm_days);
    if start - now > far_threshold && !far_date_confirmed {
        return Err(ToolError::guardrail(
            "FAR_DATE_CONFIRMATION_REQUIRED",
            format!(
                "the requested time is more than {} days away; confirm the exact date with \
                 the customer, then retry with far_date_confirmed=true",
                deps.booking.far_date_confirm_days
            ),
        ));
    }

    let hold = deps
        .holds
        .hold_slot(&ctx.tenant.id, &ctx.session.id, start, end)
        .map_err(|e| match e {
            frontdesk_store::StoreError::SlotConflict(msg) => ToolError::guardrail(
                "SLOT_CONFLICT",
                format!("{msg}; offer the customer a different time"),
            ),
            other => ToolError::from(other),
        })?;

    Ok(serde_json::json!({
        "hold_id": hold.id,
        "start_time": hold.start_utc.to_rfc3339(),
        "end_time": hold.end_utc.to_rfc3339(),
        "expires_at": hold.expires_at.to_rfc3339(),
    }))
}
