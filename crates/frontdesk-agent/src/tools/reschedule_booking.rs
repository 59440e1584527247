use frontdesk_events::Event;

use crate::executor::{ExecutorDeps, ToolContext, ToolError};
use crate::tools::require_str;

pub(crate) fn run(
    deps: &ExecutorDeps,
    ctx: &ToolContext,
    input: &serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let appointment_id = require_str(input, "appointment_id")?;
    let new_hold_id = require_str(input, "new_hold_id")?;

    let old = deps
        .appointments
        .get(appointment_id)?
        .filter(|a| a.tenant_id == ctx.tenant.id)
        .ok_or_else(|| {
            ToolError::guardrail(
                "BOOKING_ERROR",
                "no such appointment; look the booking up first",
            )
        })?;

    let new = deps
        .appointments
        .reschedule(&ctx.tenant.id, appointment_id, new_hold_id)
        .map_err(|e| match e {
            frontdesk_store::StoreError::SlotConflict(msg) => ToolError::guardrail(
                "SLOT_CONFLICT",
                format!("{msg}; hold a different slot and retry"),
            ),
            frontdesk_store::StoreError::NotFound { entity: "hold", .. }
            | frontdesk_store::StoreError::HoldExpired(_) => ToolError::guardrail(
                "BOOKING_ERROR",
                "the new hold is gone or expired; hold a slot again",
            ),
            other => ToolError::from(other),
        })?;

    // Both the vacated and the newly taken window changed.
    deps.cache.invalidate_tenant(&ctx.tenant.id);

    deps.audit.append_best_effort(
        &ctx.tenant.id,
        "booking.rescheduled",
        Some("appointment"),
        Some(&new.id),
        "tool_executor",
        serde_json::json!({
            "old_reference": old.reference_code,
            "new_reference": new.reference_code,
            "new_start": new.start_utc.to_rfc3339(),
        }),
    );

    deps.bus.emit(&Event::BookingRescheduled {
        old_reference: old.reference_code.clone(),
        appointment: new.clone(),
    });
    deps.bus.emit(&Event::SlotOpened {
        tenant_id: ctx.tenant.id.clone(),
        start: old.start_utc,
        end: old.end_utc,
        service: old.service.clone(),
    });

    Ok(serde_json::json!({
        "reference_code": new.reference_code,
        "previous_reference": old.reference_code,
        "start_time": new.start_utc.to_rfc3339(),
        "end_time": new.end_utc.to_rfc3339(),
        "timezone": new.timezone,
    }))
}
