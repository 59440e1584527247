use crate::executor::{ExecutorDeps, ToolContext, ToolError};
use crate::tools::optional_str;

pub(crate) fn run(
    deps: &ExecutorDeps,
    ctx: &ToolContext,
    input: &serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let reference = optional_str(input, "reference_code");
    let email = optional_str(input, "email");

    if reference.is_none() && email.is_none() {
        return Err(ToolError::guardrail(
            "BOOKING_ERROR",
            "lookup needs a reference_code or an email",
        ));
    }

    let found = deps.appointments.lookup(&ctx.tenant.id, reference, email)?;

    let bookings: Vec<serde_json::Value> = found
        .iter()
        .map(|a| {
            serde_json::json!({
                "appointment_id": a.id,
                "reference_code": a.reference_code,
                "client_name": a.client_name,
                "service": a.service,
                "start_time": a.start_utc.to_rfc3339(),
                "end_time": a.end_utc.to_rfc3339(),
                "timezone": a.timezone,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "bookings": bookings,
        "count": bookings.len(),
    }))
}
