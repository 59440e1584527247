use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use frontdesk_booking::RiskAction;
use frontdesk_core::types::{ServiceCatalogMode, Tenant};

use crate::executor::{ExecutorDeps, ToolContext, ToolError};
use crate::tools::{optional_str, parse_instant, require_str};

/// Accept either a bare date (midnight in the tenant zone) or a full
/// ISO-8601 instant.
fn parse_bound(
    value: &str,
    key: &str,
    tenant: &Tenant,
    end_of_day: bool,
) -> Result<DateTime<Utc>, ToolError> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let date = if end_of_day {
            date + Duration::days(1)
        } else {
            date
        };
        let local = tenant
            .timezone
            .from_local_datetime(&date.and_hms_opt(0, 0, 0).unwrap())
            .earliest()
            .ok_or_else(|| {
                ToolError::guardrail("BOOKING_ERROR", format!("'{key}' is not a valid date"))
            })?;
        return Ok(local.with_timezone(&Utc));
    }
    parse_instant(value, key)
}

/// Service disambiguation per the tenant's catalog mode.
pub(crate) fn resolve_service(
    tenant: &Tenant,
    requested: Option<&str>,
) -> Result<Option<String>, ToolError> {
    let catalog_names = || {
        tenant
            .services
            .iter()
            .map(|s| s.name.clone())
            .collect::<Vec<_>>()
            .join(", ")
    };

    match (tenant.catalog_mode, requested) {
        (ServiceCatalogMode::CatalogOnly, None) => Err(ToolError::guardrail(
            "SERVICE_REQUIRED",
            format!(
                "this business books specific services only; ask the customer to pick one of: {}",
                catalog_names()
            ),
        )),
        (ServiceCatalogMode::CatalogOnly, Some(name)) => match tenant.find_service(name) {
            Some(entry) => Ok(Some(entry.name.clone())),
            None => Err(ToolError::guardrail(
                "SERVICE_REQUIRED",
                format!(
                    "'{name}' is not in the service catalog; offer one of: {}",
                    catalog_names()
                ),
            )),
        },
        // Hybrid: catalog names are canonicalized, unknown text passes.
        (ServiceCatalogMode::Hybrid, Some(name)) => Ok(Some(
            tenant
                .find_service(name)
                .map(|e| e.name.clone())
                .unwrap_or_else(|| name.to_string()),
        )),
        (ServiceCatalogMode::FreeText, Some(name)) => Ok(Some(name.to_string())),
        (_, None) => Ok(None),
    }
}

pub(crate) async fn run(
    deps: &ExecutorDeps,
    ctx: &ToolContext,
    input: &serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let from = parse_bound(require_str(input, "start_date")?, "start_date", &ctx.tenant, false)?;
    let to = parse_bound(require_str(input, "end_date")?, "end_date", &ctx.tenant, true)?;

    if to <= from {
        return Err(ToolError::guardrail(
            "BOOKING_ERROR",
            "end_date must be after start_date",
        ));
    }
    if to - from > Duration::days(deps.booking.max_availability_range_days) {
        return Err(ToolError::guardrail(
            "DATE_RANGE_TOO_WIDE",
            format!(
                "availability can be checked at most {} days at a time; narrow the range",
                deps.booking.max_availability_range_days
            ),
        ));
    }

    let service = resolve_service(&ctx.tenant, optional_str(input, "service_name"))?;

    let assessment = deps.risk.assess(&ctx.session);
    if assessment.action == RiskAction::Cooldown {
        return Err(ToolError::guardrail(
            "RISK_COOLDOWN",
            "this conversation has made too many booking attempts; ask the customer to try again later",
        ));
    }

    let result = deps
        .availability
        .get_available_slots(&ctx.tenant, from, to)
        .await?;

    let open: Vec<serde_json::Value> = result
        .slots
        .iter()
        .filter(|s| s.available)
        .map(|s| {
            serde_json::json!({
                "start": s.start.to_rfc3339(),
                "end": s.end.to_rfc3339(),
            })
        })
        .collect();

    Ok(serde_json::json!({
        "slots": open,
        "open_count": open.len(),
        "verified": result.verified,
        "calendar_source": result.calendar_source,
        "calendar_error": result.calendar_error,
        "service": service,
        "timezone": ctx.tenant.timezone.name(),
    }))
}
