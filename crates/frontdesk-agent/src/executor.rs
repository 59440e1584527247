//! The tool executor: a fixed dispatcher keyed by tool name. Each
//! handler validates inputs, runs guardrails, calls services, and
//! returns a `{success, data?, error?}` envelope whose error string
//! starts with a stable SCREAMING_SNAKE prefix.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use frontdesk_booking::{AvailabilityEngine, RiskEngine};
use frontdesk_calendar::{BusyRangeCache, CalendarProvider};
use frontdesk_core::config::{BookingConfig, FeatureFlags, FollowupConfig};
use frontdesk_core::mask::email_hash;
use frontdesk_core::types::Tenant;
use frontdesk_core::{Clock, FrontdeskError};
use frontdesk_events::{EventBus, PolicyEngine};
use frontdesk_store::appointments::AppointmentStore;
use frontdesk_store::audit::AuditStore;
use frontdesk_store::customers::CustomerStore;
use frontdesk_store::followups::FollowupStore;
use frontdesk_store::holds::HoldStore;
use frontdesk_store::models::SessionRecord;
use frontdesk_store::sessions::SessionStore;
use frontdesk_store::StoreError;

use crate::classify::{classify_code, correlation_id};
use crate::tools;

/// Everything the tool handlers can reach.
pub struct ExecutorDeps {
    pub sessions: Arc<SessionStore>,
    pub customers: Arc<CustomerStore>,
    pub appointments: Arc<AppointmentStore>,
    pub holds: Arc<HoldStore>,
    pub availability: Arc<AvailabilityEngine>,
    pub followups: Arc<FollowupStore>,
    pub audit: Arc<AuditStore>,
    pub bus: Arc<EventBus>,
    pub policy: Arc<PolicyEngine>,
    pub risk: Arc<RiskEngine>,
    pub calendar: Arc<dyn CalendarProvider>,
    pub cache: Arc<BusyRangeCache>,
    pub clock: Clock,
    pub booking: BookingConfig,
    pub followup: FollowupConfig,
    pub features: FeatureFlags,
    /// False selects simulator semantics for `sms_status`.
    pub carrier_configured: bool,
}

/// Per-invocation context: which tenant and which conversation.
#[derive(Clone)]
pub struct ToolContext {
    pub tenant: Tenant,
    pub session: SessionRecord,
}

/// Envelope handed back to the LLM.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn fail(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Failure raised inside a tool handler.
#[derive(Debug)]
pub enum ToolError {
    /// Expected guardrail outcome with a taxonomy code and guidance the
    /// LLM can phrase to the customer.
    Guardrail {
        code: &'static str,
        message: String,
    },
    /// Unexpected domain/internal error; classified and correlated.
    Internal(FrontdeskError),
}

impl ToolError {
    pub fn guardrail(code: &'static str, message: impl Into<String>) -> Self {
        Self::Guardrail {
            code,
            message: message.into(),
        }
    }
}

impl From<FrontdeskError> for ToolError {
    fn from(e: FrontdeskError) -> Self {
        Self::Internal(e)
    }
}

impl From<StoreError> for ToolError {
    fn from(e: StoreError) -> Self {
        Self::Internal(e.into())
    }
}

pub struct ToolExecutor {
    deps: ExecutorDeps,
}

impl ToolExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }

    pub fn deps(&self) -> &ExecutorDeps {
        &self.deps
    }

    /// Dispatch one tool call. Never panics, never leaks raw internals —
    /// every failure maps to a taxonomy-prefixed error string.
    pub async fn execute(
        &self,
        ctx: &ToolContext,
        name: &str,
        input: &serde_json::Value,
    ) -> ToolOutcome {
        let started = std::time::Instant::now();
        let result = match name {
            "check_availability" => tools::check_availability::run(&self.deps, ctx, input).await,
            "hold_slot" => tools::hold_slot::run(&self.deps, ctx, input).await,
            "confirm_booking" => tools::confirm_booking::run(&self.deps, ctx, input).await,
            "lookup_booking" => tools::lookup_booking::run(&self.deps, ctx, input),
            "reschedule_booking" => tools::reschedule_booking::run(&self.deps, ctx, input),
            "cancel_booking" => tools::cancel_booking::run(&self.deps, ctx, input),
            "schedule_contact_followup" => tools::followup::run(&self.deps, ctx, input),
            other => Err(ToolError::guardrail(
                "BOOKING_ERROR",
                format!("unknown tool '{other}'"),
            )),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(data) => {
                info!(
                    tool = name,
                    tenant = %ctx.tenant.id,
                    session = %ctx.session.id,
                    elapsed_ms,
                    "tool succeeded"
                );
                ToolOutcome::ok(data)
            }
            Err(ToolError::Guardrail { code, message }) => {
                info!(
                    tool = name,
                    tenant = %ctx.tenant.id,
                    session = %ctx.session.id,
                    code,
                    elapsed_ms,
                    "tool guardrail"
                );
                ToolOutcome::fail(format!("{code}: {message}"))
            }
            Err(ToolError::Internal(e)) => {
                let code = classify_code(&e);
                let reference = correlation_id();
                let masked_email = ctx
                    .session
                    .verified_email
                    .as_deref()
                    .map(email_hash)
                    .unwrap_or_default();
                error!(
                    r#ref = %reference,
                    code,
                    tool = name,
                    tenant = %ctx.tenant.id,
                    session = %ctx.session.id,
                    email_hash = %masked_email,
                    elapsed_ms,
                    "tool failed: {e}"
                );
                if code == "INTERNAL_ERROR" {
                    ToolOutcome::fail(format!(
                        "INTERNAL_ERROR: Something went wrong on our side. \
                         Apologize briefly and offer to try again. reference ID: {reference}"
                    ))
                } else {
                    ToolOutcome::fail(format!("{code}: {e}"))
                }
            }
        }
    }
}
