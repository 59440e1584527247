//! Application state and the minimal HTTP surface: health, the carrier
//! status webhook, and the JSON chat endpoint the widget SDK talks to.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use frontdesk_agent::anthropic::AnthropicProvider;
use frontdesk_agent::{ExecutorDeps, ToolExecutor};
use frontdesk_booking::{AvailabilityEngine, RiskEngine};
use frontdesk_calendar::{
    BusyRangeCache, CalendarProvider, ExternalCalendar, MockCalendar,
};
use frontdesk_core::config::{CalendarMode, FrontdeskConfig};
use frontdesk_core::phone::normalize_phone;
use frontdesk_core::token::{TokenSigner, DEFAULT_TOKEN_TTL_SECS};
use frontdesk_core::types::Channel;
use frontdesk_core::Clock;
use frontdesk_events::handlers::{
    BookingSmsHandler, CalendarWriteFailureHandler, CancellationSmsHandler, HoldExpiryHandler,
    WaitlistHandler,
};
use frontdesk_events::{EventBus, EventKind, PolicyEngine};
use frontdesk_router::{ChatRouter, RouterDeps};
use frontdesk_sms::body as sms_body;
use frontdesk_sms::carrier::{carrier_from_config, SmsSender};
use frontdesk_sms::webhook;
use frontdesk_store::appointments::AppointmentStore;
use frontdesk_store::audit::AuditStore;
use frontdesk_store::customers::CustomerStore;
use frontdesk_store::followups::FollowupStore;
use frontdesk_store::holds::HoldStore;
use frontdesk_store::models::MessageType;
use frontdesk_store::optout::{OptOutStore, SmsRateStore};
use frontdesk_store::outbox::{EnqueueSms, OutboxStore};
use frontdesk_store::sessions::SessionStore;
use frontdesk_store::tenants::TenantStore;
use frontdesk_store::verification::VerificationStore;
use frontdesk_store::waitlist::WaitlistStore;
use frontdesk_voice::{TurnAction, VoiceFlow, VoiceSession, VoiceSessionTable};

/// Abandoned calls are evicted from the in-process table after this age.
const VOICE_CALL_MAX_AGE_SECS: i64 = 900;

pub struct AppState {
    pub config: FrontdeskConfig,
    pub clock: Clock,
    pub tenants: Arc<TenantStore>,
    pub sessions: Arc<SessionStore>,
    pub holds: Arc<HoldStore>,
    pub outbox: Arc<OutboxStore>,
    pub optouts: Arc<OptOutStore>,
    pub rates: Arc<SmsRateStore>,
    pub audit: Arc<AuditStore>,
    pub bus: Arc<EventBus>,
    pub carrier: Arc<dyn SmsSender>,
    pub signer: TokenSigner,
    pub router: Option<Arc<ChatRouter>>,
    pub voice_flow: Arc<VoiceFlow>,
    pub voice_calls: Arc<VoiceSessionTable>,
}

impl AppState {
    pub fn build(config: FrontdeskConfig) -> frontdesk_core::Result<Self> {
        let clock = Clock::system();
        let db = frontdesk_store::open_db(&config.database.path)
            .map_err(|e| frontdesk_core::FrontdeskError::Database(e.to_string()))?;

        let tenants = Arc::new(TenantStore::new(db.clone(), clock.clone()));
        let sessions = Arc::new(SessionStore::new(db.clone(), clock.clone()));
        let customers = Arc::new(CustomerStore::new(db.clone(), clock.clone()));
        let appointments = Arc::new(AppointmentStore::new(db.clone(), clock.clone()));
        let holds = Arc::new(HoldStore::new(
            db.clone(),
            clock.clone(),
            config.booking.hold_ttl_minutes,
        ));
        let waitlist = Arc::new(WaitlistStore::new(db.clone(), clock.clone()));
        let outbox = Arc::new(OutboxStore::new(db.clone(), clock.clone()));
        let optouts = Arc::new(OptOutStore::new(db.clone(), clock.clone()));
        let rates = Arc::new(SmsRateStore::new(db.clone(), clock.clone()));
        let followups = Arc::new(FollowupStore::new(db.clone(), clock.clone()));
        let audit = Arc::new(AuditStore::new(db.clone(), clock.clone()));
        let verifications = Arc::new(VerificationStore::new(
            db.clone(),
            clock.clone(),
            config.verification.ttl_minutes,
            config.verification.rate_limit,
        ));

        // Calendar provider: chosen once at startup, no runtime patching.
        let calendar: Arc<dyn CalendarProvider> = match config.calendar.mode {
            CalendarMode::Real => Arc::new(ExternalCalendar::new(
                config
                    .calendar
                    .api_base_url
                    .as_deref()
                    .expect("validated at startup"),
                config.encryption_key().expect("validated at startup"),
            )),
            CalendarMode::Mock => Arc::new(MockCalendar::new()),
        };
        let cache = Arc::new(BusyRangeCache::new(StdDuration::from_secs(
            config.calendar.busy_cache_ttl_seconds,
        )));

        let carrier = carrier_from_config(config.sms.carrier.as_ref());
        let carrier_configured = !carrier.is_simulator();

        let policy = Arc::new(PolicyEngine::new(&["hold_expiry_followup"]));

        let bus = Arc::new(EventBus::new());
        let sms_enabled = config.features.sms;
        bus.register(
            EventKind::BookingCreated,
            Arc::new(BookingSmsHandler {
                outbox: outbox.clone(),
                audit: audit.clone(),
                policy: policy.clone(),
                clock: clock.clone(),
                sms: config.sms.clone(),
                sms_enabled,
            }),
        );
        bus.register(
            EventKind::BookingRescheduled,
            Arc::new(BookingSmsHandler {
                outbox: outbox.clone(),
                audit: audit.clone(),
                policy: policy.clone(),
                clock: clock.clone(),
                sms: config.sms.clone(),
                sms_enabled,
            }),
        );
        bus.register(
            EventKind::BookingCancelled,
            Arc::new(CancellationSmsHandler {
                outbox: outbox.clone(),
                clock: clock.clone(),
                sms: config.sms.clone(),
                sms_enabled,
            }),
        );
        bus.register(
            EventKind::SlotOpened,
            Arc::new(WaitlistHandler {
                waitlist: waitlist.clone(),
                outbox: outbox.clone(),
                clock: clock.clone(),
                sms: config.sms.clone(),
            }),
        );
        bus.register(
            EventKind::HoldExpired,
            Arc::new(HoldExpiryHandler {
                sessions: sessions.clone(),
                followups: followups.clone(),
                audit: audit.clone(),
                policy: policy.clone(),
            }),
        );
        bus.register(
            EventKind::CalendarWriteFailed,
            Arc::new(CalendarWriteFailureHandler {
                audit: audit.clone(),
            }),
        );

        let availability = Arc::new(AvailabilityEngine::new(
            appointments.clone(),
            holds.clone(),
            calendar.clone(),
            cache.clone(),
            clock.clone(),
            config.calendar.read_required,
        ));

        let executor = Arc::new(ToolExecutor::new(ExecutorDeps {
            sessions: sessions.clone(),
            customers,
            appointments,
            holds: holds.clone(),
            availability,
            followups,
            audit: audit.clone(),
            bus: bus.clone(),
            policy,
            risk: Arc::new(RiskEngine::new()),
            calendar,
            cache,
            clock: clock.clone(),
            booking: config.booking.clone(),
            followup: config.followup.clone(),
            features: config.features.clone(),
            carrier_configured,
        }));

        // Voice shares the chat executor; the per-call table is one of
        // the process-local resources the sweep worker maintains.
        let voice_flow = Arc::new(VoiceFlow::new(
            executor.clone(),
            sessions.clone(),
            audit.clone(),
            clock.clone(),
        ));
        let voice_calls = Arc::new(VoiceSessionTable::new(VOICE_CALL_MAX_AGE_SECS));

        // Chat requires an LLM; without one the endpoint reports 503 and
        // the pipeline workers still run.
        let router = config.llm.as_ref().map(|llm| {
            Arc::new(ChatRouter::new(RouterDeps {
                provider: Arc::new(AnthropicProvider::new(
                    llm.api_key.clone(),
                    Some(llm.base_url.clone()),
                )),
                executor: executor.clone(),
                sessions: sessions.clone(),
                verifications: verifications.clone(),
                clock: clock.clone(),
                model: llm.model.clone(),
                require_email_verification: true,
            }))
        });

        let signer = TokenSigner::new(
            config
                .auth
                .signing_secret
                .as_deref()
                .expect("validated at startup"),
        )?;

        Ok(Self {
            config,
            clock,
            tenants,
            sessions,
            holds,
            outbox,
            optouts,
            rates,
            audit,
            bus,
            carrier,
            signer,
            router,
            voice_flow,
            voice_calls,
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/webhooks/sms-status", post(sms_status_webhook))
        .route("/chat", post(chat))
        .route("/voice/turn", post(voice_turn))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Carrier delivery-status callback. Always 2xx once past auth — a
/// non-2xx would make the carrier retry a callback we cannot use.
async fn sms_status_webhook(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    Form(fields): Form<Vec<(String, String)>>,
) -> StatusCode {
    let carrier_configured = !state.carrier.is_simulator();
    if !webhook::webhook_allowed(carrier_configured, state.config.environment) {
        warn!("webhook rejected: no carrier credentials outside dev");
        return StatusCode::FORBIDDEN;
    }

    if let Some(cfg) = &state.config.sms.carrier {
        let signature = headers
            .get("x-twilio-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let host = headers
            .get("host")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let url = format!("https://{host}{uri}");
        if !webhook::validate_signature(&cfg.auth_token, &url, &fields, signature) {
            warn!("webhook rejected: bad signature");
            return StatusCode::FORBIDDEN;
        }
    }

    let Some(cb) = webhook::parse_form(&fields) else {
        // Malformed but acknowledged: nothing for the carrier to retry.
        return StatusCode::OK;
    };
    if let Err(e) = webhook::process_status_callback(&state.outbox, &state.audit, &cb) {
        warn!("status callback processing failed: {e}");
    }
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    tenant_slug: String,
    external_id: String,
    message: String,
    #[serde(default)]
    client_tz: Option<String>,
}

/// Widget SDK chat endpoint. With `auth.sdk_required` the bearer session
/// token is mandatory and must match the session it claims.
async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let Some(router) = &state.router else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let tenant = state
        .tenants
        .get_by_slug(&body.tenant_slug)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let session = state
        .sessions
        .get_or_create(&tenant.id, Channel::Web, &body.external_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if state.config.auth.sdk_required {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;
        let claims = state
            .signer
            .verify(token, state.clock.now_utc())
            .map_err(|_| StatusCode::UNAUTHORIZED)?;
        if claims.tid != tenant.id.as_str() || claims.sid != session.id.as_str() {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    let reply = router
        .handle_message(&tenant, &session.id, &body.message, body.client_tz.as_deref())
        .await
        .map_err(|e| {
            warn!("chat handling failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    // A fresh token keeps the SDK session alive across the TTL window.
    let token = state.signer.issue(
        tenant.id.as_str(),
        session.id.as_str(),
        None,
        state.clock.now_utc(),
        DEFAULT_TOKEN_TTL_SECS,
    );

    info!(tenant = %tenant.id, session = %session.id, llm = reply.llm_used, "chat turn served");
    Ok(Json(serde_json::json!({
        "reply": reply.text,
        "session_token": token,
        "tools_used": reply.tools_used,
    })))
}

#[derive(Debug, Deserialize)]
struct VoiceTurnBody {
    tenant_slug: String,
    /// Carrier call id; keys the in-process session table.
    call_id: String,
    /// Absent or empty on the initial connect — we answer with the greeting.
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    caller_phone: Option<String>,
    /// "phone" (default) or "web" for the browser voice widget.
    #[serde(default)]
    channel: Option<String>,
}

/// One voice turn: transcript in, utterance out. The voice transport
/// (carrier media streams, browser widget) lives outside this process
/// and only ever speaks this JSON shape.
async fn voice_turn(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VoiceTurnBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let via_web = body.channel.as_deref() == Some("web");
    let enabled = if via_web {
        state.config.features.voice_web
    } else {
        state.config.features.voice
    };
    if !enabled {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let tenant = state
        .tenants
        .get_by_slug(&body.tenant_slug)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let mut call = match state.voice_calls.get(&body.call_id) {
        Some(existing) => existing,
        None => {
            let caller = body.caller_phone.as_deref().and_then(normalize_phone);
            // Calls from a known number share the chat session history of
            // that number; anonymous calls stay scoped to the call id.
            let external = caller.clone().unwrap_or_else(|| body.call_id.clone());
            let session = state
                .sessions
                .get_or_create(&tenant.id, Channel::Voice, &external)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            VoiceSession::new(
                &body.call_id,
                tenant.id.clone(),
                session.id,
                caller,
                state.clock.now_utc(),
            )
        }
    };

    let transcript = body
        .transcript
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let turn = match transcript {
        None => state.voice_flow.open_call(&tenant, &mut call),
        Some(text) => state
            .voice_flow
            .handle_turn(&tenant, &mut call, text)
            .await
            .map_err(|e| {
                warn!("voice turn failed: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            })?,
    };

    let action = match turn.action {
        TurnAction::Continue => {
            state.voice_calls.update(call);
            "continue"
        }
        TurnAction::Hangup => {
            state.voice_calls.remove(&body.call_id);
            "hangup"
        }
        TurnAction::SmsHandoff => {
            if let Some(phone) = call.caller_phone.clone() {
                let link = format!("https://frontdesk.app/{}/book", tenant.slug);
                if let Err(e) = state.outbox.enqueue(&EnqueueSms {
                    tenant_id: tenant.id.clone(),
                    to_phone: phone,
                    body: sms_body::handoff_link(&link),
                    message_type: MessageType::HandoffLink,
                    booking_reference: None,
                    run_at: state.clock.now_utc(),
                    max_attempts: state.config.sms.max_attempts,
                }) {
                    warn!("handoff link enqueue failed: {e}");
                }
            }
            state.voice_calls.remove(&body.call_id);
            "sms_handoff"
        }
    };

    info!(tenant = %tenant.id, call_id = %body.call_id, action, "voice turn served");
    Ok(Json(serde_json::json!({
        "say": turn.say,
        "action": action,
    })))
}
