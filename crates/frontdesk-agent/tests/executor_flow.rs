//! End-to-end tool-executor scenarios against in-memory stores, a mock
//! calendar, and a frozen clock.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, TimeZone, Utc};

use frontdesk_agent::{ExecutorDeps, ToolContext, ToolExecutor};
use frontdesk_booking::{AvailabilityEngine, RiskEngine};
use frontdesk_calendar::{BusyRangeCache, MockCalendar};
use frontdesk_core::config::{BookingConfig, FeatureFlags, FollowupConfig, SmsConfig};
use frontdesk_core::types::{
    BusinessHours, Channel, QuietHours, ServiceCatalogMode, ServiceEntry, Tenant, TenantId,
};
use frontdesk_core::Clock;
use frontdesk_events::handlers::BookingSmsHandler;
use frontdesk_events::{EventBus, EventKind, PolicyEngine};
use frontdesk_store::appointments::AppointmentStore;
use frontdesk_store::audit::AuditStore;
use frontdesk_store::customers::CustomerStore;
use frontdesk_store::followups::FollowupStore;
use frontdesk_store::holds::HoldStore;
use frontdesk_store::open_memory_db;
use frontdesk_store::outbox::OutboxStore;
use frontdesk_store::sessions::SessionStore;

// Wednesday 2026-02-11, 15:00 UTC = 10:00 ET.
fn frozen_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 11, 15, 0, 0).unwrap()
}

fn tenant() -> Tenant {
    Tenant {
        id: TenantId::from("t1"),
        name: "Riverside Dental".into(),
        slug: "riverside".into(),
        timezone: chrono_tz::America::New_York,
        slot_minutes: 30,
        hours: BusinessHours::weekdays(
            chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            chrono::NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        ),
        services: vec![ServiceEntry {
            name: "Consultation".into(),
            duration_minutes: 30,
            price_cents: None,
            description: None,
        }],
        catalog_mode: ServiceCatalogMode::Hybrid,
        calendar: None,
        quiet_hours: QuietHours::default(),
    }
}

struct Fixture {
    executor: ToolExecutor,
    ctx: ToolContext,
    sessions: Arc<SessionStore>,
    outbox: Arc<OutboxStore>,
    audit: Arc<AuditStore>,
}

fn fixture() -> Fixture {
    let db = open_memory_db().unwrap();
    let clock = Clock::fixed(frozen_now());

    let sessions = Arc::new(SessionStore::new(db.clone(), clock.clone()));
    let customers = Arc::new(CustomerStore::new(db.clone(), clock.clone()));
    let appointments = Arc::new(AppointmentStore::new(db.clone(), clock.clone()));
    let holds = Arc::new(HoldStore::new(db.clone(), clock.clone(), 5));
    let followups = Arc::new(FollowupStore::new(db.clone(), clock.clone()));
    let audit = Arc::new(AuditStore::new(db.clone(), clock.clone()));
    let outbox = Arc::new(OutboxStore::new(db.clone(), clock.clone()));
    let calendar = Arc::new(MockCalendar::new());
    let cache = Arc::new(BusyRangeCache::new(StdDuration::from_secs(30)));
    let policy = Arc::new(PolicyEngine::new(&["hold_expiry_followup"]));

    let availability = Arc::new(AvailabilityEngine::new(
        appointments.clone(),
        holds.clone(),
        calendar.clone(),
        cache.clone(),
        clock.clone(),
        true,
    ));

    let bus = Arc::new(EventBus::new());
    bus.register(
        EventKind::BookingCreated,
        Arc::new(BookingSmsHandler {
            outbox: outbox.clone(),
            audit: audit.clone(),
            policy: policy.clone(),
            clock: clock.clone(),
            sms: SmsConfig::default(),
            sms_enabled: true,
        }),
    );

    let session = sessions
        .get_or_create(&TenantId::from("t1"), Channel::Web, "visitor-1")
        .unwrap();

    let executor = ToolExecutor::new(ExecutorDeps {
        sessions: sessions.clone(),
        customers,
        appointments,
        holds,
        availability,
        followups,
        audit: audit.clone(),
        bus,
        policy,
        risk: Arc::new(RiskEngine::new()),
        calendar,
        cache,
        clock,
        booking: BookingConfig::default(),
        followup: FollowupConfig::default(),
        features: FeatureFlags::default(),
        carrier_configured: false,
    });

    Fixture {
        ctx: ToolContext {
            tenant: tenant(),
            session,
        },
        executor,
        sessions,
        outbox,
        audit,
    }
}

fn refresh_session(f: &mut Fixture) {
    f.ctx.session = f.sessions.get(&f.ctx.session.id).unwrap().unwrap();
}

#[tokio::test]
async fn happy_booking_wednesday_eastern() {
    let mut f = fixture();

    // "Tomorrow at 10am" ET resolved upstream: 2026-02-12T15:00Z.
    let check = f
        .executor
        .execute(
            &f.ctx,
            "check_availability",
            &serde_json::json!({"start_date": "2026-02-12", "end_date": "2026-02-12"}),
        )
        .await;
    assert!(check.success, "{:?}", check.error);
    let data = check.data.unwrap();
    assert!(data["verified"].as_bool().unwrap());
    assert!(data["slots"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s["start"] == "2026-02-12T15:00:00+00:00"));

    let hold = f
        .executor
        .execute(
            &f.ctx,
            "hold_slot",
            &serde_json::json!({
                "start_time": "2026-02-12T15:00:00Z",
                "end_time": "2026-02-12T15:30:00Z",
            }),
        )
        .await;
    assert!(hold.success, "{:?}", hold.error);
    let hold_id = hold.data.unwrap()["hold_id"].as_str().unwrap().to_string();

    // Unverified session cannot confirm.
    let premature = f
        .executor
        .execute(
            &f.ctx,
            "confirm_booking",
            &serde_json::json!({
                "hold_id": hold_id,
                "client_name": "Dana Smith",
                "client_email": "dana@example.com",
                "client_phone": "(555) 123-4567",
            }),
        )
        .await;
    assert!(!premature.success);
    assert!(premature
        .error
        .unwrap()
        .starts_with("EMAIL_VERIFICATION_REQUIRED"));

    // Complete the OTP round-trip, then confirm.
    f.sessions
        .mark_email_verified(&f.ctx.session.id, "dana@example.com")
        .unwrap();
    refresh_session(&mut f);

    let confirm = f
        .executor
        .execute(
            &f.ctx,
            "confirm_booking",
            &serde_json::json!({
                "hold_id": hold_id,
                "client_name": "Dana Smith",
                "client_email": "dana@example.com",
                "client_phone": "(555) 123-4567",
                "service_name": "Consultation",
            }),
        )
        .await;
    assert!(confirm.success, "{:?}", confirm.error);
    let data = confirm.data.unwrap();

    let reference = data["reference_code"].as_str().unwrap();
    assert!(reference.starts_with("APT-"));
    assert!(reference[4..].chars().count() >= 6);
    assert!(reference[4..]
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    assert_eq!(data["sms_status"], "simulator");

    // Audit: phone captured with masked prefix only.
    let captured = f
        .audit
        .entries_with_prefix(&f.ctx.tenant.id, "booking.phone_captured")
        .unwrap();
    assert_eq!(captured.len(), 1);
    let prefix = captured[0].payload["phone_prefix"].as_str().unwrap();
    assert!(prefix.starts_with("+1555"));
    assert!(!prefix.contains("4567"));

    // Outbox: confirmation row with Ref + STOP.
    let due = f.outbox.claim_batch(10).unwrap();
    assert_eq!(due.len(), 1);
    assert!(due[0].body.contains(&format!("Ref: {reference}")));
    assert!(due[0].body.contains("STOP"));
    assert_eq!(due[0].to_phone, "+15551234567");
}

#[tokio::test]
async fn slot_conflict_has_exactly_one_winner() {
    let f = fixture();
    let input = serde_json::json!({
        "start_time": "2026-02-12T15:00:00Z",
        "end_time": "2026-02-12T15:30:00Z",
    });

    let first = f.executor.execute(&f.ctx, "hold_slot", &input).await;
    let second = f.executor.execute(&f.ctx, "hold_slot", &input).await;

    assert!(first.success);
    assert!(!second.success);
    assert!(second.error.unwrap().starts_with("SLOT_CONFLICT:"));
}

#[tokio::test]
async fn cancel_anti_enumeration() {
    let mut f = fixture();

    // Create a real booking first.
    f.sessions
        .mark_email_verified(&f.ctx.session.id, "dana@example.com")
        .unwrap();
    refresh_session(&mut f);
    let hold = f
        .executor
        .execute(
            &f.ctx,
            "hold_slot",
            &serde_json::json!({
                "start_time": "2026-02-12T15:00:00Z",
                "end_time": "2026-02-12T15:30:00Z",
            }),
        )
        .await;
    let hold_id = hold.data.unwrap()["hold_id"].as_str().unwrap().to_string();
    let confirm = f
        .executor
        .execute(
            &f.ctx,
            "confirm_booking",
            &serde_json::json!({
                "hold_id": hold_id,
                "client_name": "Dana Smith",
                "client_email": "dana@example.com",
                "client_phone": "(555) 123-4567",
            }),
        )
        .await;
    let reference = confirm.data.unwrap()["reference_code"]
        .as_str()
        .unwrap()
        .to_string();

    // Fresh, unverified session for the probing caller.
    let probe_session = f
        .sessions
        .get_or_create(&f.ctx.tenant.id, Channel::Web, "visitor-2")
        .unwrap();
    let probe_ctx = ToolContext {
        tenant: f.ctx.tenant.clone(),
        session: probe_session,
    };

    // Unknown reference: generic refusal.
    let missing = f
        .executor
        .execute(
            &probe_ctx,
            "cancel_booking",
            &serde_json::json!({"reference_code": "APT-NONE"}),
        )
        .await;
    assert!(!missing.success);
    let missing_err = missing.error.unwrap();
    assert!(missing_err.starts_with("CANCELLATION_FAILED:"));
    assert!(missing_err.contains("can't find a booking"));

    // Real reference, no proof: asks for last4, does NOT reveal validity.
    let needs_identity = f
        .executor
        .execute(
            &probe_ctx,
            "cancel_booking",
            &serde_json::json!({"reference_code": reference}),
        )
        .await;
    assert!(!needs_identity.success);
    assert!(needs_identity
        .error
        .unwrap()
        .starts_with("CANCELLATION_NEEDS_IDENTITY:"));

    // Wrong last4 collapses to the same generic refusal as the
    // unknown-reference case.
    let wrong = f
        .executor
        .execute(
            &probe_ctx,
            "cancel_booking",
            &serde_json::json!({"reference_code": reference, "phone_last4": "9999"}),
        )
        .await;
    assert!(!wrong.success);
    let wrong_err = wrong.error.unwrap();
    assert!(wrong_err.starts_with("CANCELLATION_FAILED:"));
    assert_eq!(wrong_err, missing_err);

    // Matching last4 cancels.
    let ok = f
        .executor
        .execute(
            &probe_ctx,
            "cancel_booking",
            &serde_json::json!({"reference_code": reference, "phone_last4": "4567"}),
        )
        .await;
    assert!(ok.success, "{:?}", ok.error);
    assert_eq!(ok.data.unwrap()["verification_method"], "phone_last4");
}

#[tokio::test]
async fn far_date_gate_requires_explicit_confirmation() {
    let f = fixture();

    let far = f
        .executor
        .execute(
            &f.ctx,
            "hold_slot",
            &serde_json::json!({
                "start_time": "2026-04-15T15:00:00Z",
                "end_time": "2026-04-15T15:30:00Z",
            }),
        )
        .await;
    assert!(!far.success);
    assert!(far
        .error
        .unwrap()
        .starts_with("FAR_DATE_CONFIRMATION_REQUIRED"));

    let confirmed = f
        .executor
        .execute(
            &f.ctx,
            "hold_slot",
            &serde_json::json!({
                "start_time": "2026-04-15T15:00:00Z",
                "end_time": "2026-04-15T15:30:00Z",
                "far_date_confirmed": true,
            }),
        )
        .await;
    assert!(confirmed.success, "{:?}", confirmed.error);
}

#[tokio::test]
async fn wide_range_rejected() {
    let f = fixture();
    let out = f
        .executor
        .execute(
            &f.ctx,
            "check_availability",
            &serde_json::json!({"start_date": "2026-02-12", "end_date": "2026-03-12"}),
        )
        .await;
    assert!(!out.success);
    assert!(out.error.unwrap().starts_with("DATE_RANGE_TOO_WIDE"));
}

#[tokio::test]
async fn email_mismatch_is_masked() {
    let mut f = fixture();
    f.sessions
        .mark_email_verified(&f.ctx.session.id, "dana@example.com")
        .unwrap();
    refresh_session(&mut f);

    let hold = f
        .executor
        .execute(
            &f.ctx,
            "hold_slot",
            &serde_json::json!({
                "start_time": "2026-02-12T15:00:00Z",
                "end_time": "2026-02-12T15:30:00Z",
            }),
        )
        .await;
    let hold_id = hold.data.unwrap()["hold_id"].as_str().unwrap().to_string();

    let out = f
        .executor
        .execute(
            &f.ctx,
            "confirm_booking",
            &serde_json::json!({
                "hold_id": hold_id,
                "client_name": "Someone Else",
                "client_email": "mallory@example.com",
                "client_phone": "(555) 123-4567",
            }),
        )
        .await;
    assert!(!out.success);
    let err = out.error.unwrap();
    assert!(err.starts_with("EMAIL_MISMATCH"));
    // Raw addresses never appear; masked forms do.
    assert!(!err.contains("mallory@example.com"));
    assert!(err.contains("ma***@example.com"));
    assert!(err.contains("da***@example.com"));
}

#[tokio::test]
async fn followup_caps_and_sentinel() {
    let f = fixture();
    let base = serde_json::json!({
        "client_name": "Dana Smith",
        "client_email": "dana@example.com",
        "preferred_contact": "email",
        "reason": "pricing question",
    });

    let first = f
        .executor
        .execute(&f.ctx, "schedule_contact_followup", &base)
        .await;
    assert!(first.success, "{:?}", first.error);

    // Second needs explicit confirmation.
    let second = f
        .executor
        .execute(&f.ctx, "schedule_contact_followup", &base)
        .await;
    assert!(!second.success);
    assert!(second.error.unwrap().starts_with("CONFIRMATION_REQUIRED"));

    // With the sentinel it still hits the per-contact cooldown (the
    // first follow-up just happened).
    let mut with_sentinel = base.clone();
    with_sentinel["notes"] = serde_json::json!("customer said yes [customer-confirmed]");
    let third = f
        .executor
        .execute(&f.ctx, "schedule_contact_followup", &with_sentinel)
        .await;
    assert!(!third.success);
    assert!(third.error.unwrap().contains("minutes"));
}
