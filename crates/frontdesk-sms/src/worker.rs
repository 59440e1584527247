//! Outbox worker: claim, guard, send, mark, audit.
//!
//! Single-flight loop. The claim is a pending→sending lease in the
//! store, so a second worker instance never double-sends. Every failure
//! path leaves the row in a state the next tick can reason about.

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use frontdesk_core::config::SmsConfig;
use frontdesk_core::mask::phone_last4;
use frontdesk_core::Clock;
use frontdesk_store::audit::AuditStore;
use frontdesk_store::models::OutboxMessage;
use frontdesk_store::optout::{OptOutStore, SmsRateStore};
use frontdesk_store::outbox::OutboxStore;
use frontdesk_store::tenants::TenantStore;

use crate::carrier::SmsSender;
use crate::quiet;

pub struct WorkerDeps {
    pub outbox: Arc<OutboxStore>,
    pub optouts: Arc<OptOutStore>,
    pub rates: Arc<SmsRateStore>,
    pub tenants: Arc<TenantStore>,
    pub audit: Arc<AuditStore>,
    pub carrier: Arc<dyn SmsSender>,
    pub clock: Clock,
    pub config: SmsConfig,
}

pub struct OutboxWorker {
    deps: WorkerDeps,
}

impl OutboxWorker {
    pub fn new(deps: WorkerDeps) -> Self {
        Self { deps }
    }

    /// Main loop. Polls until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("outbox worker started");
        if let Err(e) = self.deps.outbox.requeue_stuck_sending() {
            error!("startup requeue failed: {e}");
        }

        let mut interval = tokio::time::interval(std::time::Duration::from_millis(
            self.deps.config.poll_interval_ms,
        ));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("outbox tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("outbox worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One claim-and-drain pass. Returns how many rows were processed.
    pub async fn tick(&self) -> frontdesk_store::Result<usize> {
        let batch = self.deps.outbox.claim_batch(self.deps.config.batch_size)?;
        let n = batch.len();
        for msg in batch {
            self.process(msg).await;
        }
        Ok(n)
    }

    async fn process(&self, msg: OutboxMessage) {
        let deps = &self.deps;
        let now = deps.clock.now_utc();

        // Guard 1: opt-out list. Terminal, no retry, no attempt consumed.
        match deps.optouts.is_opted_out(&msg.tenant_id, &msg.to_phone) {
            Ok(true) => {
                warn!(outbox_id = %msg.id, "recipient opted out, aborting");
                if let Err(e) = deps.outbox.abort(&msg.id, "opted_out") {
                    error!(outbox_id = %msg.id, "abort failed: {e}");
                }
                return;
            }
            Ok(false) => {}
            // Opt-out store failure is recovered locally: proceed to send.
            Err(e) => warn!(outbox_id = %msg.id, "opt-out check failed, proceeding: {e}"),
        }

        // Guard 2: tenant quiet hours — defer to the window close.
        if let Ok(Some(tenant)) = deps.tenants.get(&msg.tenant_id) {
            if let Some(resume_at) = quiet::next_send_time(&tenant.quiet_hours, tenant.timezone, now)
            {
                info!(outbox_id = %msg.id, %resume_at, "inside quiet hours, deferring");
                if let Err(e) = deps.outbox.reschedule(&msg.id, resume_at, None, false) {
                    error!(outbox_id = %msg.id, "quiet-hours reschedule failed: {e}");
                }
                return;
            }
        }

        // Guard 3: per-phone rate limit — back off without consuming an attempt.
        match deps.rates.recent_sends(&msg.to_phone, 60) {
            Ok(sent) if sent >= deps.config.rate_limit_per_hour => {
                let resume_at = now + backoff_delay(msg.attempts + 1);
                info!(outbox_id = %msg.id, "per-phone rate limit hit, deferring");
                if let Err(e) = deps.outbox.reschedule(&msg.id, resume_at, None, false) {
                    error!(outbox_id = %msg.id, "rate-limit reschedule failed: {e}");
                }
                return;
            }
            Ok(_) => {}
            Err(e) => warn!(outbox_id = %msg.id, "rate check failed, proceeding: {e}"),
        }

        // Attempt audit lands before the send so a crash mid-send still
        // leaves a trace for ops.
        deps.audit.append_best_effort(
            &msg.tenant_id,
            "sms.outbound_attempted",
            Some("outbox"),
            Some(&msg.id),
            "outbox_worker",
            serde_json::json!({
                "phone_last4": phone_last4(&msg.to_phone),
                "message_type": msg.message_type.to_string(),
                "attempt": msg.attempts + 1,
            }),
        );

        match deps.carrier.send(&msg.to_phone, &msg.body).await {
            Ok(outcome) => {
                if let Err(e) = deps.outbox.mark_sent(&msg.id, &outcome.sid) {
                    error!(outbox_id = %msg.id, "mark_sent failed: {e}");
                    return;
                }
                if let Err(e) = deps.rates.record_send(&msg.to_phone) {
                    warn!(outbox_id = %msg.id, "rate log write failed: {e}");
                }
                deps.audit.append_best_effort(
                    &msg.tenant_id,
                    "sms.outbound_sent",
                    Some("outbox"),
                    Some(&msg.id),
                    "outbox_worker",
                    serde_json::json!({
                        "sid_last4": frontdesk_core::mask::sid_last4(&outcome.sid),
                        "simulated": outcome.simulated,
                        "message_type": msg.message_type.to_string(),
                    }),
                );
            }
            Err(e) => {
                let attempted = msg.attempts + 1;
                if attempted < msg.max_attempts {
                    let resume_at = now + backoff_delay(attempted);
                    warn!(
                        outbox_id = %msg.id,
                        category = e.category.as_str(),
                        attempt = attempted,
                        "send failed, retrying with backoff"
                    );
                    if let Err(err) =
                        deps.outbox
                            .reschedule(&msg.id, resume_at, Some(&e.message), true)
                    {
                        error!(outbox_id = %msg.id, "retry reschedule failed: {err}");
                    }
                } else {
                    error!(
                        outbox_id = %msg.id,
                        category = e.category.as_str(),
                        "send failed on final attempt"
                    );
                    if let Err(err) = deps.outbox.mark_failed(&msg.id, &e.message) {
                        error!(outbox_id = %msg.id, "mark_failed failed: {err}");
                    }
                    deps.audit.append_best_effort(
                        &msg.tenant_id,
                        "sms.outbound_failed",
                        Some("outbox"),
                        Some(&msg.id),
                        "outbox_worker",
                        serde_json::json!({
                            "error_category": e.category.as_str(),
                            "error_code": e.error_code,
                            "attempts": attempted,
                        }),
                    );
                }
            }
        }
    }
}

/// Exponential backoff: 2^attempt minutes, capped at an hour.
fn backoff_delay(attempt: u32) -> Duration {
    let minutes = 1i64 << attempt.min(6);
    Duration::minutes(minutes.min(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use frontdesk_core::types::TenantId;
    use frontdesk_store::models::{MessageType, OutboxStatus};
    use frontdesk_store::open_memory_db;
    use frontdesk_store::outbox::EnqueueSms;

    use crate::carrier::{CarrierSendError, SendOutcome, SimulatorCarrier};
    use async_trait::async_trait;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 11, 15, 0, 0).unwrap()
    }

    /// Carrier that always rejects with a fixed error code.
    struct RejectingCarrier {
        code: &'static str,
    }

    #[async_trait]
    impl SmsSender for RejectingCarrier {
        fn name(&self) -> &str {
            "rejecting"
        }

        async fn send(&self, _to: &str, _body: &str) -> Result<SendOutcome, CarrierSendError> {
            Err(CarrierSendError {
                category: crate::carrier::categorize_error_code(self.code),
                error_code: Some(self.code.to_string()),
                message: format!("carrier error {}", self.code),
            })
        }
    }

    fn worker_at(
        db: frontdesk_store::Db,
        carrier: Arc<dyn SmsSender>,
        at: DateTime<Utc>,
    ) -> OutboxWorker {
        let clock = Clock::fixed(at);
        OutboxWorker::new(WorkerDeps {
            outbox: Arc::new(OutboxStore::new(db.clone(), clock.clone())),
            optouts: Arc::new(OptOutStore::new(db.clone(), clock.clone())),
            rates: Arc::new(SmsRateStore::new(db.clone(), clock.clone())),
            tenants: Arc::new(TenantStore::new(db.clone(), clock.clone())),
            audit: Arc::new(AuditStore::new(db, clock.clone())),
            carrier,
            clock,
            config: SmsConfig::default(),
        })
    }

    fn worker(db: frontdesk_store::Db) -> OutboxWorker {
        worker_at(db, Arc::new(SimulatorCarrier), now())
    }

    fn enqueue(db: &frontdesk_store::Db) -> OutboxMessage {
        let outbox = OutboxStore::new(db.clone(), Clock::fixed(now()));
        outbox
            .enqueue(&EnqueueSms {
                tenant_id: TenantId::from("t1"),
                to_phone: "+15551234567".into(),
                body: "Confirmed: Consult. Ref: APT-ABC234. Reply CHANGE / CANCEL / STOP.".into(),
                message_type: MessageType::BookingConfirmation,
                booking_reference: Some("APT-ABC234".into()),
                run_at: now(),
                max_attempts: 3,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn simulator_send_marks_sent_with_sim_sid_and_audits() {
        let db = open_memory_db().unwrap();
        let msg = enqueue(&db);
        let w = worker(db.clone());

        assert_eq!(w.tick().await.unwrap(), 1);

        let outbox = OutboxStore::new(db.clone(), Clock::fixed(now()));
        let after = outbox.get(&msg.id).unwrap().unwrap();
        assert_eq!(after.status, OutboxStatus::Sent);
        assert!(after.provider_sid.as_deref().unwrap().starts_with("SIM_"));

        let audit = AuditStore::new(db, Clock::fixed(now()));
        let rows = audit
            .entries_with_prefix(&TenantId::from("t1"), "sms.")
            .unwrap();
        let kinds: Vec<&str> = rows.iter().map(|r| r.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["sms.outbound_attempted", "sms.outbound_sent"]);
        // Masked payloads only.
        assert_eq!(rows[0].payload["phone_last4"], "4567");
        assert_eq!(rows[1].payload["simulated"], true);
        assert!(rows[1].payload["sid_last4"].as_str().unwrap().len() == 4);
    }

    #[tokio::test]
    async fn opted_out_recipient_aborts_without_send() {
        let db = open_memory_db().unwrap();
        let msg = enqueue(&db);
        let optouts = OptOutStore::new(db.clone(), Clock::fixed(now()));
        optouts
            .opt_out(&TenantId::from("t1"), "+15551234567")
            .unwrap();

        let w = worker(db.clone());
        w.tick().await.unwrap();

        let outbox = OutboxStore::new(db.clone(), Clock::fixed(now()));
        let after = outbox.get(&msg.id).unwrap().unwrap();
        assert_eq!(after.status, OutboxStatus::Aborted);
        assert_eq!(after.last_error.as_deref(), Some("opted_out"));
        assert_eq!(after.attempts, 0);

        // No attempted/sent audit for a guard-blocked message.
        let audit = AuditStore::new(db, Clock::fixed(now()));
        assert!(audit
            .entries_with_prefix(&TenantId::from("t1"), "sms.")
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn rate_limited_phone_defers_without_attempt() {
        let db = open_memory_db().unwrap();
        let msg = enqueue(&db);
        let rates = SmsRateStore::new(db.clone(), Clock::fixed(now()));
        for _ in 0..SmsConfig::default().rate_limit_per_hour {
            rates.record_send("+15551234567").unwrap();
        }

        let w = worker(db.clone());
        w.tick().await.unwrap();

        let outbox = OutboxStore::new(db, Clock::fixed(now()));
        let after = outbox.get(&msg.id).unwrap().unwrap();
        assert_eq!(after.status, OutboxStatus::Pending);
        assert_eq!(after.attempts, 0);
        assert!(after.run_at > now());
    }

    #[tokio::test]
    async fn invalid_number_retries_then_fails_with_categorised_audit() {
        let db = open_memory_db().unwrap();
        let msg = enqueue(&db);
        let carrier: Arc<dyn SmsSender> = Arc::new(RejectingCarrier { code: "21211" });

        // Attempt 1: scheduled retry with backoff.
        let w = worker_at(db.clone(), carrier.clone(), now());
        assert_eq!(w.tick().await.unwrap(), 1);
        let outbox = OutboxStore::new(db.clone(), Clock::fixed(now()));
        let after = outbox.get(&msg.id).unwrap().unwrap();
        assert_eq!(after.status, OutboxStatus::Pending);
        assert_eq!(after.attempts, 1);
        assert!(after.run_at > now());

        // Attempt 2, clock advanced past the backoff.
        let w = worker_at(db.clone(), carrier.clone(), now() + Duration::minutes(5));
        assert_eq!(w.tick().await.unwrap(), 1);

        // Attempt 3 is the last: the row goes terminal.
        let w = worker_at(db.clone(), carrier, now() + Duration::minutes(30));
        assert_eq!(w.tick().await.unwrap(), 1);

        let after = outbox.get(&msg.id).unwrap().unwrap();
        assert_eq!(after.status, OutboxStatus::Failed);
        assert_eq!(after.attempts, after.max_attempts);

        let audit = AuditStore::new(db, Clock::fixed(now()));
        let failed = audit
            .entries_with_prefix(&TenantId::from("t1"), "sms.outbound_failed")
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].payload["error_category"], "invalid_number");
        assert_eq!(failed[0].payload["error_code"], "21211");

        // Every attempt left an outbound_attempted trace.
        let attempted = audit
            .entries_with_prefix(&TenantId::from("t1"), "sms.outbound_attempted")
            .unwrap();
        assert_eq!(attempted.len(), 3);
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay(1), Duration::minutes(2));
        assert_eq!(backoff_delay(2), Duration::minutes(4));
        assert_eq!(backoff_delay(3), Duration::minutes(8));
        assert_eq!(backoff_delay(20), Duration::minutes(60));
    }
}
