use chrono::{DateTime, Utc};
use rusqlite::TransactionBehavior;
use tracing::{debug, info};
use uuid::Uuid;

use frontdesk_core::types::TenantId;
use frontdesk_core::Clock;

use crate::db::Db;
use crate::error::{Result, StoreError};
use crate::models::{from_ms, ms, MessageType, OutboxMessage, OutboxStatus};

/// New outbox row parameters.
#[derive(Debug, Clone)]
pub struct EnqueueSms {
    pub tenant_id: TenantId,
    pub to_phone: String,
    pub body: String,
    pub message_type: MessageType,
    pub booking_reference: Option<String>,
    pub run_at: DateTime<Utc>,
    pub max_attempts: u32,
}

/// Durable queue of outbound SMS with lease-claim semantics.
///
/// The claim is a single pending→sending transition inside one
/// transaction, so concurrent workers never double-send a row.
pub struct OutboxStore {
    db: Db,
    clock: Clock,
}

impl OutboxStore {
    pub fn new(db: Db, clock: Clock) -> Self {
        Self { db, clock }
    }

    pub fn enqueue(&self, req: &EnqueueSms) -> Result<OutboxMessage> {
        let id = Uuid::now_v7().to_string();
        let now_str = self.clock.now_utc().to_rfc3339();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO outbox
             (id, tenant_id, to_phone, body, message_type, booking_reference,
              status, attempts, max_attempts, run_at_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 0, ?7, ?8, ?9)",
            rusqlite::params![
                id,
                req.tenant_id.as_str(),
                req.to_phone,
                req.body,
                req.message_type.to_string(),
                req.booking_reference,
                req.max_attempts,
                ms(req.run_at),
                now_str
            ],
        )?;
        debug!(outbox_id = %id, kind = %req.message_type, "sms enqueued");

        Ok(OutboxMessage {
            id,
            tenant_id: req.tenant_id.clone(),
            to_phone: req.to_phone.clone(),
            body: req.body.clone(),
            message_type: req.message_type,
            booking_reference: req.booking_reference.clone(),
            status: OutboxStatus::Pending,
            attempts: 0,
            max_attempts: req.max_attempts,
            last_error: None,
            provider_sid: None,
            provider_status: None,
            provider_error_code: None,
            run_at: req.run_at,
            created_at: now_str,
        })
    }

    /// Atomically claim up to `limit` due rows: pending → sending.
    pub fn claim_batch(&self, limit: u32) -> Result<Vec<OutboxMessage>> {
        let now = self.clock.now_utc();
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let ids: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM outbox
                 WHERE status = 'pending' AND run_at_ms <= ?1
                 ORDER BY run_at_ms LIMIT ?2",
            )?;
            let rows: Vec<String> = stmt
                .query_map(rusqlite::params![ms(now), limit as i64], |row| row.get(0))?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        let mut claimed = Vec::with_capacity(ids.len());
        for id in &ids {
            // Guarded transition: a row raced into another state is skipped.
            let n = tx.execute(
                "UPDATE outbox SET status = 'sending'
                 WHERE id = ?1 AND status = 'pending'",
                [id],
            )?;
            if n == 1 {
                if let Ok(msg) = tx.query_row(
                    "SELECT id, tenant_id, to_phone, body, message_type, booking_reference,
                            status, attempts, max_attempts, last_error, provider_sid,
                            provider_status, provider_error_code, run_at_ms, created_at
                     FROM outbox WHERE id = ?1",
                    [id],
                    row_to_outbox,
                ) {
                    claimed.push(msg);
                }
            }
        }
        tx.commit()?;

        if !claimed.is_empty() {
            debug!(count = claimed.len(), "outbox batch claimed");
        }
        Ok(claimed)
    }

    pub fn get(&self, id: &str) -> Result<Option<OutboxMessage>> {
        let conn = self.db.lock().unwrap();
        match conn.query_row(
            "SELECT id, tenant_id, to_phone, body, message_type, booking_reference,
                    status, attempts, max_attempts, last_error, provider_sid,
                    provider_status, provider_error_code, run_at_ms, created_at
             FROM outbox WHERE id = ?1",
            [id],
            row_to_outbox,
        ) {
            Ok(m) => Ok(Some(m)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Successful send: record the provider SID and count the attempt.
    pub fn mark_sent(&self, id: &str, provider_sid: &str) -> Result<()> {
        self.transition(
            id,
            "UPDATE outbox
             SET status = 'sent', attempts = attempts + 1,
                 provider_sid = ?2, last_error = NULL
             WHERE id = ?1 AND status = 'sending'",
            rusqlite::params![id, provider_sid],
        )
    }

    /// Terminal failure after the last attempt.
    pub fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        self.transition(
            id,
            "UPDATE outbox
             SET status = 'failed', attempts = attempts + 1, last_error = ?2
             WHERE id = ?1 AND status = 'sending'",
            rusqlite::params![id, error],
        )
    }

    /// Non-retryable abort (opt-out); does not consume an attempt.
    pub fn abort(&self, id: &str, reason: &str) -> Result<()> {
        self.transition(
            id,
            "UPDATE outbox
             SET status = 'aborted', last_error = ?2
             WHERE id = ?1 AND status = 'sending'",
            rusqlite::params![id, reason],
        )
    }

    /// Back to pending with a new run time; counts the failed attempt when
    /// `count_attempt` is set (retry) and not for guard-driven deferrals
    /// (quiet hours, rate limit).
    pub fn reschedule(
        &self,
        id: &str,
        run_at: DateTime<Utc>,
        error: Option<&str>,
        count_attempt: bool,
    ) -> Result<()> {
        let bump = if count_attempt { 1 } else { 0 };
        self.transition(
            id,
            "UPDATE outbox
             SET status = 'pending', run_at_ms = ?2, attempts = attempts + ?3,
                 last_error = COALESCE(?4, last_error)
             WHERE id = ?1 AND status = 'sending'",
            rusqlite::params![id, ms(run_at), bump, error],
        )
    }

    fn transition(
        &self,
        id: &str,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let n = conn.execute(sql, params)?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "outbox message",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Carrier webhook: write the delivery status onto the row owning this
    /// SID. Unknown SID is a no-op so the carrier is never induced to retry.
    pub fn apply_provider_status(
        &self,
        provider_sid: &str,
        status: &str,
        error_code: Option<&str>,
    ) -> Result<Option<OutboxMessage>> {
        let conn = self.db.lock().unwrap();
        let n = conn.execute(
            "UPDATE outbox SET provider_status = ?2, provider_error_code = ?3
             WHERE provider_sid = ?1",
            rusqlite::params![provider_sid, status, error_code],
        )?;
        if n == 0 {
            info!(sid_tail = %frontdesk_core::mask::sid_last4(provider_sid), "status for unknown SID ignored");
            return Ok(None);
        }
        match conn.query_row(
            "SELECT id, tenant_id, to_phone, body, message_type, booking_reference,
                    status, attempts, max_attempts, last_error, provider_sid,
                    provider_status, provider_error_code, run_at_ms, created_at
             FROM outbox WHERE provider_sid = ?1",
            [provider_sid],
            row_to_outbox,
        ) {
            Ok(m) => Ok(Some(m)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Startup recovery: rows stuck in `sending` (process died mid-send)
    /// go back to pending so the worker reconsiders them.
    pub fn requeue_stuck_sending(&self) -> Result<usize> {
        let now = self.clock.now_utc();
        let conn = self.db.lock().unwrap();
        let n = conn.execute(
            "UPDATE outbox SET status = 'pending', run_at_ms = ?1
             WHERE status = 'sending'",
            [ms(now)],
        )?;
        if n > 0 {
            info!(count = n, "stuck sending rows requeued on startup");
        }
        Ok(n)
    }
}

fn row_to_outbox(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxMessage> {
    let type_str: String = row.get(4)?;
    let status_str: String = row.get(6)?;
    Ok(OutboxMessage {
        id: row.get(0)?,
        tenant_id: TenantId(row.get(1)?),
        to_phone: row.get(2)?,
        body: row.get(3)?,
        message_type: type_str.parse().unwrap_or(MessageType::Followup),
        booking_reference: row.get(5)?,
        status: status_str.parse().unwrap_or(OutboxStatus::Failed),
        attempts: row.get::<_, i64>(7)? as u32,
        max_attempts: row.get::<_, i64>(8)? as u32,
        last_error: row.get(9)?,
        provider_sid: row.get(10)?,
        provider_status: row.get(11)?,
        provider_error_code: row.get(12)?,
        run_at: from_ms(row.get(13)?),
        created_at: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_db;
    use chrono::{Duration, TimeZone};

    fn setup() -> (OutboxStore, DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2026, 2, 11, 15, 0, 0).unwrap();
        (
            OutboxStore::new(open_memory_db().unwrap(), Clock::fixed(now)),
            now,
        )
    }

    fn enqueue_req(now: DateTime<Utc>) -> EnqueueSms {
        EnqueueSms {
            tenant_id: TenantId::from("t1"),
            to_phone: "+15551234567".into(),
            body: "Confirmed: Consult on Thu. Ref: APT-ABC234. Reply CHANGE / CANCEL / STOP.".into(),
            message_type: MessageType::BookingConfirmation,
            booking_reference: Some("APT-ABC234".into()),
            run_at: now,
            max_attempts: 3,
        }
    }

    #[test]
    fn claim_transitions_to_sending_once() {
        let (store, now) = setup();
        store.enqueue(&enqueue_req(now)).unwrap();

        let first = store.claim_batch(10).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status, OutboxStatus::Sending);

        // Already leased: nothing left to claim.
        assert!(store.claim_batch(10).unwrap().is_empty());
    }

    #[test]
    fn future_rows_not_claimed() {
        let (store, now) = setup();
        let mut req = enqueue_req(now);
        req.run_at = now + Duration::minutes(30);
        store.enqueue(&req).unwrap();
        assert!(store.claim_batch(10).unwrap().is_empty());
    }

    #[test]
    fn sent_rows_keep_sid_and_attempt_count() {
        let (store, now) = setup();
        let msg = store.enqueue(&enqueue_req(now)).unwrap();
        store.claim_batch(10).unwrap();
        store.mark_sent(&msg.id, "SM12345678").unwrap();

        let after = store.get(&msg.id).unwrap().unwrap();
        assert_eq!(after.status, OutboxStatus::Sent);
        assert_eq!(after.attempts, 1);
        assert_eq!(after.provider_sid.as_deref(), Some("SM12345678"));
    }

    #[test]
    fn retry_cycle_counts_attempts() {
        let (store, now) = setup();
        let msg = store.enqueue(&enqueue_req(now)).unwrap();

        store.claim_batch(10).unwrap();
        store
            .reschedule(&msg.id, now, Some("network timeout"), true)
            .unwrap();
        let after = store.get(&msg.id).unwrap().unwrap();
        assert_eq!(after.status, OutboxStatus::Pending);
        assert_eq!(after.attempts, 1);

        store.claim_batch(10).unwrap();
        store.claim_batch(10).unwrap(); // no double claim
        store.mark_failed(&msg.id, "21211 invalid number").unwrap();
        let after = store.get(&msg.id).unwrap().unwrap();
        assert_eq!(after.status, OutboxStatus::Failed);
        assert_eq!(after.attempts, 2);
    }

    #[test]
    fn quiet_hours_deferral_does_not_count_attempt() {
        let (store, now) = setup();
        let msg = store.enqueue(&enqueue_req(now)).unwrap();
        store.claim_batch(10).unwrap();
        store
            .reschedule(&msg.id, now + Duration::hours(9), None, false)
            .unwrap();
        let after = store.get(&msg.id).unwrap().unwrap();
        assert_eq!(after.attempts, 0);
        assert_eq!(after.status, OutboxStatus::Pending);
    }

    #[test]
    fn provider_status_applies_by_sid_only() {
        let (store, now) = setup();
        let msg = store.enqueue(&enqueue_req(now)).unwrap();
        store.claim_batch(10).unwrap();
        store.mark_sent(&msg.id, "SMabc").unwrap();

        let updated = store
            .apply_provider_status("SMabc", "delivered", None)
            .unwrap()
            .unwrap();
        assert_eq!(updated.provider_status.as_deref(), Some("delivered"));

        // Unknown SID: no-op, no error.
        assert!(store
            .apply_provider_status("SMunknown", "failed", Some("30008"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn stuck_sending_requeued() {
        let (store, now) = setup();
        store.enqueue(&enqueue_req(now)).unwrap();
        store.claim_batch(10).unwrap();

        assert_eq!(store.requeue_stuck_sending().unwrap(), 1);
        assert_eq!(store.claim_batch(10).unwrap().len(), 1);
    }
}
