use chrono::{DateTime, Duration, Utc};
use rusqlite::TransactionBehavior;
use tracing::{debug, info};
use uuid::Uuid;

use frontdesk_core::types::{SessionId, TenantId};
use frontdesk_core::Clock;

use crate::db::Db;
use crate::error::{Result, StoreError};
use crate::models::{from_ms, ms, Hold};

/// Short-lived slot reservations.
///
/// `hold_slot` is the concurrency-critical operation: the overlap check
/// and insert run inside one IMMEDIATE transaction, so concurrent
/// attempts on the same slot produce exactly one winner.
pub struct HoldStore {
    db: Db,
    clock: Clock,
    ttl_minutes: i64,
}

impl HoldStore {
    pub fn new(db: Db, clock: Clock, ttl_minutes: i64) -> Self {
        Self {
            db,
            clock,
            ttl_minutes,
        }
    }

    /// Reserve `[start, end)` for a session. Fails with `SlotConflict` when
    /// the range overlaps an active hold or a confirmed appointment.
    pub fn hold_slot(
        &self,
        tenant: &TenantId,
        session: &SessionId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Hold> {
        if start >= end {
            return Err(StoreError::Invalid(format!(
                "hold range is empty: {start} >= {end}"
            )));
        }

        let now = self.clock.now_utc();
        let expires = now + Duration::minutes(self.ttl_minutes);
        let id = Uuid::new_v4().to_string();
        let created = now.to_rfc3339();

        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let hold_overlaps: i64 = tx.query_row(
            "SELECT COUNT(*) FROM holds
             WHERE tenant_id = ?1 AND expires_ms > ?2
               AND start_ms < ?3 AND end_ms > ?4",
            rusqlite::params![tenant.as_str(), ms(now), ms(end), ms(start)],
            |row| row.get(0),
        )?;
        if hold_overlaps > 0 {
            return Err(StoreError::SlotConflict(format!(
                "an active hold already covers {start}"
            )));
        }

        let appt_overlaps: i64 = tx.query_row(
            "SELECT COUNT(*) FROM appointments
             WHERE tenant_id = ?1 AND status = 'confirmed'
               AND start_ms < ?2 AND end_ms > ?3",
            rusqlite::params![tenant.as_str(), ms(end), ms(start)],
            |row| row.get(0),
        )?;
        if appt_overlaps > 0 {
            return Err(StoreError::SlotConflict(format!(
                "a confirmed appointment already covers {start}"
            )));
        }

        tx.execute(
            "INSERT INTO holds (id, tenant_id, session_id, start_ms, end_ms, expires_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                id,
                tenant.as_str(),
                session.as_str(),
                ms(start),
                ms(end),
                ms(expires),
                created
            ],
        )?;
        tx.commit()?;

        info!(hold_id = %id, tenant = %tenant, session = %session, "slot held");

        Ok(Hold {
            id,
            tenant_id: tenant.clone(),
            session_id: session.clone(),
            start_utc: start,
            end_utc: end,
            expires_at: expires,
            created_at: created,
        })
    }

    pub fn get(&self, hold_id: &str) -> Result<Option<Hold>> {
        let conn = self.db.lock().unwrap();
        match conn.query_row(
            "SELECT id, tenant_id, session_id, start_ms, end_ms, expires_ms, created_at
             FROM holds WHERE id = ?1",
            [hold_id],
            row_to_hold,
        ) {
            Ok(h) => Ok(Some(h)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Drop a hold the session no longer wants.
    pub fn release(&self, tenant: &TenantId, hold_id: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM holds WHERE id = ?1 AND tenant_id = ?2",
            rusqlite::params![hold_id, tenant.as_str()],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "hold",
                id: hold_id.to_string(),
            });
        }
        debug!(hold_id, "hold released");
        Ok(())
    }

    /// Active (unexpired) holds intersecting `[from, to)`.
    pub fn active_in_range(
        &self,
        tenant: &TenantId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Hold>> {
        let now = self.clock.now_utc();
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, session_id, start_ms, end_ms, expires_ms, created_at
             FROM holds
             WHERE tenant_id = ?1 AND expires_ms > ?2
               AND start_ms < ?3 AND end_ms > ?4
             ORDER BY start_ms",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![tenant.as_str(), ms(now), ms(to), ms(from)],
            row_to_hold,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Delete expired holds, returning them so the caller can emit
    /// `HoldExpired` events.
    pub fn sweep_expired(&self) -> Result<Vec<Hold>> {
        let now = self.clock.now_utc();
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let expired: Vec<Hold> = {
            let mut stmt = tx.prepare(
                "SELECT id, tenant_id, session_id, start_ms, end_ms, expires_ms, created_at
                 FROM holds WHERE expires_ms <= ?1",
            )?;
            let rows: Vec<Hold> = stmt
                .query_map([ms(now)], row_to_hold)?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        tx.execute("DELETE FROM holds WHERE expires_ms <= ?1", [ms(now)])?;
        tx.commit()?;

        if !expired.is_empty() {
            info!(count = expired.len(), "expired holds swept");
        }
        Ok(expired)
    }
}

fn row_to_hold(row: &rusqlite::Row<'_>) -> rusqlite::Result<Hold> {
    Ok(Hold {
        id: row.get(0)?,
        tenant_id: TenantId(row.get(1)?),
        session_id: SessionId(row.get(2)?),
        start_utc: from_ms(row.get(3)?),
        end_utc: from_ms(row.get(4)?),
        expires_at: from_ms(row.get(5)?),
        created_at: row.get(6)?,
    })
}
