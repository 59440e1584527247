use chrono::{DateTime, Utc};
use uuid::Uuid;

use frontdesk_core::types::{SessionId, TenantId};
use frontdesk_core::Clock;

use crate::db::Db;
use crate::error::Result;
use crate::models::{from_ms, ms, FollowupRecord};

/// Tracking for scheduled contact follow-ups: per-session caps and
/// cross-session cooldowns read from here.
pub struct FollowupStore {
    db: Db,
    clock: Clock,
}

impl FollowupStore {
    pub fn new(db: Db, clock: Clock) -> Self {
        Self { db, clock }
    }

    pub fn record(
        &self,
        tenant: &TenantId,
        session: &SessionId,
        contact: &str,
        channel: &str,
        reason: &str,
        job_id: Option<&str>,
    ) -> Result<FollowupRecord> {
        let id = Uuid::new_v4().to_string();
        let now = self.clock.now_utc();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO followups
             (id, tenant_id, session_id, contact, channel, reason, job_id, created_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                id,
                tenant.as_str(),
                session.as_str(),
                contact,
                channel,
                reason,
                job_id,
                ms(now)
            ],
        )?;
        Ok(FollowupRecord {
            id,
            tenant_id: tenant.clone(),
            session_id: session.clone(),
            contact: contact.to_string(),
            channel: channel.to_string(),
            reason: reason.to_string(),
            job_id: job_id.map(str::to_string),
            created_at: now,
        })
    }

    /// How many follow-ups this session has already scheduled.
    pub fn count_for_session(&self, session: &SessionId) -> Result<u32> {
        let conn = self.db.lock().unwrap();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM followups WHERE session_id = ?1",
            [session.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as u32)
    }

    /// Most recent follow-up for a contact across all sessions, for the
    /// cooldown gate.
    pub fn last_for_contact(
        &self,
        tenant: &TenantId,
        contact: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let conn = self.db.lock().unwrap();
        match conn.query_row(
            "SELECT created_ms FROM followups
             WHERE tenant_id = ?1 AND contact = ?2
             ORDER BY created_ms DESC LIMIT 1",
            rusqlite::params![tenant.as_str(), contact],
            |row| row.get::<_, i64>(0),
        ) {
            Ok(millis) => Ok(Some(from_ms(millis))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
