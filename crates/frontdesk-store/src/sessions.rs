use tracing::debug;

use frontdesk_core::types::{Channel, CustomerId, SessionId, TenantId};
use frontdesk_core::Clock;

use crate::db::Db;
use crate::error::{Result, StoreError};
use crate::models::{SessionRecord, StoredMessage};

/// Per-conversation state. Sessions are created on first contact per
/// (tenant, channel, external id) and never destroyed.
pub struct SessionStore {
    db: Db,
    clock: Clock,
}

impl SessionStore {
    pub fn new(db: Db, clock: Clock) -> Self {
        Self { db, clock }
    }

    /// Return an existing session or create a new one (upsert pattern).
    pub fn get_or_create(
        &self,
        tenant: &TenantId,
        channel: Channel,
        external_id: &str,
    ) -> Result<SessionRecord> {
        let now = self.clock.now_utc().to_rfc3339();
        let id = SessionId::new();

        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO sessions
             (id, tenant_id, channel, external_id, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, '{}', ?5, ?5)",
            rusqlite::params![
                id.as_str(),
                tenant.as_str(),
                channel.to_string(),
                external_id,
                now
            ],
        )?;

        // Read back — handles the race where two turns arrive simultaneously.
        let session = conn.query_row(
            "SELECT id, tenant_id, channel, external_id, customer_id, email_verified,
                    verified_email, metadata, message_count, booking_count,
                    created_at, updated_at
             FROM sessions
             WHERE tenant_id = ?1 AND channel = ?2 AND external_id = ?3",
            rusqlite::params![tenant.as_str(), channel.to_string(), external_id],
            row_to_session,
        )?;
        Ok(session)
    }

    pub fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        let conn = self.db.lock().unwrap();
        match conn.query_row(
            "SELECT id, tenant_id, channel, external_id, customer_id, email_verified,
                    verified_email, metadata, message_count, booking_count,
                    created_at, updated_at
             FROM sessions WHERE id = ?1",
            [id.as_str()],
            row_to_session,
        ) {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Append one turn to the history and bump the message counter.
    pub fn append_message(&self, id: &SessionId, role: &str, content: &str) -> Result<()> {
        let now = self.clock.now_utc().to_rfc3339();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO session_messages (session_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id.as_str(), role, content, now],
        )?;
        let n = conn.execute(
            "UPDATE sessions
             SET message_count = message_count + 1, updated_at = ?1
             WHERE id = ?2",
            rusqlite::params![now, id.as_str()],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "session",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Ordered message history, oldest first.
    pub fn history(&self, id: &SessionId, limit: usize) -> Result<Vec<StoredMessage>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT role, content, created_at FROM session_messages
             WHERE session_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let mut rows: Vec<StoredMessage> = stmt
            .query_map(rusqlite::params![id.as_str(), limit as i64], |row| {
                Ok(StoredMessage {
                    role: row.get(0)?,
                    content: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        rows.reverse();
        Ok(rows)
    }

    /// Replace the opaque metadata bag (FSM context lives here).
    pub fn set_metadata(&self, id: &SessionId, metadata: &serde_json::Value) -> Result<()> {
        let now = self.clock.now_utc().to_rfc3339();
        let conn = self.db.lock().unwrap();
        let n = conn.execute(
            "UPDATE sessions SET metadata = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![serde_json::to_string(metadata)?, now, id.as_str()],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "session",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Mark the session's email as verified via a completed OTP round-trip.
    pub fn mark_email_verified(&self, id: &SessionId, email: &str) -> Result<()> {
        let now = self.clock.now_utc().to_rfc3339();
        let conn = self.db.lock().unwrap();
        let n = conn.execute(
            "UPDATE sessions
             SET email_verified = 1, verified_email = ?1, updated_at = ?2
             WHERE id = ?3",
            rusqlite::params![email.trim().to_lowercase(), now, id.as_str()],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "session",
                id: id.to_string(),
            });
        }
        debug!(session = %id, "session email verified");
        Ok(())
    }

    pub fn link_customer(&self, id: &SessionId, customer: &CustomerId) -> Result<()> {
        let now = self.clock.now_utc().to_rfc3339();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "UPDATE sessions SET customer_id = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![customer.as_str(), now, id.as_str()],
        )?;
        Ok(())
    }

    pub fn increment_booking_count(&self, id: &SessionId) -> Result<()> {
        let now = self.clock.now_utc().to_rfc3339();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "UPDATE sessions
             SET booking_count = booking_count + 1, updated_at = ?1
             WHERE id = ?2",
            rusqlite::params![now, id.as_str()],
        )?;
        Ok(())
    }

    /// Detach every session pointing at a customer (soft-delete support).
    pub fn unlink_customer(&self, customer: &CustomerId) -> Result<usize> {
        let conn = self.db.lock().unwrap();
        let n = conn.execute(
            "UPDATE sessions SET customer_id = NULL WHERE customer_id = ?1",
            [customer.as_str()],
        )?;
        Ok(n)
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    let channel_str: String = row.get(2)?;
    let metadata_str: String = row.get(7)?;
    Ok(SessionRecord {
        id: SessionId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        channel: channel_str.parse().unwrap_or(Channel::Web),
        external_id: row.get(3)?,
        customer_id: row.get::<_, Option<String>>(4)?.map(CustomerId),
        email_verified: row.get::<_, i64>(5)? != 0,
        verified_email: row.get(6)?,
        metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
        message_count: row.get::<_, i64>(8)? as u32,
        booking_count: row.get::<_, i64>(9)? as u32,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}
