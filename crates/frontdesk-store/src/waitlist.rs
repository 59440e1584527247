use uuid::Uuid;

use frontdesk_core::types::{SessionId, TenantId};
use frontdesk_core::Clock;

use crate::db::Db;
use crate::error::{Result, StoreError};
use crate::models::{WaitlistEntry, WaitlistStatus};

/// Customers waiting for a slot to open.
pub struct WaitlistStore {
    db: Db,
    clock: Clock,
}

impl WaitlistStore {
    pub fn new(db: Db, clock: Clock) -> Self {
        Self { db, clock }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &self,
        tenant: &TenantId,
        session: &SessionId,
        contact: &str,
        service: Option<&str>,
        preferred_days: Option<&str>,
        window_start: Option<&str>,
        window_end: Option<&str>,
    ) -> Result<WaitlistEntry> {
        let id = Uuid::new_v4().to_string();
        let now = self.clock.now_utc().to_rfc3339();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO waitlist
             (id, tenant_id, session_id, contact, service, preferred_days,
              window_start, window_end, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'waiting', ?9)",
            rusqlite::params![
                id,
                tenant.as_str(),
                session.as_str(),
                contact,
                service,
                preferred_days,
                window_start,
                window_end,
                now
            ],
        )?;
        Ok(WaitlistEntry {
            id,
            tenant_id: tenant.clone(),
            session_id: session.clone(),
            contact: contact.to_string(),
            service: service.map(str::to_string),
            preferred_days: preferred_days.map(str::to_string),
            window_start: window_start.map(str::to_string),
            window_end: window_end.map(str::to_string),
            status: WaitlistStatus::Waiting,
            created_at: now,
        })
    }

    /// Oldest-first waiting entries for a tenant.
    pub fn waiting(&self, tenant: &TenantId) -> Result<Vec<WaitlistEntry>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, session_id, contact, service, preferred_days,
                    window_start, window_end, status, created_at
             FROM waitlist
             WHERE tenant_id = ?1 AND status = 'waiting'
             ORDER BY created_at",
        )?;
        let rows = stmt.query_map([tenant.as_str()], row_to_entry)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn set_status(&self, id: &str, status: WaitlistStatus) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let n = conn.execute(
            "UPDATE waitlist SET status = ?1 WHERE id = ?2",
            rusqlite::params![status.to_string(), id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "waitlist entry",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<WaitlistEntry> {
    let status_str: String = row.get(8)?;
    Ok(WaitlistEntry {
        id: row.get(0)?,
        tenant_id: TenantId(row.get(1)?),
        session_id: SessionId(row.get(2)?),
        contact: row.get(3)?,
        service: row.get(4)?,
        preferred_days: row.get(5)?,
        window_start: row.get(6)?,
        window_end: row.get(7)?,
        status: status_str.parse().unwrap_or(WaitlistStatus::Expired),
        created_at: row.get(9)?,
    })
}
