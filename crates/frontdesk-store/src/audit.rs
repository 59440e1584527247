use tracing::warn;

use frontdesk_core::types::TenantId;
use frontdesk_core::Clock;

use crate::db::Db;
use crate::error::Result;

/// A row read back from the audit log.
#[derive(Debug, Clone)]
pub struct AuditRow {
    pub id: i64,
    pub tenant_id: TenantId,
    pub event_type: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor: String,
    pub payload: serde_json::Value,
    pub created_at: String,
}

/// Append-only audit trail keyed by dotted event types
/// (`booking.created`, `sms.outbound_sent`, …).
///
/// Payloads must arrive pre-masked (see `frontdesk_core::mask`); the
/// store never inspects them.
pub struct AuditStore {
    db: Db,
    clock: Clock,
}

impl AuditStore {
    pub fn new(db: Db, clock: Clock) -> Self {
        Self { db, clock }
    }

    pub fn append(
        &self,
        tenant: &TenantId,
        event_type: &str,
        entity_type: Option<&str>,
        entity_id: Option<&str>,
        actor: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let now = self.clock.now_utc().to_rfc3339();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO audit_log
             (tenant_id, event_type, entity_type, entity_id, actor, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                tenant.as_str(),
                event_type,
                entity_type,
                entity_id,
                actor,
                payload.to_string(),
                now
            ],
        )?;
        Ok(())
    }

    /// Best-effort variant for paths where audit must never fail the
    /// operation (spec: recovered locally).
    pub fn append_best_effort(
        &self,
        tenant: &TenantId,
        event_type: &str,
        entity_type: Option<&str>,
        entity_id: Option<&str>,
        actor: &str,
        payload: serde_json::Value,
    ) {
        if let Err(e) = self.append(tenant, event_type, entity_type, entity_id, actor, payload) {
            warn!(event_type, error = %e, "audit write failed");
        }
    }

    /// Entries for a tenant filtered by event-type prefix, oldest first.
    pub fn entries_with_prefix(&self, tenant: &TenantId, prefix: &str) -> Result<Vec<AuditRow>> {
        let conn = self.db.lock().unwrap();
        let pattern = format!("{prefix}%");
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, event_type, entity_type, entity_id, actor, payload, created_at
             FROM audit_log
             WHERE tenant_id = ?1 AND event_type LIKE ?2
             ORDER BY id",
        )?;
        let rows = stmt.query_map(rusqlite::params![tenant.as_str(), pattern], |row| {
            let payload_str: String = row.get(6)?;
            Ok(AuditRow {
                id: row.get(0)?,
                tenant_id: TenantId(row.get(1)?),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                actor: row.get(5)?,
                payload: serde_json::from_str(&payload_str).unwrap_or_default(),
                created_at: row.get(7)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_db;
    use chrono::{TimeZone, Utc};

    #[test]
    fn append_and_filter_by_prefix() {
        let now = Utc.with_ymd_and_hms(2026, 2, 11, 15, 0, 0).unwrap();
        let store = AuditStore::new(open_memory_db().unwrap(), Clock::fixed(now));
        let tenant = TenantId::from("t1");

        store
            .append(
                &tenant,
                "booking.created",
                Some("appointment"),
                Some("a1"),
                "system",
                serde_json::json!({"reference": "APT-ABC234"}),
            )
            .unwrap();
        store
            .append(
                &tenant,
                "sms.outbound_sent",
                Some("outbox"),
                Some("m1"),
                "worker",
                serde_json::json!({"sid_last4": "cdef", "simulated": true}),
            )
            .unwrap();

        let sms = store.entries_with_prefix(&tenant, "sms.").unwrap();
        assert_eq!(sms.len(), 1);
        assert_eq!(sms[0].event_type, "sms.outbound_sent");
        assert_eq!(sms[0].payload["sid_last4"], "cdef");

        let all = store.entries_with_prefix(&tenant, "").unwrap();
        assert_eq!(all.len(), 2);
    }
}
