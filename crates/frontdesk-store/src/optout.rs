use chrono::Duration;

use frontdesk_core::types::TenantId;
use frontdesk_core::Clock;

use crate::db::Db;
use crate::error::Result;
use crate::models::ms;

/// STOP-list consulted before every outbound send.
pub struct OptOutStore {
    db: Db,
    clock: Clock,
}

impl OptOutStore {
    pub fn new(db: Db, clock: Clock) -> Self {
        Self { db, clock }
    }

    pub fn opt_out(&self, tenant: &TenantId, phone: &str) -> Result<()> {
        let now = self.clock.now_utc().to_rfc3339();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO optouts (tenant_id, phone, created_at)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![tenant.as_str(), phone, now],
        )?;
        Ok(())
    }

    pub fn is_opted_out(&self, tenant: &TenantId, phone: &str) -> Result<bool> {
        let conn = self.db.lock().unwrap();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM optouts WHERE tenant_id = ?1 AND phone = ?2",
            rusqlite::params![tenant.as_str(), phone],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }
}

/// DB-backed per-phone send rate limit over a rolling window.
pub struct SmsRateStore {
    db: Db,
    clock: Clock,
}

impl SmsRateStore {
    pub fn new(db: Db, clock: Clock) -> Self {
        Self { db, clock }
    }

    /// Sends recorded for `phone` in the last `window_minutes`.
    pub fn recent_sends(&self, phone: &str, window_minutes: i64) -> Result<u32> {
        let cutoff = self.clock.now_utc() - Duration::minutes(window_minutes);
        let conn = self.db.lock().unwrap();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sms_send_log WHERE phone = ?1 AND sent_ms > ?2",
            rusqlite::params![phone, ms(cutoff)],
            |row| row.get(0),
        )?;
        Ok(n as u32)
    }

    pub fn record_send(&self, phone: &str) -> Result<()> {
        let now = self.clock.now_utc();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO sms_send_log (phone, sent_ms) VALUES (?1, ?2)",
            rusqlite::params![phone, ms(now)],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_db;
    use chrono::{TimeZone, Utc};

    #[test]
    fn optout_is_idempotent_and_tenant_scoped() {
        let now = Utc.with_ymd_and_hms(2026, 2, 11, 15, 0, 0).unwrap();
        let store = OptOutStore::new(open_memory_db().unwrap(), Clock::fixed(now));
        let t1 = TenantId::from("t1");
        let t2 = TenantId::from("t2");

        store.opt_out(&t1, "+15551234567").unwrap();
        store.opt_out(&t1, "+15551234567").unwrap();
        assert!(store.is_opted_out(&t1, "+15551234567").unwrap());
        assert!(!store.is_opted_out(&t2, "+15551234567").unwrap());
    }

    #[test]
    fn rate_window_only_counts_recent() {
        let db = open_memory_db().unwrap();
        let t0 = Utc.with_ymd_and_hms(2026, 2, 11, 15, 0, 0).unwrap();

        let early = SmsRateStore::new(db.clone(), Clock::fixed(t0));
        early.record_send("+15551234567").unwrap();
        early.record_send("+15551234567").unwrap();

        let later = SmsRateStore::new(db, Clock::fixed(t0 + Duration::minutes(90)));
        later.record_send("+15551234567").unwrap();

        assert_eq!(later.recent_sends("+15551234567", 60).unwrap(), 1);
        assert_eq!(later.recent_sends("+15551234567", 600).unwrap(), 3);
        assert_eq!(later.recent_sends("+15559999999", 60).unwrap(), 0);
    }
}
