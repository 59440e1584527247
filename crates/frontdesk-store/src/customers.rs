use tracing::info;

use frontdesk_core::types::{CustomerId, TenantId};
use frontdesk_core::Clock;

use crate::db::Db;
use crate::error::{Result, StoreError};
use crate::models::Customer;

/// Tenant-scoped customer identities.
///
/// Soft delete clears PII but keeps the row so booking history stays
/// attributable to an id.
pub struct CustomerStore {
    db: Db,
    clock: Clock,
}

impl CustomerStore {
    pub fn new(db: Db, clock: Clock) -> Self {
        Self { db, clock }
    }

    /// Find by normalized phone or lowercased email; create when absent.
    pub fn get_or_create(
        &self,
        tenant: &TenantId,
        phone: Option<&str>,
        email: Option<&str>,
        display_name: Option<&str>,
    ) -> Result<Customer> {
        if phone.is_none() && email.is_none() {
            return Err(StoreError::Invalid(
                "customer needs a phone or an email".into(),
            ));
        }
        let email_lc = email.map(|e| e.trim().to_lowercase());

        if let Some(existing) = self.find(tenant, phone, email_lc.as_deref())? {
            self.touch(&existing.id)?;
            return Ok(existing);
        }

        let id = CustomerId::new();
        let now = self.clock.now_utc().to_rfc3339();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO customers
             (id, tenant_id, phone, email, display_name, preferences,
              booking_count, last_seen_at, deleted, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, '{}', 0, ?6, 0, ?6)",
            rusqlite::params![
                id.as_str(),
                tenant.as_str(),
                phone,
                email_lc,
                display_name,
                now
            ],
        )?;

        Ok(Customer {
            id,
            tenant_id: tenant.clone(),
            phone: phone.map(str::to_string),
            email: email_lc,
            display_name: display_name.map(str::to_string),
            preferences: serde_json::json!({}),
            booking_count: 0,
            last_seen_at: Some(now.clone()),
            deleted: false,
            created_at: now,
        })
    }

    pub fn find(
        &self,
        tenant: &TenantId,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<Customer>> {
        let conn = self.db.lock().unwrap();
        let lookup = |sql: &str, key: &str| -> Result<Option<Customer>> {
            match conn.query_row(sql, rusqlite::params![tenant.as_str(), key], row_to_customer) {
                Ok(c) => Ok(Some(c)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(StoreError::Database(e)),
            }
        };

        if let Some(p) = phone {
            let hit = lookup(
                "SELECT id, tenant_id, phone, email, display_name, preferences,
                        booking_count, last_seen_at, deleted, created_at
                 FROM customers
                 WHERE tenant_id = ?1 AND phone = ?2 AND deleted = 0",
                p,
            )?;
            if hit.is_some() {
                return Ok(hit);
            }
        }
        if let Some(e) = email {
            return lookup(
                "SELECT id, tenant_id, phone, email, display_name, preferences,
                        booking_count, last_seen_at, deleted, created_at
                 FROM customers
                 WHERE tenant_id = ?1 AND email = ?2 AND deleted = 0",
                e,
            );
        }
        Ok(None)
    }

    pub fn get(&self, id: &CustomerId) -> Result<Option<Customer>> {
        let conn = self.db.lock().unwrap();
        match conn.query_row(
            "SELECT id, tenant_id, phone, email, display_name, preferences,
                    booking_count, last_seen_at, deleted, created_at
             FROM customers WHERE id = ?1",
            [id.as_str()],
            row_to_customer,
        ) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    pub fn increment_booking_count(&self, id: &CustomerId) -> Result<()> {
        let now = self.clock.now_utc().to_rfc3339();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "UPDATE customers
             SET booking_count = booking_count + 1, last_seen_at = ?1
             WHERE id = ?2",
            rusqlite::params![now, id.as_str()],
        )?;
        Ok(())
    }

    fn touch(&self, id: &CustomerId) -> Result<()> {
        let now = self.clock.now_utc().to_rfc3339();
        let conn = self.db.lock().unwrap();
        conn.execute(
            "UPDATE customers SET last_seen_at = ?1 WHERE id = ?2",
            rusqlite::params![now, id.as_str()],
        )?;
        Ok(())
    }

    /// Clear PII and mark deleted. The caller is responsible for unlinking
    /// sessions via `SessionStore::unlink_customer`.
    pub fn soft_delete(&self, tenant: &TenantId, id: &CustomerId) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let n = conn.execute(
            "UPDATE customers
             SET phone = NULL, email = NULL, display_name = NULL, deleted = 1
             WHERE id = ?1 AND tenant_id = ?2",
            rusqlite::params![id.as_str(), tenant.as_str()],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "customer",
                id: id.to_string(),
            });
        }
        info!(customer = %id, "customer soft-deleted, PII cleared");
        Ok(())
    }
}

fn row_to_customer(row: &rusqlite::Row<'_>) -> rusqlite::Result<Customer> {
    let prefs: String = row.get(5)?;
    Ok(Customer {
        id: CustomerId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        phone: row.get(2)?,
        email: row.get(3)?,
        display_name: row.get(4)?,
        preferences: serde_json::from_str(&prefs).unwrap_or_default(),
        booking_count: row.get::<_, i64>(6)? as u32,
        last_seen_at: row.get(7)?,
        deleted: row.get::<_, i64>(8)? != 0,
        created_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_db;
    use chrono::TimeZone;

    fn store() -> CustomerStore {
        let now = chrono::Utc.with_ymd_and_hms(2026, 2, 11, 15, 0, 0).unwrap();
        CustomerStore::new(open_memory_db().unwrap(), Clock::fixed(now))
    }

    #[test]
    fn dedupes_by_email_case_insensitively() {
        let s = store();
        let tenant = TenantId::from("t1");
        let a = s
            .get_or_create(&tenant, None, Some("Dana@Example.com"), Some("Dana"))
            .unwrap();
        let b = s
            .get_or_create(&tenant, None, Some("dana@example.com"), None)
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.email.as_deref(), Some("dana@example.com"));
    }

    #[test]
    fn soft_delete_clears_pii_keeps_row() {
        let s = store();
        let tenant = TenantId::from("t1");
        let c = s
            .get_or_create(&tenant, Some("+15551234567"), Some("d@e.com"), Some("Dana"))
            .unwrap();
        s.increment_booking_count(&c.id).unwrap();
        s.soft_delete(&tenant, &c.id).unwrap();

        let after = s.get(&c.id).unwrap().unwrap();
        assert!(after.deleted);
        assert!(after.phone.is_none());
        assert!(after.email.is_none());
        assert!(after.display_name.is_none());
        // Booking history preserved.
        assert_eq!(after.booking_count, 1);

        // A deleted customer is not found by contact details.
        assert!(s
            .find(&tenant, Some("+15551234567"), Some("d@e.com"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn needs_at_least_one_contact_field() {
        let s = store();
        assert!(s
            .get_or_create(&TenantId::from("t1"), None, None, Some("Ghost"))
            .is_err());
    }
}
