use frontdesk_core::types::{Tenant, TenantId};
use frontdesk_core::Clock;

use crate::db::Db;
use crate::error::{Result, StoreError};

/// Tenant profiles. The profile column is the serialized [`Tenant`];
/// slug and id are broken out for lookups.
pub struct TenantStore {
    db: Db,
    clock: Clock,
}

impl TenantStore {
    pub fn new(db: Db, clock: Clock) -> Self {
        Self { db, clock }
    }

    pub fn upsert(&self, tenant: &Tenant) -> Result<()> {
        tenant.validate().map_err(|e| StoreError::Invalid(e.to_string()))?;
        let now = self.clock.now_utc().to_rfc3339();
        let profile = serde_json::to_string(tenant)?;
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT INTO tenants (id, slug, name, profile, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
               slug = excluded.slug, name = excluded.name,
               profile = excluded.profile, updated_at = excluded.updated_at",
            rusqlite::params![tenant.id.as_str(), tenant.slug, tenant.name, profile, now],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &TenantId) -> Result<Option<Tenant>> {
        self.fetch("SELECT profile FROM tenants WHERE id = ?1", id.as_str())
    }

    pub fn get_by_slug(&self, slug: &str) -> Result<Option<Tenant>> {
        self.fetch("SELECT profile FROM tenants WHERE slug = ?1", slug)
    }

    fn fetch(&self, sql: &str, key: &str) -> Result<Option<Tenant>> {
        let conn = self.db.lock().unwrap();
        match conn.query_row(sql, [key], |row| row.get::<_, String>(0)) {
            Ok(profile) => Ok(Some(serde_json::from_str(&profile)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }
}
