//! Tenant-scoped TTL cache of busy windows.
//!
//! Keys are minute-rounded so repeated availability checks for the same
//! visible window hit the same entry. Entries are invalidated wholesale
//! per tenant on any booking mutation; expired entries read as misses.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use frontdesk_core::types::TenantId;

use crate::provider::BusyRange;

#[derive(Clone)]
struct CacheEntry {
    ranges: Vec<BusyRange>,
    stored_at: DateTime<Utc>,
}

pub struct BusyRangeCache {
    entries: DashMap<(String, i64, i64), CacheEntry>,
    ttl: Duration,
}

impl BusyRangeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn key(tenant: &TenantId, from: DateTime<Utc>, to: DateTime<Utc>) -> (String, i64, i64) {
        (
            tenant.as_str().to_string(),
            from.timestamp() / 60,
            to.timestamp() / 60,
        )
    }

    pub fn get(
        &self,
        tenant: &TenantId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<Vec<BusyRange>> {
        let key = Self::key(tenant, from, to);
        let entry = self.entries.get(&key)?;
        let age = (now - entry.stored_at).to_std().unwrap_or_default();
        if age >= self.ttl {
            drop(entry);
            self.entries.remove(&key);
            return None;
        }
        Some(entry.ranges.clone())
    }

    /// Atomic replace per key (set on provider success only).
    pub fn put(
        &self,
        tenant: &TenantId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        ranges: Vec<BusyRange>,
        now: DateTime<Utc>,
    ) {
        self.entries.insert(
            Self::key(tenant, from, to),
            CacheEntry {
                ranges,
                stored_at: now,
            },
        );
    }

    /// Drop every window for a tenant (booking confirmed/cancelled).
    pub fn invalidate_tenant(&self, tenant: &TenantId) {
        self.entries.retain(|(t, _, _), _| t != tenant.as_str());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 11, 15, min, 0).unwrap()
    }

    fn ranges() -> Vec<BusyRange> {
        vec![BusyRange {
            start: t(0),
            end: t(30),
        }]
    }

    #[test]
    fn hit_within_ttl_miss_after() {
        let cache = BusyRangeCache::new(Duration::from_secs(30));
        let tenant = TenantId::from("t1");
        cache.put(&tenant, t(0), t(59), ranges(), t(0));

        assert!(cache.get(&tenant, t(0), t(59), t(0) + chrono::Duration::seconds(29)).is_some());
        assert!(cache.get(&tenant, t(0), t(59), t(0) + chrono::Duration::seconds(30)).is_none());
    }

    #[test]
    fn sub_minute_timestamps_share_a_key() {
        let cache = BusyRangeCache::new(Duration::from_secs(30));
        let tenant = TenantId::from("t1");
        cache.put(&tenant, t(0), t(59), ranges(), t(0));

        // Same minute, different seconds.
        let from = Utc.with_ymd_and_hms(2026, 2, 11, 15, 0, 45).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 2, 11, 15, 59, 59).unwrap();
        assert!(cache.get(&tenant, from, to, t(1)).is_some());
    }

    #[test]
    fn tenant_invalidation_is_scoped() {
        let cache = BusyRangeCache::new(Duration::from_secs(30));
        let t1 = TenantId::from("t1");
        let t2 = TenantId::from("t2");
        cache.put(&t1, t(0), t(59), ranges(), t(0));
        cache.put(&t2, t(0), t(59), ranges(), t(0));

        cache.invalidate_tenant(&t1);
        assert!(cache.get(&t1, t(0), t(59), t(1)).is_none());
        assert!(cache.get(&t2, t(0), t(59), t(1)).is_some());
    }
}
