use chrono::{DateTime, Utc};
use rand::Rng;
use rusqlite::{Transaction, TransactionBehavior};
use tracing::{info, warn};
use uuid::Uuid;

use frontdesk_core::types::TenantId;
use frontdesk_core::Clock;

use crate::db::Db;
use crate::error::{Result, StoreError};
use crate::models::{from_ms, ms, Appointment, AppointmentStatus};

/// Alphabet for reference codes: base32-like, no 0/O/1/I/L, safe to read
/// aloud over the phone.
const REF_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTVWXYZ23456789";
const REF_LEN: usize = 6;

/// Generate one `APT-XXXXXX` candidate. Uniqueness is enforced by the
/// per-tenant UNIQUE constraint; callers retry on collision.
pub fn generate_reference_code() -> String {
    let mut rng = rand::thread_rng();
    let tail: String = (0..REF_LEN)
        .map(|_| REF_ALPHABET[rng.gen_range(0..REF_ALPHABET.len())] as char)
        .collect();
    format!("APT-{tail}")
}

/// Everything `confirm_from_hold` needs besides the hold itself.
#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    pub tenant_id: TenantId,
    pub hold_id: String,
    pub client_name: String,
    pub client_email: String,
    /// Already normalized to E.164 by the caller.
    pub client_phone: String,
    pub service: Option<String>,
    pub timezone: String,
}

/// Confirmed appointments and their lifecycle.
pub struct AppointmentStore {
    db: Db,
    clock: Clock,
}

impl AppointmentStore {
    pub fn new(db: Db, clock: Clock) -> Self {
        Self { db, clock }
    }

    /// Transactionally convert a hold into a confirmed appointment.
    ///
    /// Verifies the hold exists, belongs to the tenant, and is unexpired;
    /// re-checks the exclusion invariant (a racing confirm may have landed
    /// between the hold's creation and now); inserts the appointment and
    /// deletes the hold in the same transaction.
    pub fn confirm_from_hold(&self, req: &ConfirmRequest) -> Result<Appointment> {
        if req.client_email.trim().is_empty() {
            return Err(StoreError::Invalid("client_email is required".into()));
        }
        if !req.client_phone.starts_with('+') {
            return Err(StoreError::Invalid(
                "client_phone must be E.164".into(),
            ));
        }

        let now = self.clock.now_utc();
        let now_str = now.to_rfc3339();

        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (start_ms_v, end_ms_v): (i64, i64) = match tx.query_row(
            "SELECT start_ms, end_ms, expires_ms FROM holds
             WHERE id = ?1 AND tenant_id = ?2",
            rusqlite::params![req.hold_id, req.tenant_id.as_str()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        ) {
            Ok((s, e, exp)) => {
                if exp <= ms(now) {
                    return Err(StoreError::HoldExpired(req.hold_id.clone()));
                }
                (s, e)
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(StoreError::NotFound {
                    entity: "hold",
                    id: req.hold_id.clone(),
                })
            }
            Err(e) => return Err(StoreError::Database(e)),
        };

        let overlaps: i64 = tx.query_row(
            "SELECT COUNT(*) FROM appointments
             WHERE tenant_id = ?1 AND status = 'confirmed'
               AND start_ms < ?2 AND end_ms > ?3",
            rusqlite::params![req.tenant_id.as_str(), end_ms_v, start_ms_v],
            |row| row.get(0),
        )?;
        if overlaps > 0 {
            return Err(StoreError::SlotConflict(format!(
                "slot at {} was confirmed by another session",
                from_ms(start_ms_v)
            )));
        }

        let id = Uuid::now_v7().to_string();
        let reference = insert_with_fresh_reference(&tx, req, &id, start_ms_v, end_ms_v, &now_str)?;

        tx.execute(
            "DELETE FROM holds WHERE id = ?1",
            rusqlite::params![req.hold_id],
        )?;
        tx.commit()?;

        info!(
            tenant = %req.tenant_id,
            reference = %reference,
            "appointment confirmed"
        );

        Ok(Appointment {
            id,
            tenant_id: req.tenant_id.clone(),
            reference_code: reference,
            client_name: req.client_name.clone(),
            client_email: req.client_email.clone(),
            client_phone: req.client_phone.clone(),
            service: req.service.clone(),
            start_utc: from_ms(start_ms_v),
            end_utc: from_ms(end_ms_v),
            timezone: req.timezone.clone(),
            status: AppointmentStatus::Confirmed,
            calendar_event_id: None,
            created_at: now_str.clone(),
            updated_at: now_str,
        })
    }

    /// Case-insensitive lookup by reference code or email, confirmed only.
    pub fn lookup(
        &self,
        tenant: &TenantId,
        reference: Option<&str>,
        email: Option<&str>,
    ) -> Result<Vec<Appointment>> {
        let conn = self.db.lock().unwrap();
        let mut out = Vec::new();

        if let Some(code) = reference {
            let mut stmt = conn.prepare(
                "SELECT id, tenant_id, reference_code, client_name, client_email,
                        client_phone, service, start_ms, end_ms, timezone, status,
                        calendar_event_id, created_at, updated_at
                 FROM appointments
                 WHERE tenant_id = ?1 AND reference_code = ?2 COLLATE NOCASE
                   AND status = 'confirmed'",
            )?;
            let rows = stmt.query_map(
                rusqlite::params![tenant.as_str(), code.trim()],
                row_to_appointment,
            )?;
            out.extend(rows.filter_map(|r| r.ok()));
        } else if let Some(addr) = email {
            let mut stmt = conn.prepare(
                "SELECT id, tenant_id, reference_code, client_name, client_email,
                        client_phone, service, start_ms, end_ms, timezone, status,
                        calendar_event_id, created_at, updated_at
                 FROM appointments
                 WHERE tenant_id = ?1 AND client_email = ?2 COLLATE NOCASE
                   AND status = 'confirmed'
                 ORDER BY start_ms",
            )?;
            let rows = stmt.query_map(
                rusqlite::params![tenant.as_str(), addr.trim()],
                row_to_appointment,
            )?;
            out.extend(rows.filter_map(|r| r.ok()));
        }
        Ok(out)
    }

    /// Fetch by reference regardless of status. The cancel decider needs
    /// to distinguish "missing" from "not confirmed" internally even
    /// though both collapse in the user-facing message.
    pub fn get_by_reference(
        &self,
        tenant: &TenantId,
        reference: &str,
    ) -> Result<Option<Appointment>> {
        let conn = self.db.lock().unwrap();
        match conn.query_row(
            "SELECT id, tenant_id, reference_code, client_name, client_email,
                    client_phone, service, start_ms, end_ms, timezone, status,
                    calendar_event_id, created_at, updated_at
             FROM appointments
             WHERE tenant_id = ?1 AND reference_code = ?2 COLLATE NOCASE",
            rusqlite::params![tenant.as_str(), reference.trim()],
            row_to_appointment,
        ) {
            Ok(a) => Ok(Some(a)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    pub fn get(&self, id: &str) -> Result<Option<Appointment>> {
        let conn = self.db.lock().unwrap();
        match conn.query_row(
            "SELECT id, tenant_id, reference_code, client_name, client_email,
                    client_phone, service, start_ms, end_ms, timezone, status,
                    calendar_event_id, created_at, updated_at
             FROM appointments WHERE id = ?1",
            [id],
            row_to_appointment,
        ) {
            Ok(a) => Ok(Some(a)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Confirmed appointments intersecting `[from, to)`.
    pub fn confirmed_in_range(
        &self,
        tenant: &TenantId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, reference_code, client_name, client_email,
                    client_phone, service, start_ms, end_ms, timezone, status,
                    calendar_event_id, created_at, updated_at
             FROM appointments
             WHERE tenant_id = ?1 AND status = 'confirmed'
               AND start_ms < ?2 AND end_ms > ?3
             ORDER BY start_ms",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![tenant.as_str(), ms(to), ms(from)],
            row_to_appointment,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Transition to cancelled. Idempotent failures are surfaced: a second
    /// cancel returns `NotFound` because the row is no longer confirmed.
    pub fn cancel(&self, tenant: &TenantId, id: &str) -> Result<Appointment> {
        self.set_status(tenant, id, AppointmentStatus::Cancelled)
    }

    pub fn set_status(
        &self,
        tenant: &TenantId,
        id: &str,
        status: AppointmentStatus,
    ) -> Result<Appointment> {
        let now_str = self.clock.now_utc().to_rfc3339();
        {
            let conn = self.db.lock().unwrap();
            let n = conn.execute(
                "UPDATE appointments SET status = ?1, updated_at = ?2
                 WHERE id = ?3 AND tenant_id = ?4 AND status = 'confirmed'",
                rusqlite::params![status.to_string(), now_str, id, tenant.as_str()],
            )?;
            if n == 0 {
                return Err(StoreError::NotFound {
                    entity: "appointment",
                    id: id.to_string(),
                });
            }
        }
        self.get(id)?.ok_or(StoreError::NotFound {
            entity: "appointment",
            id: id.to_string(),
        })
    }

    /// Atomic swap: cancel the old appointment and create a new one from
    /// the hold, carrying the client details over. Both happen or neither.
    pub fn reschedule(
        &self,
        tenant: &TenantId,
        appointment_id: &str,
        new_hold_id: &str,
    ) -> Result<Appointment> {
        let now = self.clock.now_utc();
        let now_str = now.to_rfc3339();

        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let old = match tx.query_row(
            "SELECT id, tenant_id, reference_code, client_name, client_email,
                    client_phone, service, start_ms, end_ms, timezone, status,
                    calendar_event_id, created_at, updated_at
             FROM appointments
             WHERE id = ?1 AND tenant_id = ?2 AND status = 'confirmed'",
            rusqlite::params![appointment_id, tenant.as_str()],
            row_to_appointment,
        ) {
            Ok(a) => a,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(StoreError::NotFound {
                    entity: "appointment",
                    id: appointment_id.to_string(),
                })
            }
            Err(e) => return Err(StoreError::Database(e)),
        };

        let (new_start, new_end): (i64, i64) = match tx.query_row(
            "SELECT start_ms, end_ms, expires_ms FROM holds
             WHERE id = ?1 AND tenant_id = ?2",
            rusqlite::params![new_hold_id, tenant.as_str()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        ) {
            Ok((s, e, exp)) => {
                if exp <= ms(now) {
                    return Err(StoreError::HoldExpired(new_hold_id.to_string()));
                }
                (s, e)
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(StoreError::NotFound {
                    entity: "hold",
                    id: new_hold_id.to_string(),
                })
            }
            Err(e) => return Err(StoreError::Database(e)),
        };

        // The old booking is excluded: moving within its own slot is legal.
        let overlaps: i64 = tx.query_row(
            "SELECT COUNT(*) FROM appointments
             WHERE tenant_id = ?1 AND status = 'confirmed' AND id != ?2
               AND start_ms < ?3 AND end_ms > ?4",
            rusqlite::params![tenant.as_str(), appointment_id, new_end, new_start],
            |row| row.get(0),
        )?;
        if overlaps > 0 {
            return Err(StoreError::SlotConflict(format!(
                "new slot at {} is already booked",
                from_ms(new_start)
            )));
        }

        tx.execute(
            "UPDATE appointments SET status = 'cancelled', updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now_str, appointment_id],
        )?;

        let new_id = Uuid::now_v7().to_string();
        let req = ConfirmRequest {
            tenant_id: tenant.clone(),
            hold_id: new_hold_id.to_string(),
            client_name: old.client_name.clone(),
            client_email: old.client_email.clone(),
            client_phone: old.client_phone.clone(),
            service: old.service.clone(),
            timezone: old.timezone.clone(),
        };
        let reference =
            insert_with_fresh_reference(&tx, &req, &new_id, new_start, new_end, &now_str)?;

        tx.execute(
            "DELETE FROM holds WHERE id = ?1",
            rusqlite::params![new_hold_id],
        )?;
        tx.commit()?;

        info!(
            tenant = %tenant,
            old_reference = %old.reference_code,
            new_reference = %reference,
            "appointment rescheduled"
        );

        Ok(Appointment {
            id: new_id,
            tenant_id: tenant.clone(),
            reference_code: reference,
            client_name: old.client_name,
            client_email: old.client_email,
            client_phone: old.client_phone,
            service: old.service,
            start_utc: from_ms(new_start),
            end_utc: from_ms(new_end),
            timezone: old.timezone,
            status: AppointmentStatus::Confirmed,
            calendar_event_id: None,
            created_at: now_str.clone(),
            updated_at: now_str,
        })
    }

    /// Record the external-calendar event id after a best-effort write.
    pub fn set_calendar_event(&self, id: &str, event_id: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute(
            "UPDATE appointments SET calendar_event_id = ?1 WHERE id = ?2",
            rusqlite::params![event_id, id],
        )?;
        Ok(())
    }

    /// Invariant helper: count pairs of overlapping confirmed appointments
    /// for a tenant. Must always be zero.
    pub fn overlapping_confirmed_pairs(&self, tenant: &TenantId) -> Result<i64> {
        let conn = self.db.lock().unwrap();
        let n = conn.query_row(
            "SELECT COUNT(*) FROM appointments a
             JOIN appointments b ON a.tenant_id = b.tenant_id AND a.id < b.id
             WHERE a.tenant_id = ?1
               AND a.status = 'confirmed' AND b.status = 'confirmed'
               AND a.start_ms < b.end_ms AND a.end_ms > b.start_ms",
            [tenant.as_str()],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}

/// Insert an appointment row, retrying reference-code collisions against
/// the per-tenant UNIQUE constraint.
fn insert_with_fresh_reference(
    tx: &Transaction<'_>,
    req: &ConfirmRequest,
    id: &str,
    start_ms_v: i64,
    end_ms_v: i64,
    now_str: &str,
) -> Result<String> {
    for attempt in 0..8 {
        let reference = generate_reference_code();
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO appointments
             (id, tenant_id, reference_code, client_name, client_email, client_phone,
              service, start_ms, end_ms, timezone, status, calendar_event_id,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'confirmed', NULL, ?11, ?11)",
            rusqlite::params![
                id,
                req.tenant_id.as_str(),
                reference,
                req.client_name,
                req.client_email,
                req.client_phone,
                req.service,
                start_ms_v,
                end_ms_v,
                req.timezone,
                now_str
            ],
        )?;
        if inserted == 1 {
            return Ok(reference);
        }
        warn!(attempt, "reference code collision, regenerating");
    }
    Err(StoreError::Invalid(
        "could not generate a unique reference code".into(),
    ))
}

fn row_to_appointment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Appointment> {
    let status_str: String = row.get(10)?;
    Ok(Appointment {
        id: row.get(0)?,
        tenant_id: TenantId(row.get(1)?),
        reference_code: row.get(2)?,
        client_name: row.get(3)?,
        client_email: row.get(4)?,
        client_phone: row.get(5)?,
        service: row.get(6)?,
        start_utc: from_ms(row.get(7)?),
        end_utc: from_ms(row.get(8)?),
        timezone: row.get(9)?,
        status: status_str.parse().unwrap_or(AppointmentStatus::Cancelled),
        calendar_event_id: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_db;
    use crate::holds::HoldStore;
    use chrono::{Duration, TimeZone};
    use frontdesk_core::types::SessionId;

    fn setup() -> (
        AppointmentStore,
        HoldStore,
        TenantId,
        SessionId,
        DateTime<Utc>,
    ) {
        let db = open_memory_db().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 2, 11, 15, 0, 0).unwrap();
        let clock = Clock::fixed(now);
        (
            AppointmentStore::new(db.clone(), clock.clone()),
            HoldStore::new(db, clock, 5),
            TenantId::from("t1"),
            SessionId::from("s1"),
            now,
        )
    }

    fn confirm_req(tenant: &TenantId, hold_id: &str) -> ConfirmRequest {
        ConfirmRequest {
            tenant_id: tenant.clone(),
            hold_id: hold_id.to_string(),
            client_name: "Dana Smith".into(),
            client_email: "dana@example.com".into(),
            client_phone: "+15551234567".into(),
            service: Some("Consultation".into()),
            timezone: "America/New_York".into(),
        }
    }

    #[test]
    fn confirm_consumes_hold_and_generates_reference() {
        let (appts, holds, tenant, session, now) = setup();
        let start = now + Duration::hours(24);
        let hold = holds
            .hold_slot(&tenant, &session, start, start + Duration::minutes(30))
            .unwrap();

        let appt = appts.confirm_from_hold(&confirm_req(&tenant, &hold.id)).unwrap();
        assert!(appt.reference_code.starts_with("APT-"));
        assert_eq!(appt.reference_code.len(), 4 + REF_LEN);
        assert_eq!(appt.status, AppointmentStatus::Confirmed);

        // Hold is gone.
        assert!(holds.get(&hold.id).unwrap().is_none());

        // Second confirm on the same hold fails.
        assert!(matches!(
            appts.confirm_from_hold(&confirm_req(&tenant, &hold.id)),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn confirm_requires_email_and_e164_phone() {
        let (appts, holds, tenant, session, now) = setup();
        let hold = holds
            .hold_slot(
                &tenant,
                &session,
                now + Duration::hours(1),
                now + Duration::hours(1) + Duration::minutes(30),
            )
            .unwrap();

        let mut req = confirm_req(&tenant, &hold.id);
        req.client_email = "".into();
        assert!(appts.confirm_from_hold(&req).is_err());

        let mut req = confirm_req(&tenant, &hold.id);
        req.client_phone = "5551234567".into();
        assert!(appts.confirm_from_hold(&req).is_err());
    }

    #[test]
    fn lookup_is_case_insensitive_and_confirmed_only() {
        let (appts, holds, tenant, session, now) = setup();
        let hold = holds
            .hold_slot(
                &tenant,
                &session,
                now + Duration::hours(1),
                now + Duration::hours(1) + Duration::minutes(30),
            )
            .unwrap();
        let appt = appts.confirm_from_hold(&confirm_req(&tenant, &hold.id)).unwrap();

        let lower = appt.reference_code.to_lowercase();
        let found = appts.lookup(&tenant, Some(&lower), None).unwrap();
        assert_eq!(found.len(), 1);

        let by_email = appts
            .lookup(&tenant, None, Some("DANA@EXAMPLE.COM"))
            .unwrap();
        assert_eq!(by_email.len(), 1);

        appts.cancel(&tenant, &appt.id).unwrap();
        assert!(appts
            .lookup(&tenant, Some(&appt.reference_code), None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn cancelled_slot_reopens() {
        let (appts, holds, tenant, session, now) = setup();
        let start = now + Duration::hours(1);
        let end = start + Duration::minutes(30);
        let hold = holds.hold_slot(&tenant, &session, start, end).unwrap();
        let appt = appts.confirm_from_hold(&confirm_req(&tenant, &hold.id)).unwrap();

        // Booked slot blocks a new hold.
        assert!(holds.hold_slot(&tenant, &session, start, end).is_err());

        appts.cancel(&tenant, &appt.id).unwrap();
        holds.hold_slot(&tenant, &session, start, end).unwrap();
    }

    #[test]
    fn reschedule_swaps_slots_atomically() {
        let (appts, holds, tenant, session, now) = setup();
        let s1 = now + Duration::hours(1);
        let s2 = now + Duration::hours(3);

        let h1 = holds
            .hold_slot(&tenant, &session, s1, s1 + Duration::minutes(30))
            .unwrap();
        let old = appts.confirm_from_hold(&confirm_req(&tenant, &h1.id)).unwrap();

        let h2 = holds
            .hold_slot(&tenant, &session, s2, s2 + Duration::minutes(30))
            .unwrap();
        let new = appts.reschedule(&tenant, &old.id, &h2.id).unwrap();

        assert_eq!(new.client_email, old.client_email);
        assert_eq!(new.start_utc, s2);
        assert_ne!(new.reference_code, old.reference_code);

        // Old slot reopened, old booking cancelled.
        let old_now = appts.get(&old.id).unwrap().unwrap();
        assert_eq!(old_now.status, AppointmentStatus::Cancelled);
        holds
            .hold_slot(&tenant, &session, s1, s1 + Duration::minutes(30))
            .unwrap();

        assert_eq!(appts.overlapping_confirmed_pairs(&tenant).unwrap(), 0);
    }

    #[test]
    fn expired_hold_cannot_confirm() {
        let db = open_memory_db().unwrap();
        let t0 = Utc.with_ymd_and_hms(2026, 2, 11, 15, 0, 0).unwrap();
        let tenant = TenantId::from("t1");
        let session = SessionId::from("s1");

        let holds = HoldStore::new(db.clone(), Clock::fixed(t0), 5);
        let hold = holds
            .hold_slot(
                &tenant,
                &session,
                t0 + Duration::hours(1),
                t0 + Duration::hours(1) + Duration::minutes(30),
            )
            .unwrap();

        let appts = AppointmentStore::new(db, Clock::fixed(t0 + Duration::minutes(6)));
        assert!(matches!(
            appts.confirm_from_hold(&confirm_req(&tenant, &hold.id)),
            Err(StoreError::HoldExpired(_))
        ));
    }
}
