use chrono::Duration;
use sha2::{Digest, Sha256};
use tracing::debug;

use frontdesk_core::types::SessionId;
use frontdesk_core::Clock;

use crate::db::Db;
use crate::error::Result;
use crate::models::{from_ms, ms, VerificationSession};

/// Maximum wrong-code attempts before the OTP session is invalidated.
const MAX_ATTEMPTS: u32 = 5;

/// The stored value is a hash of the code, never the code itself.
fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Outcome of one OTP verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpOutcome {
    /// Code matched; the pending email is returned for session marking.
    Verified { email: String },
    /// Code wrong; attempts remaining before invalidation.
    Mismatch { remaining: u32 },
    /// No pending verification, it expired, or attempts ran out.
    NotPending,
}

/// Email-OTP verification sessions, rate-limited per destination.
pub struct VerificationStore {
    db: Db,
    clock: Clock,
    ttl_minutes: i64,
    rate_limit_per_hour: u32,
}

impl VerificationStore {
    pub fn new(db: Db, clock: Clock, ttl_minutes: i64, rate_limit_per_hour: u32) -> Self {
        Self {
            db,
            clock,
            ttl_minutes,
            rate_limit_per_hour,
        }
    }

    /// Begin (or replace) the pending verification for a session.
    /// Returns false when the destination's issuance rate limit is hit.
    pub fn begin(&self, session: &SessionId, email: &str, code: &str) -> Result<bool> {
        let email_lc = email.trim().to_lowercase();
        let now = self.clock.now_utc();

        let conn = self.db.lock().unwrap();
        let issued_recently: i64 = conn.query_row(
            "SELECT COUNT(*) FROM verification_issues
             WHERE email = ?1 AND issued_ms > ?2",
            rusqlite::params![email_lc, ms(now - Duration::hours(1))],
            |row| row.get(0),
        )?;
        if issued_recently as u32 >= self.rate_limit_per_hour {
            debug!("otp issuance rate limit hit");
            return Ok(false);
        }

        let expires = now + Duration::minutes(self.ttl_minutes);
        conn.execute(
            "INSERT INTO verifications (session_id, email, code_hash, attempts, expires_ms, created_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?5)
             ON CONFLICT(session_id) DO UPDATE SET
               email = excluded.email, code_hash = excluded.code_hash,
               attempts = 0, expires_ms = excluded.expires_ms",
            rusqlite::params![
                session.as_str(),
                email_lc,
                hash_code(code),
                ms(expires),
                now.to_rfc3339()
            ],
        )?;
        conn.execute(
            "INSERT INTO verification_issues (email, issued_ms) VALUES (?1, ?2)",
            rusqlite::params![email_lc, ms(now)],
        )?;
        Ok(true)
    }

    /// Check a submitted code against the pending verification.
    pub fn attempt(&self, session: &SessionId, code: &str) -> Result<OtpOutcome> {
        let now = self.clock.now_utc();
        let conn = self.db.lock().unwrap();

        let pending = match conn.query_row(
            "SELECT session_id, email, code_hash, attempts, expires_ms
             FROM verifications WHERE session_id = ?1",
            [session.as_str()],
            |row| {
                Ok(VerificationSession {
                    session_id: SessionId(row.get(0)?),
                    email: row.get(1)?,
                    code_hash: row.get(2)?,
                    attempts: row.get::<_, i64>(3)? as u32,
                    expires_at: from_ms(row.get(4)?),
                })
            },
        ) {
            Ok(v) => v,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(OtpOutcome::NotPending),
            Err(e) => return Err(e.into()),
        };

        if pending.expires_at <= now || pending.attempts >= MAX_ATTEMPTS {
            conn.execute(
                "DELETE FROM verifications WHERE session_id = ?1",
                [session.as_str()],
            )?;
            return Ok(OtpOutcome::NotPending);
        }

        if hash_code(code.trim()) == pending.code_hash {
            conn.execute(
                "DELETE FROM verifications WHERE session_id = ?1",
                [session.as_str()],
            )?;
            return Ok(OtpOutcome::Verified {
                email: pending.email,
            });
        }

        let attempts = pending.attempts + 1;
        if attempts >= MAX_ATTEMPTS {
            conn.execute(
                "DELETE FROM verifications WHERE session_id = ?1",
                [session.as_str()],
            )?;
            return Ok(OtpOutcome::NotPending);
        }
        conn.execute(
            "UPDATE verifications SET attempts = ?1 WHERE session_id = ?2",
            rusqlite::params![attempts, session.as_str()],
        )?;
        Ok(OtpOutcome::Mismatch {
            remaining: MAX_ATTEMPTS - attempts,
        })
    }

    /// Whether a verification is pending for this session (unexpired).
    pub fn pending_email(&self, session: &SessionId) -> Result<Option<String>> {
        let now = self.clock.now_utc();
        let conn = self.db.lock().unwrap();
        match conn.query_row(
            "SELECT email, expires_ms FROM verifications WHERE session_id = ?1",
            [session.as_str()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        ) {
            Ok((email, expires)) if from_ms(expires) > now => Ok(Some(email)),
            Ok(_) => Ok(None),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
