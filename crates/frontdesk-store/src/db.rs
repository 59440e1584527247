use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::error::Result;

/// Shared connection handle passed to every store.
pub type Db = Arc<Mutex<Connection>>;

/// Open (or create) the database file and initialise the schema.
pub fn open_db(path: &str) -> Result<Db> {
    if let Some(dir) = std::path::Path::new(path).parent() {
        // Best effort; the open below reports the real failure.
        let _ = std::fs::create_dir_all(dir);
    }
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    init_db(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// In-memory database for tests.
pub fn open_memory_db() -> Result<Db> {
    let conn = Connection::open_in_memory()?;
    init_db(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Initialise all frontdesk tables. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tenants (
            id                  TEXT    NOT NULL PRIMARY KEY,
            slug                TEXT    NOT NULL UNIQUE,
            name                TEXT    NOT NULL,
            profile             TEXT    NOT NULL,   -- JSON-encoded Tenant
            created_at          TEXT    NOT NULL,
            updated_at          TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS appointments (
            id                  TEXT    NOT NULL PRIMARY KEY,
            tenant_id           TEXT    NOT NULL,
            reference_code      TEXT    NOT NULL,
            client_name         TEXT    NOT NULL,
            client_email        TEXT    NOT NULL,
            client_phone        TEXT    NOT NULL,
            service             TEXT,
            start_ms            INTEGER NOT NULL,
            end_ms              INTEGER NOT NULL,
            timezone            TEXT    NOT NULL,
            status              TEXT    NOT NULL DEFAULT 'confirmed',
            calendar_event_id   TEXT,
            created_at          TEXT    NOT NULL,
            updated_at          TEXT    NOT NULL,
            UNIQUE(tenant_id, reference_code)
        );
        -- Overlap checks scan by tenant and time window.
        CREATE INDEX IF NOT EXISTS idx_appt_tenant_start
            ON appointments (tenant_id, start_ms);
        CREATE INDEX IF NOT EXISTS idx_appt_tenant_status
            ON appointments (tenant_id, status);
        CREATE INDEX IF NOT EXISTS idx_appt_email
            ON appointments (tenant_id, client_email);

        CREATE TABLE IF NOT EXISTS holds (
            id                  TEXT    NOT NULL PRIMARY KEY,
            tenant_id           TEXT    NOT NULL,
            session_id          TEXT    NOT NULL,
            start_ms            INTEGER NOT NULL,
            end_ms              INTEGER NOT NULL,
            expires_ms          INTEGER NOT NULL,
            created_at          TEXT    NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_holds_tenant_start
            ON holds (tenant_id, start_ms);
        -- Expiry sweep: SELECT … WHERE expires_ms <= ?
        CREATE INDEX IF NOT EXISTS idx_holds_expires
            ON holds (expires_ms);

        CREATE TABLE IF NOT EXISTS sessions (
            id                  TEXT    NOT NULL PRIMARY KEY,
            tenant_id           TEXT    NOT NULL,
            channel             TEXT    NOT NULL,
            external_id         TEXT    NOT NULL,
            customer_id         TEXT,
            email_verified      INTEGER NOT NULL DEFAULT 0,
            verified_email      TEXT,
            metadata            TEXT    NOT NULL DEFAULT '{}',
            message_count       INTEGER NOT NULL DEFAULT 0,
            booking_count       INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT    NOT NULL,
            updated_at          TEXT    NOT NULL,
            UNIQUE(tenant_id, channel, external_id)
        );

        CREATE TABLE IF NOT EXISTS session_messages (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id          TEXT    NOT NULL,
            role                TEXT    NOT NULL,
            content             TEXT    NOT NULL,
            created_at          TEXT    NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_msgs_session
            ON session_messages (session_id, id);

        CREATE TABLE IF NOT EXISTS customers (
            id                  TEXT    NOT NULL PRIMARY KEY,
            tenant_id           TEXT    NOT NULL,
            phone               TEXT,
            email               TEXT,
            display_name        TEXT,
            preferences         TEXT    NOT NULL DEFAULT '{}',
            booking_count       INTEGER NOT NULL DEFAULT 0,
            last_seen_at        TEXT,
            deleted             INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT    NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_customers_email
            ON customers (tenant_id, email);
        CREATE INDEX IF NOT EXISTS idx_customers_phone
            ON customers (tenant_id, phone);

        CREATE TABLE IF NOT EXISTS waitlist (
            id                  TEXT    NOT NULL PRIMARY KEY,
            tenant_id           TEXT    NOT NULL,
            session_id          TEXT    NOT NULL,
            contact             TEXT    NOT NULL,
            service             TEXT,
            preferred_days      TEXT,
            window_start        TEXT,
            window_end          TEXT,
            status              TEXT    NOT NULL DEFAULT 'waiting',
            created_at          TEXT    NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_waitlist_tenant_status
            ON waitlist (tenant_id, status);

        CREATE TABLE IF NOT EXISTS outbox (
            id                  TEXT    NOT NULL PRIMARY KEY,
            tenant_id           TEXT    NOT NULL,
            to_phone            TEXT    NOT NULL,
            body                TEXT    NOT NULL,
            message_type        TEXT    NOT NULL,
            booking_reference   TEXT,
            status              TEXT    NOT NULL DEFAULT 'pending',
            attempts            INTEGER NOT NULL DEFAULT 0,
            max_attempts        INTEGER NOT NULL DEFAULT 3,
            last_error          TEXT,
            provider_sid        TEXT,
            provider_status     TEXT,
            provider_error_code TEXT,
            run_at_ms           INTEGER NOT NULL,
            created_at          TEXT    NOT NULL
        );
        -- Worker claim: SELECT … WHERE status='pending' AND run_at_ms <= ?
        CREATE INDEX IF NOT EXISTS idx_outbox_due
            ON outbox (status, run_at_ms);
        CREATE INDEX IF NOT EXISTS idx_outbox_sid
            ON outbox (provider_sid);

        CREATE TABLE IF NOT EXISTS followups (
            id                  TEXT    NOT NULL PRIMARY KEY,
            tenant_id           TEXT    NOT NULL,
            session_id          TEXT    NOT NULL,
            contact             TEXT    NOT NULL,
            channel             TEXT    NOT NULL,
            reason              TEXT    NOT NULL,
            job_id              TEXT,
            created_ms          INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_followups_session
            ON followups (session_id);
        -- Cooldown lookup is newest-first per contact.
        CREATE INDEX IF NOT EXISTS idx_followups_contact
            ON followups (tenant_id, contact, created_ms DESC);

        CREATE TABLE IF NOT EXISTS optouts (
            tenant_id           TEXT    NOT NULL,
            phone               TEXT    NOT NULL,
            created_at          TEXT    NOT NULL,
            PRIMARY KEY (tenant_id, phone)
        );

        CREATE TABLE IF NOT EXISTS sms_send_log (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            phone               TEXT    NOT NULL,
            sent_ms             INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sms_log_phone
            ON sms_send_log (phone, sent_ms);

        CREATE TABLE IF NOT EXISTS verifications (
            session_id          TEXT    NOT NULL PRIMARY KEY,
            email               TEXT    NOT NULL,
            code_hash           TEXT    NOT NULL,
            attempts            INTEGER NOT NULL DEFAULT 0,
            expires_ms          INTEGER NOT NULL,
            created_at          TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS verification_issues (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            email               TEXT    NOT NULL,
            issued_ms           INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_verif_issues_email
            ON verification_issues (email, issued_ms);

        CREATE TABLE IF NOT EXISTS audit_log (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id           TEXT    NOT NULL,
            event_type          TEXT    NOT NULL,
            entity_type         TEXT,
            entity_id           TEXT,
            actor               TEXT    NOT NULL DEFAULT 'system',
            payload             TEXT    NOT NULL DEFAULT '{}',
            created_at          TEXT    NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_tenant
            ON audit_log (tenant_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_audit_event
            ON audit_log (event_type);
        ",
    )?;
    Ok(())
}
