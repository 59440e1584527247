//! Carrier status-callback processing.
//!
//! Transport-agnostic: the HTTP layer hands us the full request URL, the
//! form fields, and the signature header. Callbacks always resolve to a
//! 2xx-style outcome — a non-2xx would make the carrier retry forever
//! against a row we will never recognise.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tracing::{info, warn};

use frontdesk_core::config::Environment;
use frontdesk_core::mask::sid_last4;
use frontdesk_store::audit::AuditStore;
use frontdesk_store::outbox::OutboxStore;

type HmacSha1 = Hmac<Sha1>;

/// Parsed status callback. Carrier-sent PII fields (To/From/Body) are
/// deliberately never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCallback {
    pub message_sid: String,
    pub message_status: String,
    pub error_code: Option<String>,
}

/// Extract the callback from form fields. `None` when the required
/// fields are missing (malformed POST).
pub fn parse_form(form: &[(String, String)]) -> Option<StatusCallback> {
    let get = |key: &str| {
        form.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.to_string())
    };
    Some(StatusCallback {
        message_sid: get("MessageSid")?,
        message_status: get("MessageStatus")?,
        error_code: get("ErrorCode").filter(|v| !v.is_empty()),
    })
}

/// Validate the provider's signature: base64(HMAC-SHA1(auth_token,
/// url + concat(sorted key+value pairs))).
pub fn validate_signature(
    auth_token: &str,
    url: &str,
    form: &[(String, String)],
    signature_b64: &str,
) -> bool {
    let mut sorted: Vec<&(String, String)> = form.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut data = url.to_string();
    for (k, v) in sorted {
        data.push_str(k);
        data.push_str(v);
    }

    let Ok(expected_sig) = BASE64.decode(signature_b64) else {
        return false;
    };
    let mut mac =
        HmacSha1::new_from_slice(auth_token.as_bytes()).expect("hmac accepts any key length");
    mac.update(data.as_bytes());
    mac.verify_slice(&expected_sig).is_ok()
}

/// Whether webhook processing may run at all. Absent carrier credentials
/// outside Dev means nobody legitimate can be calling us: fail closed.
pub fn webhook_allowed(carrier_configured: bool, environment: Environment) -> bool {
    carrier_configured || environment == Environment::Dev
}

/// Apply a verified callback to the outbox and audit it.
/// Unknown SIDs are acknowledged silently (idempotent, no carrier retry).
pub fn process_status_callback(
    outbox: &OutboxStore,
    audit: &AuditStore,
    cb: &StatusCallback,
) -> frontdesk_store::Result<()> {
    match outbox.apply_provider_status(
        &cb.message_sid,
        &cb.message_status,
        cb.error_code.as_deref(),
    )? {
        Some(row) => {
            audit.append_best_effort(
                &row.tenant_id,
                "sms.provider_status_update",
                Some("outbox"),
                Some(&row.id),
                "carrier_webhook",
                serde_json::json!({
                    "sid_last4": sid_last4(&cb.message_sid),
                    "status": cb.message_status,
                    "error_code": cb.error_code,
                }),
            );
            info!(
                sid_last4 = %sid_last4(&cb.message_sid),
                status = %cb.message_status,
                "provider status applied"
            );
        }
        None => {
            warn!(
                sid_last4 = %sid_last4(&cb.message_sid),
                "provider status for unknown SID ignored"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use frontdesk_core::types::TenantId;
    use frontdesk_core::Clock;
    use frontdesk_store::models::MessageType;
    use frontdesk_store::open_memory_db;
    use frontdesk_store::outbox::EnqueueSms;

    fn form(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parse_requires_sid_and_status() {
        let cb = parse_form(&form(&[
            ("MessageSid", "SM123"),
            ("MessageStatus", "delivered"),
            ("To", "+15551234567"),
        ]))
        .unwrap();
        assert_eq!(cb.message_sid, "SM123");
        assert_eq!(cb.message_status, "delivered");
        assert!(cb.error_code.is_none());

        assert!(parse_form(&form(&[("MessageStatus", "failed")])).is_none());
    }

    #[test]
    fn empty_error_code_reads_as_none() {
        let cb = parse_form(&form(&[
            ("MessageSid", "SM123"),
            ("MessageStatus", "failed"),
            ("ErrorCode", ""),
        ]))
        .unwrap();
        assert!(cb.error_code.is_none());
    }

    #[test]
    fn signature_roundtrip() {
        let url = "https://frontdesk.example/webhooks/sms-status";
        let fields = form(&[
            ("MessageStatus", "delivered"),
            ("MessageSid", "SM123"),
        ]);

        // Compute the expected signature the way the carrier would.
        let mut sorted: Vec<_> = fields.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let mut data = url.to_string();
        for (k, v) in sorted {
            data.push_str(k);
            data.push_str(v);
        }
        let mut mac = HmacSha1::new_from_slice(b"auth-token").unwrap();
        mac.update(data.as_bytes());
        let sig = BASE64.encode(mac.finalize().into_bytes());

        assert!(validate_signature("auth-token", url, &fields, &sig));
        assert!(!validate_signature("other-token", url, &fields, &sig));
        assert!(!validate_signature("auth-token", url, &fields, "not-base64!!"));

        let mut tampered = fields.clone();
        tampered[0].1 = "failed".into();
        assert!(!validate_signature("auth-token", url, &tampered, &sig));
    }

    #[test]
    fn fail_closed_outside_dev_without_credentials() {
        assert!(webhook_allowed(true, Environment::Production));
        assert!(webhook_allowed(false, Environment::Dev));
        assert!(!webhook_allowed(false, Environment::Pilot));
        assert!(!webhook_allowed(false, Environment::Production));
    }

    #[test]
    fn callback_updates_row_and_audits() {
        let db = open_memory_db().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 2, 11, 15, 0, 0).unwrap();
        let clock = Clock::fixed(now);
        let outbox = OutboxStore::new(db.clone(), clock.clone());
        let audit = AuditStore::new(db, clock.clone());

        let msg = outbox
            .enqueue(&EnqueueSms {
                tenant_id: TenantId::from("t1"),
                to_phone: "+15551234567".into(),
                body: "Reminder".into(),
                message_type: MessageType::Reminder24h,
                booking_reference: None,
                run_at: now,
                max_attempts: 3,
            })
            .unwrap();
        outbox.claim_batch(10).unwrap();
        outbox.mark_sent(&msg.id, "SM0001cdef").unwrap();

        let cb = StatusCallback {
            message_sid: "SM0001cdef".into(),
            message_status: "undelivered".into(),
            error_code: Some("30008".into()),
        };
        process_status_callback(&outbox, &audit, &cb).unwrap();

        let row = outbox.get(&msg.id).unwrap().unwrap();
        assert_eq!(row.provider_status.as_deref(), Some("undelivered"));
        assert_eq!(row.provider_error_code.as_deref(), Some("30008"));

        let entries = audit
            .entries_with_prefix(&TenantId::from("t1"), "sms.provider_status_update")
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload["sid_last4"], "cdef");

        // Unknown SID: silently fine.
        let cb = StatusCallback {
            message_sid: "SMunknown".into(),
            message_status: "delivered".into(),
            error_code: None,
        };
        process_status_callback(&outbox, &audit, &cb).unwrap();
    }
}
