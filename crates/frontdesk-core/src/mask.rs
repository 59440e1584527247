//! PII masking for audit payloads and error messages.
//!
//! Audit entries must never carry a raw email, phone number, message SID,
//! or SMS body. Everything below produces the masked forms the audit
//! invariants check for.

use sha2::{Digest, Sha256};

/// `alice@example.com` → `al***@example.com`. Inputs without an `@` are
/// fully starred.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(2).collect();
            format!("{visible}***@{domain}")
        }
        None => "***".to_string(),
    }
}

/// SHA-256 hex prefix of the lowercased email. Stable join key for audit
/// correlation that never reveals the address.
pub fn email_hash(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

/// Last four digits of a phone number, or `****`.
pub fn phone_last4(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return "****".to_string();
    }
    digits[digits.len() - 4..].iter().collect()
}

/// Country code + leading subscriber digits, e.g. `+1555…` — enough for
/// region triage, not enough to dial.
pub fn phone_prefix(e164: &str) -> String {
    let visible: String = e164.chars().take(5).collect();
    format!("{visible}\u{2026}")
}

/// Last four characters of a carrier message SID.
pub fn sid_last4(sid: &str) -> String {
    if sid.len() < 4 {
        return "****".to_string();
    }
    sid[sid.len() - 4..].to_string()
}
