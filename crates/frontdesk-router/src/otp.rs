//! Email-OTP verification helpers for the router's identity gate.

use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap()
    })
}

fn code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{6})\b").unwrap())
}

/// First email address in the text, lowercased.
pub fn extract_email(text: &str) -> Option<String> {
    email_re()
        .find(text)
        .map(|m| m.as_str().to_lowercase())
}

/// First 6-digit group in the text.
pub fn extract_code(text: &str) -> Option<String> {
    code_re()
        .captures(text)
        .map(|c| c[1].to_string())
}

/// Fresh 6-digit code, zero-padded.
pub fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}
