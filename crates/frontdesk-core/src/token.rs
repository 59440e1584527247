//! Customer session tokens.
//!
//! Wire format: `<payload-b64url>.<sig-b64url>` where the payload is JSON
//! `{tid, sid, cid?, iat, exp}` and the signature is HMAC-SHA256 over the
//! raw payload bytes. Verification recomputes the MAC and compares in
//! constant time.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{FrontdeskError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime: 4 hours.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 14_400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub tid: String,
    pub sid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Signs and verifies session tokens with a process-wide secret.
///
/// The key is held once at startup and never logged.
pub struct TokenSigner {
    key: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Result<Self> {
        if secret.len() < 16 {
            return Err(FrontdeskError::Config(
                "signing secret must be at least 16 bytes".into(),
            ));
        }
        Ok(Self {
            key: secret.as_bytes().to_vec(),
        })
    }

    pub fn issue(
        &self,
        tenant: &str,
        session: &str,
        customer: Option<&str>,
        now: DateTime<Utc>,
        ttl_secs: i64,
    ) -> String {
        let claims = TokenClaims {
            tid: tenant.to_string(),
            sid: session.to_string(),
            cid: customer.map(str::to_string),
            iat: now.timestamp(),
            exp: now.timestamp() + ttl_secs,
        };
        // Serialization of a plain struct cannot fail.
        let payload = serde_json::to_vec(&claims).expect("token claims serialize");
        let sig = self.sign(&payload);
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(sig)
        )
    }

    /// Verify shape, signature, and expiry. Returns the claims on success.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims> {
        let (payload_b64, sig_b64) = token
            .split_once('.')
            .ok_or_else(|| FrontdeskError::TokenRejected("malformed token".into()))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| FrontdeskError::TokenRejected("bad payload encoding".into()))?;
        let sig = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| FrontdeskError::TokenRejected("bad signature encoding".into()))?;

        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(&payload);
        mac.verify_slice(&sig)
            .map_err(|_| FrontdeskError::TokenRejected("signature mismatch".into()))?;

        let claims: TokenClaims = serde_json::from_slice(&payload)
            .map_err(|_| FrontdeskError::TokenRejected("bad claims shape".into()))?;

        if claims.exp <= now.timestamp() {
            return Err(FrontdeskError::TokenRejected("token expired".into()));
        }
        Ok(claims)
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}
