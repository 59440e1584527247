//! At-rest encryption for external-calendar credentials.
//!
//! Wire format: `enc:v1:<iv-hex>:<tag-hex>:<ciphertext-hex>`.
//! The AES-256-GCM key is derived from the raw process key via
//! HMAC-SHA256 with a fixed context string, so rotating the context
//! version invalidates old blobs without touching the raw key.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::{FrontdeskError, Result};

const VERSION_PREFIX: &str = "enc:v1";
const KEY_CONTEXT: &[u8] = b"ai-receptionist:oauth-token-encryption:v1";
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

fn derive_key(raw_key: &str) -> [u8; 32] {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(raw_key.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(KEY_CONTEXT);
    mac.finalize().into_bytes().into()
}

/// Encrypt `plaintext` under the derived key. Fresh random 96-bit IV per call.
pub fn encrypt_secret(raw_key: &str, plaintext: &str) -> Result<String> {
    let key = derive_key(raw_key);
    let cipher = Aes256Gcm::new((&key).into());

    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext.as_bytes(),
                aad: &[],
            },
        )
        .map_err(|_| FrontdeskError::Internal("secretbox seal failed".into()))?;

    // aes-gcm appends the 16-byte tag to the ciphertext.
    let (ct, tag) = sealed.split_at(sealed.len() - TAG_LEN);
    Ok(format!(
        "{VERSION_PREFIX}:{}:{}:{}",
        hex::encode(iv),
        hex::encode(tag),
        hex::encode(ct)
    ))
}

/// Decrypt an `enc:v1:` blob produced by [`encrypt_secret`].
pub fn decrypt_secret(raw_key: &str, blob: &str) -> Result<String> {
    let rest = blob
        .strip_prefix(VERSION_PREFIX)
        .and_then(|r| r.strip_prefix(':'))
        .ok_or_else(|| FrontdeskError::InvalidInput("not an enc:v1 secret".into()))?;

    let mut parts = rest.splitn(3, ':');
    let (iv_hex, tag_hex, ct_hex) = match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), Some(c)) => (a, b, c),
        _ => {
            return Err(FrontdeskError::InvalidInput(
                "malformed enc:v1 secret".into(),
            ))
        }
    };

    let iv = hex::decode(iv_hex)
        .map_err(|_| FrontdeskError::InvalidInput("bad iv encoding".into()))?;
    let tag = hex::decode(tag_hex)
        .map_err(|_| FrontdeskError::InvalidInput("bad tag encoding".into()))?;
    let ct = hex::decode(ct_hex)
        .map_err(|_| FrontdeskError::InvalidInput("bad ciphertext encoding".into()))?;

    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return Err(FrontdeskError::InvalidInput(
            "bad iv or tag length".into(),
        ));
    }

    let key = derive_key(raw_key);
    let cipher = Aes256Gcm::new((&key).into());

    let mut sealed = ct;
    sealed.extend_from_slice(&tag);

    let plain = cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &sealed,
                aad: &[],
            },
        )
        .map_err(|_| FrontdeskError::InvalidInput("secret authentication failed".into()))?;

    String::from_utf8(plain)
        .map_err(|_| FrontdeskError::InvalidInput("secret is not utf-8".into()))
}
