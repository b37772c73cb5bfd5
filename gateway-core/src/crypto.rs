//! Encryption shim for provider API keys at rest (§4.A).
//!
//! The original service (`core/security.py`) wraps a symmetric Fernet token
//! keyed off a SHA-256 derivation of `API_KEY_SECRET`. This is the same
//! scheme expressed with an AEAD cipher idiomatic to Rust: AES-256-GCM via
//! `aes-gcm`, with the nonce prepended to the ciphertext before base64
//! encoding so the stored token is a single opaque string.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::GatewayError;

const NONCE_LEN: usize = 12;

/// Derives a 256-bit key from the configured secret the same way the
/// original service derives its Fernet key: SHA-256 of the raw secret
/// bytes.
fn derive_key(secret: &str) -> Key<Aes256Gcm> {
    let digest = Sha256::digest(secret.as_bytes());
    *Key::<Aes256Gcm>::from_slice(&digest)
}

/// Encrypts `plaintext` (a provider API key) into an opaque base64 token.
pub fn encrypt(secret: &str, plaintext: &str) -> Result<String, GatewayError> {
    let cipher = Aes256Gcm::new(&derive_key(secret));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| GatewayError::DecryptionFailed)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(out))
}

/// Recovers the plaintext API key from a token produced by [`encrypt`].
pub fn decrypt(secret: &str, token: &str) -> Result<String, GatewayError> {
    let raw = BASE64
        .decode(token)
        .map_err(|_| GatewayError::DecryptionFailed)?;
    if raw.len() < NONCE_LEN {
        return Err(GatewayError::DecryptionFailed);
    }
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new(&derive_key(secret));
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| GatewayError::DecryptionFailed)?;
    String::from_utf8(plaintext).map_err(|_| GatewayError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encrypt_decrypt() {
        let secret = "test-secret";
        let token = encrypt(secret, "sk-live-abc123").unwrap();
        assert_eq!(decrypt(secret, &token).unwrap(), "sk-live-abc123");
    }

    #[test]
    fn distinct_ciphertexts_for_same_plaintext() {
        let secret = "test-secret";
        let a = encrypt(secret, "sk-live-abc123").unwrap();
        let b = encrypt(secret, "sk-live-abc123").unwrap();
        assert_ne!(a, b, "random nonce must vary the ciphertext");
    }

    #[test]
    fn wrong_secret_fails_to_decrypt() {
        let token = encrypt("right-secret", "sk-live-abc123").unwrap();
        assert!(decrypt("wrong-secret", &token).is_err());
    }

    #[test]
    fn malformed_token_fails_gracefully() {
        assert!(decrypt("any-secret", "not-valid-base64!!").is_err());
    }
}
