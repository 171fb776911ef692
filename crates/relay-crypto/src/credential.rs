//! At-rest encryption for account credentials.
//!
//! The primary format is `base64(iv[16] || ciphertext || tag[16])` under
//! AES-256-GCM with a **16-byte** nonce -- non-standard (GCM is normally
//! used with a 12-byte nonce), so the implementation constructs the GCM
//! instantiation explicitly over a 16-byte nonce size rather than going
//! through the crate's default `Aes256Gcm` alias. A legacy on-disk format,
//! `hex(iv):hex(ciphertext||tag)` with a 12-byte nonce, must also decrypt
//! for backward compatibility with credentials written before this change.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, generic_array::typenum::U16};
use aes_gcm::{AesGcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::key_material::Key;

/// AES-256-GCM with a 16-byte nonce (see module docs for why).
type Aes256Gcm16 = AesGcm<aes_gcm::aes::Aes256, U16>;
/// Standard AES-256-GCM with the conventional 12-byte nonce, kept only to
/// decrypt credentials written in the legacy on-disk format.
type Aes256Gcm12 = aes_gcm::Aes256Gcm;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("invalid base64 credential envelope")]
    InvalidBase64,
    #[error("invalid hex credential envelope")]
    InvalidHex,
    #[error("credential envelope too short")]
    TooShort,
    #[error("decryption failed (wrong key or corrupted data)")]
    DecryptionFailed,
    #[error("credential is not valid UTF-8")]
    NotUtf8,
}

/// Encrypts and decrypts account credential material at rest.
pub struct CredentialCipher {
    key: Key,
}

impl CredentialCipher {
    #[must_use]
    pub fn new(key: Key) -> Self {
        Self { key }
    }

    /// Encrypt `plaintext`, always producing the current (16-byte nonce)
    /// envelope format.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CredentialError> {
        let cipher = Aes256Gcm16::new(self.key.as_bytes().into());
        let nonce = Aes256Gcm16::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CredentialError::DecryptionFailed)?;

        let mut out = Vec::with_capacity(16 + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(B64.encode(out))
    }

    /// Decrypt a credential envelope in either the current base64 /
    /// 16-byte-nonce format or the legacy `hex(iv):hex(ct||tag)` /
    /// 12-byte-nonce format.
    pub fn decrypt(&self, envelope: &str) -> Result<SecretString, CredentialError> {
        if let Some((iv_hex, ct_hex)) = envelope.split_once(':') {
            return self.decrypt_legacy(iv_hex, ct_hex);
        }
        self.decrypt_current(envelope)
    }

    fn decrypt_current(&self, envelope: &str) -> Result<SecretString, CredentialError> {
        let raw = B64
            .decode(envelope.trim())
            .map_err(|_| CredentialError::InvalidBase64)?;
        if raw.len() < 16 {
            return Err(CredentialError::TooShort);
        }
        let (iv, ciphertext) = raw.split_at(16);
        let cipher = Aes256Gcm16::new(self.key.as_bytes().into());
        let nonce = Nonce::<U16>::from_slice(iv);
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CredentialError::DecryptionFailed)?;
        String::from_utf8(plaintext)
            .map(SecretString::new)
            .map_err(|_| CredentialError::NotUtf8)
    }

    fn decrypt_legacy(&self, iv_hex: &str, ct_hex: &str) -> Result<SecretString, CredentialError> {
        let iv = hex::decode(iv_hex).map_err(|_| CredentialError::InvalidHex)?;
        let ciphertext = hex::decode(ct_hex).map_err(|_| CredentialError::InvalidHex)?;
        if iv.len() != 12 {
            return Err(CredentialError::TooShort);
        }
        let cipher = Aes256Gcm12::new(self.key.as_bytes().into());
        let nonce = aes_gcm::Nonce::<aes_gcm::aead::generic_array::typenum::U12>::from_slice(&iv);
        let plaintext = cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| CredentialError::DecryptionFailed)?;
        String::from_utf8(plaintext)
            .map(SecretString::new)
            .map_err(|_| CredentialError::NotUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> CredentialCipher {
        CredentialCipher::new(Key::from_bytes([3u8; 32]))
    }

    #[test]
    fn round_trips_current_format() {
        let c = cipher();
        let enc = c.encrypt("sk-ant-super-secret").unwrap();
        assert!(!enc.contains(':'));
        let dec = c.decrypt(&enc).unwrap();
        assert_eq!(dec.expose_secret(), "sk-ant-super-secret");
    }

    #[test]
    fn decrypts_legacy_format() {
        let c = cipher();
        let cipher12 = Aes256Gcm12::new(c.key.as_bytes().into());
        let nonce = Aes256Gcm12::generate_nonce(&mut OsRng);
        let ct = cipher12.encrypt(&nonce, b"legacy-secret".as_ref()).unwrap();
        let envelope = format!("{}:{}", hex::encode(nonce), hex::encode(ct));
        let dec = c.decrypt(&envelope).unwrap();
        assert_eq!(dec.expose_secret(), "legacy-secret");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let c1 = cipher();
        let c2 = CredentialCipher::new(Key::from_bytes([9u8; 32]));
        let enc = c1.encrypt("secret").unwrap();
        assert!(c2.decrypt(&enc).is_err());
    }

    #[test]
    fn malformed_envelope_errors() {
        let c = cipher();
        assert!(c.decrypt("not-base64!!!").is_err());
    }
}
