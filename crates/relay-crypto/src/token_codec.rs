//! Deterministic, domain-separated encrypt/decrypt of short in-text
//! replacement tokens (spec component A).
//!
//! Determinism is intentional: the same plaintext anonymised under the
//! same domain always yields the same token, which preserves
//! conversational coherence across turns without needing the reverse map
//! for every replacement.

use aes::Aes256;
use aes::cipher::{KeyIvInit, StreamCipher};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ctr::Ctr128BE;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::key_material::Key;

type HmacSha256 = Hmac<Sha256>;
type Aes256Ctr = Ctr128BE<Aes256>;

const CHECKSUM_LEN: usize = 4;
const IV_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("token is not valid base64url")]
    InvalidEncoding,
    #[error("token is too short to contain iv + checksum")]
    TooShort,
}

/// Stateless deterministic codec over a single guardrail key.
#[derive(Clone)]
pub struct TokenCodec {
    key: Key,
}

impl TokenCodec {
    #[must_use]
    pub fn new(key: Key) -> Self {
        Self { key }
    }

    fn domain_mac(&self, domain: &str) -> HmacSha256 {
        let mut outer = HmacSha256::new_from_slice(self.key.as_bytes())
            .expect("hmac accepts any key length");
        outer.update(domain.as_bytes());
        let domain_key = outer.finalize().into_bytes();
        HmacSha256::new_from_slice(&domain_key).expect("hmac accepts any key length")
    }

    fn derive_iv(&self, domain: &str, plaintext: &str) -> [u8; IV_LEN] {
        let mut mac = self.domain_mac(domain);
        mac.update(plaintext.as_bytes());
        let full = mac.finalize().into_bytes();
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&full[..IV_LEN]);
        iv
    }

    fn checksum(&self, plaintext: &str, domain: &str) -> [u8; CHECKSUM_LEN] {
        let mut mac =
            HmacSha256::new_from_slice(self.key.as_bytes()).expect("hmac accepts any key length");
        mac.update(plaintext.as_bytes());
        mac.update(domain.as_bytes());
        let full = mac.finalize().into_bytes();
        let mut out = [0u8; CHECKSUM_LEN];
        out.copy_from_slice(&full[..CHECKSUM_LEN]);
        out
    }

    /// Encrypt `plaintext` within `domain`, producing a short reversible
    /// token safe to splice into request/response text.
    #[must_use]
    pub fn encrypt(&self, plaintext: &str, domain: &str) -> String {
        let iv = self.derive_iv(domain, plaintext);
        let mut buf = plaintext.as_bytes().to_vec();
        let mut cipher = Aes256Ctr::new(self.key.as_bytes().into(), &iv.into());
        cipher.apply_keystream(&mut buf);

        let checksum = self.checksum(plaintext, domain);

        let mut out = Vec::with_capacity(IV_LEN + buf.len() + CHECKSUM_LEN);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&buf);
        out.extend_from_slice(&checksum);
        URL_SAFE_NO_PAD.encode(out)
    }

    /// Decrypt `token` within `domain`. Returns `None` (not an error) on
    /// checksum mismatch or malformed input -- callers treat that as "not
    /// a token this codec produced" and fall back to other strategies.
    #[must_use]
    pub fn decrypt(&self, token: &str, domain: &str) -> Option<String> {
        self.try_decrypt(token, domain).ok()
    }

    fn try_decrypt(&self, token: &str, domain: &str) -> Result<String, CodecError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CodecError::InvalidEncoding)?;
        if raw.len() < IV_LEN + CHECKSUM_LEN {
            return Err(CodecError::TooShort);
        }
        let (iv, rest) = raw.split_at(IV_LEN);
        let (ciphertext, checksum) = rest.split_at(rest.len() - CHECKSUM_LEN);

        let mut iv_arr = [0u8; IV_LEN];
        iv_arr.copy_from_slice(iv);

        let mut buf = ciphertext.to_vec();
        let mut cipher = Aes256Ctr::new(self.key.as_bytes().into(), &iv_arr.into());
        cipher.apply_keystream(&mut buf);

        let plaintext = String::from_utf8(buf).map_err(|_| CodecError::TooShort)?;
        let expected = self.checksum(&plaintext, domain);

        if expected.ct_eq(checksum).unwrap_u8() != 1 {
            return Err(CodecError::TooShort);
        }
        Ok(plaintext)
    }

    /// First `n` hex characters of `HMAC-SHA256(key, value)`, used to
    /// build deterministic-but-opaque suffixes for replacement formats.
    #[must_use]
    pub fn hmac_short(&self, value: &str, n: usize) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.key.as_bytes()).expect("hmac accepts any key length");
        mac.update(value.as_bytes());
        let full = hex::encode(mac.finalize().into_bytes());
        full.chars().take(n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(Key::from_bytes([7u8; 32]))
    }

    #[test]
    fn encrypt_decrypt_round_trips() {
        let c = codec();
        let token = c.encrypt("alice@example.com", "email");
        assert_eq!(c.decrypt(&token, "email").as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn determinism_same_plaintext_same_domain() {
        let c = codec();
        let a = c.encrypt("555-1234", "phone");
        let b = c.encrypt("555-1234", "phone");
        assert_eq!(a, b);
    }

    #[test]
    fn domain_separation_prevents_cross_decrypt() {
        let c = codec();
        let token = c.encrypt("123-45-6789", "ssn");
        assert_eq!(c.decrypt(&token, "email"), None);
    }

    #[test]
    fn different_plaintexts_yield_different_tokens() {
        let c = codec();
        let a = c.encrypt("one@example.com", "email");
        let b = c.encrypt("two@example.com", "email");
        assert_ne!(a, b);
    }

    #[test]
    fn garbage_token_fails_closed() {
        let c = codec();
        assert_eq!(c.decrypt("not-a-real-token", "email"), None);
        assert_eq!(c.decrypt("", "email"), None);
    }

    #[test]
    fn hmac_short_is_deterministic_and_truncated() {
        let c = codec();
        let a = c.hmac_short("value", 8);
        let b = c.hmac_short("value", 8);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    proptest::proptest! {
        #[test]
        fn roundtrip_arbitrary_strings(s in "[a-zA-Z0-9@._ -]{0,64}") {
            let c = codec();
            let token = c.encrypt(&s, "generic");
            proptest::prop_assert_eq!(c.decrypt(&token, "generic"), Some(s));
        }
    }
}
