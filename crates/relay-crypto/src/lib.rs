//! Deterministic token codec (spec component A) and account credential
//! at-rest encryption for the relay LLM proxy.

pub mod credential;
pub mod key_material;
pub mod token_codec;

pub use credential::{CredentialCipher, CredentialError};
pub use key_material::{Key, KeyError, resolve_key};
pub use token_codec::{CodecError, TokenCodec};

use std::path::PathBuf;

/// Env var / file-path conventions for the two independent key material
/// slots the spec names: the guardrail token codec's key, and the
/// account-credential encryption key.
pub struct KeyConfig {
    pub env_var: &'static str,
    pub file_name: &'static str,
    pub salt: &'static [u8],
}

pub const GUARDRAIL_KEY_CONFIG: KeyConfig = KeyConfig {
    env_var: "GUARDRAIL_KEY",
    file_name: "guardrail.key",
    salt: b"relay-guardrail-salt-v1",
};

pub const ACCOUNT_KEY_CONFIG: KeyConfig = KeyConfig {
    env_var: "ACCOUNT_KEY",
    file_name: "account.key",
    salt: b"relay-account-salt-v1",
};

impl KeyConfig {
    pub fn resolve(&self, data_dir: &std::path::Path) -> Result<Key, KeyError> {
        let path: PathBuf = data_dir.join(self.file_name);
        resolve_key(self.env_var, &path, self.salt)
    }
}
