//! Resolution of 32-byte symmetric keys from environment, disk, or fresh
//! generation, shared by the guardrail token codec and the account
//! credential encryptor.

use std::fmt;
use std::io::Write as _;
use std::path::Path;

use rand::RngCore;
use scrypt::Params;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A 32-byte symmetric key, zeroized on drop. [`fmt::Debug`] is redacted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Key([u8; 32]);

impl Key {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key([REDACTED])")
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("io error resolving key material: {0}")]
    Io(#[from] std::io::Error),
    #[error("key file content is not valid hex")]
    InvalidHex,
    #[error("scrypt key derivation failed: {0}")]
    Scrypt(String),
}

/// scrypt parameters fixed by the spec: N=16384 (log2 n = 14), r=8, p=1.
fn scrypt_params() -> Params {
    Params::new(14, 8, 1, 32).expect("fixed scrypt params are valid")
}

/// Derive a 32-byte key from a passphrase-like environment value using
/// scrypt with a fixed salt. Used when the raw env var value is not
/// already 32 bytes of hex.
fn derive_from_env_value(value: &str, salt: &[u8]) -> Result<Key, KeyError> {
    let mut out = [0u8; 32];
    scrypt::scrypt(value.as_bytes(), salt, &scrypt_params(), &mut out)
        .map_err(|e| KeyError::Scrypt(e.to_string()))?;
    Ok(Key(out))
}

/// Resolve a key in priority order:
/// 1. `env_var` set -> if it decodes as 64 hex chars, use directly;
///    otherwise scrypt-derive it with `salt`.
/// 2. `file_path` exists -> parse its hex contents.
/// 3. Generate 32 random bytes, persist them to `file_path` as hex, and
///    use them.
pub fn resolve_key(env_var: &str, file_path: &Path, salt: &[u8]) -> Result<Key, KeyError> {
    if let Ok(value) = std::env::var(env_var) {
        if let Ok(bytes) = hex::decode(value.trim())
            && bytes.len() == 32
        {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&bytes);
            return Ok(Key(arr));
        }
        return derive_from_env_value(&value, salt);
    }

    if file_path.exists() {
        let contents = std::fs::read_to_string(file_path)?;
        let bytes = hex::decode(contents.trim()).map_err(|_| KeyError::InvalidHex)?;
        if bytes.len() != 32 {
            return Err(KeyError::InvalidHex);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        return Ok(Key(arr));
    }

    let mut arr = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut arr);
    if let Some(parent) = file_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(file_path)?;
    file.write_all(hex::encode(arr).as_bytes())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(Key(arr))
}
