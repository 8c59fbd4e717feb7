use std::path::{Path, PathBuf};

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use thiserror::Error;
use tracing::warn;

use crate::utils::config::AppConfig;

/// Length of the AES-256 key in raw bytes.
const KEY_LEN: usize = 32;
/// Length of the AES-GCM nonce prepended to every ciphertext.
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("ciphertext failed authentication")]
    InvalidToken,
    #[error("invalid vault key: {0}")]
    InvalidKey(String),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
}

/// Symmetric authenticated-encryption facility for user provider credentials.
///
/// Ciphertext layout is `base64(nonce ‖ aes256gcm(plaintext))`. Tampering with
/// either part surfaces as [`VaultError::InvalidToken`].
pub struct SecretVault {
    cipher: Aes256Gcm,
}

impl SecretVault {
    /// Resolves the vault key and builds the cipher. Resolution order:
    /// explicit base64 key from config/env, key file named by config/env, the
    /// persistent path under the data root, a development path under the
    /// working directory, and finally a freshly generated key written to the
    /// persistent path with owner-only permissions.
    pub fn from_config(config: &AppConfig) -> Result<Self, VaultError> {
        if let Some(encoded) = config.secret_key.as_deref().filter(|v| !v.is_empty()) {
            return Self::from_encoded_key(encoded);
        }

        if let Some(path) = config.secret_key_file.as_deref().filter(|v| !v.is_empty()) {
            return Self::from_key_file(Path::new(path));
        }

        let persistent = config.secrets_dir().join("fernet.key");
        if persistent.is_file() {
            return Self::from_key_file(&persistent);
        }

        let development = PathBuf::from("./.secrets/fernet.key");
        if development.is_file() {
            return Self::from_key_file(&development);
        }

        let key = Aes256Gcm::generate_key(&mut OsRng);
        write_key_file(&persistent, &BASE64.encode(key))?;
        warn!(
            path = %persistent.display(),
            "No vault key configured, generated a new one"
        );

        Ok(Self {
            cipher: Aes256Gcm::new(&key),
        })
    }

    pub fn from_encoded_key(encoded: &str) -> Result<Self, VaultError> {
        let raw = BASE64
            .decode(encoded.trim())
            .map_err(|e| VaultError::InvalidKey(e.to_string()))?;

        if raw.len() != KEY_LEN {
            return Err(VaultError::InvalidKey(format!(
                "expected {KEY_LEN} key bytes, got {}",
                raw.len()
            )));
        }

        let key = Key::<Aes256Gcm>::from_slice(&raw);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    fn from_key_file(path: &Path) -> Result<Self, VaultError> {
        let encoded = std::fs::read_to_string(path)?;
        Self::from_encoded_key(&encoded)
    }

    pub fn encrypt(&self, plain: &str) -> Result<String, VaultError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plain.as_bytes())
            .map_err(|_| VaultError::InvalidToken)?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(payload))
    }

    pub fn decrypt(&self, token: &str) -> Result<String, VaultError> {
        let raw = BASE64
            .decode(token.trim())
            .map_err(|_| VaultError::InvalidToken)?;

        if raw.len() <= NONCE_LEN {
            return Err(VaultError::InvalidToken);
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::InvalidToken)?;

        String::from_utf8(plain).map_err(|_| VaultError::InvalidToken)
    }
}

fn write_key_file(path: &Path, encoded: &str) -> Result<(), VaultError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, encoded)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}
