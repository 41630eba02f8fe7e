//! Secret resolution and credential encryption.
//!
//! Secrets (the session encryption key, the default vision API key) are
//! looked up from three places, first match wins:
//!
//! 1. **Direct value** in the config file, for local testing
//! 2. **File reference**, for the Docker secrets pattern (`/run/secrets/...`)
//! 3. **Env var reference**, for production deployments
//!
//! [`CredentialCipher`] seals user-supplied API credentials with AES-256-GCM
//! before they are written to the session store.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use log::warn;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::fs;

use crate::config::SessionConfig;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source configured (value, file or env var)")]
    NoSourceProvided,

    #[error("Cannot read secret file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Secret env var '{name}' is not set")]
    EnvVarNotSet { name: String },

    #[error("Secret env var '{name}' is not valid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Unusable session key: {0}")]
    InvalidKey(String),

    #[error("Sealing failed: {0}")]
    EncryptionError(String),

    #[error("Ciphertext is malformed: {0}")]
    MalformedCiphertext(String),

    /// Wrong key, or the sealed value was altered.
    #[error("Ciphertext failed authentication")]
    AuthenticationFailed,

    #[error("No session encryption key configured and the insecure development key is not allowed in this build")]
    InsecureFallbackRefused,
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Where a secret may come from. Empty strings count as absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretSource<'a> {
    pub value: Option<&'a str>,
    pub file: Option<&'a str>,
    pub env_var: Option<&'a str>,
}

impl<'a> SecretSource<'a> {
    pub fn new(value: Option<&'a str>, file: Option<&'a str>, env_var: Option<&'a str>) -> Self {
        Self {
            value: value.filter(|s| !s.is_empty()),
            file: file.filter(|s| !s.is_empty()),
            env_var: env_var.filter(|s| !s.is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.value.is_some() || self.file.is_some() || self.env_var.is_some()
    }

    pub fn resolve(&self) -> Result<SecretString> {
        if let Some(value) = self.value {
            return Ok(SecretString::from(value.to_string()));
        }

        if let Some(path) = self.file {
            let expanded = expand_home(path);
            return fs::read_to_string(&expanded)
                .map(|content| SecretString::from(content.trim().to_string()))
                .map_err(|source| SecretError::FileReadError {
                    path: expanded,
                    source,
                });
        }

        if let Some(name) = self.env_var {
            return match std::env::var(name) {
                // Env vars commonly carry a trailing newline
                Ok(value) => Ok(SecretString::from(value.trim().to_string())),
                Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: name.to_string(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: name.to_string(),
                }),
            };
        }

        Err(SecretError::NoSourceProvided)
    }

    /// Like [`resolve`](Self::resolve), but a source that yields nothing
    /// (no source at all, or an unset env var) is `Ok(None)`.
    pub fn resolve_optional(&self) -> Result<Option<SecretString>> {
        match self.resolve() {
            Ok(secret) => Ok(Some(secret)),
            Err(SecretError::NoSourceProvided) | Err(SecretError::EnvVarNotSet { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Expands a leading `~` or `~/` to the current user's home directory.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

/// Seed for the development-only key. Anyone with the source can derive it.
const FALLBACK_KEY_SEED: &str = "ttpipe-development-session-key";

const NONCE_SIZE: usize = 12;

/// AES-256-GCM sealing of session credentials.
///
/// Sealed values are URL-safe base64 of `nonce(12) || ciphertext || tag`.
pub struct CredentialCipher {
    cipher: Aes256Gcm,
    insecure: bool,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("insecure", &self.insecure)
            .finish_non_exhaustive()
    }
}

impl CredentialCipher {
    /// Builds the cipher from the session config section.
    ///
    /// Debug builds may always fall back to the development key; release
    /// builds only when `allow_insecure_key_fallback` is set.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let source = SecretSource::new(
            config.key.as_deref(),
            config.key_file.as_deref(),
            config.key_env_var.as_deref(),
        );
        Self::from_source(
            &source,
            config.allow_insecure_key_fallback || cfg!(debug_assertions),
        )
    }

    pub fn from_source(source: &SecretSource<'_>, allow_fallback: bool) -> Result<Self> {
        match source.resolve_optional()? {
            Some(material) => Self::from_key_material(material.expose_secret()),
            None if allow_fallback => Self::insecure_fallback(),
            None => Err(SecretError::InsecureFallbackRefused),
        }
    }

    /// Accepts a 64-char hex key as raw bytes; any other non-empty string is
    /// treated as a passphrase and hashed down to 32 bytes.
    pub fn from_key_material(material: &str) -> Result<Self> {
        let material = material.trim();
        if material.is_empty() {
            return Err(SecretError::InvalidKey("key material is empty".to_string()));
        }
        if material.len() == 64 && material.chars().all(|c| c.is_ascii_hexdigit()) {
            return Self::from_hex_key(material);
        }
        Self::from_bytes(&Sha256::digest(material.as_bytes()), false)
    }

    pub fn from_hex_key(key_hex: &str) -> Result<Self> {
        let key_bytes = decode_hex_key(key_hex).map_err(SecretError::InvalidKey)?;

        if key_bytes.len() != 32 {
            return Err(SecretError::InvalidKey(format!(
                "expected 32 key bytes, got {}",
                key_bytes.len()
            )));
        }

        Self::from_bytes(&key_bytes, false)
    }

    fn insecure_fallback() -> Result<Self> {
        warn!(
            "No session encryption key configured; using the built-in development key. \
             Stored credentials are NOT protected. Configure session.key_env_var for production."
        );
        Self::from_bytes(&Sha256::digest(FALLBACK_KEY_SEED.as_bytes()), true)
    }

    fn from_bytes(key: &[u8], insecure: bool) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| SecretError::InvalidKey(format!("Failed to create cipher: {}", e)))?;
        Ok(Self { cipher, insecure })
    }

    /// True when running on the development key.
    pub fn is_insecure(&self) -> bool {
        self.insecure
    }

    /// Seals `plaintext` as URL-safe base64 of `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &SecretString) -> Result<String> {
        let nonce = rand_bytes::<NONCE_SIZE>()?;
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.expose_secret().as_bytes())
            .map_err(|e| SecretError::EncryptionError(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    pub fn decrypt(&self, sealed: &str) -> Result<SecretString> {
        let raw = URL_SAFE_NO_PAD
            .decode(sealed.trim())
            .map_err(|e| SecretError::MalformedCiphertext(e.to_string()))?;
        if raw.len() <= NONCE_SIZE {
            return Err(SecretError::MalformedCiphertext(format!(
                "{} bytes is too short for a sealed value",
                raw.len()
            )));
        }

        let (nonce, body) = raw.split_at(NONCE_SIZE);
        let opened = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| SecretError::AuthenticationFailed)?;

        String::from_utf8(opened)
            .map(SecretString::from)
            .map_err(|_| SecretError::MalformedCiphertext("plaintext is not UTF-8".to_string()))
    }
}

/// Decodes a 64-character hex key.
fn decode_hex_key(key_hex: &str) -> std::result::Result<Vec<u8>, String> {
    let digits = key_hex.trim().as_bytes();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits ({})", digits.len()));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).map_err(|_| "non-ASCII key".to_string())?;
            u8::from_str_radix(pair, 16).map_err(|_| format!("'{}' is not a hex byte", pair))
        })
        .collect()
}

fn rand_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    getrandom::fill(&mut buf)
        .map_err(|e| SecretError::EncryptionError(format!("no randomness available: {}", e)))?;
    Ok(buf)
}
