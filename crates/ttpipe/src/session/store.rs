use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::config::SessionConfig;
use crate::sanitize::hash_id;
use crate::secrets::{CredentialCipher, SecretError};
use crate::session::kv::KvStore;
use crate::session::settings::{SessionSettings, StoredSettings};
use crate::session::SessionError;

const KEY_PREFIX: &str = "llm_settings:";

/// Encrypted, expiring per-session AI settings.
///
/// An unreachable backing store degrades to "not stored" / "nothing
/// stored" with a warning. A ciphertext that fails authentication is always
/// surfaced as [`SessionError::EncryptionAuthFailure`].
pub struct SessionStore {
    kv: Arc<dyn KvStore>,
    cipher: Arc<CredentialCipher>,
    default_timeout_minutes: u32,
    allowed_timeout_minutes: Vec<u32>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KvStore>, cipher: Arc<CredentialCipher>, config: &SessionConfig) -> Self {
        Self {
            kv,
            cipher,
            default_timeout_minutes: config.default_timeout_minutes,
            allowed_timeout_minutes: config.allowed_timeout_minutes.clone(),
        }
    }

    pub fn allowed_timeout_minutes(&self) -> &[u32] {
        &self.allowed_timeout_minutes
    }

    fn key(session_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, session_id)
    }

    fn ttl_for(&self, override_ttl: Option<Duration>, preferred_minutes: Option<u32>) -> Duration {
        override_ttl.unwrap_or_else(|| {
            let minutes = preferred_minutes.unwrap_or(self.default_timeout_minutes);
            Duration::from_secs(u64::from(minutes) * 60)
        })
    }

    fn check_timeout(&self, minutes: u32) -> Result<(), SessionError> {
        if self.allowed_timeout_minutes.contains(&minutes) {
            Ok(())
        } else {
            Err(SessionError::InvalidTimeout {
                minutes,
                allowed: self.allowed_timeout_minutes.clone(),
            })
        }
    }

    /// Seals and stores `settings`. Returns `Ok(false)` when the backing
    /// store could not be written.
    pub async fn set_settings(
        &self,
        session_id: &str,
        settings: &SessionSettings,
        ttl: Option<Duration>,
    ) -> Result<bool, SessionError> {
        if let Some(minutes) = settings.timeout_minutes {
            self.check_timeout(minutes)?;
        }

        let encrypted_credential = settings
            .credential
            .as_ref()
            .map(|credential| self.cipher.encrypt(credential))
            .transpose()
            .map_err(|e| SessionError::Encryption(e.to_string()))?;

        let record = StoredSettings {
            provider: settings.provider,
            model: settings.model.clone(),
            encrypted_credential,
            timeout_minutes: settings.timeout_minutes,
        };
        let payload = serde_json::to_string(&record)
            .map_err(|e| SessionError::MalformedRecord(e.to_string()))?;
        let ttl = self.ttl_for(ttl, settings.timeout_minutes);

        match self.kv.set_ex(&Self::key(session_id), payload, ttl).await {
            Ok(()) => {
                debug!(
                    "Stored settings for session {} (provider {}, ttl {}s)",
                    hash_id(session_id),
                    record.provider,
                    ttl.as_secs()
                );
                Ok(true)
            }
            Err(e) => {
                warn!(
                    "Could not store settings for session {}: {}",
                    hash_id(session_id),
                    e
                );
                Ok(false)
            }
        }
    }

    /// Returns the decrypted settings, or `None` when absent, expired, or the
    /// store is unreachable.
    pub async fn get_settings(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionSettings>, SessionError> {
        let Some(record) = self.read_record(session_id).await? else {
            return Ok(None);
        };

        let credential = match record.encrypted_credential.as_deref() {
            Some(sealed) => Some(self.cipher.decrypt(sealed).map_err(|e| match e {
                SecretError::AuthenticationFailed => {
                    warn!(
                        "Stored credential for session {} failed authentication",
                        hash_id(session_id)
                    );
                    SessionError::EncryptionAuthFailure
                }
                other => SessionError::MalformedRecord(other.to_string()),
            })?),
            None => None,
        };

        Ok(Some(SessionSettings {
            provider: record.provider,
            model: record.model,
            credential,
            timeout_minutes: record.timeout_minutes,
        }))
    }

    async fn read_record(&self, session_id: &str) -> Result<Option<StoredSettings>, SessionError> {
        let payload = match self.kv.get(&Self::key(session_id)).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(
                    "Could not read settings for session {}: {}",
                    hash_id(session_id),
                    e
                );
                return Ok(None);
            }
        };

        serde_json::from_str(&payload)
            .map(Some)
            .map_err(|e| SessionError::MalformedRecord(e.to_string()))
    }

    /// Pushes the expiry of an existing record forward. The TTL is the
    /// override if given, else the stored preference, else the default.
    /// Never recreates an expired record.
    pub async fn extend(&self, session_id: &str, timeout_minutes: Option<u32>) -> bool {
        if let Some(minutes) = timeout_minutes {
            if let Err(e) = self.check_timeout(minutes) {
                warn!("Refusing to extend session {}: {}", hash_id(session_id), e);
                return false;
            }
        }

        let record = match self.read_record(session_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return false,
            Err(e) => {
                warn!(
                    "Cannot extend session {}: {}",
                    hash_id(session_id),
                    e
                );
                return false;
            }
        };

        let ttl = self.ttl_for(None, timeout_minutes.or(record.timeout_minutes));
        match self.kv.expire(&Self::key(session_id), ttl).await {
            Ok(extended) => {
                if extended {
                    debug!(
                        "Extended session {} by {}s",
                        hash_id(session_id),
                        ttl.as_secs()
                    );
                }
                extended
            }
            Err(e) => {
                warn!("Could not extend session {}: {}", hash_id(session_id), e);
                false
            }
        }
    }

    pub async fn exists(&self, session_id: &str) -> bool {
        match self.kv.exists(&Self::key(session_id)).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(
                    "Could not check session {}: {}",
                    hash_id(session_id),
                    e
                );
                false
            }
        }
    }

    /// Deletes the record. Missing records are fine.
    pub async fn clear(&self, session_id: &str) {
        if let Err(e) = self.kv.del(&Self::key(session_id)).await {
            warn!("Could not clear session {}: {}", hash_id(session_id), e);
        }
    }
}
