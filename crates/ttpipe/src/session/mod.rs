//! Per-session AI provider settings with encrypted credentials and a
//! sliding expiry.

pub mod kv;
pub mod settings;
pub mod store;

pub use kv::{KvStore, MemoryKvStore, StoreError};
pub use settings::{Provider, SessionSettings};
pub use store::SessionStore;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The sealed credential failed authentication. The record is corrupt or
    /// was altered; the user has to enter the credential again.
    #[error("Stored credential could not be decrypted; please re-enter it")]
    EncryptionAuthFailure,

    #[error("Failed to encrypt credential: {0}")]
    Encryption(String),

    #[error("Session timeout of {minutes} minutes is not allowed (allowed: {allowed:?})")]
    InvalidTimeout { minutes: u32, allowed: Vec<u32> },

    #[error("Stored session record is malformed: {0}")]
    MalformedRecord(String),
}
