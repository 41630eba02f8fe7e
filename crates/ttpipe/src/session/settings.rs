use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Extraction backend chosen for a session. `Tesseract` means OCR only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Tesseract,
    Claude,
    OpenAi,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Tesseract => "tesseract",
            Provider::Claude => "claude",
            Provider::OpenAi => "openai",
            Provider::Google => "google",
        }
    }

    /// Whether this provider uses a vision model at all.
    pub fn is_ai(&self) -> bool {
        !matches!(self, Provider::Tesseract)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tesseract" => Ok(Provider::Tesseract),
            "claude" => Ok(Provider::Claude),
            "openai" => Ok(Provider::OpenAi),
            "google" => Ok(Provider::Google),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Per-session AI preferences. The credential stays plaintext only in memory.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub provider: Provider,
    pub model: Option<String>,
    pub credential: Option<SecretString>,
    pub timeout_minutes: Option<u32>,
}

impl SessionSettings {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            model: None,
            credential: None,
            timeout_minutes: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_credential(mut self, credential: SecretString) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_timeout_minutes(mut self, minutes: u32) -> Self {
        self.timeout_minutes = Some(minutes);
        self
    }
}

/// Record as it sits in the key-value store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredSettings {
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_credential: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_serde_names() {
        assert_eq!(serde_json::to_string(&Provider::OpenAi).unwrap(), "\"openai\"");
        assert_eq!(
            serde_json::from_str::<Provider>("\"tesseract\"").unwrap(),
            Provider::Tesseract
        );
        assert_eq!("Claude".parse::<Provider>().unwrap(), Provider::Claude);
        assert!("bard".parse::<Provider>().is_err());
    }

    #[test]
    fn test_stored_record_field_names() {
        let record = StoredSettings {
            provider: Provider::Claude,
            model: Some("claude-3-opus-20240229".to_string()),
            encrypted_credential: Some("abcd".to_string()),
            timeout_minutes: Some(15),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["encryptedCredential"], "abcd");
        assert_eq!(json["timeoutMinutes"], 15);
        assert_eq!(json["provider"], "claude");
    }
}
