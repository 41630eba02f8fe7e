//! Vision-model extraction of structured timetable data.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use log::debug;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::collaborators::{ExtractionRequest, ProgressFn};
use crate::config::AiConfig;
use crate::converter::Encoding;
use crate::error::CollaboratorError;
use crate::session::Provider;

#[async_trait]
pub trait VisionExtractor: Send + Sync {
    fn provider(&self) -> Provider;

    fn default_model(&self) -> &str;

    /// Returns the timetable as JSON. `progress` may be called any number of
    /// times with the share of work done so far.
    async fn extract(
        &self,
        request: &ExtractionRequest,
        progress: ProgressFn<'_>,
    ) -> Result<serde_json::Value, CollaboratorError>;
}

/// Extractors by provider.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<Provider, Arc<dyn VisionExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extractor: Arc<dyn VisionExtractor>) {
        self.extractors.insert(extractor.provider(), extractor);
    }

    pub fn with(mut self, extractor: Arc<dyn VisionExtractor>) -> Self {
        self.register(extractor);
        self
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn VisionExtractor>> {
        self.extractors.get(&provider).cloned()
    }

    pub fn contains(&self, provider: Provider) -> bool {
        self.extractors.contains_key(&provider)
    }
}

const NAME: &str = "claude";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = r#"You are an expert at extracting school timetable data from images.

Analyze the provided timetable image and extract all scheduled events.

Return a JSON object with this exact structure:
{
  "teacher": "Teacher name (if visible)",
  "className": "Class name (if visible)",
  "term": "Term/semester (if visible)",
  "year": 2024,
  "timeblocks": [
    {
      "day": "Monday|Tuesday|Wednesday|Thursday|Friday",
      "name": "Event/subject name (preserve exact spelling)",
      "startTime": "HH:MM (24-hour)",
      "endTime": "HH:MM (24-hour)",
      "notes": "Any additional details"
    }
  ]
}

Rules:
1. Preserve original event names exactly as written
2. Convert all times to 24-hour format (HH:MM)
3. If only a duration is given, calculate the end time
4. Extract ALL events, even if partially visible
5. For merged cells spanning several slots, use the full time range
6. Mark any uncertainty in the notes field
7. Return ONLY valid JSON, no additional text"#;

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Messages API client.
pub struct ClaudeExtractor {
    http: reqwest::Client,
    endpoint: String,
    default_model: String,
    max_tokens: u32,
    timeout: Duration,
    api_key: Option<SecretString>,
}

impl ClaudeExtractor {
    pub fn new(config: &AiConfig, api_key: Option<SecretString>) -> Result<Self, CollaboratorError> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let http = reqwest::Client::builder()
            .user_agent(concat!("ttpipe/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::unavailable(NAME, e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            default_model: config.default_model.clone(),
            max_tokens: config.max_tokens,
            timeout,
            api_key,
        })
    }

    fn request_body(&self, model: &str, media_type: &str, image_b64: String) -> serde_json::Value {
        json!({
            "model": model,
            "max_tokens": self.max_tokens,
            "temperature": 0,
            "system": SYSTEM_PROMPT,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": { "type": "base64", "media_type": media_type, "data": image_b64 }
                    },
                    { "type": "text", "text": "Extract this timetable as JSON." }
                ]
            }]
        })
    }
}

#[async_trait]
impl VisionExtractor for ClaudeExtractor {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn extract(
        &self,
        request: &ExtractionRequest,
        progress: ProgressFn<'_>,
    ) -> Result<serde_json::Value, CollaboratorError> {
        let api_key = request
            .credential
            .as_ref()
            .or(self.api_key.as_ref())
            .ok_or_else(|| CollaboratorError::rejected(NAME, "invalid credential: no API key configured"))?;
        let model = request.model.as_deref().unwrap_or(&self.default_model);

        let image = tokio::fs::read(&request.image_path)
            .await
            .map_err(|e| CollaboratorError::rejected(NAME, format!("cannot read image: {}", e)))?;
        let media_type = Encoding::from_path(&request.image_path)
            .unwrap_or(Encoding::Png)
            .mime_type();
        let body = self.request_body(
            model,
            media_type,
            base64::engine::general_purpose::STANDARD.encode(&image),
        );
        progress(10);

        debug!("Calling vision model {} ({} byte image)", model, image.len());
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), model));
        }
        progress(70);

        let reply: MessagesResponse = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;
        let text: String = reply
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        let data = serde_json::from_str(extract_json(&text)).map_err(|e| {
            CollaboratorError::rejected(NAME, format!("model reply was not valid JSON: {}", e))
        })?;
        progress(100);
        Ok(data)
    }
}

impl ClaudeExtractor {
    fn transport_error(&self, e: reqwest::Error) -> CollaboratorError {
        if e.is_timeout() {
            CollaboratorError::Timeout {
                collaborator: NAME,
                after_ms: self.timeout.as_millis() as u64,
            }
        } else {
            // reqwest errors carry the URL, never headers
            CollaboratorError::unavailable(NAME, e.without_url().to_string())
        }
    }
}

/// Maps an HTTP error status to a collaborator error whose message starts
/// with a recognizable hint.
pub(crate) fn classify_status(status: u16, model: &str) -> CollaboratorError {
    match status {
        401 | 403 => CollaboratorError::rejected(NAME, format!("invalid credential (HTTP {})", status)),
        404 => CollaboratorError::rejected(NAME, format!("model not found: {}", model)),
        408 | 504 => CollaboratorError::Timeout {
            collaborator: NAME,
            after_ms: 0,
        },
        429 => CollaboratorError::unavailable(NAME, "rate limited (HTTP 429)"),
        500..=599 => CollaboratorError::unavailable(NAME, format!("server error (HTTP {})", status)),
        _ => CollaboratorError::rejected(NAME, format!("request refused (HTTP {})", status)),
    }
}

/// Pulls the JSON object out of a model reply that may wrap it in a
/// markdown fence or surrounding prose.
pub(crate) fn extract_json(text: &str) -> &str {
    for fence in ["```json", "```"] {
        if let Some(start) = text.find(fence) {
            let body = &text[start + fence.len()..];
            if let Some(end) = body.find("```") {
                return body[..end].trim();
            }
        }
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text.trim(),
    }
}
