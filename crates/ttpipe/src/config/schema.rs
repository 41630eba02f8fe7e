use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::converter::Encoding;
use crate::session::Provider;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub quality_gate: QualityGateConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            queue: QueueConfig::default(),
            quality_gate: QualityGateConfig::default(),
            broadcast: BroadcastConfig::default(),
            session: SessionConfig::default(),
            conversion: ConversionConfig::default(),
            compression: CompressionConfig::default(),
            ocr: OcrConfig::default(),
            ai: AiConfig::default(),
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Total attempts per stage, first try included.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_job_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_concurrency() -> usize {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_job_timeout_ms() -> u64 {
    600_000
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl QueueConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            timeout_ms: default_job_timeout_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGateConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    0.80
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Delay between a terminal event and closing the document's sinks.
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
}

fn default_close_grace_ms() -> u64 {
    1000
}

impl BroadcastConfig {
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            close_grace_ms: default_close_grace_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_timeout")]
    pub default_timeout_minutes: u32,
    #[serde(default = "default_allowed_timeouts")]
    pub allowed_timeout_minutes: Vec<u32>,
    /// Encryption key, direct value. Local testing only.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub key_file: Option<String>,
    #[serde(default = "default_session_key_env")]
    pub key_env_var: Option<String>,
    /// Permit the built-in development key in release builds.
    #[serde(default)]
    pub allow_insecure_key_fallback: bool,
}

fn default_session_timeout() -> u32 {
    7
}

fn default_allowed_timeouts() -> Vec<u32> {
    vec![7, 15, 30]
}

fn default_session_key_env() -> Option<String> {
    Some("TTPIPE_SESSION_KEY".to_string())
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_timeout_minutes: default_session_timeout(),
            allowed_timeout_minutes: default_allowed_timeouts(),
            key: None,
            key_file: None,
            key_env_var: default_session_key_env(),
            allow_insecure_key_fallback: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    #[serde(default = "default_preferred_encoding")]
    pub preferred_encoding: Encoding,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Resolution used when rasterizing the first page of a PDF.
    #[serde(default = "default_dpi")]
    pub pdf_dpi: u32,
}

fn default_preferred_encoding() -> Encoding {
    Encoding::Jpeg
}

fn default_jpeg_quality() -> u8 {
    90
}

fn default_dpi() -> u32 {
    300
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            preferred_encoding: default_preferred_encoding(),
            jpeg_quality: default_jpeg_quality(),
            pdf_dpi: default_dpi(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Longest edge after compression, in pixels.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_compression_quality")]
    pub jpeg_quality: u8,
}

fn default_max_dimension() -> u32 {
    2000
}

fn default_compression_quality() -> u8 {
    80
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            jpeg_quality: default_compression_quality(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default = "default_contrast")]
    pub contrast: f32,
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

fn default_contrast() -> f32 {
    20.0
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            contrast: default_contrast(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_provider")]
    pub default_provider: Provider,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env_var: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> Provider {
    Provider::Claude
}

fn default_model() -> String {
    "claude-3-opus-20240229".to_string()
}

fn default_api_key_env() -> Option<String> {
    Some("ANTHROPIC_API_KEY".to_string())
}

fn default_endpoint() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_model: default_model(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_api_key_env(),
            endpoint: default_endpoint(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}
