use crate::config::Config;
use crate::converter::Encoding;
use crate::queue::RetryPolicy;
use crate::session::Provider;

/// The slice of [`Config`] the orchestrator reads.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub quality_threshold: f64,
    pub preferred_encoding: Encoding,
    pub retry: RetryPolicy,
    /// Provider used when the job has no session settings.
    pub default_provider: Provider,
    pub default_model: Option<String>,
    /// Remove converted, compressed and preprocessed files after a run.
    pub cleanup_intermediates: bool,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            quality_threshold: config.quality_gate.threshold,
            preferred_encoding: config.conversion.preferred_encoding,
            retry: RetryPolicy::from_config(&config.queue),
            default_provider: config.ai.default_provider,
            default_model: Some(config.ai.default_model.clone()).filter(|m| !m.is_empty()),
            cleanup_intermediates: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
