use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Cross-field checks the schema cannot express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    let gate = config.quality_gate.threshold;
    if !(0.0..=1.0).contains(&gate) {
        return Err(invalid(format!(
            "quality_gate.threshold must be within [0, 1], got {}",
            gate
        )));
    }

    if config.queue.concurrency == 0 {
        return Err(invalid("queue.concurrency must be at least 1".to_string()));
    }
    if config.queue.max_retries == 0 {
        return Err(invalid("queue.max_retries must be at least 1".to_string()));
    }
    if config.queue.timeout_ms == 0 {
        return Err(invalid("queue.timeout_ms must be positive".to_string()));
    }

    let session = &config.session;
    if session.allowed_timeout_minutes.is_empty() {
        return Err(invalid(
            "session.allowed_timeout_minutes must not be empty".to_string(),
        ));
    }
    if !session
        .allowed_timeout_minutes
        .contains(&session.default_timeout_minutes)
    {
        return Err(invalid(format!(
            "session.default_timeout_minutes ({}) is not one of {:?}",
            session.default_timeout_minutes, session.allowed_timeout_minutes
        )));
    }

    Ok(())
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Validation { message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::Encoding;
    use crate::session::Provider;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();

        assert_eq!(config.queue.concurrency, 2);
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.queue.timeout_ms, 600_000);
        assert!((config.quality_gate.threshold - 0.80).abs() < f64::EPSILON);
        assert_eq!(config.broadcast.close_grace_ms, 1000);
        assert_eq!(config.session.default_timeout_minutes, 7);
        assert_eq!(config.session.allowed_timeout_minutes, vec![7, 15, 30]);
        assert_eq!(
            config.session.key_env_var.as_deref(),
            Some("TTPIPE_SESSION_KEY")
        );
        assert!(!config.session.allow_insecure_key_fallback);
        assert_eq!(config.conversion.preferred_encoding, Encoding::Jpeg);
        assert_eq!(config.ai.default_provider, Provider::Claude);
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "version": "1.0",
            "queue": { "concurrency": 4, "max_retries": 5, "timeout_ms": 30000, "retry_backoff_ms": 10 },
            "quality_gate": { "threshold": 0.9 },
            "broadcast": { "close_grace_ms": 250 },
            "session": { "default_timeout_minutes": 15, "key_env_var": "MY_KEY" },
            "conversion": { "preferred_encoding": "png" },
            "ai": { "default_provider": "tesseract" },
            "database": { "path": "/tmp/ttpipe.db" },
            "server": { "bind": "0.0.0.0:9000" }
        }"#;

        let config = load_config_from_str(json).unwrap();
        assert_eq!(config.queue.concurrency, 4);
        assert_eq!(config.queue.job_timeout().as_millis(), 30_000);
        assert!((config.quality_gate.threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.session.default_timeout_minutes, 15);
        assert_eq!(config.conversion.preferred_encoding, Encoding::Png);
        assert_eq!(config.ai.default_provider, Provider::Tesseract);
        assert_eq!(config.database.path.as_deref(), Some("/tmp/ttpipe.db"));
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn test_invalid_version() {
        let result = load_config_from_str(r#"{ "version": "2.0" }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_missing_version_fails_schema() {
        let result = load_config_from_str(r#"{ "queue": { "concurrency": 1 } }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "quality_gate": { "threshold": 1.5 } }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result =
            load_config_from_str(r#"{ "version": "1.0", "queue": { "concurrency": 0 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_timeout_must_be_allowed() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "session": { "default_timeout_minutes": 9 } }"#,
        );
        match result {
            Err(ConfigError::Validation { message }) => {
                assert!(message.contains("default_timeout_minutes"))
            }
            Err(ConfigError::SchemaValidation { .. }) => {}
            other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result =
            load_config_from_str(r#"{ "version": "1.0", "ai": { "default_provider": "mystery" } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_config_passes_validation() {
        assert!(validate_config(&Config::default()).is_ok());
    }
}
