use std::path::Path;

use crate::config::schema::IntakeConfig;
use crate::error::ConfigError;
use crate::validation::jurisdiction_name;

const SCHEMA_JSON: &str = include_str!("../../../../schema/intake-config-v1.json");

pub const SUPPORTED_VERSION: &str = "1.0";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<IntakeConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<IntakeConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: IntakeConfig = serde_json::from_value(json_value)?;

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

pub fn validate_config(config: &IntakeConfig) -> Result<(), ConfigError> {
    if config.version != SUPPORTED_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "workerCount must be at least 1".to_string(),
        });
    }

    if config.cleanup_interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "cleanupIntervalSecs must be at least 1".to_string(),
        });
    }

    if config.max_pending == Some(0) {
        return Err(ConfigError::Validation {
            message: "maxPending must be at least 1 when set".to_string(),
        });
    }

    if let Some(code) = &config.buyer_jurisdiction {
        if jurisdiction_name(code).is_none() {
            return Err(ConfigError::Validation {
                message: format!("Unknown buyer jurisdiction code: {}", code),
            });
        }
    }

    Ok(())
}
