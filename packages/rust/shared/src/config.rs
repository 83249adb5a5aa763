//! Application configuration for refsync.
//!
//! Config is a TOML file (`refsync.toml` by default) loaded once at startup.
//! Missing API values are fatal; everything else falls back to defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RefsyncError, Result};

// ---------------------------------------------------------------------------
// Config structs (matching refsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote record-store settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// External converter settings.
    #[serde(default)]
    pub converter: ConverterConfig,

    /// Local persistence settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Debug logging toggle.
    #[serde(default)]
    pub debug: DebugConfig,
}

/// `[api]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bearer token for the bulk API.
    #[serde(default)]
    pub bearer_token: String,

    /// Record group to pull and process.
    #[serde(default)]
    pub group_id: i64,

    /// Base URL of the bulk API endpoint.
    #[serde(default)]
    pub bulk_api_url: String,
}

/// `[converter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Command invoked on conversion artifacts; must print text to stdout.
    #[serde(default = "default_converter_command")]
    pub command: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            command: default_converter_command(),
        }
    }
}

fn default_converter_command() -> String {
    "markitdown".into()
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the database, the run log, and their archives.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    ".".into()
}

/// `[debug]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugConfig {
    /// When set, the run log records debug-level decision traces.
    #[serde(default)]
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RefsyncError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        RefsyncError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Check that the API section is complete enough to talk to the remote store.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.api.bearer_token.is_empty() {
        return Err(RefsyncError::config("api.bearer_token is not set"));
    }
    if config.api.bulk_api_url.is_empty() {
        return Err(RefsyncError::config("api.bulk_api_url is not set"));
    }
    if config.api.group_id == 0 {
        return Err(RefsyncError::config("api.group_id is not set"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_config() -> AppConfig {
        AppConfig {
            api: ApiConfig {
                bearer_token: "secret".into(),
                group_id: 12,
                bulk_api_url: "https://kb.example.com/api/bulk".into(),
            },
            ..AppConfig::default()
        }
    }

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("markitdown"));
        assert!(toml_str.contains("data_dir"));
    }

    #[test]
    fn config_roundtrip() {
        let config = complete_config();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.api.group_id, 12);
        assert_eq!(parsed.converter.command, "markitdown");
        assert!(!parsed.debug.enabled);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
[api]
bearer_token = "t"
group_id = 5
bulk_api_url = "https://example.com/bulk"

[debug]
enabled = true
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert!(config.debug.enabled);
        assert_eq!(config.converter.command, "markitdown");
        assert_eq!(config.storage.data_dir, ".");
    }

    #[test]
    fn validation_rejects_missing_api_values() {
        let result = validate_config(&AppConfig::default());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("bearer_token"));

        let mut config = complete_config();
        config.api.bulk_api_url.clear();
        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("bulk_api_url"));

        let mut config = complete_config();
        config.api.group_id = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn validation_accepts_complete_config() {
        assert!(validate_config(&complete_config()).is_ok());
    }
}
