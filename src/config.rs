// Configuration
// TOML file with environment overrides for backend, models and storage

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub generation: GenerationConfig,
    pub models: ModelConfig,
    pub storage: StorageConfig,
}

/// Generative backend connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 120,
            temperature: None,
        }
    }
}

/// Model selection per stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub analyzer: String,
    pub composer: String,
    pub narrator: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            analyzer: DEFAULT_MODEL.to_string(),
            composer: DEFAULT_MODEL.to_string(),
            narrator: DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Overrides the platform data directory
    pub data_dir: Option<PathBuf>,
    /// Record runs and artifacts in the SQLite ledger
    pub record_runs: bool,
    /// Write a JSONL stage trace per run
    pub trace: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: None,
            record_runs: true,
            trace: true,
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Config::default(),
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply overrides from `lookup` (the process environment in production)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY").or_else(|| non_empty("GOOGLE_API_KEY")) {
            self.generation.api_key = Some(key);
        }
        if let Some(url) = non_empty("ECHODEPICT_BASE_URL") {
            self.generation.base_url = url;
        }
        if let Some(dir) = non_empty("ECHODEPICT_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(model) = non_empty("ECHODEPICT_MODEL") {
            self.models = ModelConfig {
                analyzer: model.clone(),
                composer: model.clone(),
                narrator: model,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.generation.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.generation.timeout_secs, 120);
        assert_eq!(config.models.narrator, DEFAULT_MODEL);
        assert!(config.storage.record_runs);
        assert!(config.generation.api_key.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [models]
            composer = "gemini-1.5-pro"

            [storage]
            record_runs = false
            "#,
        )
        .unwrap();

        assert_eq!(config.models.composer, "gemini-1.5-pro");
        assert_eq!(config.models.analyzer, DEFAULT_MODEL);
        assert!(!config.storage.record_runs);
        assert!(config.storage.trace);
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml_str("[generation]\ntimeout_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GOOGLE_API_KEY", "google-key"),
            ("ECHODEPICT_DATA_DIR", "/tmp/echo"),
            ("ECHODEPICT_MODEL", "gemini-2.0-flash"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.generation.api_key.as_deref(), Some("google-key"));
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/tmp/echo")));
        assert_eq!(config.models.analyzer, "gemini-2.0-flash");
        assert_eq!(config.models.narrator, "gemini-2.0-flash");
    }

    #[test]
    fn test_gemini_key_wins_over_google_key() {
        let mut config = Config::default();
        config.apply_env(|name| match name {
            "GEMINI_API_KEY" => Some("gemini-key".to_string()),
            "GOOGLE_API_KEY" => Some("google-key".to_string()),
            _ => None,
        });

        assert_eq!(config.generation.api_key.as_deref(), Some("gemini-key"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
