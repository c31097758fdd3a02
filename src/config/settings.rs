//! Application settings loaded from `config.toml` and environment variables.
//!
//! The TOML file is optional; every value has a default. Environment variables
//! (`DATABASE_URL`, `MODEL_PATH`, `HOST`, `PORT`) take precedence over the file so
//! deployments can override single values without shipping a config file.

use crate::config::database::DEFAULT_DATABASE_URL;
use crate::errors::{Error, Result};
use crate::ml::{ModelType, TrainingParams};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default location of the persisted model artefact.
pub const DEFAULT_MODEL_PATH: &str = "models/sales_forecast_model.json";

/// Structure of `config.toml`
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerSection,
    /// Model storage and training defaults
    #[serde(default)]
    pub model: ModelSection,
}

/// `[server]` table
#[derive(Debug, Default, Deserialize)]
pub struct ServerSection {
    /// Interface to bind (default `0.0.0.0`)
    pub host: Option<String>,
    /// Port to bind (default 8000)
    pub port: Option<u16>,
}

/// `[model]` table
#[derive(Debug, Default, Deserialize)]
pub struct ModelSection {
    /// Where the trained model is stored
    pub path: Option<PathBuf>,
    /// Model type used when a retrain request does not name one
    pub default_type: Option<String>,
    pub test_size: Option<f64>,
    pub random_state: Option<u64>,
    pub n_neighbors: Option<usize>,
    pub max_depth: Option<usize>,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Connection string handed to `SeaORM`
    pub database_url: String,
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Model artefact location
    pub model_path: PathBuf,
    /// Defaults for training runs
    pub training: TrainingParams,
}

impl AppConfig {
    /// Merges file values, environment overrides and defaults.
    ///
    /// `env` looks up a variable by name; production passes `std::env::var`.
    pub fn resolve<F>(file: FileConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = env("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let host = env("HOST")
            .or(file.server.host)
            .unwrap_or_else(|| "0.0.0.0".to_string());

        let port = match env("PORT") {
            Some(raw) => raw.parse().map_err(|e| Error::Config {
                message: format!("Invalid PORT '{raw}': {e}"),
            })?,
            None => file.server.port.unwrap_or(8000),
        };

        let model_path = env("MODEL_PATH")
            .map(PathBuf::from)
            .or(file.model.path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));

        let defaults = TrainingParams::default();
        let model_type = file
            .model
            .default_type
            .as_deref()
            .map(str::parse::<ModelType>)
            .transpose()
            .map_err(|e| Error::Config {
                message: format!("Invalid [model].default_type: {e}"),
            })?
            .unwrap_or(defaults.model_type);

        let training = TrainingParams {
            model_type,
            test_size: file.model.test_size.unwrap_or(defaults.test_size),
            random_state: file.model.random_state.unwrap_or(defaults.random_state),
            n_neighbors: file.model.n_neighbors.unwrap_or(defaults.n_neighbors),
            max_depth: file.model.max_depth.or(defaults.max_depth),
        };
        training.validate().map_err(|e| Error::Config {
            message: format!("Invalid [model] training defaults: {e}"),
        })?;

        Ok(Self {
            database_url,
            host,
            port,
            model_path,
            training,
        })
    }

    /// `host:port` string for the listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Loads `config.toml` from `path`; a missing file yields the defaults.
pub fn load_file_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        debug!("No configuration file at {:?}, using defaults", path_ref);
        return Ok(FileConfig::default());
    }

    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {path_ref:?}: {e}"),
    })?;
    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse TOML from config file {path_ref:?}: {e}"),
    })
}

/// Loads the application configuration from `CONFIG_PATH` (default `config.toml`)
/// and the process environment.
pub fn load_app_configuration() -> Result<AppConfig> {
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let file = load_file_config(&config_path)?;
    let config = AppConfig::resolve(file, |key| std::env::var(key).ok())?;
    info!(
        "Configuration loaded: bind {}, model path {:?}, default model {}",
        config.bind_address(),
        config.model_path,
        config.training.model_type
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_file_or_env() {
        let config = AppConfig::resolve(FileConfig::default(), env_from(&[])).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
        assert_eq!(config.training, TrainingParams::default());
    }

    #[test]
    fn test_parse_file_config() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [model]
            path = "/tmp/model.json"
            default_type = "knn"
            n_neighbors = 7
            test_size = 0.25
        "#;

        let file: FileConfig = toml::from_str(toml_str).unwrap();
        let config = AppConfig::resolve(file, env_from(&[])).unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:9000");
        assert_eq!(config.model_path, PathBuf::from("/tmp/model.json"));
        assert_eq!(config.training.model_type, ModelType::Knn);
        assert_eq!(config.training.n_neighbors, 7);
        assert_eq!(config.training.test_size, 0.25);
        assert_eq!(config.training.random_state, 42);
    }

    #[test]
    fn test_env_overrides_file() {
        let file: FileConfig = toml::from_str("[server]\nport = 9000\n").unwrap();
        let env = env_from(&[
            ("PORT", "7000"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("MODEL_PATH", "elsewhere/model.json"),
        ]);
        let config = AppConfig::resolve(file, env).unwrap();

        assert_eq!(config.port, 7000);
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.model_path, PathBuf::from("elsewhere/model.json"));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let bad_port = AppConfig::resolve(FileConfig::default(), env_from(&[("PORT", "http")]));
        assert!(matches!(bad_port, Err(Error::Config { .. })));

        let file: FileConfig = toml::from_str("[model]\ndefault_type = \"svm\"\n").unwrap();
        assert!(matches!(
            AppConfig::resolve(file, env_from(&[])),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = load_file_config(dir.path().join("absent.toml")).unwrap();
        assert!(file.server.port.is_none());
        assert!(file.model.path.is_none());
    }
}
