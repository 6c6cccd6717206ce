//! Configuration Loader
//!
//! Environment-aware configuration loading: defaults, then the base TOML file,
//! then the environment-specific TOML file, then `FLOODGATE__*` variables.

use super::PromoteConfig;
use crate::error::Result;
use ::config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_FILE_STEM: &str = "floodgate";
const ENV_PREFIX: &str = "FLOODGATE";

/// Loaded configuration together with where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<PromoteConfig>,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> Result<ConfigManager> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> Result<ConfigManager> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> Result<ConfigManager> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = environment,
            config_directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::build(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = environment,
            batch_size = config.promotion.batch_size,
            bulk_request_size = config.promotion.bulk_request_size,
            dispatch_backend = ?config.dispatch.backend,
            status_store_backend = ?config.status_store.backend,
            "Configuration loaded successfully"
        );

        Ok(ConfigManager {
            config: Arc::new(config),
            environment: environment.to_string(),
            config_directory,
        })
    }

    /// Wrap an already-built configuration (tests, embedding callers)
    pub fn from_config(config: PromoteConfig, environment: &str) -> Result<ConfigManager> {
        config.validate()?;
        Ok(ConfigManager {
            config: Arc::new(config),
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        })
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &PromoteConfig {
        &self.config
    }

    /// Configuration as JSON with credentials masked, safe to print or log
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self.config.as_ref()).unwrap_or_default();
        sanitize_json(&mut value);
        value
    }

    /// Shared handle to the loaded configuration
    pub fn config_arc(&self) -> Arc<PromoteConfig> {
        Arc::clone(&self.config)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect the current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("FLOODGATE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("FLOODGATE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn build(config_directory: &Path, environment: &str) -> Result<PromoteConfig> {
        let base_file = config_directory.join(format!("{BASE_FILE_STEM}.toml"));
        let env_file = config_directory.join(format!("{BASE_FILE_STEM}.{environment}.toml"));

        let settings = Config::builder()
            .add_source(
                File::from(base_file.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                File::from(env_file.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize::<PromoteConfig>()?)
    }
}

/// Field names whose values never leave the process unmasked
const SENSITIVE_FIELDS: &[&str] = &["token", "key", "secret", "password", "database_url"];

fn sanitize_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (field, val) in map.iter_mut() {
                let field = field.to_lowercase();
                if SENSITIVE_FIELDS.iter().any(|pattern| field.contains(pattern)) {
                    if let serde_json::Value::String(secret) = val {
                        *val = serde_json::Value::String(super::mask_secret(secret).to_string());
                    } else if !val.is_null() {
                        *val = serde_json::Value::String("[MASKED]".to_string());
                    }
                } else {
                    sanitize_json(val);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(sanitize_json),
        _ => {}
    }
}
