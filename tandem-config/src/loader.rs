//! Configuration loading and environment variable handling

use crate::domains::TandemConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "TANDEM".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<TandemConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: TandemConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<TandemConfig> {
        let mut config = TandemConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<TandemConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut TandemConfig) -> ConfigResult<()> {
        self.apply_transport_overrides(&mut config.transport)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    /// Apply transport config overrides
    fn apply_transport_overrides(
        &self,
        config: &mut crate::domains::transport::TransportConfig,
    ) -> ConfigResult<()> {
        if let Some(address) = self.parse_env_var("BIND_ADDRESS")? {
            config.bind_address = address;
        }

        if let Some(port) = self.parse_env_var("BASE_PORT")? {
            config.base_port = port;
        }

        if let Some(attempts) = self.parse_env_var("MAX_BIND_ATTEMPTS")? {
            config.max_bind_attempts = attempts;
        }

        if let Some(seconds) = self.parse_env_var::<u64>("CONNECT_TIMEOUT_SECONDS")? {
            config.connect_timeout = Duration::from_secs(seconds);
        }

        if let Some(seconds) = self.parse_env_var::<u64>("RESULT_TIMEOUT_SECONDS")? {
            config.result_timeout = Some(Duration::from_secs(seconds));
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Some(level) = self.parse_env_var("LOG_LEVEL")? {
            config.level = level;
        }

        if let Some(format) = self.parse_env_var("LOG_FORMAT")? {
            config.format = format;
        }

        Ok(())
    }

    /// Read and parse a prefixed variable; unset means no override
    fn parse_env_var<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_env_var(name) {
            Ok(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::EnvError(format!("Invalid {}_{}: {}", self.prefix, name, e))),
            Err(_) => Ok(None),
        }
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
