//! Domain-specific configuration modules

pub mod logging;
pub mod transport;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Tandem configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TandemConfig {
    /// Worker channel configuration
    #[serde(default)]
    pub transport: transport::TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl TandemConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.transport.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = TandemConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_parses_back_to_defaults() {
        let sample = TandemConfig::generate_sample();
        let parsed: TandemConfig = serde_yaml::from_str(&sample).unwrap();
        assert_eq!(parsed, TandemConfig::default());
        assert!(parsed.validate_all().is_ok());
    }
}
