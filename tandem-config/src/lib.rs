//! Configuration management for Tandem
//!
//! Configuration is split by domain (transport, logging), loaded from YAML,
//! overridden from `TANDEM_*` environment variables and validated before use.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    logging::{LogFormat, LogLevel, LoggingConfig},
    transport::TransportConfig,
    TandemConfig,
};
