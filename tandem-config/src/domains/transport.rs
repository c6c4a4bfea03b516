//! Worker channel configuration

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

/// Port, timeout and framing settings for the host/worker channel pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Address both listening endpoints bind to
    pub bind_address: IpAddr,

    /// First candidate port for the outbound (request) endpoint. The inbound
    /// endpoint searches from the outbound port + 1.
    pub base_port: u16,

    /// Candidate ports tried per endpoint before giving up
    pub max_bind_attempts: u32,

    /// How long the first send waits for the worker to connect
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Largest frame accepted or sent, in bytes
    pub max_frame_length: usize,

    /// Optional deadline applied by tools waiting on a result
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub result_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: 2336,
            max_bind_attempts: 100,
            connect_timeout: Duration::from_secs(30),
            max_frame_length: 256 * 1024 * 1024,
            result_timeout: None,
        }
    }
}

impl Validatable for TransportConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.base_port, "base_port", self.domain_name())?;
        validate_positive(self.max_bind_attempts, "max_bind_attempts", self.domain_name())?;
        validate_positive(self.max_frame_length, "max_frame_length", self.domain_name())?;

        if self.connect_timeout.is_zero() {
            return Err(self.validation_error("connect_timeout must be greater than 0"));
        }

        if self.max_frame_length > u32::MAX as usize {
            return Err(self.validation_error(format!(
                "max_frame_length must fit a 4-byte length prefix, got {}",
                self.max_frame_length
            )));
        }

        if matches!(self.result_timeout, Some(timeout) if timeout.is_zero()) {
            return Err(self.validation_error("result_timeout must be greater than 0 when set"));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "transport"
    }
}
