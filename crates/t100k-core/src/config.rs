//! NAL configuration
//!
//! Handles loading the application configuration from TOML, including the
//! network settings consumed by the NAL and the logging settings consumed by
//! the front end.

use crate::{CoreError, LogConfig, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

/// Host octet of controller 0; controller `n` answers on `subnet.(50 + n)`
pub const CONTROLLER_HOST_OFFSET: u8 = 50;

/// Highest controller count whose addresses still fit in one octet
pub const MAX_CONTROLLER_COUNT: u8 = u8::MAX - CONTROLLER_HOST_OFFSET;

/// Default UDP port the controllers listen on
pub const DEFAULT_PORT: u16 = 5000;

/// Network abstraction layer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NalConfig {
    /// Require the host to own an address on the controller subnet
    pub strict_address_check: bool,
    /// Number of controllers, addressed as ids `0..max_controller_count`
    pub max_controller_count: u8,
    /// Target refresh rate in frames per second
    pub target_frame_rate: u32,
    /// Controller subnet base (the host octet is ignored)
    pub subnet: Ipv4Addr,
    /// Remote UDP port of every controller
    pub port: u16,
    /// How long to wait for a controller acknowledgment
    pub ack_timeout_ms: u64,
    /// Keep-alive refresh period when no updates arrive (defaults to the
    /// frame interval)
    pub idle_refresh_ms: Option<u64>,
    /// Grace period granted to a running cycle on stop
    pub stop_grace_ms: u64,
}

impl Default for NalConfig {
    fn default() -> Self {
        Self {
            strict_address_check: true,
            max_controller_count: 128,
            target_frame_rate: 4,
            subnet: Ipv4Addr::new(192, 168, 1, 0),
            port: DEFAULT_PORT,
            ack_timeout_ms: 20,
            idle_refresh_ms: None,
            stop_grace_ms: 1000,
        }
    }
}

impl NalConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.target_frame_rate == 0 || self.target_frame_rate > 1000 {
            return Err(CoreError::InvalidConfig(format!(
                "target_frame_rate {} must be within 1..=1000",
                self.target_frame_rate
            )));
        }
        if self.max_controller_count > MAX_CONTROLLER_COUNT {
            return Err(CoreError::InvalidConfig(format!(
                "max_controller_count {} exceeds {} (host octet would overflow)",
                self.max_controller_count, MAX_CONTROLLER_COUNT
            )));
        }
        if self.idle_refresh_ms == Some(0) {
            return Err(CoreError::InvalidConfig(
                "idle_refresh_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Minimum time between the starts of two send cycles
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.target_frame_rate.max(1)))
    }

    /// Keep-alive refresh period
    pub fn idle_refresh(&self) -> Duration {
        self.idle_refresh_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.min_interval())
    }

    /// Acknowledgment wait per controller
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Stop grace period
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Network address of a controller
    pub fn controller_addr(&self, controller_id: u8) -> Ipv4Addr {
        let [a, b, c, _] = self.subnet.octets();
        Ipv4Addr::new(a, b, c, CONTROLLER_HOST_OFFSET.saturating_add(controller_id))
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Network settings
    pub nal: NalConfig,
    /// Logging settings
    pub logging: LogConfig,
}

impl AppConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        config.nal.validate()?;
        Ok(config)
    }

    /// Load configuration from file, or return defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }
}
