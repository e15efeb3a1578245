//! T100K Core - Data Model
//!
//! This crate contains the data model shared by the T100K network abstraction
//! layer and its front ends:
//! - Color values and output update requests
//! - NAL configuration with defaults and validation
//! - Logging configuration
//! - The console command syntax

#![warn(missing_docs)]

use thiserror::Error;

pub mod color;
pub mod config;
pub mod logging;
pub mod output;

pub use color::Color;
pub use config::{AppConfig, NalConfig};
pub use logging::LogConfig;
pub use output::{OutputItem, CHANNELS_PER_UNIVERSE, UNIVERSE_COUNT};

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// A color string could not be parsed
    #[error("Invalid color '{0}': expected RRGGBB, #RRGGBB or 0xRRGGBB")]
    InvalidColor(String),

    /// A console command line could not be parsed
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Configuration values are out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
