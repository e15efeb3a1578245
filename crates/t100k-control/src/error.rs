//! Error types for the network abstraction layer
use crate::nal::NalState;
use thiserror::Error;

/// NAL errors
#[derive(Error, Debug)]
pub enum NalError {
    /// The host has no address on the controller subnet
    #[error("No usable network interface: {0}")]
    NoUsableInterface(String),

    /// Pixel index outside `0..1024`
    #[error("Pixel index {0} out of range (must be 0-1023)")]
    PixelOutOfRange(u16),

    /// Universe outside `0..8`
    #[error("Universe {0} out of range (must be 0-7)")]
    UniverseOutOfRange(u8),

    /// Controller id not configured
    #[error("Unknown controller {id} (configured: {count})")]
    UnknownController {
        /// Requested id
        id: u8,
        /// Number of configured controllers
        count: usize,
    },

    /// Operation not allowed in the current lifecycle state
    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        /// Attempted operation
        operation: &'static str,
        /// Current state
        state: NalState,
    },

    /// Configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] t100k_core::CoreError),

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for NAL operations
pub type Result<T> = std::result::Result<T, NalError>;
