//! T100K Control - Network Abstraction Layer for T100K LED controllers
//!
//! This crate drives addressable RGB LED controllers over UDP:
//! - **Protocol**: bit-plane packing of 8 universes into fixed 1040-byte frames
//! - **Controller**: per-unit frame buffers with lock-protected pixel writes
//! - **Transport**: UDP sends and acknowledgment probing with timeouts
//! - **Scheduler**: a rate-limited, restartable background loop
//! - **NAL**: the orchestrator tying controllers, transport and loop together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use t100k_control::T100kNal;
//! use t100k_core::{Color, NalConfig, OutputItem};
//!
//! # #[tokio::main]
//! # async fn main() -> t100k_control::Result<()> {
//! let mut nal = T100kNal::new();
//! nal.initialize(NalConfig::default()).await?;
//! nal.start()?;
//! nal.update_data([OutputItem::new(0, 0, 0, Color::WHITE)])?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Packet encoder for a single controller
pub mod controller;
/// Error types
pub mod error;
/// Host network sanity check
pub mod interface;
/// Orchestrator
pub mod nal;
/// Wire protocol constants and frame layout
pub mod protocol;
/// Rate-limited background loop
pub mod scheduler;
/// UDP transport
pub mod transport;

// Re-exports
pub use controller::Controller;
pub use error::{NalError, Result};
pub use nal::{NalState, T100kNal};
pub use scheduler::{Liveness, RateLimitedLoop, Work};
pub use transport::Transport;
