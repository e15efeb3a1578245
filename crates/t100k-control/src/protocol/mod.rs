//! T100K wire protocol
//!
//! The controllers speak a fixed-size, bit-packed UDP protocol on port 5000.
//!
//! ## Markers
//!
//! - Start marker `C5 77 88 00 00` primes a controller before its data.
//! - Continuation marker `AA 00 66 00 00` follows the last data frame and
//!   asks the controller to acknowledge.
//!
//! ## Data frames
//!
//! Each controller drives 8 universes of 1024 pixels, spread over 16 frames
//! of 1040 bytes:
//!
//! ```text
//! ┌──────────────┬──────────────────────────────┬───────────┐
//! │ Header (12)  │ 64 pixel slots × 16 bytes    │ Zero (4)  │
//! │ 88 idx EA .. │ marker, R4..R0, G4..G0, B4..B0│           │
//! └──────────────┴──────────────────────────────┴───────────┘
//! ```
//!
//! Every byte of a pixel slot is a bit plane: bit `u` belongs to universe
//! `u`, so the same 16 bytes carry one pixel for all 8 universes at once.
//! Only the 5 most significant bits of each color channel are sent.
//!
//! ## Send sequence
//!
//! Per controller and cycle: 16 data frames (1 ms apart), continuation
//! marker, acknowledgment wait, 1 ms pause, start marker.

pub mod frame;

pub use frame::{Frame, FRAME_COUNT, FRAME_LEN, PIXELS_PER_FRAME};

use std::time::Duration;

/// Primes a controller for its next data burst
pub const START_MARKER: [u8; 5] = [0xC5, 0x77, 0x88, 0x00, 0x00];

/// Terminates a data burst and requests an acknowledgment
pub const CONTINUATION_MARKER: [u8; 5] = [0xAA, 0x00, 0x66, 0x00, 0x00];

/// Pause between two data frames
pub const FRAME_PACING: Duration = Duration::from_millis(1);

/// Pause between the acknowledgment wait and the start marker
pub const MARKER_PACING: Duration = Duration::from_millis(1);
