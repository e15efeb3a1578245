//! Packet encoder for one T100K controller
//!
//! A [`Controller`] owns the 16 data frames that describe every pixel of its
//! 8 universes. Pixel writes patch the frames in place, so a send cycle only
//! has to copy the current frames out and put them on the wire.

use crate::error::{NalError, Result};
use crate::protocol::frame::{self, Frame, FRAME_COUNT};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use t100k_core::{Color, CHANNELS_PER_UNIVERSE, UNIVERSE_COUNT};

/// All frames of one controller
pub type Frames = [Frame; FRAME_COUNT];

/// Encoded output state of one hardware controller
pub struct Controller {
    id: u8,
    endpoint: SocketAddr,
    packets: Mutex<Box<Frames>>,
    enabled: AtomicBool,
    online: AtomicBool,
}

impl Controller {
    /// Create a controller with every pixel black
    pub fn new(id: u8, endpoint: SocketAddr) -> Self {
        let packets = Box::new(std::array::from_fn(|index| frame::blank_frame(index as u8)));
        Self {
            id,
            endpoint,
            packets: Mutex::new(packets),
            enabled: AtomicBool::new(false),
            online: AtomicBool::new(false),
        }
    }

    /// Controller id
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Remote address the frames are sent to
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Whether the controller has been written to and needs refreshing
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Whether the last send cycle got an acknowledgment
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    /// Record acknowledgment status, returning true when it changed
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::Relaxed) != online
    }

    /// Set one pixel of one universe
    ///
    /// Marks the controller enabled on every successful write.
    pub fn set_pixel(&self, universe: u8, channel: u16, color: Color) -> Result<()> {
        check_bounds(universe, channel)?;
        let (index, offset) = frame::locate(channel);
        {
            let mut packets = self.packets.lock();
            frame::encode_pixel(&mut packets[index], offset, universe, color);
        }
        self.enabled.store(true, Ordering::Release);
        tracing::trace!(
            "Controller {} universe {} pixel {} -> {}",
            self.id,
            universe,
            channel,
            color
        );
        Ok(())
    }

    /// Read back a pixel as it will be transmitted
    pub fn pixel(&self, universe: u8, channel: u16) -> Result<Color> {
        check_bounds(universe, channel)?;
        let (index, offset) = frame::locate(channel);
        let packets = self.packets.lock();
        Ok(frame::decode_pixel(&packets[index], offset, universe))
    }

    /// Copy of the current frames
    pub fn snapshot(&self) -> Box<Frames> {
        self.packets.lock().clone()
    }
}

fn check_bounds(universe: u8, channel: u16) -> Result<()> {
    if universe >= UNIVERSE_COUNT {
        return Err(NalError::UniverseOutOfRange(universe));
    }
    if channel >= CHANNELS_PER_UNIVERSE {
        return Err(NalError::PixelOutOfRange(channel));
    }
    Ok(())
}
