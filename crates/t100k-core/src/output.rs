//! Output update requests
//!
//! An [`OutputItem`] addresses one pixel of one universe on one controller.
//! Items are produced by a front end (for instance the interactive console,
//! which accepts `controllerId universeId channel colorHex` lines) and handed
//! to the NAL, which consumes them once.

use crate::{Color, CoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of independent universes per controller
pub const UNIVERSE_COUNT: u8 = 8;

/// Number of addressable pixels per universe
pub const CHANNELS_PER_UNIVERSE: u16 = 1024;

/// A single pixel update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputItem {
    /// Target controller (0..max_controller_count)
    pub controller_id: u8,
    /// Target universe (0..8)
    pub universe_id: u8,
    /// Pixel index within the universe (0..1024)
    pub channel: u16,
    /// New pixel color
    pub color: Color,
}

impl OutputItem {
    /// Create a new update request
    pub fn new(controller_id: u8, universe_id: u8, channel: u16, color: Color) -> Self {
        Self {
            controller_id,
            universe_id,
            channel,
            color,
        }
    }
}

impl fmt::Display for OutputItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.controller_id, self.universe_id, self.channel, self.color
        )
    }
}

/// Parses the console syntax `controllerId universeId channel colorHex`.
///
/// Numeric fields only have to fit their integer types here; range checks
/// against the running configuration happen in the NAL.
impl FromStr for OutputItem {
    type Err = CoreError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [controller, universe, channel, color] = fields.as_slice() else {
            return Err(CoreError::InvalidCommand(format!(
                "expected 4 fields (controllerId universeId channel colorHex), got {}",
                fields.len()
            )));
        };

        let controller_id = parse_field(controller, "controllerId")?;
        let universe_id = parse_field(universe, "universeId")?;
        let channel = parse_field(channel, "channel")?;
        let color = color.parse()?;

        Ok(OutputItem::new(controller_id, universe_id, channel, color))
    }
}

fn parse_field<T: FromStr>(raw: &str, name: &str) -> Result<T, CoreError> {
    raw.parse()
        .map_err(|_| CoreError::InvalidCommand(format!("{} '{}' is not a valid number", name, raw)))
}
