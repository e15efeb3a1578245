//! Data frame layout and bit-plane packing

use t100k_core::{Color, CHANNELS_PER_UNIVERSE};

/// Size of one data frame on the wire
pub const FRAME_LEN: usize = 1040;

/// Frames needed to cover a full universe
pub const FRAME_COUNT: usize = 16;

/// Pixels carried by one frame
pub const PIXELS_PER_FRAME: usize = 64;

/// Fixed frame header length
pub const HEADER_LEN: usize = 12;

/// Bytes per pixel slot
pub const SLOT_LEN: usize = 16;

/// Zero trailer length
pub const TRAILER_LEN: usize = 4;

/// Bits transmitted per color channel
pub const COLOR_BITS: usize = 5;

/// First slot byte; the marker bit is set for every universe
pub const SLOT_SEPARATOR: u8 = 0xFF;

/// Header bytes after the leading `0x88` and the frame index
const HEADER_TAIL: [u8; HEADER_LEN - 2] =
    [0xEA, 0x33, 0xF1, 0x88, 0x00, 0xE0, 0x32, 0x22, 0x14, 0x7F];

/// One encoded data frame
pub type Frame = [u8; FRAME_LEN];

const _: () = assert!(HEADER_LEN + PIXELS_PER_FRAME * SLOT_LEN + TRAILER_LEN == FRAME_LEN);
const _: () = assert!(FRAME_COUNT * PIXELS_PER_FRAME == CHANNELS_PER_UNIVERSE as usize);

/// Build frame `index` with every pixel black in every universe
pub fn blank_frame(index: u8) -> Frame {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = 0x88;
    frame[1] = index;
    frame[2..HEADER_LEN].copy_from_slice(&HEADER_TAIL);

    for slot in 0..PIXELS_PER_FRAME {
        frame[HEADER_LEN + slot * SLOT_LEN] = SLOT_SEPARATOR;
    }
    frame
}

/// Frame index and slot byte offset of a pixel
///
/// The caller guarantees `channel < 1024`.
pub fn locate(channel: u16) -> (usize, usize) {
    let channel = channel as usize;
    let frame = channel / PIXELS_PER_FRAME;
    let offset = HEADER_LEN + (channel % PIXELS_PER_FRAME) * SLOT_LEN;
    (frame, offset)
}

/// Write one universe's bits of the slot at `offset`
///
/// Only bit `universe` of the 15 color bytes changes; the separator byte and
/// the other universes' bits are left as they are.
pub fn encode_pixel(frame: &mut Frame, offset: usize, universe: u8, color: Color) {
    let mask = 1u8 << universe;
    for (plane, value) in color.channels().into_iter().enumerate() {
        let reduced = value >> 3;
        let base = offset + 1 + plane * COLOR_BITS;
        for bit in 0..COLOR_BITS {
            let byte = &mut frame[base + bit];
            if reduced & (1 << (COLOR_BITS - 1 - bit)) != 0 {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
        }
    }
}

/// Read one universe's color back from the slot at `offset`
///
/// The three discarded low bits come back as zero.
pub fn decode_pixel(frame: &Frame, offset: usize, universe: u8) -> Color {
    let mask = 1u8 << universe;
    let mut channels = [0u8; 3];
    for (plane, value) in channels.iter_mut().enumerate() {
        let base = offset + 1 + plane * COLOR_BITS;
        let reduced = (0..COLOR_BITS).fold(0u8, |acc, bit| {
            (acc << 1) | u8::from(frame[base + bit] & mask != 0)
        });
        *value = reduced << 3;
    }
    Color::from(channels)
}
