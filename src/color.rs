/*!
 # Colors

 RGB pixels, `#rrggbb` palette strings, the hue wheel used by the rainbow
 effects and the brightness scaling applied before transmission.
*/

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// A single pixel color, one byte per channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const GREEN: Rgb = Rgb::new(0, 255, 0);
    pub const BLUE: Rgb = Rgb::new(0, 0, 255);
    /// Yellowish orange, like the bulbs of a real marquee
    pub const WARM: Rgb = Rgb::new(0xff, 0x82, 0x00);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `rrggbb`, with or without a leading `#`
    pub fn from_hex(s: &str) -> Result<Self> {
        let digits = s.trim();
        let digits = digits.strip_prefix('#').unwrap_or(digits);
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidColor(s.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).map_err(|_| Error::InvalidColor(s.to_string()))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    /// `#rrggbb`, the form the palette is persisted in
    pub fn to_hex(self) -> String {
        self.to_string()
    }

    /// Scale every channel by `brightness / 255`, rounding to nearest
    pub fn scaled(self, brightness: u8) -> Self {
        Self::new(
            scale_channel(self.r, brightness),
            scale_channel(self.g, brightness),
            scale_channel(self.b, brightness),
        )
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

/// `round(raw × brightness / 255)` in integer math
pub const fn scale_channel(raw: u8, brightness: u8) -> u8 {
    ((raw as u16 * brightness as u16 + 127) / 255) as u8
}

/// Fully saturated color at a position on the hue wheel.
///
/// The wheel is split into six equal segments over the full `u16` range, so
/// `hue` 0 is red, ~21845 is green and ~43690 is blue.
pub fn hue_wheel(hue: u16) -> Rgb {
    const SEGMENT: u32 = 65536 / 6;
    let hue = u32::from(hue);
    let segment = (hue / SEGMENT).min(5);
    let offset = hue - segment * SEGMENT;
    let rising = ((offset * 255) / SEGMENT).min(255) as u8;
    let falling = 255 - rising;

    match segment {
        0 => Rgb::new(255, rising, 0),
        1 => Rgb::new(falling, 255, 0),
        2 => Rgb::new(0, 255, rising),
        3 => Rgb::new(0, falling, 255),
        4 => Rgb::new(rising, 0, 255),
        _ => Rgb::new(255, 0, falling),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_channel_rounds() {
        assert_eq!(scale_channel(255, 255), 255);
        assert_eq!(scale_channel(255, 0), 0);
        assert_eq!(scale_channel(255, 64), 64);
        assert_eq!(scale_channel(0x82, 64), 33);
        assert_eq!(scale_channel(1, 128), 1);
    }

    #[test]
    fn test_hex_accepts_optional_hash() {
        assert_eq!(Rgb::from_hex("ff8200").unwrap(), Rgb::WARM);
        assert_eq!(Rgb::from_hex("#FF8200").unwrap(), Rgb::WARM);
        assert_eq!(Rgb::WARM.to_hex(), "#ff8200");
    }

    #[test]
    fn test_hex_rejects_garbage() {
        assert!(Rgb::from_hex("ff82").is_err());
        assert!(Rgb::from_hex("gg0000").is_err());
        assert!(Rgb::from_hex("#ff82000").is_err());
    }

    #[test]
    fn test_hue_wheel_primaries() {
        assert_eq!(hue_wheel(0), Rgb::RED);
        assert_eq!(hue_wheel(21845).g, 255);
        assert_eq!(hue_wheel(43690).b, 255);
        assert_eq!(hue_wheel(u16::MAX).r, 255);
    }
}
