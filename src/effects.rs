/*!
 # Effect catalog

 The effects a strip can run and the pure functions that draw them. Every
 frame is derived from the effect, its parameters, the frame index and the
 strip length alone, so a render task never carries pixel state between frames.
*/

use std::fmt;
use std::time::Duration;

use crate::color::{hue_wheel, Rgb};

/// Available effects.
///
/// The discriminants are persisted as the `effect` byte, so they must never be
/// renumbered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Effect {
    /// All pixels dark
    Off = 0,
    /// Whole strip in the palette color
    SolidColor = 1,
    /// Hue wheel spread across the strip
    #[default]
    Rainbow = 2,
    /// One pixel bouncing end to end, cycling red, green, blue
    Enumerate = 3,
    /// Every third pixel lit in the palette color, chasing
    Marquee = 4,
    /// Random pixels lit in the palette color
    Twinkle = 5,
    /// Every third pixel lit in rainbow colors, chasing
    RainbowMarquee = 6,
}

/// Order visited by the cycle touch pad. `Off` and `Enumerate` are never cycled to.
pub const CYCLE_ORDER: [Effect; 5] = [
    Effect::SolidColor,
    Effect::Rainbow,
    Effect::Marquee,
    Effect::Twinkle,
    Effect::RainbowMarquee,
];

/// Off renders black at its own fixed cadence
const OFF_FRAME_DELAY: Duration = Duration::from_millis(50);
const TWINKLE_DELAY_FACTOR: u32 = 4;
const MARQUEE_SPACING: usize = 3;

/// Payload prefixes on the mode topic, checked in this order
const MODE_PAYLOADS: [(&str, Effect); 6] = [
    ("rainbow", Effect::Rainbow),
    ("color", Effect::SolidColor),
    ("enumerate", Effect::Enumerate),
    ("twinkle", Effect::Twinkle),
    ("marquee", Effect::Marquee),
    ("rmarquee", Effect::RainbowMarquee),
];

impl Effect {
    pub const ALL: [Effect; 7] = [
        Effect::Off,
        Effect::SolidColor,
        Effect::Rainbow,
        Effect::Enumerate,
        Effect::Marquee,
        Effect::Twinkle,
        Effect::RainbowMarquee,
    ];

    /// Stable byte used for persistence
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    /// Parse a mode payload. Matching is case-sensitive on the payload prefix.
    pub fn from_payload(payload: &str) -> Option<Self> {
        MODE_PAYLOADS
            .iter()
            .find(|(prefix, _)| payload.starts_with(prefix))
            .map(|(_, effect)| *effect)
    }

    /// The effect the cycle pad moves to from `self`.
    ///
    /// Effects outside the cycle (`Off`, `Enumerate`) continue with the next
    /// cyclable effect by ordinal.
    pub fn next_in_cycle(self) -> Self {
        match CYCLE_ORDER.iter().position(|effect| *effect == self) {
            Some(index) => CYCLE_ORDER[(index + 1) % CYCLE_ORDER.len()],
            None => CYCLE_ORDER
                .iter()
                .copied()
                .find(|effect| effect.ordinal() > self.ordinal())
                .unwrap_or(CYCLE_ORDER[0]),
        }
    }

    /// Time between frames for a given speed delay (milliseconds)
    pub fn frame_delay(self, speed: u8) -> Duration {
        let speed = Duration::from_millis(u64::from(speed));
        match self {
            Effect::Off => OFF_FRAME_DELAY,
            Effect::Twinkle => speed * TWINKLE_DELAY_FACTOR,
            _ => speed,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Effect::Off => "off",
            Effect::SolidColor => "color",
            Effect::Rainbow => "rainbow",
            Effect::Enumerate => "enumerate",
            Effect::Marquee => "marquee",
            Effect::Twinkle => "twinkle",
            Effect::RainbowMarquee => "rmarquee",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters shared by all effects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameParams {
    /// Color used by the palette-based effects
    pub palette: Rgb,
    /// 0-255, applied to every channel before transmission
    pub brightness: u8,
    /// Percent chance (0-100) that a twinkle pixel is lit
    pub twinkle_density: u8,
}

impl Default for FrameParams {
    fn default() -> Self {
        Self {
            palette: Rgb::WARM,
            brightness: 64,
            twinkle_density: 25,
        }
    }
}

/// Draw frame `frame_index` of `effect` for a strip of `pixel_count` pixels
pub fn next_frame(
    effect: Effect,
    params: &FrameParams,
    frame_index: u64,
    pixel_count: usize,
) -> Vec<Rgb> {
    if pixel_count == 0 {
        return Vec::new();
    }

    let lit = params.palette.scaled(params.brightness);
    match effect {
        Effect::Off => vec![Rgb::BLACK; pixel_count],
        Effect::SolidColor => vec![lit; pixel_count],
        Effect::Rainbow => {
            let base = frame_index as u16;
            (0..pixel_count)
                .map(|i| {
                    let offset = (i * 65536 / pixel_count) as u16;
                    hue_wheel(base.wrapping_add(offset)).scaled(params.brightness)
                })
                .collect()
        }
        Effect::Enumerate => enumerate(params.brightness, frame_index, pixel_count),
        Effect::Marquee => marquee(pixel_count, frame_index, |_| lit),
        Effect::RainbowMarquee => marquee(pixel_count, frame_index, |i| {
            hue_wheel((i * 65536 / pixel_count) as u16).scaled(params.brightness)
        }),
        Effect::Twinkle => {
            let mut rng = fastrand::Rng::with_seed(frame_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
            (0..pixel_count)
                .map(|_| {
                    if rng.u8(0..100) < params.twinkle_density {
                        lit
                    } else {
                        Rgb::BLACK
                    }
                })
                .collect()
        }
    }
}

/// Every third pixel lit, the whole pattern rotated one pixel right per frame
fn marquee(pixel_count: usize, frame_index: u64, color_at: impl Fn(usize) -> Rgb) -> Vec<Rgb> {
    let mut pixels: Vec<Rgb> = (0..pixel_count)
        .map(|i| {
            if i % MARQUEE_SPACING == 0 {
                color_at(i)
            } else {
                Rgb::BLACK
            }
        })
        .collect();
    pixels.rotate_right((frame_index % pixel_count as u64) as usize);
    pixels
}

fn enumerate(brightness: u8, frame_index: u64, pixel_count: usize) -> Vec<Rgb> {
    const SWEEP_COLORS: [Rgb; 3] = [Rgb::RED, Rgb::GREEN, Rgb::BLUE];

    let len = pixel_count as u64;
    let sweep = frame_index / len;
    let step = (frame_index % len) as usize;
    // Even sweeps walk forward, odd sweeps walk back
    let position = if sweep % 2 == 0 {
        step
    } else {
        pixel_count - 1 - step
    };

    let mut pixels = vec![Rgb::BLACK; pixel_count];
    pixels[position] = SWEEP_COLORS[(sweep % 3) as usize].scaled(brightness);
    pixels
}
