/*!
 # Touch input

 Three capacitive pads control the sign without the network: power, cycle and
 brightness. Each pad is sampled every period `T` and turned into discrete
 events by an independent state machine.

 Power and cycle emit a single `Pressed` per continuous touch. Brightness
 free-runs instead, emitting `Held` on every tick so the level can ramp while
 the finger stays on the pad. Only the power pad detects a long press.
*/

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, trace, warn};

use crate::command::CommandAdapter;
use crate::orchestrator::OrchestratorHandle;
use crate::{Error, Result};

/// Raw readings below this (and above zero) mean a finger is on the pad
pub const TOUCH_THRESHOLD: u16 = 500;
/// Reading reported by an untouched pad
pub const UNTOUCHED_READING: u16 = 1000;
/// Reading reported by a touched pad
pub const TOUCHED_READING: u16 = 200;
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(200);
pub const LONG_PRESS_THRESHOLD: Duration = Duration::from_millis(10_000);

/// Physical touch pads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TouchChannel {
    Power,
    Cycle,
    Brightness,
}

impl TouchChannel {
    pub const ALL: [TouchChannel; 3] = [
        TouchChannel::Power,
        TouchChannel::Cycle,
        TouchChannel::Brightness,
    ];

    fn index(self) -> usize {
        match self {
            TouchChannel::Power => 0,
            TouchChannel::Cycle => 1,
            TouchChannel::Brightness => 2,
        }
    }

    fn debounced(self) -> bool {
        !matches!(self, TouchChannel::Brightness)
    }
}

impl fmt::Display for TouchChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TouchChannel::Power => "power",
            TouchChannel::Cycle => "cycle",
            TouchChannel::Brightness => "brightness",
        })
    }
}

impl FromStr for TouchChannel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "power" => Ok(TouchChannel::Power),
            "cycle" => Ok(TouchChannel::Cycle),
            "brightness" => Ok(TouchChannel::Brightness),
            other => Err(Error::UnknownTouchPad(other.to_string())),
        }
    }
}

/// Events produced by the debouncer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchEvent {
    /// Start of a touch on a debounced pad
    Pressed(TouchChannel),
    /// Touch held past the long-press threshold; fires once per touch
    LongPressed(TouchChannel),
    /// One tick of a free-running pad while touched
    Held(TouchChannel),
    /// Finger lifted after being held for `held`
    Released { channel: TouchChannel, held: Duration },
}

/// Per-pad state, reset when the finger is lifted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TouchInputState {
    /// Accumulated contact time of the current touch
    pub held: Duration,
    /// Set once a long press fired; the accumulator stops growing until release
    pub long_press_latched: bool,
}

/// `true` when a raw reading indicates contact
pub fn is_contact(raw: u16) -> bool {
    raw != 0 && raw < TOUCH_THRESHOLD
}

/// Edge detection for all pads
#[derive(Debug, Clone)]
pub struct TouchDebouncer {
    period: Duration,
    long_press: Duration,
    states: [TouchInputState; 3],
}

impl Default for TouchDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_PERIOD)
    }
}

impl TouchDebouncer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            long_press: LONG_PRESS_THRESHOLD,
            states: [TouchInputState::default(); 3],
        }
    }

    #[must_use]
    pub fn with_long_press(mut self, threshold: Duration) -> Self {
        self.long_press = threshold;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self, channel: TouchChannel) -> TouchInputState {
        self.states[channel.index()]
    }

    /// Feed one sampling tick for `channel`
    pub fn sample(&mut self, channel: TouchChannel, raw: u16) -> Option<TouchEvent> {
        let period = self.period;
        let long_press = self.long_press;
        let state = &mut self.states[channel.index()];

        if !is_contact(raw) {
            if state.held.is_zero() {
                return None;
            }
            let held = state.held;
            *state = TouchInputState::default();
            return Some(TouchEvent::Released { channel, held });
        }

        if !channel.debounced() {
            state.held += period;
            return Some(TouchEvent::Held(channel));
        }

        if state.long_press_latched {
            return None;
        }

        state.held += period;
        if state.held < period * 2 {
            return Some(TouchEvent::Pressed(channel));
        }

        if channel == TouchChannel::Power && state.held > long_press {
            state.long_press_latched = true;
            return Some(TouchEvent::LongPressed(channel));
        }

        None
    }
}

/// Source of raw touch readings
pub trait TouchSensor: Send + 'static {
    fn read_raw(&mut self, channel: TouchChannel) -> Result<u16>;
}

/// Touch pads driven from software. Clones share the pads.
#[derive(Debug, Clone)]
pub struct VirtualTouchPad {
    readings: Arc<[AtomicU16; 3]>,
}

impl Default for VirtualTouchPad {
    fn default() -> Self {
        Self {
            readings: Arc::new([
                AtomicU16::new(UNTOUCHED_READING),
                AtomicU16::new(UNTOUCHED_READING),
                AtomicU16::new(UNTOUCHED_READING),
            ]),
        }
    }
}

impl VirtualTouchPad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_raw(&self, channel: TouchChannel, raw: u16) {
        self.readings[channel.index()].store(raw, Ordering::Relaxed);
    }

    pub fn press(&self, channel: TouchChannel) {
        self.set_raw(channel, TOUCHED_READING);
    }

    pub fn release(&self, channel: TouchChannel) {
        self.set_raw(channel, UNTOUCHED_READING);
    }
}

impl TouchSensor for VirtualTouchPad {
    fn read_raw(&mut self, channel: TouchChannel) -> Result<u16> {
        Ok(self.readings[channel.index()].load(Ordering::Relaxed))
    }
}

/// Sample every pad each `debouncer.period()` and forward the resulting
/// commands. Returns once the orchestrator stops accepting commands.
#[instrument(skip(sensor, debouncer, handle))]
pub async fn poll_touch<T: TouchSensor>(
    mut sensor: T,
    mut debouncer: TouchDebouncer,
    handle: OrchestratorHandle,
) {
    info!("Polling touch pads every {:?}", debouncer.period());
    loop {
        for channel in TouchChannel::ALL {
            let raw = match sensor.read_raw(channel) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Reading {} pad failed: {}", channel, e);
                    continue;
                }
            };
            trace!("{} pad raw reading {}", channel, raw);

            let Some(event) = debouncer.sample(channel, raw) else {
                continue;
            };
            debug!("Touch event {:?}", event);
            if let Some(command) = CommandAdapter::from_touch(event) {
                if handle.send(command).is_err() {
                    info!("Orchestrator closed, touch polling stops");
                    return;
                }
            }
        }
        tokio::time::sleep(debouncer.period()).await;
    }
}
