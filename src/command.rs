/*!
 # Commands

 Every input source (bus messages, touch pads, the CLI) is normalized into an
 `EffectCommand` before it reaches the orchestrator.
*/

use tracing::{debug, warn};

use crate::bus::BusEvent;
use crate::color::Rgb;
use crate::effects::Effect;
use crate::touch::{TouchChannel, TouchEvent};
use crate::{Error, Result};

/// A request to change the show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectCommand {
    /// Switch to a specific effect
    SetEffect(Effect),
    /// `false` turns the strip off, `true` resumes the last effect
    Power(bool),
    /// Power pad press: off when on, on when off
    TogglePower,
    /// Advance to the next cyclable effect
    Cycle,
    SetPalette(Rgb),
    /// Speed 0-255, higher is faster
    SetSpeed(u8),
    /// Brightness 1-255; 0 is ignored
    SetBrightness(u8),
    /// One brightness pad tick: step the level without persisting it
    RampBrightness,
    /// Brightness pad released: persist the ramped level
    PersistBrightness,
    /// Restart the current effect even though nothing changed
    Restart,
    /// Power pad held past the long-press threshold
    LongPress,
    /// Show a status indication. Nothing is persisted, so a reboot brings
    /// back the stored show.
    Indicate { palette: Rgb, effect: Effect },
}

/// Fully qualified bus topics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub mode: String,
    pub control: String,
    pub color: String,
    pub speed: String,
    pub brightness: String,
}

impl Topics {
    pub const DEFAULT_PREFIX: &'static str = "marquee";

    /// `<prefix>/mode`, `<prefix>/control`, ...
    pub fn with_prefix(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        let topic = |suffix: &str| format!("{prefix}/{suffix}");
        Self {
            mode: topic("mode"),
            control: topic("control"),
            color: topic("color"),
            speed: topic("speed"),
            brightness: topic("brightness"),
        }
    }

    pub fn all(&self) -> [&str; 5] {
        [
            self.mode.as_str(),
            self.control.as_str(),
            self.color.as_str(),
            self.speed.as_str(),
            self.brightness.as_str(),
        ]
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::with_prefix(Self::DEFAULT_PREFIX)
    }
}

/// Translates bus messages and touch events into commands
#[derive(Debug, Clone, Default)]
pub struct CommandAdapter {
    topics: Topics,
}

impl CommandAdapter {
    pub fn new(topics: Topics) -> Self {
        Self { topics }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Parse one inbound message. Topics match exactly; payloads are
    /// case-sensitive.
    pub fn from_message(&self, topic: &str, payload: &[u8]) -> Result<EffectCommand> {
        let invalid = || Error::InvalidPayload {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
        };
        let text = std::str::from_utf8(payload).map_err(|_| invalid())?;

        let topics = &self.topics;
        if topic == topics.mode {
            Effect::from_payload(text)
                .map(EffectCommand::SetEffect)
                .ok_or_else(invalid)
        } else if topic == topics.control {
            if text.starts_with("OFF") {
                Ok(EffectCommand::Power(false))
            } else if text.starts_with("ON") {
                Ok(EffectCommand::Power(true))
            } else {
                Err(invalid())
            }
        } else if topic == topics.color {
            Rgb::from_hex(text).map(EffectCommand::SetPalette)
        } else if topic == topics.speed {
            let speed = parse_number(text).ok_or_else(invalid)?;
            in_range(speed, 0, 255).map(EffectCommand::SetSpeed)
        } else if topic == topics.brightness {
            let brightness = parse_number(text).ok_or_else(invalid)?;
            in_range(brightness, 0, 255).map(EffectCommand::SetBrightness)
        } else {
            Err(Error::UnknownTopic(topic.to_string()))
        }
    }

    /// Translate a bus event. Malformed messages are logged and dropped.
    pub fn from_bus_event(&self, event: &BusEvent) -> Option<EffectCommand> {
        match event {
            // A (re)subscription restarts the show from a clean slate
            BusEvent::Subscribed => Some(EffectCommand::Restart),
            BusEvent::Message { topic, payload } => match self.from_message(topic, payload) {
                Ok(command) => {
                    debug!("{} -> {:?}", topic, command);
                    Some(command)
                }
                Err(e) => {
                    warn!("Ignoring message: {}", e);
                    None
                }
            },
            BusEvent::Connected | BusEvent::Disconnected => None,
        }
    }

    pub fn from_touch(event: TouchEvent) -> Option<EffectCommand> {
        match event {
            TouchEvent::Pressed(TouchChannel::Power) => Some(EffectCommand::TogglePower),
            TouchEvent::Pressed(TouchChannel::Cycle) => Some(EffectCommand::Cycle),
            TouchEvent::LongPressed(TouchChannel::Power) => Some(EffectCommand::LongPress),
            TouchEvent::Held(TouchChannel::Brightness) => Some(EffectCommand::RampBrightness),
            TouchEvent::Released {
                channel: TouchChannel::Brightness,
                ..
            } => Some(EffectCommand::PersistBrightness),
            _ => None,
        }
    }
}

fn parse_number(text: &str) -> Option<i64> {
    text.trim().parse().ok()
}

fn in_range(value: i64, min: i64, max: i64) -> Result<u8> {
    if (min..=max).contains(&value) {
        Ok(value as u8)
    } else {
        Err(Error::ValueOutOfRange(value, min, max))
    }
}
