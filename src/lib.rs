/*!
 # Marquee Lights

 Effect orchestration for an addressable LED marquee sign. The visual effect is
 selected and reconfigured at runtime by a message bus, three touch pads and a
 persisted configuration loaded at boot.

 ## Features

 * Seven effects (off, solid color, rainbow, enumerate, marquee, twinkle, rainbow marquee)
 * Exactly one render task owns the strip at any time
 * Race-free effect switches using render generations
 * Debounced touch input with long-press detection
 * Write-if-changed persistence of palette, speed, brightness and effect

 ## Example

 ```no_run
 use marquee_lights::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     tracing_subscriber::fmt::init();

     let store = ConfigStore::new(MemoryStore::new());
     let strip = NullStrip::default();
     let (orchestrator, handle) = Orchestrator::boot(store, strip, RenderSettings::default());

     tokio::spawn(orchestrator.run());

     handle.send(EffectCommand::SetEffect(Effect::Twinkle))?;
     handle.send(EffectCommand::Power(false))?;
     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the marquee lights library
#[derive(Error, Debug)]
pub enum Error {
    /// Persistence backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored key holds a value of the wrong type
    #[error("Stored key '{key}' is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    /// Inbound payload could not be understood
    #[error("Invalid payload {payload:?} on topic '{topic}'")]
    InvalidPayload { topic: String, payload: String },

    /// Inbound message on a topic we do not handle
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// Touch pad name not recognized
    #[error("Unknown touch pad: {0}")]
    UnknownTouchPad(String),

    /// Value out of range
    #[error("Value {0} out of range ({1}..{2})")]
    ValueOutOfRange(i64, i64, i64),

    /// Color string is not `rrggbb` or `#rrggbb`
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    /// Strip transmission failed
    #[error("Render failed: {0}")]
    Render(String),

    /// Message bus failure
    #[error("Message bus error: {0}")]
    Bus(String),

    /// Orchestrator is no longer accepting commands
    #[error("Orchestrator has shut down")]
    OrchestratorClosed,

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Run blocking I/O from code that may sit on an async worker.
///
/// On a multi-threaded runtime the worker hands its queued tasks to the other
/// workers before `f` runs. Anywhere else `f` runs inline.
pub(crate) fn blocking_io<T>(f: impl FnOnce() -> T) -> T {
    use tokio::runtime::{Handle, RuntimeFlavor};

    match Handle::try_current() {
        Ok(handle) if matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

pub mod bus;
pub mod color;
pub mod command;
pub mod effects;
pub mod orchestrator;
pub mod store;
pub mod strip;
pub mod touch;

// Re-export key types
pub use bus::{run_bus, BusEvent, ChannelBus, MessageBus};
pub use color::Rgb;
pub use command::{CommandAdapter, EffectCommand, Topics};
pub use effects::{next_frame, Effect, FrameParams};
pub use orchestrator::{
    AdminEvent, Orchestrator, OrchestratorHandle, RenderSettings, RenderToken, ShowState,
    Transition,
};
pub use store::{ConfigStore, FileStore, KeyValueStore, MemoryStore, PersistedConfig, Value};
pub use strip::{MemoryStrip, NullStrip, Strip, TerminalStrip};
pub use touch::{poll_touch, TouchChannel, TouchDebouncer, TouchEvent, TouchSensor, VirtualTouchPad};
