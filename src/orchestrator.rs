/*!
 # Effect orchestration

 The orchestrator is the single authority over the show state and over the
 one task allowed to write to the strip.

 Every state change bumps the render generation and spawns a fresh render task
 bound to it. A superseded task is never killed; it notices the generation moved
 on the next time it tries to draw and exits. The generation is checked while
 holding the strip lock, so at most one stale frame can slip out after a switch
 and two tasks can never both draw the same frame.
*/

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::color::Rgb;
use crate::command::EffectCommand;
use crate::effects::{next_frame, Effect, FrameParams};
use crate::store::{
    ConfigStore, KeyValueStore, PersistedConfig, Value, KEY_BRIGHTNESS, KEY_EFFECT, KEY_PALETTE,
    KEY_SPEED,
};
use crate::strip::Strip;
use crate::{Error, Result};

/// Shortest frame delay in milliseconds
pub const MIN_SPEED_DELAY: u8 = 10;
/// Effect resumed by "power on" when nothing ever ran
pub const DEFAULT_RESUME_EFFECT: Effect = Effect::Rainbow;

const BRIGHTNESS_STEP: u8 = 10;
const BRIGHTNESS_FLOOR: u8 = 10;
const BRIGHTNESS_RAMP_TOP: u8 = 245;
const ADMIN_EVENT_CAPACITY: usize = 8;

/// Convert a speed (higher is faster) into a frame delay in milliseconds
pub fn speed_to_delay(speed: u8) -> u8 {
    (255 - speed).max(MIN_SPEED_DELAY)
}

/// Everything that determines what the strip shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShowState {
    pub current_effect: Effect,
    /// Last effect other than `Off`, resumed by "power on"
    pub previous_effect: Effect,
    pub palette: Rgb,
    /// Frame delay in milliseconds, 10-255
    pub speed: u8,
    pub brightness: u8,
    /// Bumped on every transition
    pub render_generation: u64,
}

impl ShowState {
    pub fn from_config(config: &PersistedConfig) -> Self {
        Self {
            current_effect: config.effect,
            previous_effect: config.effect,
            palette: config.palette,
            speed: config.speed.max(MIN_SPEED_DELAY),
            brightness: config.brightness,
            render_generation: 0,
        }
    }

    fn power(&mut self, on: bool) {
        if on {
            if self.current_effect == Effect::Off {
                self.current_effect = match self.previous_effect {
                    Effect::Off => DEFAULT_RESUME_EFFECT,
                    previous => previous,
                };
            }
        } else if self.current_effect != Effect::Off {
            self.previous_effect = self.current_effect;
            self.current_effect = Effect::Off;
        }
    }

    /// Field-wise comparison of everything the strip shows
    fn looks_different(&self, other: &ShowState) -> bool {
        self.current_effect != other.current_effect
            || self.palette != other.palette
            || self.speed != other.speed
            || self.brightness != other.brightness
    }

    fn value_of(&self, key: &'static str) -> Value {
        match key {
            KEY_PALETTE => Value::from(self.palette.to_hex()),
            KEY_SPEED => Value::from(self.speed),
            KEY_BRIGHTNESS => Value::from(self.brightness),
            _ => Value::from(self.current_effect.ordinal()),
        }
    }
}

impl Default for ShowState {
    fn default() -> Self {
        Self::from_config(&PersistedConfig::default())
    }
}

/// Strip parameters that do not change at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    pub pixel_count: usize,
    /// Percent chance (0-100) that a twinkle pixel is lit
    pub twinkle_density: u8,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            pixel_count: 112,
            twinkle_density: 25,
        }
    }
}

/// Administrative events the orchestrator reports but leaves to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminEvent {
    /// The power pad was held past the long-press threshold
    LongPress,
}

/// Outcome of applying one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Effect running after the command
    pub effect: Effect,
    pub generation: u64,
    /// A new render task was started
    pub restarted: bool,
    /// Keys written to the store
    pub persisted: Vec<&'static str>,
}

/// Proof that a render task is still the authoritative one
#[derive(Debug, Clone)]
pub struct RenderToken {
    issued: u64,
    current: Arc<AtomicU64>,
}

impl RenderToken {
    pub fn generation(&self) -> u64 {
        self.issued
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.issued
    }
}

/// Cheap, cloneable access to a running orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<EffectCommand>,
    state: watch::Receiver<ShowState>,
    admin: broadcast::Sender<AdminEvent>,
}

impl OrchestratorHandle {
    /// Queue a command. Never blocks.
    pub fn send(&self, command: EffectCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::OrchestratorClosed)
    }

    /// Snapshot of the current state
    pub fn state(&self) -> ShowState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ShowState> {
        self.state.clone()
    }

    pub fn admin_events(&self) -> broadcast::Receiver<AdminEvent> {
        self.admin.subscribe()
    }
}

/// Owner of the show state and of the render task
pub struct Orchestrator<S, P> {
    state: ShowState,
    brightness_rising: bool,
    store: ConfigStore<S>,
    strip: Arc<Mutex<P>>,
    settings: RenderSettings,
    generation: Arc<AtomicU64>,
    /// Next frame index of the authoritative render task
    frame_clock: Arc<AtomicU64>,
    render_task: Option<JoinHandle<()>>,
    commands: mpsc::UnboundedReceiver<EffectCommand>,
    state_tx: watch::Sender<ShowState>,
    admin_tx: broadcast::Sender<AdminEvent>,
}

impl<S: KeyValueStore, P: Strip> Orchestrator<S, P> {
    /// Load the persisted settings and prepare to render. Nothing is spawned
    /// until [`Orchestrator::start`] or [`Orchestrator::run`].
    #[instrument(skip_all)]
    pub fn boot(store: ConfigStore<S>, strip: P, settings: RenderSettings) -> (Self, OrchestratorHandle) {
        let state = ShowState::from_config(&store.load());
        info!(
            "Booting with {} (palette {}, delay {}ms, brightness {})",
            state.current_effect, state.palette, state.speed, state.brightness
        );

        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(state);
        let (admin_tx, _) = broadcast::channel(ADMIN_EVENT_CAPACITY);

        let handle = OrchestratorHandle {
            commands: commands_tx,
            state: state_rx,
            admin: admin_tx.clone(),
        };
        let orchestrator = Self {
            state,
            brightness_rising: true,
            store,
            strip: Arc::new(Mutex::new(strip)),
            settings,
            generation: Arc::new(AtomicU64::new(state.render_generation)),
            frame_clock: Arc::new(AtomicU64::new(0)),
            render_task: None,
            commands,
            state_tx,
            admin_tx,
        };
        (orchestrator, handle)
    }

    pub fn state(&self) -> &ShowState {
        &self.state
    }

    pub fn store(&self) -> &ConfigStore<S> {
        &self.store
    }

    /// Blank the strip and start rendering the loaded effect. Does nothing if
    /// a render task already exists.
    pub fn start(&mut self) {
        if self.render_task.is_some() {
            return;
        }
        let blank = vec![Rgb::BLACK; self.settings.pixel_count];
        if let Err(e) = self.strip.lock().render(&blank) {
            warn!("Blanking the strip failed: {}", e);
        }
        let token = RenderToken {
            issued: self.generation.load(Ordering::SeqCst),
            current: Arc::clone(&self.generation),
        };
        self.spawn_render(token, 0);
    }

    /// Apply commands in arrival order until every handle is dropped
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        self.start();
        while let Some(command) = self.commands.recv().await {
            self.apply(command);
        }
        info!("All command senders dropped, stopping");
    }

    /// Apply one command. Persists the fields it targets (only if the store
    /// holds something different) and restarts rendering when the visible
    /// state changed.
    #[instrument(skip(self))]
    pub fn apply(&mut self, command: EffectCommand) -> Transition {
        let before = self.state;
        let mut next = self.state;
        let mut force_restart = false;

        let targets: &[&'static str] = match command {
            EffectCommand::SetEffect(effect) => {
                next.current_effect = effect;
                &[KEY_EFFECT]
            }
            EffectCommand::Power(on) => {
                next.power(on);
                &[KEY_EFFECT]
            }
            EffectCommand::TogglePower => {
                next.power(next.current_effect == Effect::Off);
                &[KEY_EFFECT]
            }
            EffectCommand::Cycle => {
                next.current_effect = next.current_effect.next_in_cycle();
                &[KEY_EFFECT]
            }
            EffectCommand::SetPalette(color) => {
                next.palette = color;
                &[KEY_PALETTE]
            }
            EffectCommand::SetSpeed(speed) => {
                next.speed = speed_to_delay(speed);
                &[KEY_SPEED]
            }
            EffectCommand::SetBrightness(0) => {
                debug!("Brightness 0 ignored; power off instead");
                &[]
            }
            EffectCommand::SetBrightness(level) => {
                next.brightness = level;
                &[KEY_BRIGHTNESS]
            }
            EffectCommand::RampBrightness => {
                next.brightness = self.ramp_brightness(next.brightness);
                trace!("Brightness ramped to {}", next.brightness);
                &[]
            }
            EffectCommand::PersistBrightness => &[KEY_BRIGHTNESS],
            EffectCommand::Restart => {
                force_restart = true;
                &[]
            }
            EffectCommand::LongPress => {
                info!("Long press of power pad detected");
                if self.admin_tx.send(AdminEvent::LongPress).is_err() {
                    debug!("Nobody is listening for admin events");
                }
                &[]
            }
            EffectCommand::Indicate { palette, effect } => {
                next.palette = palette;
                next.current_effect = effect;
                &[]
            }
        };

        if next.current_effect != Effect::Off {
            next.previous_effect = next.current_effect;
        }

        let persisted = self.persist(&next, targets);

        let restarted = force_restart || next.looks_different(&before);
        self.state = next;
        if restarted {
            let resume = before.current_effect == next.current_effect;
            self.restart_render(resume);
            self.state_tx.send_replace(self.state);
        }

        Transition {
            effect: self.state.current_effect,
            generation: self.state.render_generation,
            restarted,
            persisted,
        }
    }

    fn persist(&mut self, state: &ShowState, keys: &[&'static str]) -> Vec<&'static str> {
        if keys.is_empty() {
            return Vec::new();
        }
        let entries = keys.iter().map(|key| (*key, state.value_of(*key)));
        match self.store.store(entries) {
            Ok(written) => written,
            Err(e) => {
                // The show goes on; the store catches up on the next change
                error!("Persisting {:?} failed: {}", keys, e);
                Vec::new()
            }
        }
    }

    fn ramp_brightness(&mut self, level: u8) -> u8 {
        if self.brightness_rising {
            let level = level.saturating_add(BRIGHTNESS_STEP);
            if level > BRIGHTNESS_RAMP_TOP {
                self.brightness_rising = false;
                return u8::MAX;
            }
            level
        } else {
            let level = level.saturating_sub(BRIGHTNESS_STEP);
            if level < BRIGHTNESS_FLOOR {
                self.brightness_rising = true;
                return BRIGHTNESS_FLOOR;
            }
            level
        }
    }

    fn restart_render(&mut self, resume: bool) {
        let issued = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.render_generation = issued;
        let token = RenderToken {
            issued,
            current: Arc::clone(&self.generation),
        };

        // The old task exits on its own at its next generation check
        self.render_task = None;

        let start_frame = if resume {
            self.frame_clock.load(Ordering::SeqCst)
        } else {
            0
        };
        self.spawn_render(token, start_frame);
    }

    fn spawn_render(&mut self, token: RenderToken, start_frame: u64) {
        let effect = self.state.current_effect;
        info!(
            "Starting '{}' (generation {}, frame {})",
            effect,
            token.generation(),
            start_frame
        );
        let job = RenderJob {
            token,
            strip: Arc::clone(&self.strip),
            clock: Arc::clone(&self.frame_clock),
            effect,
            params: FrameParams {
                palette: self.state.palette,
                brightness: self.state.brightness,
                twinkle_density: self.settings.twinkle_density,
            },
            speed: self.state.speed,
            pixel_count: self.settings.pixel_count,
        };
        self.frame_clock.store(start_frame, Ordering::SeqCst);
        self.render_task = Some(tokio::spawn(job.run(start_frame)));
    }

}

impl<S, P> Drop for Orchestrator<S, P> {
    /// Retire the render task with its owner; it exits at its next frame
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Everything one render task needs; an immutable snapshot of the show
struct RenderJob<P> {
    token: RenderToken,
    strip: Arc<Mutex<P>>,
    clock: Arc<AtomicU64>,
    effect: Effect,
    params: FrameParams,
    speed: u8,
    pixel_count: usize,
}

impl<P: Strip> RenderJob<P> {
    async fn run(self, mut frame: u64) {
        let delay = self.effect.frame_delay(self.speed);
        loop {
            let pixels = next_frame(self.effect, &self.params, frame, self.pixel_count);
            {
                let mut strip = self.strip.lock();
                if !self.token.is_current() {
                    break;
                }
                if let Err(e) = strip.render(&pixels) {
                    warn!("Dropped frame {} of '{}': {}", frame, self.effect, e);
                }
                frame += 1;
                self.clock.store(frame, Ordering::SeqCst);
            }
            tokio::time::sleep(delay).await;
        }
        debug!(
            "'{}' (generation {}) superseded after frame {}",
            self.effect,
            self.token.generation(),
            frame
        );
    }
}
