use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result};
use marquee_lights::orchestrator::speed_to_delay;
use marquee_lights::store::NAMESPACE;
use marquee_lights::touch::DEFAULT_SAMPLE_PERIOD;
use marquee_lights::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file holding the persisted settings
    #[arg(long, global = true, default_value = "marquee-store.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, ValueEnum, Debug)]
enum EffectType {
    /// All pixels dark
    Off,
    /// Whole strip in the palette color
    Color,
    /// Hue wheel spread across the strip
    Rainbow,
    /// One pixel bouncing end to end
    Enumerate,
    /// Every third pixel chasing in the palette color
    Marquee,
    /// Random pixels in the palette color
    Twinkle,
    /// Every third pixel chasing in rainbow colors
    Rmarquee,
}

impl From<EffectType> for Effect {
    fn from(effect: EffectType) -> Self {
        match effect {
            EffectType::Off => Effect::Off,
            EffectType::Color => Effect::SolidColor,
            EffectType::Rainbow => Effect::Rainbow,
            EffectType::Enumerate => Effect::Enumerate,
            EffectType::Marquee => Effect::Marquee,
            EffectType::Twinkle => Effect::Twinkle,
            EffectType::Rmarquee => Effect::RainbowMarquee,
        }
    }
}

#[derive(Clone, Copy, ValueEnum, Debug)]
enum StripKind {
    /// Draw frames on stderr
    Terminal,
    /// Discard frames
    Null,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sign. Reads bus messages and touch input from stdin, one per line:
    /// `<topic> <payload>` or `touch <power|cycle|brightness> <down|up>`
    Run {
        /// Number of pixels on the strip
        #[arg(long, default_value_t = 112)]
        pixels: usize,
        /// Bus topics are `<prefix>/mode`, `<prefix>/control`, ...
        #[arg(long, default_value = Topics::DEFAULT_PREFIX)]
        topic_prefix: String,
        /// Touch pad sampling period
        #[arg(long, default_value_t = DEFAULT_SAMPLE_PERIOD.as_millis() as u64)]
        touch_period_ms: u64,
        /// Percent chance (0-100) that a twinkle pixel is lit
        #[arg(long, default_value_t = 25, value_parser = clap::value_parser!(u8).range(0..=100))]
        twinkle_density: u8,
        /// Where rendered frames go
        #[arg(long, value_enum, default_value_t = StripKind::Terminal)]
        strip: StripKind,
    },
    /// Render an effect on the terminal without touching the stored settings
    Preview {
        #[arg(value_enum, default_value_t = EffectType::Rainbow)]
        effect: EffectType,
        /// Number of frames to draw
        #[arg(short, long, default_value_t = 200)]
        frames: u64,
        #[arg(long, default_value_t = 60)]
        pixels: usize,
        /// Palette color, `rrggbb`
        #[arg(long, default_value = "ff8200")]
        palette: String,
        /// Brightness (0-255)
        #[arg(short, long, default_value_t = 128)]
        brightness: u8,
        /// Speed (0-255, higher is faster)
        #[arg(short, long, default_value_t = 155)]
        speed: u8,
    },
    /// Print the persisted settings
    Config,
}

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("marquee_lights=info")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    match cli.command.unwrap_or(Commands::Config) {
        Commands::Run {
            pixels,
            topic_prefix,
            touch_period_ms,
            twinkle_density,
            strip,
        } => {
            let settings = RenderSettings {
                pixel_count: pixels,
                twinkle_density,
            };
            let strip: Box<dyn Strip> = match strip {
                StripKind::Terminal => Box::new(TerminalStrip::stderr()),
                StripKind::Null => Box::new(NullStrip),
            };
            run_sign(
                &cli.store,
                settings,
                strip,
                Topics::with_prefix(&topic_prefix),
                Duration::from_millis(touch_period_ms),
            )
            .await?;
        }
        Commands::Preview {
            effect,
            frames,
            pixels,
            palette,
            brightness,
            speed,
        } => {
            let params = FrameParams {
                palette: palette.parse()?,
                brightness,
                ..FrameParams::default()
            };
            run_preview(effect.into(), params, frames, pixels, speed).await?;
        }
        Commands::Config => show_config(&cli.store)?,
    }

    Ok(())
}

/// Boot the sign and serve stdin until EOF or Ctrl-C
#[instrument(skip(strip))]
async fn run_sign(
    store_path: &Path,
    settings: RenderSettings,
    strip: Box<dyn Strip>,
    topics: Topics,
    touch_period: Duration,
) -> Result<()> {
    let store = ConfigStore::new(FileStore::open(store_path, NAMESPACE)?);
    let (mut orchestrator, handle) = Orchestrator::boot(store, strip, settings);

    // Start the show immediately so the sign works without any network
    orchestrator.start();
    tokio::spawn(orchestrator.run());

    let pad = VirtualTouchPad::new();
    tokio::spawn(poll_touch(
        pad.clone(),
        TouchDebouncer::new(touch_period),
        handle.clone(),
    ));
    tokio::spawn(on_long_press(handle.admin_events(), handle.clone()));

    let adapter = CommandAdapter::new(topics);
    let (network_tx, network_rx) = watch::channel(false);
    let (bus, bus_tx) = ChannelBus::new();
    tokio::spawn({
        let adapter = adapter.clone();
        let handle = handle.clone();
        async move {
            if let Err(e) = run_bus(bus, adapter, handle, network_rx).await {
                error!("Message bus client stopped: {}", e);
            }
        }
    });
    // Local stdin needs no network association
    network_tx.send_replace(true);

    println!("OK");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };
        let Some(line) = line else {
            info!("stdin closed");
            break;
        };

        match dispatch_line(line.trim(), &adapter, &pad, &bus_tx) {
            Ok(()) => println!("OK"),
            Err(e) => eprintln!("ERR {e}"),
        }
    }

    Ok(())
}

/// Route one stdin line to the virtual touch pad or the bus
fn dispatch_line(
    line: &str,
    adapter: &CommandAdapter,
    pad: &VirtualTouchPad,
    bus: &mpsc::UnboundedSender<BusEvent>,
) -> Result<()> {
    let mut parts = line.splitn(2, ' ');
    match (parts.next(), parts.next()) {
        (Some("touch"), Some(rest)) => {
            let mut args = rest.split_whitespace();
            let channel: TouchChannel = args
                .next()
                .ok_or_else(|| eyre!("no touch pad given"))?
                .parse()?;
            match args.next() {
                Some("down") => pad.press(channel),
                Some("up") => pad.release(channel),
                other => return Err(eyre!("expected down or up, got {:?}", other)),
            }
        }
        (Some(topic), Some(payload)) if !topic.is_empty() => {
            // Reject garbage here so the caller gets an answer
            adapter.from_message(topic, payload.as_bytes())?;
            bus.send(BusEvent::message(topic, payload))
                .map_err(|_| eyre!("message bus client is gone"))?;
        }
        _ => return Err(eyre!("expected `<topic> <payload>` or `touch <pad> <down|up>`")),
    }
    Ok(())
}

/// Long-press policy: request a network credential reset and show it on the strip
async fn on_long_press(mut events: broadcast::Receiver<AdminEvent>, handle: OrchestratorHandle) {
    loop {
        match events.recv().await {
            Ok(AdminEvent::LongPress) => {
                warn!("Long press of power pad: network credential reset requested");
                let indicator = EffectCommand::Indicate {
                    palette: Rgb::RED,
                    effect: Effect::Enumerate,
                };
                if handle.send(indicator).is_err() {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Missed {} admin events", missed);
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Draw an effect straight from the catalog
#[instrument]
async fn run_preview(
    effect: Effect,
    params: FrameParams,
    frames: u64,
    pixels: usize,
    speed: u8,
) -> Result<()> {
    info!("Previewing '{}' for {} frames", effect, frames);
    let delay = effect.frame_delay(speed_to_delay(speed));
    let mut strip = TerminalStrip::new(Box::new(std::io::stdout()));
    for frame in 0..frames {
        strip.render(&next_frame(effect, &params, frame, pixels))?;
        tokio::time::sleep(delay).await;
    }
    println!();
    Ok(())
}

fn show_config(store_path: &Path) -> Result<()> {
    let store = ConfigStore::new(FileStore::open(store_path, NAMESPACE)?);
    let config = store.load();
    println!("store:      {}", store.backend().path().display());
    println!("effect:     {} ({})", config.effect, config.effect.ordinal());
    println!("palette:    {}", config.palette);
    println!("speed:      {}ms", config.speed);
    println!("brightness: {}", config.brightness);
    Ok(())
}
