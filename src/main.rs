//! ch8-audio command line tool
//!
//! Renders a CHIP-8 / XO-CHIP beep session through the audio bridge, either
//! to a WAV file or live on the default output device.

use anyhow::{bail, Context};
use ch8_audio::generator::PATTERN_BYTES;
use ch8_audio::{BridgeConfig, BridgeKind, SoundGenerator};
use clap::{Args, Parser, Subcommand};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ch8-audio")]
#[command(about = "Real-time audio bridge for CHIP-8 / XO-CHIP sound")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a session to a WAV file
    Render {
        /// Output WAV file
        #[arg(short, long)]
        out: PathBuf,

        #[command(flatten)]
        session: SessionArgs,
    },
    /// Play a session on the default output device, toggling off and on halfway
    Play {
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(Args)]
struct SessionArgs {
    /// Bridge strategy (polled or mailbox)
    #[arg(short, long, default_value = "polled")]
    bridge: BridgeKind,

    /// Bridge configuration file (JSON); overrides --bridge
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output sample rate in Hz (render only; live output uses the device rate)
    #[arg(short, long, default_value_t = 44_100)]
    rate: u32,

    /// Session length in seconds
    #[arg(short, long, default_value_t = 1.0)]
    seconds: f32,

    /// XO-CHIP pitch register (enables pattern playback)
    #[arg(long)]
    pitch: Option<u8>,

    /// XO-CHIP 16-byte pattern as 32 hex digits (enables pattern playback)
    #[arg(long)]
    pattern: Option<String>,
}

impl SessionArgs {
    fn bridge_config(&self) -> anyhow::Result<BridgeConfig> {
        match &self.config {
            Some(path) => BridgeConfig::load(path)
                .with_context(|| format!("loading bridge config {}", path.display())),
            None => Ok(BridgeConfig {
                kind: self.bridge,
                chunk_length: None,
            }),
        }
    }

    /// Generator with the sound timer covering the whole session
    fn generator(&self) -> anyhow::Result<Arc<Mutex<SoundGenerator>>> {
        let generator = SoundGenerator::shared();
        {
            let mut g = generator.lock();
            if let Some(pattern) = &self.pattern {
                g.load_pattern(parse_pattern(pattern)?);
            }
            if let Some(pitch) = self.pitch {
                g.set_pitch(pitch);
            }
            let frames = (self.seconds.max(0.0) * 60.0).ceil().min(f32::from(u8::MAX));
            g.set_sound_timer(frames as u8);
        }
        Ok(generator)
    }
}

fn parse_pattern(text: &str) -> anyhow::Result<[u8; PATTERN_BYTES]> {
    let digits: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() != PATTERN_BYTES * 2 {
        bail!(
            "pattern must be {} hex digits, got {}",
            PATTERN_BYTES * 2,
            digits.len()
        );
    }

    let mut pattern = [0u8; PATTERN_BYTES];
    for (byte, pair) in pattern.iter_mut().zip(digits.chunks(2)) {
        let pair: String = pair.iter().collect();
        *byte = u8::from_str_radix(&pair, 16)
            .with_context(|| format!("invalid hex byte '{}' in pattern", pair))?;
    }
    Ok(pattern)
}

#[cfg(feature = "export")]
fn render(out: PathBuf, session: SessionArgs) -> anyhow::Result<()> {
    use ch8_audio::export::{export_to_wav, ExportConfig};

    let config = ExportConfig::default()
        .sample_rate(session.rate)
        .seconds(session.seconds)
        .bridge(session.bridge_config()?);
    let generator = session.generator()?;

    let written = export_to_wav(&generator, &out, &config)
        .with_context(|| format!("rendering to {}", out.display()))?;
    println!("Wrote {} samples to {}", written, out.display());
    Ok(())
}

#[cfg(not(feature = "export"))]
fn render(_out: PathBuf, _session: SessionArgs) -> anyhow::Result<()> {
    bail!("`render` requires the \"export\" feature. Rebuild with `--features export`.")
}

#[cfg(feature = "streaming")]
fn play(session: SessionArgs) -> anyhow::Result<()> {
    use ch8_audio::{PowerController, RodioHost};
    use std::time::{Duration, Instant};

    const FRAME: Duration = Duration::from_micros(16_667);

    let generator = session.generator()?;
    let config = session.bridge_config()?;
    let mut power = PowerController::new(RodioHost::new(), generator.clone(), config);
    power.on_change(|on| println!("Audio {}", if on { "ON" } else { "OFF" }));
    power.activate().context("starting audio output")?;

    let total = Duration::from_secs_f32(session.seconds.max(0.0));
    let half = total / 2;
    let start = Instant::now();
    let mut next_frame = start + FRAME;
    let mut toggled = false;

    while start.elapsed() < total {
        power.pump();
        if Instant::now() >= next_frame {
            generator.lock().tick_timer();
            next_frame += FRAME;
        }
        if !toggled && start.elapsed() >= half {
            power.toggle()?;
            std::thread::sleep(Duration::from_millis(250));
            power.toggle()?;
            toggled = true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    power.toggle()?;
    Ok(())
}

#[cfg(not(feature = "streaming"))]
fn play(_session: SessionArgs) -> anyhow::Result<()> {
    bail!(
        "`play` requires the \"streaming\" feature. \
         Rebuild with `--features streaming` to enable playback."
    )
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Render { out, session } => render(out, session),
        Command::Play { session } => play(session),
    }
}
