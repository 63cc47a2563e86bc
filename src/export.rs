//! Headless rendering to WAV
//!
//! Runs a full session through [`ManualHost`] and [`PowerController`] exactly
//! as a live host would: the host pulls one quantum at a time, the emulator
//! side pumps the bridge after every pull and ticks the sound timer at 60 Hz.
//! The resulting stream is what a listener would have heard, including the
//! initial silent quantum of the mailbox strategy.

use crate::config::BridgeConfig;
use crate::generator::SoundGenerator;
use crate::power::{ManualHost, PowerController};
use crate::sample::{SampleRate, SharedSource, DEFAULT_SAMPLE_RATE};
use crate::{Ch8AudioError, Result};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Emulated timer frequency
pub const TIMER_HZ: u64 = 60;

/// Settings for a headless session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Length of the rendered session in seconds
    pub seconds: f32,
    /// Bridge used for the session
    pub bridge: BridgeConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            sample_rate: DEFAULT_SAMPLE_RATE,
            seconds: 1.0,
            bridge: BridgeConfig::default(),
        }
    }
}

impl ExportConfig {
    /// Set the output sample rate
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Set the session length
    pub fn seconds(mut self, seconds: f32) -> Self {
        self.seconds = seconds;
        self
    }

    /// Set the bridge configuration
    pub fn bridge(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = bridge;
        self
    }

    /// Total samples the session renders
    pub fn total_samples(&self) -> usize {
        (self.seconds.max(0.0) * self.sample_rate as f32).round() as usize
    }
}

/// Render a session from the generator's current state.
///
/// The caller sets up the generator first (sound timer, pitch, pattern);
/// the timer then runs down at 60 Hz while the session renders.
pub fn render_session(
    generator: &Arc<Mutex<SoundGenerator>>,
    config: &ExportConfig,
) -> Result<Vec<f32>> {
    let rate = SampleRate::new(config.sample_rate)?;
    let source: SharedSource = generator.clone();
    let mut power = PowerController::new(ManualHost::new(rate.hz()), source, config.bridge);
    power.activate()?;

    let quantum = config.bridge.chunk_length();
    let total = config.total_samples();
    let mut samples = Vec::with_capacity(total);
    let mut buffer = vec![0.0f32; quantum];
    let mut ticks = 0u64;

    while samples.len() < total {
        let len = quantum.min(total - samples.len());
        power.host_mut().pull_into(&mut buffer[..len]);
        samples.extend_from_slice(&buffer[..len]);
        power.pump();

        let due = samples.len() as u64 * TIMER_HZ / u64::from(rate.hz());
        while ticks < due {
            generator.lock().tick_timer();
            ticks += 1;
        }
    }

    Ok(samples)
}

/// Render a session and write it to a 16-bit mono WAV file
pub fn export_to_wav<P: AsRef<Path>>(
    generator: &Arc<Mutex<SoundGenerator>>,
    output_path: P,
    config: &ExportConfig,
) -> Result<usize> {
    info!(
        "Rendering {:.2}s at {} Hz through the {} bridge",
        config.seconds, config.sample_rate, config.bridge.kind
    );
    let samples = render_session(generator, config)?;

    info!("Writing WAV file to {}", output_path.as_ref().display());
    write_wav_file(output_path.as_ref(), &samples, config.sample_rate)?;
    Ok(samples.len())
}

/// Write mono samples to a 16-bit PCM WAV file
pub fn write_wav_file(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| Ch8AudioError::Export(format!("Failed to create WAV file: {}", e)))?;

    for &sample in samples {
        writer
            .write_sample(to_i16(sample))
            .map_err(|e| Ch8AudioError::Export(format!("Failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| Ch8AudioError::Export(format!("Failed to finalize WAV file: {}", e)))?;

    Ok(())
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
