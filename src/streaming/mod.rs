//! Native audio output using rodio
//!
//! [`RodioHost`] is the desktop counterpart of the browser's audio context:
//! `open` creates the output stream on the default device and reports its
//! sample rate, `attach` starts a sink pulling the renderer, and `detach`
//! stops and drops that sink.

mod source;

use crate::bridge::Renderer;
use crate::power::AudioHost;
use crate::sample::SampleRate;
use crate::{Ch8AudioError, Result};
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamHandle, Sink};
use source::RendererSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Sink currently pulling a renderer
struct Playback {
    sink: Sink,
    finished: Arc<AtomicBool>,
}

impl Playback {
    fn stop(self) {
        self.finished.store(true, Ordering::Relaxed);
        self.sink.stop();
    }
}

/// Default-device host backed by rodio
///
/// The output stream is created once on the first `open` and kept for the
/// lifetime of the host; every attach gets its own sink.
#[derive(Default)]
pub struct RodioHost {
    stream: Option<(OutputStream, OutputStreamHandle)>,
    sample_rate: Option<SampleRate>,
    playback: Option<Playback>,
}

impl RodioHost {
    /// Host with nothing opened yet
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the output stream exists
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// True while a renderer is being played
    pub fn is_playing(&self) -> bool {
        self.playback.is_some()
    }

    /// Sample rate reported by the device, once opened
    pub fn sample_rate(&self) -> Option<SampleRate> {
        self.sample_rate
    }

    fn open_default_device() -> Result<(OutputStream, OutputStreamHandle, SampleRate)> {
        let device = rodio::cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Ch8AudioError::AudioUnavailable("no default output device".into()))?;

        let config = device.default_output_config().map_err(|e| {
            Ch8AudioError::AudioUnavailable(format!("Failed to query output config: {}", e))
        })?;
        let rate = SampleRate::new(config.sample_rate().0)?;

        let (stream, handle) = OutputStream::try_from_device(&device).map_err(|e| {
            Ch8AudioError::AudioUnavailable(format!("Failed to create audio stream: {}", e))
        })?;

        Ok((stream, handle, rate))
    }
}

impl AudioHost for RodioHost {
    fn open(&mut self) -> Result<SampleRate> {
        if let Some(rate) = self.sample_rate {
            return Ok(rate);
        }

        let (stream, handle, rate) = Self::open_default_device()?;
        info!("Audio output opened at {}", rate);
        self.stream = Some((stream, handle));
        self.sample_rate = Some(rate);
        Ok(rate)
    }

    fn attach(&mut self, renderer: Renderer) -> Result<()> {
        let (Some((_, handle)), Some(rate)) = (self.stream.as_ref(), self.sample_rate) else {
            return Err(Ch8AudioError::AudioDeviceError(
                "attach before the output stream was opened".into(),
            ));
        };

        if let Some(previous) = self.playback.take() {
            previous.stop();
        }

        let sink = Sink::try_new(handle).map_err(|e| {
            Ch8AudioError::AudioDeviceError(format!("Failed to create audio sink: {}", e))
        })?;

        let finished = Arc::new(AtomicBool::new(false));
        sink.append(RendererSource::new(renderer, rate.hz(), Arc::clone(&finished)));
        sink.play();
        debug!("Renderer attached to rodio sink");

        self.playback = Some(Playback { sink, finished });
        Ok(())
    }

    fn detach(&mut self) {
        if let Some(playback) = self.playback.take() {
            playback.stop();
            debug!("Renderer detached from rodio sink");
        }
    }
}

impl Drop for RodioHost {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::generator::SoundGenerator;
    use crate::power::PowerController;

    fn try_open_host() -> Option<RodioHost> {
        let mut host = RodioHost::new();
        match host.open() {
            Ok(_) => Some(host),
            Err(err) => {
                eprintln!("Skipping streaming test (audio backend unavailable): {}", err);
                None
            }
        }
    }

    #[test]
    fn test_new_host_is_closed() {
        let host = RodioHost::new();
        assert!(!host.is_open());
        assert!(!host.is_playing());
        assert!(host.sample_rate().is_none());
    }

    #[test]
    fn test_open_reports_device_rate() {
        let Some(mut host) = try_open_host() else {
            return;
        };
        let rate = host.sample_rate().unwrap();
        assert!(rate.hz() > 0);
        // Second open reuses the stream
        assert_eq!(host.open().unwrap(), rate);
    }

    #[test]
    fn test_attach_requires_open() {
        let generator = SoundGenerator::shared();
        let mut bridge = crate::BufferBridge::new(
            crate::BridgeKind::Polled,
            generator,
            crate::ChunkLength::new(512).unwrap(),
            SampleRate::new(44_100).unwrap(),
        );
        let mut host = RodioHost::new();
        assert!(matches!(
            host.attach(bridge.connect()),
            Err(Ch8AudioError::AudioDeviceError(_))
        ));
    }

    #[test]
    fn test_toggle_through_controller() {
        let Some(host) = try_open_host() else {
            return;
        };
        let generator = SoundGenerator::shared();
        let mut power = PowerController::new(host, generator, BridgeConfig::polled());

        power.activate().unwrap();
        assert!(power.host().is_playing());
        power.toggle().unwrap();
        assert!(!power.host().is_playing());
        power.toggle().unwrap();
        assert!(power.host().is_playing());
        assert_eq!(power.bridges_constructed(), 1);
    }
}
