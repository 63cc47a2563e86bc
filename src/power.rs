//! Power controller behind the UI audio toggle
//!
//! The controller builds the one bridge of the session on first activation,
//! bound to whatever sample rate the host sink negotiated, and afterwards only
//! attaches and detaches it from the output path.
//!
//! ```text
//! Off --activate--> Starting --sink ok--> Connected --toggle--> Off
//!                       |
//!                       +--sink unavailable--> Off
//! ```

use crate::bridge::{BridgeState, BufferBridge, Renderer};
use crate::config::BridgeConfig;
use crate::sample::{fill_silence, ChunkLength, SampleRate, SharedSource};
use crate::{Ch8AudioError, Result};
use tracing::{debug, info, warn};

/// Audible state exposed to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    /// Not attached to the output (or never activated)
    #[default]
    Off,
    /// Sink being created and bridge being built
    Starting,
    /// Bridge attached to the output sink
    Connected,
}

/// Host audio sink the controller drives
pub trait AudioHost {
    /// Create the sink if needed and report its negotiated sample rate.
    ///
    /// An error means audio is unavailable (e.g. no user gesture yet).
    fn open(&mut self) -> Result<SampleRate>;

    /// Attach a renderer to the output path
    fn attach(&mut self, renderer: Renderer) -> Result<()>;

    /// Detach the current renderer; the output path goes silent
    fn detach(&mut self);
}

type IndicatorFn = Box<dyn FnMut(bool)>;

/// State machine owning the session's single bridge
pub struct PowerController<H: AudioHost> {
    host: H,
    source: SharedSource,
    config: BridgeConfig,
    state: PowerState,
    bridge: Option<BufferBridge>,
    bridges_constructed: usize,
    indicators: Vec<IndicatorFn>,
}

impl<H: AudioHost> PowerController<H> {
    /// Create an inactive controller. Nothing is built until [`activate`](Self::activate).
    pub fn new(host: H, source: SharedSource, config: BridgeConfig) -> Self {
        PowerController {
            host,
            source,
            config,
            state: PowerState::Off,
            bridge: None,
            bridges_constructed: 0,
            indicators: Vec::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> PowerState {
        self.state
    }

    /// On/off indicator for display
    pub fn is_on(&self) -> bool {
        self.state == PowerState::Connected
    }

    /// Lifecycle of the underlying bridge
    pub fn bridge_state(&self) -> BridgeState {
        self.bridge
            .as_ref()
            .map_or(BridgeState::Uninitialized, BufferBridge::state)
    }

    /// The bridge, once constructed
    pub fn bridge(&self) -> Option<&BufferBridge> {
        self.bridge.as_ref()
    }

    /// How many bridges this controller has built (never more than one)
    pub fn bridges_constructed(&self) -> usize {
        self.bridges_constructed
    }

    /// Configuration the bridge is built from
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Borrow the host
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutably borrow the host
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Register an observer called with the new on/off value on every change
    pub fn on_change<F>(&mut self, f: F)
    where
        F: FnMut(bool) + 'static,
    {
        self.indicators.push(Box::new(f));
    }

    /// Build the bridge if needed and connect it. No-op while connected.
    ///
    /// If the host sink cannot be created the controller stays off and the
    /// error is returned; nothing is retried until the next call.
    pub fn activate(&mut self) -> Result<()> {
        if self.state == PowerState::Connected {
            debug!("activate() while connected, ignoring");
            return Ok(());
        }

        if self.bridge.is_none() {
            let chunk = self
                .config
                .validate()
                .and_then(|_| ChunkLength::new(self.config.chunk_length()))?;

            self.set_state(PowerState::Starting);
            let rate = match self.host.open() {
                Ok(rate) => rate,
                Err(err) => {
                    warn!("Audio unavailable: {}", err);
                    self.set_state(PowerState::Off);
                    return Err(match err {
                        Ch8AudioError::AudioUnavailable(_) => err,
                        other => Ch8AudioError::AudioUnavailable(other.to_string()),
                    });
                }
            };

            self.bridge = Some(BufferBridge::new(
                self.config.kind,
                std::sync::Arc::clone(&self.source),
                chunk,
                rate,
            ));
            self.bridges_constructed += 1;
            info!("Audio bridge constructed: {} at {}", self.config.kind, rate);
        }

        self.connect()
    }

    /// Flip the output on or off, keeping the bridge instance.
    ///
    /// Turning off stops generator advancement; turning back on resumes at
    /// the generator's current time.
    pub fn toggle(&mut self) -> Result<()> {
        match self.state {
            PowerState::Connected => {
                self.disconnect();
                Ok(())
            }
            PowerState::Off | PowerState::Starting => self.activate(),
        }
    }

    /// Service the mailbox producer (no-op when polled or off)
    pub fn pump(&mut self) -> usize {
        if self.state != PowerState::Connected {
            return 0;
        }
        self.bridge.as_mut().map_or(0, BufferBridge::pump)
    }

    fn connect(&mut self) -> Result<()> {
        let Some(bridge) = self.bridge.as_mut() else {
            return Err(Ch8AudioError::Other("no bridge to connect".into()));
        };

        let renderer = bridge.connect();
        if let Err(err) = self.host.attach(renderer) {
            warn!("Failed to attach audio renderer: {}", err);
            bridge.disconnect();
            self.set_state(PowerState::Off);
            return Err(err);
        }

        self.set_state(PowerState::Connected);
        info!("Audio on");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.host.detach();
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.disconnect();
        }
        self.set_state(PowerState::Off);
        info!("Audio off");
    }

    fn set_state(&mut self, state: PowerState) {
        let was_on = self.is_on();
        self.state = state;
        let on = self.is_on();
        if was_on != on {
            for indicator in &mut self.indicators {
                indicator(on);
            }
        }
    }
}

/// In-process host: the caller pulls quanta by hand
///
/// Used for headless rendering and tests. While nothing is attached the
/// output path is silent.
#[derive(Default)]
pub struct ManualHost {
    rate: Option<u32>,
    renderer: Option<Renderer>,
    opens: usize,
    detached_pulls: u64,
}

impl ManualHost {
    /// Host whose sink runs at `rate` Hz
    pub fn new(rate: u32) -> Self {
        ManualHost {
            rate: Some(rate),
            ..Self::default()
        }
    }

    /// Host whose sink can never be created
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Pull `len` samples from the output path
    pub fn pull(&mut self, len: usize) -> Vec<f32> {
        let mut out = vec![0.0; len];
        self.pull_into(&mut out);
        out
    }

    /// Pull into an existing buffer
    pub fn pull_into(&mut self, out: &mut [f32]) {
        match self.renderer.as_mut() {
            Some(renderer) => renderer.render(out),
            None => {
                fill_silence(out);
                self.detached_pulls += 1;
            }
        }
    }

    /// True while a renderer is attached
    pub fn is_attached(&self) -> bool {
        self.renderer.is_some()
    }

    /// The attached renderer
    pub fn renderer_mut(&mut self) -> Option<&mut Renderer> {
        self.renderer.as_mut()
    }

    /// Number of successful `open` calls
    pub fn opens(&self) -> usize {
        self.opens
    }

    /// Pulls served while nothing was attached
    pub fn detached_pulls(&self) -> u64 {
        self.detached_pulls
    }
}

impl AudioHost for ManualHost {
    fn open(&mut self) -> Result<SampleRate> {
        let Some(rate) = self.rate else {
            return Err(Ch8AudioError::AudioUnavailable(
                "audio sink could not be created".into(),
            ));
        };
        self.opens += 1;
        SampleRate::new(rate)
    }

    fn attach(&mut self, renderer: Renderer) -> Result<()> {
        self.renderer = Some(renderer);
        Ok(())
    }

    fn detach(&mut self) {
        self.renderer = None;
    }
}
