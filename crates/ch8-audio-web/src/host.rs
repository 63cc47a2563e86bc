//! Audio host backed by the page's `AudioContext`
//!
//! The page creates the context (only possible after a user gesture) and
//! hands its sample rate in on activation. The node callbacks then drive the
//! attached renderer: the script processor pulls [`WebHost::render`], the
//! worklet port relays demands through [`serve_demand`].

use ch8_audio::bridge::Renderer;
use ch8_audio::sample::fill_silence;
use ch8_audio::{AudioHost, Ch8AudioError, PowerController, Result, SampleBatch, SampleRate};

/// Host whose sink is the page's audio graph
#[derive(Default)]
pub struct WebHost {
    /// Rate of the context created for this activation, if any
    offered_rate: Option<f32>,
    renderer: Option<Renderer>,
}

impl WebHost {
    /// Host with no context yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the context's sample rate; `None` when it could not be created
    pub fn offer_context(&mut self, sample_rate: Option<f32>) {
        self.offered_rate = sample_rate;
    }

    /// Script-processor callback: fill the node's output buffer
    pub fn render(&mut self, out: &mut [f32]) {
        match self.renderer.as_mut() {
            Some(renderer) => renderer.render(out),
            None => fill_silence(out),
        }
    }

    /// True while a renderer is attached
    pub fn is_attached(&self) -> bool {
        self.renderer.is_some()
    }

    fn post_demand(&mut self) -> bool {
        match self.renderer.as_mut() {
            Some(Renderer::Mailbox(renderer)) => renderer.post_demand(),
            _ => false,
        }
    }

    fn take_batch(&mut self) -> Option<SampleBatch> {
        match self.renderer.as_mut() {
            Some(Renderer::Mailbox(renderer)) => renderer.take_batch(),
            _ => None,
        }
    }
}

impl AudioHost for WebHost {
    fn open(&mut self) -> Result<SampleRate> {
        let rate = self.offered_rate.take().ok_or_else(|| {
            Ch8AudioError::AudioUnavailable("AudioContext could not be created".into())
        })?;
        if !rate.is_finite() || rate < 1.0 {
            return Err(Ch8AudioError::AudioUnavailable(format!(
                "AudioContext reported an invalid sample rate: {rate}"
            )));
        }
        SampleRate::new(rate.round() as u32)
    }

    fn attach(&mut self, renderer: Renderer) -> Result<()> {
        self.renderer = Some(renderer);
        Ok(())
    }

    fn detach(&mut self) {
        self.renderer = None;
    }
}

/// Answer one worklet demand with the next batch.
///
/// The worklet is the isolated rendering context; this side forwards its
/// demand through the mailbox endpoint, lets the producer run, and returns
/// the batch for posting back. `None` while off, for the polled strategy, or
/// when a demand is already outstanding.
pub fn serve_demand(power: &mut PowerController<WebHost>) -> Option<SampleBatch> {
    if !power.is_on() {
        return None;
    }
    power.host_mut().post_demand();
    power.pump();
    power.host_mut().take_batch()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ch8_audio::{BridgeConfig, PowerState, SoundGenerator};

    fn controller(config: BridgeConfig) -> PowerController<WebHost> {
        let generator = SoundGenerator::shared();
        generator.lock().set_sound_timer(10);
        PowerController::new(WebHost::new(), generator, config)
    }

    #[test]
    fn test_activation_without_context_fails() {
        let mut power = controller(BridgeConfig::polled());
        power.host_mut().offer_context(None);
        assert!(matches!(
            power.activate(),
            Err(Ch8AudioError::AudioUnavailable(_))
        ));
        assert_eq!(power.state(), PowerState::Off);
    }

    #[test]
    fn test_context_rate_used_for_bridge() {
        let mut power = controller(BridgeConfig::polled());
        power.host_mut().offer_context(Some(48_000.0));
        power.activate().unwrap();
        assert_eq!(power.bridge().unwrap().sample_rate().hz(), 48_000);
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let mut power = controller(BridgeConfig::polled());
        power.host_mut().offer_context(Some(f32::NAN));
        assert!(power.activate().is_err());
    }

    #[test]
    fn test_polled_render() {
        let mut power = controller(BridgeConfig::polled());
        power.host_mut().offer_context(Some(44_100.0));
        power.activate().unwrap();

        let mut out = vec![0.0; 512];
        power.host_mut().render(&mut out);
        assert!(out.iter().all(|&s| s == 1.0 || s == -1.0));
        assert!(serve_demand(&mut power).is_none());
    }

    #[test]
    fn test_worklet_demand_round_trip() {
        let mut power = controller(BridgeConfig::mailbox());
        power.host_mut().offer_context(Some(44_100.0));
        power.activate().unwrap();

        let batch = serve_demand(&mut power).expect("batch for first demand");
        assert_eq!(batch.len(), 128);
        assert!(!batch.is_silent());
    }

    #[test]
    fn test_off_yields_nothing() {
        let mut power = controller(BridgeConfig::mailbox());
        power.host_mut().offer_context(Some(44_100.0));
        power.activate().unwrap();
        power.toggle().unwrap();

        assert!(serve_demand(&mut power).is_none());
        let mut out = vec![0.7; 128];
        power.host_mut().render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_reconnect_after_toggle_needs_no_context() {
        let mut power = controller(BridgeConfig::mailbox());
        power.host_mut().offer_context(Some(44_100.0));
        power.activate().unwrap();
        power.toggle().unwrap();
        power.toggle().unwrap();

        assert!(power.is_on());
        assert_eq!(power.bridges_constructed(), 1);
        assert!(serve_demand(&mut power).is_some());
    }
}
