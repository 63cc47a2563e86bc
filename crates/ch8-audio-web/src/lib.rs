//! WebAssembly bindings for the ch8-audio bridge
//!
//! The page bootstrap owns the `AudioContext` and the audio node. It creates
//! a [`WebAudio`] once, forwards the UI toggle and the emulator's sound
//! opcodes, and wires the node callbacks to `fill` (script processor) or
//! `on_message` (worklet port).
//!
//! # Example Usage (JavaScript)
//!
//! ```javascript
//! import init, { WebAudio } from './ch8_audio_web.js';
//!
//! await init();
//! const audio = new WebAudio("mailbox");
//!
//! button.onclick = async () => {
//!     const ctx = new AudioContext();
//!     await ctx.audioWorklet.addModule("processor.js");
//!     const node = new AudioWorkletNode(ctx, "ch8-processor");
//!     node.port.onmessage = (e) => {
//!         const batch = audio.on_message(e.data);
//!         if (batch) node.port.postMessage(batch);
//!     };
//!     node.connect(ctx.destination);
//!     audio.activate(ctx.sampleRate);
//! };
//! ```

#![warn(missing_docs)]

mod host;

pub use host::{serve_demand, WebHost};

use ch8_audio::bridge::Message;
use ch8_audio::generator::PATTERN_BYTES;
use ch8_audio::{BridgeConfig, BridgeKind, PowerController, SoundGenerator};
use parking_lot::Mutex;
use std::sync::Arc;
use wasm_bindgen::prelude::*;

/// Set panic hook for better error messages in the browser console
#[cfg(feature = "console_error_panic_hook")]
#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

/// Log to browser console
macro_rules! console_log {
    ($($t:tt)*) => {
        web_sys::console::log_1(&format!($($t)*).into());
    }
}

/// Browser audio session: one generator, one bridge, one toggle
#[wasm_bindgen]
pub struct WebAudio {
    power: PowerController<WebHost>,
    generator: Arc<Mutex<SoundGenerator>>,
}

#[wasm_bindgen]
impl WebAudio {
    /// Create the session with the bridge strategy fixed for its lifetime
    ///
    /// # Arguments
    ///
    /// * `bridge` - `"polled"` (script processor) or `"mailbox"` (worklet)
    #[wasm_bindgen(constructor)]
    pub fn new(bridge: &str) -> Result<WebAudio, JsValue> {
        let kind: BridgeKind = bridge
            .parse()
            .map_err(|e| JsValue::from_str(&format!("{}", e)))?;
        let generator = SoundGenerator::shared();
        let power = PowerController::new(
            WebHost::new(),
            generator.clone(),
            BridgeConfig {
                kind,
                chunk_length: None,
            },
        );

        console_log!("Audio session created ({} bridge)", kind);
        Ok(WebAudio { power, generator })
    }

    /// Turn sound on from a user gesture.
    ///
    /// `sample_rate` is the new context's `sampleRate`, or `undefined` if the
    /// context could not be created; the session then stays off.
    pub fn activate(&mut self, sample_rate: Option<f32>) -> Result<(), JsValue> {
        self.power.host_mut().offer_context(sample_rate);
        self.power.activate().map_err(|e| {
            console_log!("{}", e);
            JsValue::from_str(&e.to_string())
        })
    }

    /// Flip sound on or off. The first call needs a context rate via `activate`.
    pub fn toggle(&mut self) -> Result<(), JsValue> {
        self.power
            .toggle()
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// On/off indicator
    pub fn is_on(&self) -> bool {
        self.power.is_on()
    }

    /// Bridge strategy name
    pub fn bridge_kind(&self) -> String {
        self.power.config().kind.to_string()
    }

    /// Samples per chunk; size the script processor buffer with this
    pub fn chunk_length(&self) -> usize {
        self.power.config().chunk_length()
    }

    /// Script-processor callback: write one chunk into the output buffer
    pub fn fill(&mut self, out: &mut [f32]) {
        self.power.host_mut().render(out);
    }

    /// Worklet port handler.
    ///
    /// A `"need"` token (or a `{"type":"demand"}` object) is answered with the
    /// next batch, to be posted back as a `Float32Array`. Anything else, and
    /// anything received while off, yields `undefined`.
    pub fn on_message(&mut self, msg: JsValue) -> Option<Vec<f32>> {
        let message = match msg.as_string() {
            Some(token) => Message::from_token(&token),
            None => {
                let text: String = js_sys::JSON::stringify(&msg).ok()?.into();
                Message::from_json(&text)
            }
        };

        match message {
            Ok(Message::Demand) => serve_demand(&mut self.power).map(|batch| batch.into_vec()),
            Ok(Message::Batch(_)) => None,
            Err(e) => {
                console_log!("Ignoring worklet message: {}", e);
                None
            }
        }
    }

    /// Service the producer once per emulator frame
    pub fn pump(&mut self) -> usize {
        self.power.pump()
    }

    /// FX18: load the sound timer
    pub fn set_sound_timer(&mut self, value: u8) {
        self.generator.lock().set_sound_timer(value);
    }

    /// 60 Hz timer tick; returns whether the timer was running
    pub fn tick_timer(&mut self) -> bool {
        self.generator.lock().tick_timer()
    }

    /// FX3A: set the XO-CHIP pitch register
    pub fn set_pitch(&mut self, pitch: u8) {
        self.generator.lock().set_pitch(pitch);
    }

    /// F002: load the 16-byte XO-CHIP audio pattern
    pub fn load_pattern(&mut self, pattern: &[u8]) -> Result<(), JsValue> {
        let pattern: [u8; PATTERN_BYTES] = pattern.try_into().map_err(|_| {
            JsValue::from_str(&format!(
                "pattern must be {} bytes, got {}",
                PATTERN_BYTES,
                pattern.len()
            ))
        })?;
        self.generator.lock().load_pattern(pattern);
        Ok(())
    }

    /// Return the generator to its power-on state
    pub fn reset(&mut self) {
        self.generator.lock().reset();
    }
}
