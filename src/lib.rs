//! Real-time audio bridge for a CHIP-8 / XO-CHIP emulator front end
//!
//! The emulator core owns a deterministic sound generator. The host audio
//! sink pulls samples on its own schedule. This crate sits between the two
//! and hands freshly synthesized PCM to the sink without drifting away from
//! emulator time.
//!
//! # Features
//! - Two bridge strategies chosen once per session:
//!   - [`PolledBridge`]: the host renderer calls back synchronously and the
//!     generator fills the host buffer inline
//!   - [`MailboxBridge`]: an isolated rendering context and the producer talk
//!     through a single-slot demand/batch rendezvous
//! - [`PowerController`] state machine behind the UI on/off toggle
//! - Silence fallback whenever no batch is ready
//! - Reference CHIP-8 beeper / XO-CHIP pattern generator
//!
//! # Crate feature flags
//! - `generator` (default): Reference [`SoundGenerator`]
//! - `export` (default): Headless WAV rendering via hound
//! - `streaming` (opt-in): Native real-time output via rodio
//!
//! # Quick start
//! ```
//! use ch8_audio::{BridgeConfig, ManualHost, PowerController, SoundGenerator};
//!
//! let generator = SoundGenerator::shared();
//! let mut power = PowerController::new(
//!     ManualHost::new(44_100),
//!     generator.clone(),
//!     BridgeConfig::polled(),
//! );
//!
//! generator.lock().set_sound_timer(30);
//! power.activate().unwrap();
//! let chunk = power.host_mut().pull(512);
//! assert_eq!(chunk.len(), 512);
//! ```

#![warn(missing_docs)]

pub mod bridge; // Buffer bridge strategies
pub mod config; // Bridge configuration
#[cfg(feature = "export")]
pub mod export; // WAV rendering
#[cfg(feature = "generator")]
pub mod generator; // CHIP-8 / XO-CHIP sound generator
pub mod power; // Power controller and host seam
pub mod sample; // Sample batches and the generator contract
#[cfg(feature = "streaming")]
pub mod streaming; // Native audio output

/// Error types for audio bridge operations
#[derive(thiserror::Error, Debug)]
pub enum Ch8AudioError {
    /// The host audio sink could not be created (usually no user gesture yet)
    #[error("Audio unavailable: {0}")]
    AudioUnavailable(String),

    /// Audio device error after the sink was created
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON configuration or message
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error writing an audio file
    #[error("Export error: {0}")]
    Export(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Ch8AudioError {
    /// Converts a String into `Ch8AudioError::Other`.
    ///
    /// Prefer the specific variants (`Config`, `AudioUnavailable`, ...) when
    /// the failure has a known category.
    fn from(msg: String) -> Self {
        Ch8AudioError::Other(msg)
    }
}

impl From<&str> for Ch8AudioError {
    fn from(msg: &str) -> Self {
        Ch8AudioError::Other(msg.to_string())
    }
}

/// Result type for audio bridge operations
pub type Result<T> = std::result::Result<T, Ch8AudioError>;

// Public API exports
pub use bridge::{BridgeKind, BridgeState, BufferBridge, MailboxBridge, PolledBridge, Renderer};
pub use config::BridgeConfig;
#[cfg(feature = "generator")]
pub use generator::{SoundGenerator, ToneMode};
pub use power::{AudioHost, ManualHost, PowerController, PowerState};
pub use sample::{ChunkLength, SampleBatch, SampleRate, SampleSource, SharedSource};

#[cfg(feature = "streaming")]
pub use streaming::RodioHost;
