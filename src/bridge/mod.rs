//! Buffer bridges between the sound generator and the host renderer
//!
//! One strategy is picked per session and never swapped:
//! - [`PolledBridge`]: the renderer's callback fills the host buffer inline
//! - [`MailboxBridge`]: an isolated renderer and the producer exchange one
//!   demand and one batch at a time
//!
//! A bridge hands the host a [`Renderer`] on every connect. The renderer is
//! what the host pulls from; the bridge stays with the controller.

pub mod mailbox;
pub mod polled;

pub use mailbox::{MailboxBridge, MailboxRenderer, Message};
pub use polled::{PolledBridge, PolledRenderer};

use crate::sample::{ChunkLength, SampleRate, SharedSource};
use crate::Ch8AudioError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default chunk length for the polled strategy
pub const DEFAULT_POLLED_CHUNK: usize = 512;

/// Default chunk length for the mailbox strategy (one render quantum)
pub const DEFAULT_MAILBOX_CHUNK: usize = 128;

/// Bridge lifecycle as seen from the output path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeState {
    /// No bridge constructed yet
    #[default]
    Uninitialized,
    /// Constructed, generator initialized, not attached to the output
    Idle,
    /// Attached to the audible output path
    Connected,
}

/// Bridge strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeKind {
    /// Synchronous main-thread callback
    #[default]
    #[serde(alias = "script-processor")]
    Polled,
    /// Isolated rendering context with message passing
    #[serde(alias = "worklet")]
    Mailbox,
}

impl BridgeKind {
    /// Chunk length used when configuration does not pick one
    pub fn default_chunk(self) -> usize {
        match self {
            BridgeKind::Polled => DEFAULT_POLLED_CHUNK,
            BridgeKind::Mailbox => DEFAULT_MAILBOX_CHUNK,
        }
    }

    /// Lowercase name as used in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeKind::Polled => "polled",
            BridgeKind::Mailbox => "mailbox",
        }
    }
}

impl fmt::Display for BridgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BridgeKind {
    type Err = Ch8AudioError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "polled" | "script-processor" => Ok(BridgeKind::Polled),
            "mailbox" | "worklet" => Ok(BridgeKind::Mailbox),
            other => Err(Ch8AudioError::Config(format!(
                "unknown bridge kind '{other}' (expected 'polled' or 'mailbox')"
            ))),
        }
    }
}

/// The single bridge instance of a session
pub enum BufferBridge {
    /// Synchronous pull strategy
    Polled(PolledBridge),
    /// Asynchronous mailbox strategy
    Mailbox(MailboxBridge),
}

impl BufferBridge {
    /// Build the bridge for `kind`; initializes the generator once.
    pub fn new(
        kind: BridgeKind,
        source: SharedSource,
        chunk: ChunkLength,
        rate: SampleRate,
    ) -> Self {
        match kind {
            BridgeKind::Polled => BufferBridge::Polled(PolledBridge::new(source, chunk, rate)),
            BridgeKind::Mailbox => BufferBridge::Mailbox(MailboxBridge::new(source, chunk, rate)),
        }
    }

    /// Strategy of this bridge
    pub fn kind(&self) -> BridgeKind {
        match self {
            BufferBridge::Polled(_) => BridgeKind::Polled,
            BufferBridge::Mailbox(_) => BridgeKind::Mailbox,
        }
    }

    /// Idle or Connected
    pub fn state(&self) -> BridgeState {
        match self {
            BufferBridge::Polled(bridge) => bridge.state(),
            BufferBridge::Mailbox(bridge) => bridge.state(),
        }
    }

    /// Fixed chunk length of this bridge
    pub fn chunk_length(&self) -> ChunkLength {
        match self {
            BufferBridge::Polled(bridge) => bridge.chunk_length(),
            BufferBridge::Mailbox(bridge) => bridge.chunk_length(),
        }
    }

    /// Sample rate negotiated at construction
    pub fn sample_rate(&self) -> SampleRate {
        match self {
            BufferBridge::Polled(bridge) => bridge.sample_rate(),
            BufferBridge::Mailbox(bridge) => bridge.sample_rate(),
        }
    }

    /// Start a connection and return the renderer the host should pull
    pub fn connect(&mut self) -> Renderer {
        match self {
            BufferBridge::Polled(bridge) => Renderer::Polled(bridge.connect()),
            BufferBridge::Mailbox(bridge) => Renderer::Mailbox(bridge.connect()),
        }
    }

    /// End the current connection; the generator stops advancing
    pub fn disconnect(&mut self) {
        match self {
            BufferBridge::Polled(bridge) => bridge.disconnect(),
            BufferBridge::Mailbox(bridge) => bridge.disconnect(),
        }
    }

    /// Service pending demands (mailbox only). Returns batches produced.
    pub fn pump(&mut self) -> usize {
        match self {
            BufferBridge::Polled(_) => 0,
            BufferBridge::Mailbox(bridge) => bridge.pump(),
        }
    }
}

impl fmt::Debug for BufferBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferBridge")
            .field("kind", &self.kind())
            .field("state", &self.state())
            .field("chunk", &self.chunk_length())
            .field("rate", &self.sample_rate())
            .finish()
    }
}

/// What the host pulls from while a connection is live
pub enum Renderer {
    /// Inline generator fill
    Polled(PolledRenderer),
    /// Isolated-context mailbox endpoint
    Mailbox(MailboxRenderer),
}

impl Renderer {
    /// Render one quantum into the host buffer
    pub fn render(&mut self, out: &mut [f32]) {
        match self {
            Renderer::Polled(renderer) => renderer.render(out),
            Renderer::Mailbox(renderer) => renderer.render(out),
        }
    }

    /// Chunk length the renderer expects per pull
    pub fn chunk_length(&self) -> ChunkLength {
        match self {
            Renderer::Polled(renderer) => renderer.chunk_length(),
            Renderer::Mailbox(renderer) => renderer.chunk_length(),
        }
    }

    /// Strategy of the owning bridge
    pub fn kind(&self) -> BridgeKind {
        match self {
            Renderer::Polled(_) => BridgeKind::Polled,
            Renderer::Mailbox(_) => BridgeKind::Mailbox,
        }
    }
}
