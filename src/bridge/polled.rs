//! Synchronous pull bridge
//!
//! The host renderer invokes the callback on its own periodic schedule and
//! the generator writes straight into the host buffer before the callback
//! returns. Nothing is computed ahead of a pull, so a slow generator shows up
//! as a host underrun rather than as drift.

use super::BridgeState;
use crate::sample::{fill_silence, ChunkLength, SampleRate, SharedSource};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Polled bridge: owns the generator handle and the current connection flag
pub struct PolledBridge {
    source: SharedSource,
    chunk: ChunkLength,
    rate: SampleRate,
    state: BridgeState,
    /// Liveness flag of the current connection
    live: Option<Arc<AtomicBool>>,
    /// Pulls served across all connections
    pulls: Arc<AtomicU64>,
}

impl PolledBridge {
    /// Create the bridge and announce the chunk length to the generator
    pub fn new(source: SharedSource, chunk: ChunkLength, rate: SampleRate) -> Self {
        source.lock().init_generator(chunk);
        info!(
            "Polled bridge ready: {} per pull at {} ({:.1} ms)",
            chunk,
            rate,
            chunk.duration_ms(rate)
        );

        PolledBridge {
            source,
            chunk,
            rate,
            state: BridgeState::Idle,
            live: None,
            pulls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Idle or Connected
    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Chunk length per pull
    pub fn chunk_length(&self) -> ChunkLength {
        self.chunk
    }

    /// Negotiated sample rate
    pub fn sample_rate(&self) -> SampleRate {
        self.rate
    }

    /// Number of renderer pulls that reached the generator
    pub fn pulls(&self) -> u64 {
        self.pulls.load(Ordering::Relaxed)
    }

    /// Start a connection. A previous connection is ended first.
    pub fn connect(&mut self) -> PolledRenderer {
        if self.live.is_some() {
            self.disconnect();
        }

        let live = Arc::new(AtomicBool::new(true));
        self.live = Some(Arc::clone(&live));
        self.state = BridgeState::Connected;
        debug!("Polled bridge connected");

        PolledRenderer {
            source: Arc::clone(&self.source),
            chunk: self.chunk,
            rate: self.rate,
            live,
            pulls: Arc::clone(&self.pulls),
        }
    }

    /// End the current connection; its renderer goes silent
    pub fn disconnect(&mut self) {
        if let Some(live) = self.live.take() {
            live.store(false, Ordering::Release);
            debug!("Polled bridge disconnected after {} pulls", self.pulls());
        }
        self.state = BridgeState::Idle;
    }
}

/// Renderer side of a polled connection, called from the host callback
pub struct PolledRenderer {
    source: SharedSource,
    chunk: ChunkLength,
    rate: SampleRate,
    live: Arc<AtomicBool>,
    pulls: Arc<AtomicU64>,
}

impl PolledRenderer {
    /// Fill the host buffer.
    ///
    /// One generator call per chunk-sized slice of `out`, so a host buffer of
    /// exactly one chunk costs exactly one call. A renderer whose connection
    /// ended produces silence and leaves the generator untouched.
    pub fn render(&mut self, out: &mut [f32]) {
        if !self.live.load(Ordering::Acquire) {
            fill_silence(out);
            return;
        }

        self.pulls.fetch_add(1, Ordering::Relaxed);
        let mut source = self.source.lock();
        for chunk in out.chunks_mut(self.chunk.get()) {
            source.fill_into(chunk, self.rate);
        }
    }

    /// Chunk length per pull
    pub fn chunk_length(&self) -> ChunkLength {
        self.chunk
    }

    /// False once the owning bridge disconnected this renderer
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}
