//! Asynchronous single-slot mailbox bridge
//!
//! The renderer lives in an isolated context and never blocks. It talks to
//! the producer through two capacity-1 channels:
//! - demand (renderer → producer): "my buffer is consumed, send the next one"
//! - batch (producer → renderer): exactly one chunk per demand
//!
//! At most one demand is outstanding and at most one batch is stored, so the
//! producer can never run ahead of the renderer. Each connection gets fresh
//! channels and a liveness flag; whatever is in flight when a connection
//! ends is dropped with it, including on the renderer side.

use super::BridgeState;
use crate::sample::{fill_silence, ChunkLength, SampleBatch, SampleRate, SharedSource};
use crate::{Ch8AudioError, Result};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Token the browser worklet posts when it needs the next batch
pub const DEMAND_TOKEN: &str = "need";

/// Empty-payload demand signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Demand;

/// Mailbox wire protocol
///
/// JSON form: `{"type":"demand"}` and `{"type":"batch","payload":[...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Message {
    /// Renderer consumed its buffer and needs the next one
    Demand,
    /// One chunk of samples in [-1.0, 1.0]
    Batch(Vec<f32>),
}

impl Message {
    /// Encode as JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode the worklet's bare string token
    pub fn from_token(token: &str) -> Result<Self> {
        if token == DEMAND_TOKEN || token == "demand" {
            Ok(Message::Demand)
        } else {
            Err(Ch8AudioError::Other(format!("unknown mailbox token '{token}'")))
        }
    }

    /// Validate a batch payload into a [`SampleBatch`]
    pub fn into_batch(self) -> Option<Result<SampleBatch>> {
        match self {
            Message::Demand => None,
            Message::Batch(samples) => Some(SampleBatch::from_samples(samples)),
        }
    }
}

impl From<SampleBatch> for Message {
    fn from(batch: SampleBatch) -> Self {
        Message::Batch(batch.into_vec())
    }
}

/// Producer-side endpoints of one connection
struct ProducerEndpoint {
    demands: HeapCons<Demand>,
    batches: HeapProd<SampleBatch>,
    live: Arc<AtomicBool>,
}

/// Mailbox bridge: the producing side
pub struct MailboxBridge {
    source: SharedSource,
    chunk: ChunkLength,
    rate: SampleRate,
    state: BridgeState,
    endpoint: Option<ProducerEndpoint>,
    batches_sent: u64,
    stale_discards: u64,
}

impl MailboxBridge {
    /// Create the bridge and announce the chunk length to the generator
    pub fn new(source: SharedSource, chunk: ChunkLength, rate: SampleRate) -> Self {
        source.lock().init_generator(chunk);
        info!(
            "Mailbox bridge ready: {} per batch at {} ({:.1} ms)",
            chunk,
            rate,
            chunk.duration_ms(rate)
        );

        MailboxBridge {
            source,
            chunk,
            rate,
            state: BridgeState::Idle,
            endpoint: None,
            batches_sent: 0,
            stale_discards: 0,
        }
    }

    /// Idle or Connected
    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Chunk length per batch
    pub fn chunk_length(&self) -> ChunkLength {
        self.chunk
    }

    /// Negotiated sample rate
    pub fn sample_rate(&self) -> SampleRate {
        self.rate
    }

    /// Batches produced across all connections
    pub fn batches_sent(&self) -> u64 {
        self.batches_sent
    }

    /// Demands and batches dropped because their connection ended
    pub fn stale_discards(&self) -> u64 {
        self.stale_discards
    }

    /// Start a connection with fresh channels. A previous connection is ended first.
    pub fn connect(&mut self) -> MailboxRenderer {
        if self.endpoint.is_some() {
            self.disconnect();
        }

        let (demand_tx, demand_rx) = HeapRb::<Demand>::new(1).split();
        let (batch_tx, batch_rx) = HeapRb::<SampleBatch>::new(1).split();
        let live = Arc::new(AtomicBool::new(true));

        self.endpoint = Some(ProducerEndpoint {
            demands: demand_rx,
            batches: batch_tx,
            live: Arc::clone(&live),
        });
        self.state = BridgeState::Connected;
        debug!("Mailbox bridge connected");

        MailboxRenderer {
            chunk: self.chunk,
            demands: demand_tx,
            batches: batch_rx,
            slot: None,
            cursor: 0,
            awaiting: false,
            live,
            silent_quanta: 0,
        }
    }

    /// End the current connection, discarding anything still in flight
    pub fn disconnect(&mut self) {
        if let Some(mut endpoint) = self.endpoint.take() {
            endpoint.live.store(false, Ordering::Release);
            let mut stale = endpoint.batches.occupied_len();
            while endpoint.demands.try_pop().is_some() {
                stale += 1;
            }
            if stale > 0 {
                self.stale_discards += stale as u64;
                debug!("Mailbox bridge dropped {} in-flight message(s)", stale);
            }
            debug!("Mailbox bridge disconnected");
        }
        self.state = BridgeState::Idle;
    }

    /// Service pending demands: one generator call and one batch per demand.
    ///
    /// Does nothing while disconnected, so generator time does not advance.
    pub fn pump(&mut self) -> usize {
        let Some(endpoint) = self.endpoint.as_mut() else {
            return 0;
        };

        let mut served = 0;
        while endpoint.demands.try_pop().is_some() {
            let batch = self.source.lock().fill(self.chunk.get(), self.rate);
            if endpoint.batches.try_push(batch).is_err() {
                // Renderer still holds an undrained batch; it never demands in that state.
                warn!("Mailbox slot occupied, dropping batch");
                self.stale_discards += 1;
                continue;
            }
            served += 1;
            self.batches_sent += 1;
        }

        if served > 0 {
            trace!("Mailbox bridge sent {} batch(es)", served);
        }
        served
    }
}

/// Isolated-context side of a mailbox connection
pub struct MailboxRenderer {
    chunk: ChunkLength,
    demands: HeapProd<Demand>,
    batches: HeapCons<SampleBatch>,
    /// Single stored batch, replaced on arrival
    slot: Option<SampleBatch>,
    /// Samples of `slot` already rendered
    cursor: usize,
    /// A demand is outstanding
    awaiting: bool,
    /// Cleared when the producer ends this connection
    live: Arc<AtomicBool>,
    silent_quanta: u64,
}

impl MailboxRenderer {
    /// Render one quantum from the stored batch, carrying any unread tail
    /// into the next call. Whatever the batch cannot cover is silence.
    ///
    /// A demand is emitted once the stored batch is used up, unless one is
    /// already outstanding. After the connection ended this only renders
    /// silence and drops anything still in flight.
    pub fn render(&mut self, out: &mut [f32]) {
        if !self.is_live() {
            self.discard();
            fill_silence(out);
            return;
        }

        let mut written = 0;
        while written < out.len() {
            self.receive();
            let Some(batch) = self.slot.as_ref() else {
                fill_silence(&mut out[written..]);
                self.silent_quanta += 1;
                break;
            };

            let unread = &batch.as_slice()[self.cursor..];
            let n = unread.len().min(out.len() - written);
            out[written..written + n].copy_from_slice(&unread[..n]);
            written += n;
            self.cursor += n;

            if self.cursor >= batch.len() {
                self.slot = None;
                self.cursor = 0;
                self.post_demand();
            }
        }
        self.post_demand();
    }

    /// Move an arrived batch into the slot, replacing any stored one.
    ///
    /// Unrequested batches are accepted as well. Returns true if one arrived.
    pub fn receive(&mut self) -> bool {
        if !self.is_live() {
            self.discard();
            return false;
        }

        let mut arrived = false;
        while let Some(batch) = self.batches.try_pop() {
            if self.slot.replace(batch).is_some() {
                trace!("Mailbox renderer replaced an unconsumed batch");
            }
            self.cursor = 0;
            self.awaiting = false;
            arrived = true;
        }
        arrived
    }

    /// Receive, then remove and return the unread part of the stored batch
    pub fn take_batch(&mut self) -> Option<SampleBatch> {
        self.receive();
        let batch = self.slot.take()?;
        match std::mem::take(&mut self.cursor) {
            0 => Some(batch),
            cursor => SampleBatch::from_samples(batch.as_slice()[cursor..].to_vec()).ok(),
        }
    }

    /// Emit a demand unless one is outstanding, a batch is still stored, or
    /// the connection has ended. Returns true if sent.
    pub fn post_demand(&mut self) -> bool {
        if self.awaiting || self.slot.is_some() || !self.is_live() {
            return false;
        }
        match self.demands.try_push(Demand) {
            Ok(()) => {
                self.awaiting = true;
                true
            }
            Err(_) => false,
        }
    }

    /// False once the producer has ended this connection
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn discard(&mut self) {
        while self.batches.try_pop().is_some() {}
        self.slot = None;
        self.cursor = 0;
        self.awaiting = false;
    }

    /// Chunk length per batch
    pub fn chunk_length(&self) -> ChunkLength {
        self.chunk
    }

    /// 0 or 1
    pub fn outstanding_demands(&self) -> usize {
        usize::from(self.awaiting)
    }

    /// 0 or 1
    pub fn stored_batches(&self) -> usize {
        usize::from(self.slot.is_some())
    }

    /// Samples of the stored batch not yet rendered
    pub fn unread_samples(&self) -> usize {
        self.slot
            .as_ref()
            .map_or(0, |batch| batch.len() - self.cursor)
    }

    /// Quanta rendered as silence because no batch was ready
    pub fn silent_quanta(&self) -> u64 {
        self.silent_quanta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleSource;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Ramp {
        calls: usize,
        advanced: usize,
    }

    impl SampleSource for Ramp {
        fn init_generator(&mut self, _chunk: ChunkLength) {}

        fn fill_into(&mut self, out: &mut [f32], _rate: SampleRate) {
            self.calls += 1;
            for sample in out.iter_mut() {
                self.advanced += 1;
                *sample = (self.advanced % 10) as f32 / 10.0;
            }
        }
    }

    fn bridge() -> (Arc<Mutex<Ramp>>, MailboxBridge) {
        let ramp = Arc::new(Mutex::new(Ramp::default()));
        let source: SharedSource = ramp.clone();
        let bridge = MailboxBridge::new(
            source,
            ChunkLength::new(128).unwrap(),
            SampleRate::new(48_000).unwrap(),
        );
        (ramp, bridge)
    }

    #[test]
    fn test_first_quantum_is_silence_then_demand() {
        let (ramp, mut bridge) = bridge();
        let mut renderer = bridge.connect();
        let mut out = vec![0.3; 128];

        renderer.render(&mut out);

        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(renderer.outstanding_demands(), 1);
        assert_eq!(renderer.silent_quanta(), 1);
        assert_eq!(ramp.lock().calls, 0);
    }

    #[test]
    fn test_round_trip_delivers_batch_verbatim() {
        let (ramp, mut bridge) = bridge();
        let mut renderer = bridge.connect();
        let mut out = vec![0.0; 128];

        renderer.render(&mut out);
        assert_eq!(bridge.pump(), 1);

        let expected = {
            let mut check = Ramp::default();
            check.fill(128, SampleRate::new(48_000).unwrap())
        };
        renderer.render(&mut out);
        assert_eq!(out.as_slice(), expected.as_slice());
        assert_eq!(ramp.lock().advanced, 128);
    }

    #[test]
    fn test_single_outstanding_demand() {
        let (ramp, mut bridge) = bridge();
        let mut renderer = bridge.connect();
        let mut out = vec![0.0; 128];

        // Slow producer: the renderer keeps pulling without an answer
        for _ in 0..5 {
            renderer.render(&mut out);
            assert!(renderer.outstanding_demands() <= 1);
            assert!(renderer.stored_batches() <= 1);
        }
        assert_eq!(renderer.silent_quanta(), 5);

        // One demand outstanding means exactly one batch produced
        assert_eq!(bridge.pump(), 1);
        assert_eq!(bridge.pump(), 0);
        assert_eq!(ramp.lock().calls, 1);
    }

    #[test]
    fn test_pump_without_demand_does_not_advance() {
        let (ramp, mut bridge) = bridge();
        let _renderer = bridge.connect();
        assert_eq!(bridge.pump(), 0);
        assert_eq!(ramp.lock().advanced, 0);
    }

    #[test]
    fn test_pump_while_disconnected_does_nothing() {
        let (ramp, mut bridge) = bridge();
        let mut renderer = bridge.connect();
        renderer.render(&mut [0.0; 128]);
        bridge.disconnect();

        assert_eq!(bridge.pump(), 0);
        assert_eq!(ramp.lock().advanced, 0);
        assert_eq!(bridge.stale_discards(), 1);
    }

    #[test]
    fn test_in_flight_batch_discarded_on_disconnect() {
        let (_ramp, mut bridge) = bridge();
        let mut old = bridge.connect();
        let mut out = vec![0.0; 128];
        old.render(&mut out);
        bridge.pump();
        bridge.disconnect();
        assert_eq!(bridge.stale_discards(), 1);

        let mut fresh = bridge.connect();
        fresh.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(fresh.outstanding_demands(), 1);
    }

    #[test]
    fn test_old_renderer_silent_after_disconnect() {
        let (ramp, mut bridge) = bridge();
        let mut old = bridge.connect();
        let mut out = vec![0.0; 128];
        old.render(&mut out);
        assert_eq!(bridge.pump(), 1);
        bridge.disconnect();
        assert!(!old.is_live());

        out.fill(0.3);
        old.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(old.outstanding_demands(), 0);
        assert_eq!(old.stored_batches(), 0);
        assert!(!old.post_demand());
        assert!(old.take_batch().is_none());
        assert_eq!(bridge.stale_discards(), 1);

        // The old renderer cannot reach the next connection's producer
        let _fresh = bridge.connect();
        old.render(&mut out);
        assert_eq!(bridge.pump(), 0);
        assert_eq!(ramp.lock().calls, 1);
    }

    #[test]
    fn test_stored_batch_dropped_when_connection_ends() {
        let (_ramp, mut bridge) = bridge();
        let mut old = bridge.connect();
        old.post_demand();
        bridge.pump();
        assert!(old.receive());
        bridge.disconnect();

        let mut out = vec![0.3; 128];
        old.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(old.stored_batches(), 0);
    }

    #[test]
    fn test_short_pulls_carry_batch_tail() {
        let (ramp, mut bridge) = bridge();
        let mut renderer = bridge.connect();
        let expected = {
            let mut check = Ramp::default();
            check.fill(128, SampleRate::new(48_000).unwrap())
        };

        renderer.render(&mut [0.0; 64]);
        bridge.pump();

        let mut first = vec![0.0; 64];
        renderer.render(&mut first);
        assert_eq!(first.as_slice(), &expected[..64]);
        assert_eq!(renderer.unread_samples(), 64);
        assert_eq!(renderer.outstanding_demands(), 0);
        assert_eq!(bridge.pump(), 0);

        let mut second = vec![0.0; 64];
        renderer.render(&mut second);
        assert_eq!(second.as_slice(), &expected[64..]);
        assert_eq!(renderer.unread_samples(), 0);
        assert_eq!(renderer.outstanding_demands(), 1);
        assert_eq!(ramp.lock().advanced, 128);
    }

    #[test]
    fn test_long_pull_uses_whole_batch_before_silence() {
        let (_ramp, mut bridge) = bridge();
        let mut renderer = bridge.connect();
        renderer.render(&mut [0.0; 128]);
        bridge.pump();

        let mut out = vec![0.3; 200];
        renderer.render(&mut out);
        let expected = {
            let mut check = Ramp::default();
            check.fill(128, SampleRate::new(48_000).unwrap())
        };
        assert_eq!(&out[..128], expected.as_slice());
        assert!(out[128..].iter().all(|&s| s == 0.0));
        assert_eq!(renderer.outstanding_demands(), 1);
        assert_eq!(renderer.silent_quanta(), 2);
    }

    #[test]
    fn test_take_batch_returns_unread_tail() {
        let (_ramp, mut bridge) = bridge();
        let mut renderer = bridge.connect();
        renderer.post_demand();
        bridge.pump();

        let mut head = vec![0.0; 100];
        renderer.render(&mut head);
        let tail = renderer.take_batch().expect("unread tail");
        assert_eq!(tail.len(), 28);
        assert_eq!(renderer.unread_samples(), 0);
    }

    #[test]
    fn test_demand_only_after_batch_consumed() {
        let (_ramp, mut bridge) = bridge();
        let mut renderer = bridge.connect();
        assert!(renderer.post_demand());
        assert!(!renderer.post_demand());
        bridge.pump();

        assert!(renderer.receive());
        assert_eq!(renderer.outstanding_demands(), 0);
        assert_eq!(renderer.stored_batches(), 1);

        let mut out = vec![0.0; 128];
        renderer.render(&mut out);
        assert_eq!(renderer.stored_batches(), 0);
        assert_eq!(renderer.outstanding_demands(), 1);
    }

    #[test]
    fn test_take_batch() {
        let (_ramp, mut bridge) = bridge();
        let mut renderer = bridge.connect();
        assert!(renderer.take_batch().is_none());
        renderer.post_demand();
        bridge.pump();
        let batch = renderer.take_batch().expect("batch after round trip");
        assert_eq!(batch.len(), 128);
        assert!(renderer.take_batch().is_none());
    }

    #[test]
    fn test_message_json_form() {
        assert_eq!(Message::Demand.to_json().unwrap(), r#"{"type":"demand"}"#);
        let batch = Message::Batch(vec![0.5, -0.5]);
        assert_eq!(batch.to_json().unwrap(), r#"{"type":"batch","payload":[0.5,-0.5]}"#);
        assert_eq!(Message::from_json(r#"{"type":"demand"}"#).unwrap(), Message::Demand);
    }

    #[test]
    fn test_message_tokens() {
        assert_eq!(Message::from_token("need").unwrap(), Message::Demand);
        assert!(Message::from_token("more").is_err());
    }

    #[test]
    fn test_batch_message_validation() {
        let batch = Message::Batch(vec![1.5, 0.0]).into_batch().unwrap().unwrap();
        assert_eq!(batch.as_slice(), &[1.0, 0.0]);
        assert!(Message::Batch(Vec::new()).into_batch().unwrap().is_err());
        assert!(Message::Demand.into_batch().is_none());
    }
}
