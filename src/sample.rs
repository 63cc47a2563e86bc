//! Sample batches, rates and the generator contract
//!
//! A [`SampleSource`] is the emulation core's view of its sound generator:
//! asking it for `n` samples advances generator time by exactly `n` sample
//! periods. Everything else in the crate only moves those samples around.

use crate::{Ch8AudioError, Result};
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Default sample rate (44.1 kHz), only for hosts that cannot negotiate one
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Host sink sample rate in samples per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleRate(u32);

impl SampleRate {
    /// Create a sample rate, rejecting zero
    pub fn new(hz: u32) -> Result<Self> {
        if hz == 0 {
            return Err(Ch8AudioError::Config(
                "sample rate must be greater than 0".into(),
            ));
        }
        Ok(SampleRate(hz))
    }

    /// Rate in Hz
    pub fn hz(self) -> u32 {
        self.0
    }

    /// Rate in Hz as a float, for phase arithmetic
    pub fn as_f64(self) -> f64 {
        f64::from(self.0)
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

/// Number of samples produced or consumed per invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkLength(usize);

impl ChunkLength {
    /// Create a chunk length, rejecting zero
    pub fn new(samples: usize) -> Result<Self> {
        if samples == 0 {
            return Err(Ch8AudioError::Config(
                "chunk length must be greater than 0".into(),
            ));
        }
        Ok(ChunkLength(samples))
    }

    /// Length in samples
    pub fn get(self) -> usize {
        self.0
    }

    /// Duration of one chunk in milliseconds at `rate`
    pub fn duration_ms(self, rate: SampleRate) -> f32 {
        (self.0 as f32 / rate.hz() as f32) * 1000.0
    }
}

impl fmt::Display for ChunkLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} samples", self.0)
    }
}

/// Fixed-length run of normalized samples in [-1.0, 1.0]
///
/// Produced once by a [`SampleSource`] and consumed once by a renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    samples: Vec<f32>,
}

impl SampleBatch {
    /// All-zero batch of `len` samples
    pub fn silence(len: usize) -> Self {
        SampleBatch {
            samples: vec![0.0; len],
        }
    }

    /// Wrap samples coming from outside the crate.
    ///
    /// Empty input is rejected; out-of-range and non-finite values are
    /// clamped (NaN becomes silence).
    pub fn from_samples(mut samples: Vec<f32>) -> Result<Self> {
        if samples.is_empty() {
            return Err(Ch8AudioError::Config(
                "sample batch must not be empty".into(),
            ));
        }
        for sample in &mut samples {
            *sample = if sample.is_nan() {
                0.0
            } else {
                sample.clamp(-1.0, 1.0)
            };
        }
        Ok(SampleBatch { samples })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the batch holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True when every sample is exactly zero
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0.0)
    }

    /// Borrow the samples
    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    /// Copy into `out`; any tail beyond the batch is zero-filled
    pub fn copy_to(&self, out: &mut [f32]) {
        let n = out.len().min(self.samples.len());
        out[..n].copy_from_slice(&self.samples[..n]);
        fill_silence(&mut out[n..]);
    }

    /// Take ownership of the samples
    pub fn into_vec(self) -> Vec<f32> {
        self.samples
    }
}

impl Deref for SampleBatch {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.samples
    }
}

/// Silence fallback: zero `out` in place. Never blocks, never fails.
pub fn fill_silence(out: &mut [f32]) {
    out.fill(0.0);
}

/// Sample generation capability exposed by the emulation core
///
/// Implementations must advance generator time by exactly `out.len()` sample
/// periods per [`fill_into`](Self::fill_into) call. The bridges guarantee they
/// never call it twice for the same window and never skip a requested chunk.
pub trait SampleSource: Send {
    /// Inform the generator of the chunk size chosen for this bridge.
    ///
    /// Called exactly once per bridge construction.
    fn init_generator(&mut self, chunk: ChunkLength);

    /// Write `out.len()` samples for the current generator state at `rate`.
    fn fill_into(&mut self, out: &mut [f32], rate: SampleRate);

    /// Generate `count` samples into a new batch.
    fn fill(&mut self, count: usize, rate: SampleRate) -> SampleBatch {
        let mut samples = vec![0.0; count];
        self.fill_into(&mut samples, rate);
        SampleBatch { samples }
    }
}

/// Generator handle shared between the emulator and the bridge
pub type SharedSource = Arc<Mutex<dyn SampleSource>>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(f32);

    impl SampleSource for Constant {
        fn init_generator(&mut self, _chunk: ChunkLength) {}

        fn fill_into(&mut self, out: &mut [f32], _rate: SampleRate) {
            out.fill(self.0);
        }
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(SampleRate::new(0).is_err());
        assert_eq!(SampleRate::new(48_000).unwrap().hz(), 48_000);
    }

    #[test]
    fn test_zero_chunk_rejected() {
        let err = ChunkLength::new(0).unwrap_err();
        assert!(err.to_string().contains("greater than 0"));
    }

    #[test]
    fn test_chunk_duration() {
        let chunk = ChunkLength::new(441).unwrap();
        let rate = SampleRate::new(44_100).unwrap();
        assert!((chunk.duration_ms(rate) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_silence_batch() {
        let batch = SampleBatch::silence(128);
        assert_eq!(batch.len(), 128);
        assert!(batch.is_silent());
    }

    #[test]
    fn test_from_samples_clamps() {
        let batch = SampleBatch::from_samples(vec![2.0, -3.0, 0.25, f32::NAN]).unwrap();
        assert_eq!(batch.as_slice(), &[1.0, -1.0, 0.25, 0.0]);
        assert!(SampleBatch::from_samples(Vec::new()).is_err());
    }

    #[test]
    fn test_copy_to_zero_fills_tail() {
        let batch = SampleBatch::from_samples(vec![0.5; 4]).unwrap();
        let mut out = [1.0f32; 6];
        batch.copy_to(&mut out);
        assert_eq!(out, [0.5, 0.5, 0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_default_fill_allocates_exact_count() {
        let mut source = Constant(0.5);
        let rate = SampleRate::new(8_000).unwrap();
        for count in [1, 7, 128, 512] {
            let batch = source.fill(count, rate);
            assert_eq!(batch.len(), count);
            assert!(batch.iter().all(|&s| s == 0.5));
        }
    }

    #[test]
    fn test_fill_silence() {
        let mut out = vec![0.7f32; 32];
        fill_silence(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
