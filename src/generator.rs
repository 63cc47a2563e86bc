//! CHIP-8 / XO-CHIP sound generator
//!
//! Two sound models share one sound timer:
//! - CHIP-8: a fixed square-wave beep while the timer runs
//! - XO-CHIP: a 128-bit 1-bit waveform pattern played at a programmable pitch
//!
//! The generator is the reference [`SampleSource`]. The emulator drives the
//! timer, pitch and pattern; the audio bridge drives sample generation.

use crate::sample::{fill_silence, ChunkLength, SampleRate, SampleSource};
use parking_lot::Mutex;
use std::sync::Arc;

/// Frequency of the classic CHIP-8 beep
pub const BEEP_FREQ_HZ: f64 = 440.0;

/// Pattern length in bytes (128 one-bit steps)
pub const PATTERN_BYTES: usize = 16;

/// Pattern length in steps
pub const PATTERN_STEPS: usize = PATTERN_BYTES * 8;

/// XO-CHIP pitch register value that plays the pattern at 4000 Hz
pub const DEFAULT_PITCH: u8 = 64;

/// Active sound model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToneMode {
    /// Fixed-frequency square wave
    #[default]
    Chip8,
    /// Programmable pattern buffer
    XoChip,
}

/// Pattern playback rate for a pitch register value: `4000 * 2^((pitch - 64) / 48)`
pub fn pattern_freq(pitch: u8) -> f64 {
    4000.0 * 2f64.powf((f64::from(pitch) - 64.0) / 48.0)
}

/// Emulated sound hardware state
#[derive(Debug, Clone, Default)]
pub struct SoundGenerator {
    pattern: [u8; PATTERN_BYTES],
    pitch: u8,
    /// Sound timer, counts down at 60 Hz; audible while non-zero
    st: u8,
    /// Fractional position inside the current waveform period
    phase: f64,
    mode: ToneMode,
    chunk: Option<ChunkLength>,
    init_count: usize,
    samples_generated: u64,
}

impl SoundGenerator {
    /// Create a silent generator in CHIP-8 mode
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a generator wrapped for sharing with a bridge
    pub fn shared() -> Arc<Mutex<SoundGenerator>> {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Return to power-on state
    pub fn reset(&mut self) {
        self.pattern = [0; PATTERN_BYTES];
        self.pitch = 0;
        self.phase = 0.0;
        self.st = 0;
        self.set_mode(ToneMode::Chip8);
    }

    /// Switch sound model
    pub fn set_mode(&mut self, mode: ToneMode) {
        self.mode = mode;
        match mode {
            ToneMode::XoChip => {
                if self.pitch == 0 {
                    self.pitch = DEFAULT_PITCH;
                }
            }
            ToneMode::Chip8 => self.pitch = 0,
        }
    }

    /// Current sound model
    pub fn mode(&self) -> ToneMode {
        self.mode
    }

    /// Load the sound timer (FX18)
    pub fn set_sound_timer(&mut self, value: u8) {
        self.st = value;
    }

    /// Current sound timer value
    pub fn sound_timer(&self) -> u8 {
        self.st
    }

    /// Count the sound timer down by one 60 Hz tick.
    ///
    /// Returns true if the timer was running.
    pub fn tick_timer(&mut self) -> bool {
        if self.st > 0 {
            self.st -= 1;
            return true;
        }
        false
    }

    /// True while the sound timer is running
    pub fn is_beeping(&self) -> bool {
        self.st > 0
    }

    /// Set the pattern playback pitch (FX3A); selects XO-CHIP mode
    pub fn set_pitch(&mut self, pitch: u8) {
        self.pitch = pitch;
        self.set_mode(ToneMode::XoChip);
    }

    /// Current pitch register
    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    /// Load the 16-byte waveform pattern (F002); selects XO-CHIP mode
    pub fn load_pattern(&mut self, pattern: [u8; PATTERN_BYTES]) {
        self.set_mode(ToneMode::XoChip);
        self.pattern = pattern;
    }

    /// Current waveform pattern
    pub fn pattern(&self) -> &[u8; PATTERN_BYTES] {
        &self.pattern
    }

    /// Chunk length announced by the last bridge construction
    pub fn chunk_length(&self) -> Option<ChunkLength> {
        self.chunk
    }

    /// How many times a bridge initialized this generator
    pub fn init_count(&self) -> usize {
        self.init_count
    }

    /// Total sample periods the generator has advanced
    pub fn samples_generated(&self) -> u64 {
        self.samples_generated
    }

    fn pattern_sample(&self, pos: usize) -> f32 {
        let pos = pos % PATTERN_STEPS;
        let byte = self.pattern[pos >> 3];
        let bit = 7 - (pos & 7);
        if (byte >> bit) & 1 == 1 {
            1.0
        } else {
            -1.0
        }
    }

    fn output_pattern(&mut self, out: &mut [f32], rate: SampleRate) {
        let step = pattern_freq(self.pitch) / rate.as_f64();
        for sample in out.iter_mut() {
            *sample = self.pattern_sample(self.phase as usize);
            self.phase += step;
            while self.phase >= PATTERN_STEPS as f64 {
                self.phase -= PATTERN_STEPS as f64;
            }
        }
    }

    fn output_beep(&mut self, out: &mut [f32], rate: SampleRate) {
        let step = BEEP_FREQ_HZ / rate.as_f64();
        for sample in out.iter_mut() {
            *sample = if self.phase < 1.0 { 1.0 } else { -1.0 };
            self.phase += step;
            // square wave period = 2
            while self.phase >= 2.0 {
                self.phase -= 2.0;
            }
        }
    }
}

impl SampleSource for SoundGenerator {
    fn init_generator(&mut self, chunk: ChunkLength) {
        self.chunk = Some(chunk);
        self.init_count += 1;
    }

    fn fill_into(&mut self, out: &mut [f32], rate: SampleRate) {
        self.samples_generated += out.len() as u64;

        if !self.is_beeping() {
            fill_silence(out);
            return;
        }

        match self.mode {
            ToneMode::XoChip => self.output_pattern(out, rate),
            ToneMode::Chip8 => self.output_beep(out, rate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rate(hz: u32) -> SampleRate {
        SampleRate::new(hz).unwrap()
    }

    #[test]
    fn test_silent_without_timer() {
        let mut generator = SoundGenerator::new();
        let batch = generator.fill(256, rate(44_100));
        assert!(batch.is_silent());
        assert_eq!(generator.samples_generated(), 256);
    }

    #[test]
    fn test_timer_counts_down() {
        let mut generator = SoundGenerator::new();
        generator.set_sound_timer(2);
        assert!(generator.tick_timer());
        assert!(generator.is_beeping());
        assert!(generator.tick_timer());
        assert!(!generator.is_beeping());
        assert!(!generator.tick_timer());
    }

    #[test]
    fn test_chip8_square_wave() {
        let mut generator = SoundGenerator::new();
        generator.set_sound_timer(10);
        // 440 Hz rate: one sample per half period
        let batch = generator.fill(6, rate(440));
        assert_eq!(batch.as_slice(), &[1.0, -1.0, 1.0, -1.0, 1.0, -1.0]);
    }

    #[test]
    fn test_samples_are_normalized() {
        let mut generator = SoundGenerator::new();
        generator.set_sound_timer(10);
        generator.load_pattern([0b1010_0000; PATTERN_BYTES]);
        for count in [1, 3, 128, 512, 1000] {
            let batch = generator.fill(count, rate(48_000));
            assert_eq!(batch.len(), count);
            assert!(batch.iter().all(|&s| (-1.0..=1.0).contains(&s)));
        }
    }

    #[test]
    fn test_pattern_freq() {
        assert_relative_eq!(pattern_freq(64), 4000.0);
        assert_relative_eq!(pattern_freq(112), 8000.0, epsilon = 1e-9);
        assert_relative_eq!(pattern_freq(16), 2000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pattern_plays_msb_first() {
        let mut generator = SoundGenerator::new();
        generator.set_sound_timer(1);
        let mut pattern = [0u8; PATTERN_BYTES];
        pattern[0] = 0b1100_0000;
        generator.load_pattern(pattern);
        assert_eq!(generator.pitch(), DEFAULT_PITCH);
        // 4000 Hz pattern rate at 4000 Hz output: one step per sample
        let batch = generator.fill(4, rate(4_000));
        assert_eq!(batch.as_slice(), &[1.0, 1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_pattern_wraps_after_128_steps() {
        let mut generator = SoundGenerator::new();
        generator.set_sound_timer(1);
        let mut pattern = [0u8; PATTERN_BYTES];
        pattern[0] = 0b1000_0000;
        generator.load_pattern(pattern);
        let batch = generator.fill(PATTERN_STEPS + 1, rate(4_000));
        assert_eq!(batch[0], 1.0);
        assert_eq!(batch[PATTERN_STEPS], 1.0);
        assert_eq!(batch[1], -1.0);
    }

    #[test]
    fn test_mode_switching() {
        let mut generator = SoundGenerator::new();
        assert_eq!(generator.mode(), ToneMode::Chip8);
        generator.set_pitch(100);
        assert_eq!(generator.mode(), ToneMode::XoChip);
        assert_eq!(generator.pitch(), 100);
        generator.set_mode(ToneMode::Chip8);
        assert_eq!(generator.pitch(), 0);
        generator.set_mode(ToneMode::XoChip);
        assert_eq!(generator.pitch(), DEFAULT_PITCH);
    }

    #[test]
    fn test_reset() {
        let mut generator = SoundGenerator::new();
        generator.set_pitch(90);
        generator.load_pattern([0xFF; PATTERN_BYTES]);
        generator.set_sound_timer(5);
        generator.reset();
        assert_eq!(generator.mode(), ToneMode::Chip8);
        assert_eq!(generator.pattern(), &[0; PATTERN_BYTES]);
        assert!(!generator.is_beeping());
    }

    #[test]
    fn test_init_generator_records_chunk() {
        let mut generator = SoundGenerator::new();
        generator.init_generator(ChunkLength::new(512).unwrap());
        assert_eq!(generator.chunk_length().map(ChunkLength::get), Some(512));
        assert_eq!(generator.init_count(), 1);
    }
}
