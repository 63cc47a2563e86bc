//! rodio source that pulls the attached renderer
//!
//! rodio drains sources one sample at a time from its own audio thread. The
//! renderer works in whole quanta, so the source keeps one chunk-sized
//! buffer and asks the renderer for the next quantum whenever it runs dry.

use crate::bridge::Renderer;
use rodio::Source;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mono source fed quantum by quantum from a [`Renderer`]
pub(crate) struct RendererSource {
    renderer: Renderer,
    sample_rate: u32,
    finished: Arc<AtomicBool>,
    /// Current quantum
    buffer: Vec<f32>,
    /// Read position in the current quantum
    buffer_pos: usize,
}

impl RendererSource {
    pub(crate) fn new(renderer: Renderer, sample_rate: u32, finished: Arc<AtomicBool>) -> Self {
        let quantum = renderer.chunk_length().get();
        RendererSource {
            renderer,
            sample_rate,
            finished,
            buffer: vec![0.0; quantum],
            buffer_pos: quantum, // Render on first pull
        }
    }
}

impl Source for RendererSource {
    fn current_frame_len(&self) -> Option<usize> {
        let remaining = self.buffer.len() - self.buffer_pos;
        if remaining > 0 {
            Some(remaining)
        } else {
            Some(self.buffer.len())
        }
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for RendererSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }

        if self.buffer_pos >= self.buffer.len() {
            self.renderer.render(&mut self.buffer);
            self.buffer_pos = 0;
        }

        let sample = self.buffer[self.buffer_pos];
        self.buffer_pos += 1;
        Some(sample)
    }
}
