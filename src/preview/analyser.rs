//! Analysis tap
//!
//! Pass-through node that keeps the most recent window of the (mono-summed)
//! signal and turns it into byte magnitudes for the spectrum display.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_SMOOTHING: f32 = 0.8;
pub const DEFAULT_MIN_DB: f32 = -100.0;
pub const DEFAULT_MAX_DB: f32 = -30.0;

/// FFT analyser with time smoothing and byte scaling
pub struct AnalyserNode {
    fft_size: usize,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Ring buffer of the latest `fft_size` mono samples
    history: Vec<f32>,
    write_pos: usize,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl AnalyserNode {
    pub fn new() -> Self {
        Self::with_fft_size(DEFAULT_FFT_SIZE)
    }

    /// # Arguments
    /// * `fft_size` - Window length; rounded up to a power of two, at least 32
    pub fn with_fft_size(fft_size: usize) -> Self {
        let fft_size = fft_size.max(32).next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        Self {
            fft_size,
            smoothing: DEFAULT_SMOOTHING,
            min_db: DEFAULT_MIN_DB,
            max_db: DEFAULT_MAX_DB,
            fft,
            window: blackman(fft_size),
            history: vec![0.0; fft_size],
            write_pos: 0,
            smoothed: vec![0.0; fft_size / 2],
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of magnitude bins (half the FFT size)
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }

    pub fn set_smoothing(&mut self, smoothing: f32) {
        self.smoothing = smoothing.clamp(0.0, 1.0);
    }

    /// Decibel range mapped onto 0..=255
    pub fn set_range(&mut self, min_db: f32, max_db: f32) {
        if max_db > min_db {
            self.min_db = min_db;
            self.max_db = max_db;
        }
    }

    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
    }

    /// Record interleaved stereo; the audio itself is left untouched
    pub fn process(&mut self, frames: &[f32]) {
        for frame in frames.chunks_exact(2) {
            self.history[self.write_pos] = 0.5 * (frame[0] + frame[1]);
            self.write_pos = (self.write_pos + 1) % self.fft_size;
        }
    }

    /// Smoothed magnitudes of the latest window scaled to bytes
    ///
    /// Each call advances the smoothing state, like one display refresh.
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        let n = self.fft_size;
        for i in 0..n {
            let sample = self.history[(self.write_pos + i) % n];
            self.scratch[i] = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let scale = 255.0 / (self.max_db - self.min_db);
        let tau = self.smoothing;
        self.smoothed
            .iter_mut()
            .zip(self.scratch.iter())
            .map(|(prev, bin)| {
                let magnitude = bin.norm() / n as f32;
                *prev = tau * *prev + (1.0 - tau) * magnitude;
                let db = if *prev > 0.0 {
                    20.0 * prev.log10()
                } else {
                    f32::NEG_INFINITY
                };
                (scale * (db - self.min_db)).clamp(0.0, 255.0) as u8
            })
            .collect()
    }
}

impl Default for AnalyserNode {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AnalyserNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyserNode")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("min_db", &self.min_db)
            .field("max_db", &self.max_db)
            .finish()
    }
}

/// Blackman window (alpha = 0.16)
fn blackman(n: usize) -> Vec<f32> {
    let a0 = 0.42;
    let a1 = 0.5;
    let a2 = 0.08;
    (0..n)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / n as f32;
            a0 - a1 * x.cos() + a2 * (2.0 * x).cos()
        })
        .collect()
}
