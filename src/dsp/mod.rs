//! Offline DSP processors
//!
//! Double-precision stereo processors used by the native render backend.
//! Each [`Stage`] descriptor maps onto exactly one [`Processor`].

pub mod biquad;
pub mod compressor;
pub mod crossfeed;
pub mod limiter;
pub mod loudnorm;
pub mod true_peak;

pub use biquad::{Biquad, BiquadCoeffs, BiquadState, FilterShape};
pub use compressor::Compressor;
pub use crossfeed::Crossfeed;
pub use limiter::LookaheadLimiter;
pub use loudnorm::LoudnessNormalizer;
pub use true_peak::TruePeakDetector;

use crate::chain::{FilterChain, Stage};

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    if linear <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// One-pole smoothing coefficient for a time constant in milliseconds
#[inline]
pub fn time_to_coeff(time_ms: f64, sample_rate: f64) -> f64 {
    if time_ms <= 0.0 {
        0.0
    } else {
        (-1.0 / (time_ms * sample_rate / 1000.0)).exp()
    }
}

/// A stereo offline processor
///
/// Buffers are planar; `left` and `right` always have the same length.
pub trait Processor: Send {
    /// Configure for a sample rate. Called once before the first block.
    fn prepare(&mut self, sample_rate: f64);

    /// Process one block in place
    fn process(&mut self, left: &mut [f64], right: &mut [f64]);

    /// Clear filter history, envelopes and delay lines
    fn reset(&mut self);

    /// Delay introduced by the processor, in frames
    fn latency(&self) -> usize {
        0
    }

    fn name(&self) -> &'static str;
}

/// Create the processor for one stage descriptor
pub fn processor_for(stage: &Stage) -> Box<dyn Processor> {
    match *stage {
        Stage::HighPass { frequency, q } => {
            Box::new(Biquad::new(FilterShape::HighPass { q }, frequency))
        }
        Stage::Crossfeed {
            strength,
            range,
            level_in,
        } => Box::new(Crossfeed::new(strength, range, level_in)),
        Stage::Equalizer {
            frequency,
            width,
            gain_db,
        } => Box::new(Biquad::new(
            FilterShape::Peaking {
                q: width.to_q(frequency),
                gain_db,
            },
            frequency,
        )),
        Stage::HighShelf {
            frequency,
            gain_db,
            slope,
        } => Box::new(Biquad::new(
            FilterShape::HighShelf { slope, gain_db },
            frequency,
        )),
        Stage::Compressor {
            threshold,
            ratio,
            attack_ms,
            release_ms,
            makeup,
            knee,
        } => Box::new(Compressor::new(
            threshold, ratio, attack_ms, release_ms, makeup, knee,
        )),
        Stage::LoudnessNorm {
            target_i,
            target_tp,
            target_lra,
            mode,
        } => Box::new(LoudnessNormalizer::new(target_i, target_tp, target_lra, mode)),
        Stage::Limiter {
            limit,
            attack_ms,
            release_ms,
        } => Box::new(LookaheadLimiter::new(limit, attack_ms, release_ms)),
    }
}

/// Processors for a whole chain, run in order
pub struct ProcessorChain {
    processors: Vec<Box<dyn Processor>>,
}

impl ProcessorChain {
    /// Build and prepare processors for `chain` at `sample_rate`
    pub fn new(chain: &FilterChain, sample_rate: f64) -> Self {
        let mut processors: Vec<Box<dyn Processor>> =
            chain.stages().iter().map(processor_for).collect();
        for p in processors.iter_mut() {
            p.prepare(sample_rate);
        }
        Self { processors }
    }

    pub fn process(&mut self, left: &mut [f64], right: &mut [f64]) {
        for p in self.processors.iter_mut() {
            p.process(left, right);
        }
    }

    /// Total delay of the chain in frames
    pub fn latency(&self) -> usize {
        self.processors.iter().map(|p| p.latency()).sum()
    }

    pub fn reset(&mut self) {
        for p in self.processors.iter_mut() {
            p.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }
}
