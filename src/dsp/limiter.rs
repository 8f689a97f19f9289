//! Lookahead limiter
//!
//! Brickwall limiter for the final stage of the render chain. The signal is
//! delayed by the attack time so gain reduction is fully in place before a
//! peak reaches the output; recovery follows an exponential release.
//!
//! Peaks are detected on a 4x oversampled estimate, so the ceiling holds for
//! the true peak and not only for the sample values. The lookahead always
//! spans the interpolator's support. A hard clamp follows the gain stage.

use std::collections::VecDeque;

use super::true_peak::TruePeakDetector;
use super::{db_to_linear, time_to_coeff, Processor};

/// Allowance for interpolation and quantization error, in dB
const TRUE_PEAK_MARGIN_DB: f64 = 0.01;

// ============================================================================
// Limiter
// ============================================================================

/// Brickwall limiter with lookahead
///
/// # Parameters
/// - `limit`: Linear ceiling (e.g. 0.891 for -1 dBFS)
/// - `attack_ms`: Lookahead window; also the reported latency (never
///   shorter than the true-peak interpolator support)
/// - `release_ms`: Time constant of gain recovery
#[derive(Debug, Clone)]
pub struct LookaheadLimiter {
    limit: f64,
    attack_ms: f64,
    release_ms: f64,

    lookahead: usize,
    release_coeff: f64,
    margin: f64,
    detector: TruePeakDetector,
    /// Current applied gain
    envelope: f64,
    /// Delayed input frames
    delay: VecDeque<(f64, f64)>,
    /// Monotonic queue of (frame index, required gain) for the window minimum
    window: VecDeque<(u64, f64)>,
    frame_index: u64,
}

impl LookaheadLimiter {
    pub fn new(limit: f64, attack_ms: f64, release_ms: f64) -> Self {
        Self {
            limit: limit.max(1e-6),
            attack_ms,
            release_ms,
            lookahead: 1,
            release_coeff: 0.0,
            margin: db_to_linear(TRUE_PEAK_MARGIN_DB),
            detector: TruePeakDetector::new(),
            envelope: 1.0,
            delay: VecDeque::new(),
            window: VecDeque::new(),
            frame_index: 0,
        }
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    /// Current gain reduction (1.0 = none)
    pub fn gain(&self) -> f64 {
        self.envelope
    }

    fn fill_delay(&mut self) {
        self.delay.clear();
        self.delay
            .extend(std::iter::repeat((0.0, 0.0)).take(self.lookahead));
    }

    #[inline]
    fn process_frame(&mut self, l: f64, r: f64) -> (f64, f64) {
        let peak = self.detector.process_frame(l, r) * self.margin;
        let required = if peak > self.limit {
            self.limit / peak
        } else {
            1.0
        };

        let n = self.frame_index;
        self.frame_index += 1;
        while matches!(self.window.back(), Some(&(_, g)) if g >= required) {
            self.window.pop_back();
        }
        self.window.push_back((n, required));
        let span = self.lookahead as u64 + 1;
        while matches!(self.window.front(), Some(&(i, _)) if i + span <= n) {
            self.window.pop_front();
        }
        let target = self.window.front().map(|&(_, g)| g).unwrap_or(1.0);

        if target < self.envelope {
            self.envelope = target;
        } else {
            self.envelope = target + (self.envelope - target) * self.release_coeff;
        }

        self.delay.push_back((l, r));
        let (dl, dr) = self.delay.pop_front().unwrap_or((0.0, 0.0));

        let out_l = (dl * self.envelope).clamp(-self.limit, self.limit);
        let out_r = (dr * self.envelope).clamp(-self.limit, self.limit);
        (out_l, out_r)
    }
}

impl Processor for LookaheadLimiter {
    fn prepare(&mut self, sample_rate: f64) {
        self.lookahead = ((self.attack_ms * sample_rate / 1000.0).round() as usize)
            .max(TruePeakDetector::SUPPORT);
        self.release_coeff = time_to_coeff(self.release_ms, sample_rate);
        self.reset();
    }

    fn process(&mut self, left: &mut [f64], right: &mut [f64]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (out_l, out_r) = self.process_frame(*l, *r);
            *l = out_l;
            *r = out_r;
        }
    }

    fn reset(&mut self) {
        self.envelope = 1.0;
        self.window.clear();
        self.frame_index = 0;
        self.detector.reset();
        self.fill_delay();
    }

    fn latency(&self) -> usize {
        self.lookahead
    }

    fn name(&self) -> &'static str {
        "limiter"
    }
}
