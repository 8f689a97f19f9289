//! Loudness normalization
//!
//! Two behaviours, selected by [`NormMode`]:
//!
//! - **Linear** (second pass of a two-pass render): a fixed gain of
//!   `target_i - measured_i`. If the measured true peak plus that gain would
//!   cross `target_tp`, a true-peak guard limits at `target_tp`.
//! - **Dynamic** (blind single pass): a gain rider steered by a running
//!   EBU R128 meter. The signal is delayed by the short-term window so the
//!   meter has seen the audio its gain is applied to. The short-term estimate
//!   is kept within `±target_lra / 2` of the running integrated loudness.
//!   The peak guard is always active.

use std::collections::VecDeque;

use ebur128::{EbuR128, Mode};
use tracing::warn;

use super::limiter::LookaheadLimiter;
use super::{db_to_linear, Processor};
use crate::chain::NormMode;

/// Short-term loudness window (EBU R128)
const SHORT_TERM_MS: f64 = 3000.0;
/// Interval between gain updates of the rider
const HOP_MS: f64 = 100.0;
/// Largest correction the rider will apply, in dB
const MAX_RIDER_GAIN_DB: f64 = 24.0;
/// Estimates below this are treated as silence
const SILENCE_LUFS: f64 = -70.0;

const GUARD_ATTACK_MS: f64 = 5.0;
const GUARD_RELEASE_MS: f64 = 100.0;

/// Level-riding state for dynamic mode
struct GainRider {
    meter: Option<EbuR128>,
    target_i: f64,
    half_range: f64,
    lookahead: usize,
    hop: usize,
    delay: VecDeque<(f64, f64)>,
    hop_buffer: Vec<f64>,
    gain_db: f64,
    target_gain_db: f64,
    step_db: f64,
}

impl GainRider {
    fn new(target_i: f64, target_lra: f64, sample_rate: f64) -> Self {
        let meter = match EbuR128::new(2, sample_rate as u32, Mode::I | Mode::S) {
            Ok(meter) => Some(meter),
            Err(e) => {
                warn!("Loudness meter unavailable ({:?}); rider holds unity gain", e);
                None
            }
        };
        let lookahead = ((SHORT_TERM_MS * sample_rate / 1000.0).round() as usize).max(1);
        let hop = ((HOP_MS * sample_rate / 1000.0).round() as usize).max(1);

        let mut rider = Self {
            meter,
            target_i,
            half_range: target_lra / 2.0,
            lookahead,
            hop,
            delay: VecDeque::with_capacity(lookahead + 1),
            hop_buffer: Vec::with_capacity(hop * 2),
            gain_db: 0.0,
            target_gain_db: 0.0,
            step_db: 0.0,
        };
        rider.delay.extend(std::iter::repeat((0.0, 0.0)).take(lookahead));
        rider
    }

    fn update_target(&mut self) {
        let Some(meter) = self.meter.as_mut() else {
            return;
        };
        if meter.add_frames_f64(&self.hop_buffer).is_err() {
            return;
        }

        let short_term = meter.loudness_shortterm().unwrap_or(f64::NEG_INFINITY);
        if !short_term.is_finite() || short_term < SILENCE_LUFS {
            // Hold the current gain through silence
            self.step_db = 0.0;
            self.target_gain_db = self.gain_db;
            return;
        }

        let integrated = meter.loudness_global().unwrap_or(f64::NEG_INFINITY);
        let estimate = if integrated.is_finite() {
            short_term.clamp(integrated - self.half_range, integrated + self.half_range)
        } else {
            short_term
        };

        self.target_gain_db = (self.target_i - estimate).clamp(-MAX_RIDER_GAIN_DB, MAX_RIDER_GAIN_DB);
        self.step_db = (self.target_gain_db - self.gain_db) / self.hop as f64;
    }

    #[inline]
    fn process_frame(&mut self, l: f64, r: f64) -> (f64, f64) {
        self.hop_buffer.push(l);
        self.hop_buffer.push(r);
        if self.hop_buffer.len() >= self.hop * 2 {
            self.update_target();
            self.hop_buffer.clear();
        }

        if self.step_db != 0.0 {
            self.gain_db += self.step_db;
            let overshoot = (self.step_db > 0.0 && self.gain_db > self.target_gain_db)
                || (self.step_db < 0.0 && self.gain_db < self.target_gain_db);
            if overshoot {
                self.gain_db = self.target_gain_db;
                self.step_db = 0.0;
            }
        }

        self.delay.push_back((l, r));
        let (dl, dr) = self.delay.pop_front().unwrap_or((0.0, 0.0));
        let g = db_to_linear(self.gain_db);
        (dl * g, dr * g)
    }
}

/// Loudness normalization stage
pub struct LoudnessNormalizer {
    target_i: f64,
    target_tp: f64,
    target_lra: f64,
    mode: NormMode,
    linear_gain: f64,
    rider: Option<GainRider>,
    peak_guard: Option<LookaheadLimiter>,
    sample_rate: f64,
}

impl LoudnessNormalizer {
    pub fn new(target_i: f64, target_tp: f64, target_lra: f64, mode: NormMode) -> Self {
        Self {
            target_i,
            target_tp,
            target_lra,
            mode,
            linear_gain: 1.0,
            rider: None,
            peak_guard: None,
            sample_rate: 0.0,
        }
    }

    /// Gain applied in linear mode, in dB
    pub fn linear_gain_db(&self) -> Option<f64> {
        match self.mode {
            NormMode::Linear { measured } => Some(self.target_i - measured.input_i),
            NormMode::Dynamic => None,
        }
    }

    /// Whether a peak guard follows the gain stage
    pub fn has_peak_guard(&self) -> bool {
        self.peak_guard.is_some()
    }

    fn needs_peak_guard(&self) -> bool {
        match self.mode {
            NormMode::Linear { measured } => {
                measured.input_tp + (self.target_i - measured.input_i) > self.target_tp
            }
            NormMode::Dynamic => true,
        }
    }
}

impl Processor for LoudnessNormalizer {
    fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.linear_gain = self.linear_gain_db().map(db_to_linear).unwrap_or(1.0);
        self.rider = match self.mode {
            NormMode::Dynamic => Some(GainRider::new(self.target_i, self.target_lra, sample_rate)),
            NormMode::Linear { .. } => None,
        };
        self.peak_guard = if self.needs_peak_guard() {
            let mut guard = LookaheadLimiter::new(
                db_to_linear(self.target_tp),
                GUARD_ATTACK_MS,
                GUARD_RELEASE_MS,
            );
            guard.prepare(sample_rate);
            Some(guard)
        } else {
            None
        };
    }

    fn process(&mut self, left: &mut [f64], right: &mut [f64]) {
        match self.rider.as_mut() {
            Some(rider) => {
                for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                    let (out_l, out_r) = rider.process_frame(*l, *r);
                    *l = out_l;
                    *r = out_r;
                }
            }
            None => {
                let g = self.linear_gain;
                left.iter_mut().for_each(|s| *s *= g);
                right.iter_mut().for_each(|s| *s *= g);
            }
        }

        if let Some(guard) = self.peak_guard.as_mut() {
            guard.process(left, right);
        }
    }

    fn reset(&mut self) {
        if self.sample_rate > 0.0 {
            self.prepare(self.sample_rate);
        }
    }

    fn latency(&self) -> usize {
        let rider = self.rider.as_ref().map(|r| r.lookahead).unwrap_or(0);
        let guard = self.peak_guard.as_ref().map(|g| g.latency()).unwrap_or(0);
        rider + guard
    }

    fn name(&self) -> &'static str {
        "loudness_norm"
    }
}
