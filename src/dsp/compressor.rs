//! Glue compressor
//!
//! Feed-forward stereo compressor with linked RMS detection, a soft knee and
//! smoothed attack/release. Threshold, knee and makeup are linear values so
//! the stage descriptor can be handed to either backend unchanged.

use super::{time_to_coeff, Processor};

/// Feed-forward RMS compressor
///
/// # Example
/// ```
/// use worthy::dsp::{Compressor, Processor};
///
/// let mut comp = Compressor::new(0.125, 3.0, 20.0, 250.0, 1.0, 2.828);
/// comp.prepare(44100.0);
/// let mut left = vec![0.0; 512];
/// let mut right = vec![0.0; 512];
/// comp.process(&mut left, &mut right);
/// ```
#[derive(Debug, Clone)]
pub struct Compressor {
    /// Linear threshold
    threshold: f64,
    ratio: f64,
    attack_ms: f64,
    release_ms: f64,
    /// Linear makeup gain
    makeup: f64,
    /// Linear knee width (1.0 = hard knee)
    knee: f64,

    attack_coeff: f64,
    release_coeff: f64,
    /// Smoothed mean-square level of the linked detector
    envelope: f64,

    // Gain computer in the natural-log domain
    log_threshold: f64,
    log_knee_start: f64,
    log_knee_stop: f64,
    /// Mean-square level where the knee begins
    knee_start_power: f64,
    gain_reduction: f64,
}

impl Compressor {
    pub fn new(
        threshold: f64,
        ratio: f64,
        attack_ms: f64,
        release_ms: f64,
        makeup: f64,
        knee: f64,
    ) -> Self {
        let mut comp = Self {
            threshold: threshold.max(1e-9),
            ratio: ratio.max(1.0),
            attack_ms,
            release_ms,
            makeup,
            knee: knee.max(1.0),
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
            log_threshold: 0.0,
            log_knee_start: 0.0,
            log_knee_stop: 0.0,
            knee_start_power: 0.0,
            gain_reduction: 1.0,
        };
        comp.update_gain_computer();
        comp
    }

    fn update_gain_computer(&mut self) {
        let half_knee = self.knee.sqrt();
        self.log_threshold = self.threshold.ln();
        self.log_knee_start = (self.threshold / half_knee).ln();
        self.log_knee_stop = (self.threshold * half_knee).ln();
        let knee_start = self.threshold / half_knee;
        self.knee_start_power = knee_start * knee_start;
    }

    /// Static gain for a detector level given in the log domain
    fn gain_for_level(&self, log_level: f64) -> f64 {
        let slope = 1.0 / self.ratio;
        let compressed = |x: f64| (x - self.log_threshold) * slope + self.log_threshold;

        let log_out = if self.knee > 1.0 && log_level < self.log_knee_stop {
            hermite(
                log_level,
                self.log_knee_start,
                self.log_knee_stop,
                self.log_knee_start,
                compressed(self.log_knee_stop),
                1.0,
                slope,
            )
        } else {
            compressed(log_level)
        };

        (log_out - log_level).exp()
    }

    /// Most recent gain reduction factor (1.0 = none)
    pub fn gain_reduction(&self) -> f64 {
        self.gain_reduction
    }

    /// Static input/output curve, for tests and UI metering
    pub fn static_gain(&self, level: f64) -> f64 {
        if level * level <= self.knee_start_power {
            1.0
        } else {
            self.gain_for_level(level.ln())
        }
    }
}

/// Cubic Hermite spline between (x0, p0) and (x1, p1) with slopes m0, m1
fn hermite(x: f64, x0: f64, x1: f64, p0: f64, p1: f64, m0: f64, m1: f64) -> f64 {
    let width = x1 - x0;
    let t = (x - x0) / width;
    let m0 = m0 * width;
    let m1 = m1 * width;
    let t2 = t * t;
    let t3 = t2 * t;

    let c2 = -3.0 * p0 - 2.0 * m0 + 3.0 * p1 - m1;
    let c3 = 2.0 * p0 + m0 - 2.0 * p1 + m1;
    c3 * t3 + c2 * t2 + m0 * t + p0
}

impl Processor for Compressor {
    fn prepare(&mut self, sample_rate: f64) {
        self.attack_coeff = time_to_coeff(self.attack_ms, sample_rate);
        self.release_coeff = time_to_coeff(self.release_ms, sample_rate);
        self.update_gain_computer();
    }

    fn process(&mut self, left: &mut [f64], right: &mut [f64]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            // Linked detector: average of both channels, squared for RMS
            let level = (l.abs() + r.abs()) * 0.5;
            let power = level * level;

            let coeff = if power > self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = coeff * self.envelope + (1.0 - coeff) * power;

            let gain = if self.envelope > self.knee_start_power {
                // ln(sqrt(power)) = 0.5 * ln(power)
                self.gain_for_level(0.5 * self.envelope.ln())
            } else {
                1.0
            };
            self.gain_reduction = gain;

            let g = gain * self.makeup;
            *l *= g;
            *r *= g;
        }
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
        self.gain_reduction = 1.0;
    }

    fn name(&self) -> &'static str {
        "compressor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::linear_to_db;
    use approx::assert_relative_eq;

    fn glue() -> Compressor {
        Compressor::new(0.125, 3.0, 20.0, 250.0, 1.0, 2.828_427_12)
    }

    #[test]
    fn test_below_knee_is_unity() {
        let comp = glue();
        assert_eq!(comp.static_gain(0.01), 1.0);
    }

    #[test]
    fn test_above_knee_follows_ratio() {
        let comp = glue();
        // 12 dB over threshold at 3:1 -> 8 dB of reduction
        let level = 0.125 * 10f64.powf(12.0 / 20.0);
        assert_relative_eq!(linear_to_db(comp.static_gain(level)), -8.0, epsilon = 1e-6);
    }

    #[test]
    fn test_knee_is_continuous() {
        let comp = glue();
        let knee_start = 0.125 / 2.828_427_12_f64.sqrt();
        let just_above = comp.static_gain(knee_start * 1.0001);
        assert_relative_eq!(just_above, 1.0, epsilon = 1e-3);

        let knee_stop = 0.125 * 2.828_427_12_f64.sqrt();
        let inside = comp.static_gain(knee_stop * 0.9999);
        let outside = comp.static_gain(knee_stop * 1.0001);
        assert_relative_eq!(inside, outside, epsilon = 1e-3);
    }

    #[test]
    fn test_loud_signal_is_reduced_after_attack() {
        let mut comp = glue();
        comp.prepare(44100.0);
        let mut left = vec![0.9; 44100];
        let mut right = vec![0.9; 44100];
        comp.process(&mut left, &mut right);
        assert!(left[44099] < 0.9 * 0.6);
        assert!(comp.gain_reduction() < 1.0);

        comp.reset();
        assert_eq!(comp.gain_reduction(), 1.0);
    }

    #[test]
    fn test_quiet_signal_passes() {
        let mut comp = glue();
        comp.prepare(44100.0);
        let mut left = vec![0.01; 1000];
        let mut right = vec![-0.01; 1000];
        comp.process(&mut left, &mut right);
        assert_relative_eq!(left[999], 0.01, epsilon = 1e-12);
        assert_relative_eq!(right[999], -0.01, epsilon = 1e-12);
    }
}
