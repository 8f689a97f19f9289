//! Bass-centering crossfeed
//!
//! Splits the signal into mid and side, shelves the low end of the side
//! channel down and recombines. Low frequencies collapse toward mono while
//! the stereo image above the shelf corner is preserved.

use super::biquad::{BiquadCoeffs, BiquadState, FilterShape};
use super::Processor;

/// Shelf corner when `range` is 0
const BASE_CORNER_HZ: f64 = 2100.0;
/// Side-channel cut in dB for a strength of 1.0
const FULL_STRENGTH_CUT_DB: f64 = -30.0;
/// Shelf slope of the side filter
const SHELF_SLOPE: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct Crossfeed {
    strength: f64,
    range: f64,
    level_in: f64,
    coeffs: BiquadCoeffs,
    side_state: BiquadState,
}

impl Crossfeed {
    /// # Arguments
    /// * `strength` - Side cut amount (0..1); 1.0 cuts 30 dB
    /// * `range` - Moves the shelf corner down from 2100 Hz (0..1)
    /// * `level_in` - Input gain applied before the split
    pub fn new(strength: f64, range: f64, level_in: f64) -> Self {
        Self {
            strength: strength.clamp(0.0, 1.0),
            range: range.clamp(0.0, 1.0),
            level_in,
            coeffs: BiquadCoeffs::IDENTITY,
            side_state: BiquadState::default(),
        }
    }

    /// Corner frequency of the side-channel shelf
    pub fn corner_hz(&self) -> f64 {
        (1.0 - self.range) * BASE_CORNER_HZ
    }

    /// Side-channel cut in dB
    pub fn side_cut_db(&self) -> f64 {
        self.strength * FULL_STRENGTH_CUT_DB
    }
}

impl Processor for Crossfeed {
    fn prepare(&mut self, sample_rate: f64) {
        self.coeffs = BiquadCoeffs::design(
            FilterShape::LowShelf {
                slope: SHELF_SLOPE,
                gain_db: self.side_cut_db(),
            },
            self.corner_hz(),
            sample_rate,
        );
    }

    fn process(&mut self, left: &mut [f64], right: &mut [f64]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let mid = (*l + *r) * 0.5 * self.level_in;
            let side = (*l - *r) * 0.5 * self.level_in;
            let side = self.side_state.process(side, &self.coeffs);
            *l = mid + side;
            *r = mid - side;
        }
    }

    fn reset(&mut self) {
        self.side_state.reset();
    }

    fn name(&self) -> &'static str {
        "crossfeed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_shelf_settings() {
        let cf = Crossfeed::new(0.3, 0.5, 0.9);
        assert_relative_eq!(cf.corner_hz(), 1050.0);
        assert_relative_eq!(cf.side_cut_db(), -9.0);
    }

    #[test]
    fn test_mono_input_only_scaled() {
        let mut cf = Crossfeed::new(0.3, 0.5, 0.9);
        cf.prepare(44100.0);
        let mut left = vec![0.5; 64];
        let mut right = vec![0.5; 64];
        cf.process(&mut left, &mut right);
        for (l, r) in left.iter().zip(right.iter()) {
            assert_relative_eq!(*l, 0.45, epsilon = 1e-12);
            assert_relative_eq!(*r, 0.45, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_low_frequency_side_is_reduced() {
        let sr = 44100.0;
        let mut cf = Crossfeed::new(0.3, 0.5, 1.0);
        cf.prepare(sr);

        // 50 Hz fully out of phase: pure side signal
        let n = 44100;
        let mut left: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * 50.0 * i as f64 / sr).sin())
            .collect();
        let mut right: Vec<f64> = left.iter().map(|x| -x).collect();
        cf.process(&mut left, &mut right);

        let peak = left[n / 2..].iter().fold(0.0_f64, |m, x| m.max(x.abs()));
        // about -9 dB
        assert!(peak < 0.4, "side peak {}", peak);
        assert!(peak > 0.3, "side peak {}", peak);
    }
}
