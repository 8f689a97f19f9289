//! Biquad filters
//!
//! Coefficients follow the Audio EQ Cookbook (RBJ). The same coefficient
//! designer serves the offline processors and the preview nodes.

use super::Processor;
use std::f64::consts::PI;

/// Filter response and its shape parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterShape {
    HighPass { q: f64 },
    LowPass { q: f64 },
    /// Bell boost/cut with constant Q
    Peaking { q: f64, gain_db: f64 },
    /// Shelf below the corner; `slope` is the cookbook S parameter
    LowShelf { slope: f64, gain_db: f64 },
    /// Shelf above the corner; `slope` is the cookbook S parameter
    HighShelf { slope: f64, gain_db: f64 },
}

impl FilterShape {
    pub fn name(&self) -> &'static str {
        match self {
            FilterShape::HighPass { .. } => "highpass",
            FilterShape::LowPass { .. } => "lowpass",
            FilterShape::Peaking { .. } => "peaking",
            FilterShape::LowShelf { .. } => "low_shelf",
            FilterShape::HighShelf { .. } => "high_shelf",
        }
    }
}

/// Normalized biquad coefficients (a0 = 1)
///
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl BiquadCoeffs {
    /// Pass-through coefficients
    pub const IDENTITY: BiquadCoeffs = BiquadCoeffs {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Design coefficients for `shape` with its corner/center at `frequency`
    ///
    /// # Arguments
    /// * `shape` - Response type and its Q/slope/gain
    /// * `frequency` - Corner or center frequency in Hz
    /// * `sample_rate` - Processing rate in Hz
    pub fn design(shape: FilterShape, frequency: f64, sample_rate: f64) -> Self {
        // Keep the corner strictly inside (0, Nyquist)
        let nyquist = sample_rate / 2.0;
        let freq = frequency.clamp(1e-3, nyquist * 0.9999);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();

        let (b0, b1, b2, a0, a1, a2) = match shape {
            FilterShape::HighPass { q } => {
                let alpha = sin_w0 / (2.0 * q.max(1e-4));
                (
                    (1.0 + cos_w0) / 2.0,
                    -(1.0 + cos_w0),
                    (1.0 + cos_w0) / 2.0,
                    1.0 + alpha,
                    -2.0 * cos_w0,
                    1.0 - alpha,
                )
            }
            FilterShape::LowPass { q } => {
                let alpha = sin_w0 / (2.0 * q.max(1e-4));
                (
                    (1.0 - cos_w0) / 2.0,
                    1.0 - cos_w0,
                    (1.0 - cos_w0) / 2.0,
                    1.0 + alpha,
                    -2.0 * cos_w0,
                    1.0 - alpha,
                )
            }
            FilterShape::Peaking { q, gain_db } => {
                let a = 10.0_f64.powf(gain_db / 40.0);
                let alpha = sin_w0 / (2.0 * q.max(1e-4));
                (
                    1.0 + alpha * a,
                    -2.0 * cos_w0,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_w0,
                    1.0 - alpha / a,
                )
            }
            FilterShape::LowShelf { slope, gain_db } => {
                let a = 10.0_f64.powf(gain_db / 40.0);
                let alpha = shelf_alpha(sin_w0, a, slope);
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterShape::HighShelf { slope, gain_db } => {
                let a = 10.0_f64.powf(gain_db / 40.0);
                let alpha = shelf_alpha(sin_w0, a, slope);
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
        };

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Check if coefficients represent a bypass (unity gain, no filtering)
    pub fn is_identity(&self) -> bool {
        (self.b0 - 1.0).abs() < 1e-10
            && self.b1.abs() < 1e-10
            && self.b2.abs() < 1e-10
            && self.a1.abs() < 1e-10
            && self.a2.abs() < 1e-10
    }

    /// Magnitude response in dB at `frequency`
    pub fn magnitude_db(&self, frequency: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * frequency / sample_rate;
        let (cos1, sin1) = (w.cos(), w.sin());
        let (cos2, sin2) = ((2.0 * w).cos(), (2.0 * w).sin());

        let num_re = self.b0 + self.b1 * cos1 + self.b2 * cos2;
        let num_im = -(self.b1 * sin1 + self.b2 * sin2);
        let den_re = 1.0 + self.a1 * cos1 + self.a2 * cos2;
        let den_im = -(self.a1 * sin1 + self.a2 * sin2);

        let num = (num_re * num_re + num_im * num_im).sqrt();
        let den = (den_re * den_re + den_im * den_im).sqrt();
        20.0 * (num / den).log10()
    }
}

fn shelf_alpha(sin_w0: f64, a: f64, slope: f64) -> f64 {
    let s = slope.max(1e-4);
    let term = ((a + 1.0 / a) * (1.0 / s - 1.0) + 2.0).max(0.0);
    sin_w0 / 2.0 * term.sqrt()
}

/// Filter history for one channel
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    /// Process a single sample (Direct Form I)
    #[inline]
    pub fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Stereo biquad stage
#[derive(Debug, Clone)]
pub struct Biquad {
    shape: FilterShape,
    frequency: f64,
    coeffs: BiquadCoeffs,
    state: [BiquadState; 2],
}

impl Biquad {
    /// Create a filter; coefficients are computed in [`Processor::prepare`]
    pub fn new(shape: FilterShape, frequency: f64) -> Self {
        Self {
            shape,
            frequency,
            coeffs: BiquadCoeffs::IDENTITY,
            state: [BiquadState::default(); 2],
        }
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }
}

impl Processor for Biquad {
    fn prepare(&mut self, sample_rate: f64) {
        self.coeffs = BiquadCoeffs::design(self.shape, self.frequency, sample_rate);
    }

    fn process(&mut self, left: &mut [f64], right: &mut [f64]) {
        let coeffs = self.coeffs;
        let [l_state, r_state] = &mut self.state;
        for sample in left.iter_mut() {
            *sample = l_state.process(*sample, &coeffs);
        }
        for sample in right.iter_mut() {
            *sample = r_state.process(*sample, &coeffs);
        }
    }

    fn reset(&mut self) {
        for s in self.state.iter_mut() {
            s.reset();
        }
    }

    fn name(&self) -> &'static str {
        self.shape.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SR: f64 = 44100.0;

    #[test]
    fn test_peaking_gain_at_center() {
        let coeffs = BiquadCoeffs::design(
            FilterShape::Peaking {
                q: 1.5,
                gain_db: -3.0,
            },
            250.0,
            SR,
        );
        assert_relative_eq!(coeffs.magnitude_db(250.0, SR), -3.0, epsilon = 1e-6);
        assert!(coeffs.magnitude_db(5000.0, SR).abs() < 0.1);
    }

    #[test]
    fn test_zero_gain_peaking_is_identity() {
        let coeffs = BiquadCoeffs::design(
            FilterShape::Peaking {
                q: 1.0,
                gain_db: 0.0,
            },
            1000.0,
            SR,
        );
        assert!(coeffs.is_identity());
    }

    #[test]
    fn test_highpass_removes_rumble() {
        let coeffs = BiquadCoeffs::design(
            FilterShape::HighPass {
                q: std::f64::consts::FRAC_1_SQRT_2,
            },
            30.0,
            SR,
        );
        assert_relative_eq!(coeffs.magnitude_db(30.0, SR), -3.01, epsilon = 0.05);
        assert!(coeffs.magnitude_db(5.0, SR) < -25.0);
        assert!(coeffs.magnitude_db(1000.0, SR).abs() < 0.01);
    }

    #[test]
    fn test_high_shelf_reaches_gain() {
        let coeffs = BiquadCoeffs::design(
            FilterShape::HighShelf {
                slope: 0.5,
                gain_db: 2.5,
            },
            12000.0,
            48000.0,
        );
        assert!(coeffs.magnitude_db(100.0, 48000.0).abs() < 0.05);
        assert_relative_eq!(coeffs.magnitude_db(12000.0, 48000.0), 1.25, epsilon = 0.05);
        assert!(coeffs.magnitude_db(22000.0, 48000.0) > 2.0);
    }

    #[test]
    fn test_low_shelf_cuts_below_corner() {
        let coeffs = BiquadCoeffs::design(
            FilterShape::LowShelf {
                slope: 1.0,
                gain_db: -9.0,
            },
            1050.0,
            SR,
        );
        assert_relative_eq!(coeffs.magnitude_db(20.0, SR), -9.0, epsilon = 0.05);
        assert!(coeffs.magnitude_db(15000.0, SR).abs() < 0.05);
    }

    #[test]
    fn test_processor_filters_both_channels() {
        let mut filter = Biquad::new(FilterShape::HighPass { q: 0.707 }, 1000.0);
        filter.prepare(SR);

        // DC is fully rejected once the filter settles
        let mut left = vec![1.0; 4410];
        let mut right = vec![-1.0; 4410];
        filter.process(&mut left, &mut right);
        assert!(left[4409].abs() < 1e-3);
        assert!(right[4409].abs() < 1e-3);

        filter.reset();
        let mut left = vec![1.0];
        let mut right = vec![1.0];
        filter.process(&mut left, &mut right);
        assert_relative_eq!(left[0], filter.coeffs().b0, epsilon = 1e-12);
        assert_eq!(filter.name(), "highpass");
    }
}
