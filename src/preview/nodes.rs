//! Real-time preview nodes
//!
//! Single-precision stereo nodes modelled on browser audio-graph primitives:
//! a biquad with Web-Audio parameter conventions, a dynamics compressor with
//! automatic makeup gain, and a plain gain stage. Parameters can change at
//! any time without resetting filter history.

use crate::dsp::{BiquadCoeffs, FilterShape};

/// Biquad response types available to preview nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadKind {
    Highpass,
    Lowshelf,
    Highshelf,
    Peaking,
}

/// Stereo biquad node
///
/// For `Highpass` the `q` value is a resonance in dB; shelves use a fixed
/// slope of 1 and ignore `q`; `Peaking` uses `q` as bandwidth Q.
#[derive(Debug, Clone)]
pub struct BiquadNode {
    kind: BiquadKind,
    frequency: f32,
    q: f32,
    gain_db: f32,
    sample_rate: f32,
    coeffs: [f32; 5],
    // Transposed direct form II, per channel
    state: [[f32; 2]; 2],
}

impl BiquadNode {
    pub fn new(kind: BiquadKind, frequency: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let mut node = Self {
            kind,
            frequency,
            q,
            gain_db,
            sample_rate,
            coeffs: [1.0, 0.0, 0.0, 0.0, 0.0],
            state: [[0.0; 2]; 2],
        };
        node.update_coeffs();
        node
    }

    pub fn kind(&self) -> BiquadKind {
        self.kind
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn q(&self) -> f32 {
        self.q
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    /// Change frequency, Q and gain; history is kept so playback stays continuous
    pub fn set(&mut self, frequency: f32, q: f32, gain_db: f32) {
        if self.frequency == frequency && self.q == q && self.gain_db == gain_db {
            return;
        }
        self.frequency = frequency;
        self.q = q;
        self.gain_db = gain_db;
        self.update_coeffs();
    }

    pub fn set_gain(&mut self, gain_db: f32) {
        self.set(self.frequency, self.q, gain_db);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.update_coeffs();
    }

    fn update_coeffs(&mut self) {
        let gain_db = self.gain_db as f64;
        let shape = match self.kind {
            BiquadKind::Highpass => FilterShape::HighPass {
                q: 10.0_f64.powf(self.q as f64 / 20.0),
            },
            BiquadKind::Lowshelf => FilterShape::LowShelf { slope: 1.0, gain_db },
            BiquadKind::Highshelf => FilterShape::HighShelf { slope: 1.0, gain_db },
            BiquadKind::Peaking => FilterShape::Peaking {
                q: self.q as f64,
                gain_db,
            },
        };
        let c = BiquadCoeffs::design(shape, self.frequency as f64, self.sample_rate as f64);
        self.coeffs = [c.b0 as f32, c.b1 as f32, c.b2 as f32, c.a1 as f32, c.a2 as f32];
    }

    pub fn reset(&mut self) {
        self.state = [[0.0; 2]; 2];
    }

    /// Magnitude response in dB at `frequency`
    pub fn magnitude_db(&self, frequency: f32) -> f32 {
        let [b0, b1, b2, a1, a2] = self.coeffs.map(|c| c as f64);
        BiquadCoeffs { b0, b1, b2, a1, a2 }.magnitude_db(frequency as f64, self.sample_rate as f64)
            as f32
    }

    /// Process interleaved stereo in place
    pub fn process(&mut self, frames: &mut [f32]) {
        let [b0, b1, b2, a1, a2] = self.coeffs;
        for frame in frames.chunks_exact_mut(2) {
            for (sample, s) in frame.iter_mut().zip(self.state.iter_mut()) {
                let x = *sample;
                let y = b0 * x + s[0];
                s[0] = b1 * x - a1 * y + s[1];
                s[1] = b2 * x - a2 * y;
                *sample = y;
            }
        }
    }
}

/// Stereo-linked dynamics compressor
///
/// Threshold and knee in dB, attack and release in seconds. Makeup gain is
/// derived from the static curve at 0 dBFS (`(1/g)^0.6`), so a unity ratio
/// leaves the signal untouched.
#[derive(Debug, Clone)]
pub struct DynamicsCompressorNode {
    threshold: f32,
    knee: f32,
    ratio: f32,
    attack: f32,
    release: f32,
    sample_rate: f32,
    attack_coeff: f32,
    release_coeff: f32,
    makeup_db: f32,
    /// Current gain change in dB (<= 0)
    envelope_db: f32,
}

impl DynamicsCompressorNode {
    pub fn new(threshold: f32, knee: f32, ratio: f32, attack: f32, release: f32, sample_rate: f32) -> Self {
        let mut node = Self {
            threshold,
            knee,
            ratio,
            attack,
            release,
            sample_rate,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            makeup_db: 0.0,
            envelope_db: 0.0,
        };
        node.update();
        node
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn knee(&self) -> f32 {
        self.knee
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn attack(&self) -> f32 {
        self.attack
    }

    pub fn release(&self) -> f32 {
        self.release
    }

    /// Current gain reduction in dB (positive number)
    pub fn reduction(&self) -> f32 {
        -self.envelope_db
    }

    pub fn set(&mut self, threshold: f32, knee: f32, ratio: f32, attack: f32, release: f32) {
        self.threshold = threshold;
        self.knee = knee.max(0.0);
        self.ratio = ratio.max(1.0);
        self.attack = attack.max(0.0);
        self.release = release.max(0.0);
        self.update();
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.update();
    }

    fn update(&mut self) {
        let coeff = |seconds: f32| {
            if seconds <= 0.0 {
                0.0
            } else {
                (-1.0 / (seconds * self.sample_rate)).exp()
            }
        };
        self.attack_coeff = coeff(self.attack);
        self.release_coeff = coeff(self.release);
        self.makeup_db = -0.6 * self.curve(0.0);
    }

    /// Static gain change (dB) for an input level in dB
    pub fn curve(&self, level_db: f32) -> f32 {
        let over = level_db - self.threshold;
        let slope = 1.0 / self.ratio - 1.0;
        if self.knee > 0.0 && 2.0 * over.abs() <= self.knee {
            let x = over + self.knee / 2.0;
            slope * x * x / (2.0 * self.knee)
        } else if over > 0.0 {
            slope * over
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        self.envelope_db = 0.0;
    }

    /// Process interleaved stereo in place
    pub fn process(&mut self, frames: &mut [f32]) {
        for frame in frames.chunks_exact_mut(2) {
            let peak = frame[0].abs().max(frame[1].abs());
            let target = if peak > 1e-9 {
                self.curve(20.0 * peak.log10())
            } else {
                0.0
            };
            let coeff = if target < self.envelope_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope_db = target + coeff * (self.envelope_db - target);

            let gain_db = self.envelope_db + self.makeup_db;
            if gain_db != 0.0 {
                let gain = 10.0_f32.powf(gain_db / 20.0);
                frame[0] *= gain;
                frame[1] *= gain;
            }
        }
    }
}

/// Output level
#[derive(Debug, Clone)]
pub struct GainNode {
    gain: f32,
}

impl GainNode {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.max(0.0);
    }

    pub fn process(&mut self, frames: &mut [f32]) {
        if self.gain != 1.0 {
            for s in frames.iter_mut() {
                *s *= self.gain;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sine(freq: f32, amp: f32, frames: usize, sr: f32) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let s = amp * (2.0 * std::f32::consts::PI * freq * i as f32 / sr).sin();
                [s, s]
            })
            .collect()
    }

    fn peak(frames: &[f32]) -> f32 {
        frames.iter().fold(0.0_f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_peaking_zero_gain_is_transparent() {
        let mut node = BiquadNode::new(BiquadKind::Peaking, 1000.0, 1.0, 0.0, 44100.0);
        let input = sine(1000.0, 0.5, 2048, 44100.0);
        let mut out = input.clone();
        node.process(&mut out);
        for (a, b) in input.iter().zip(out.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_shelf_and_peak_gain_at_center() {
        let node = BiquadNode::new(BiquadKind::Peaking, 1000.0, 1.0, 6.0, 48000.0);
        assert_abs_diff_eq!(node.magnitude_db(1000.0), 6.0, epsilon = 0.01);

        let node = BiquadNode::new(BiquadKind::Highshelf, 12000.0, 0.0, 2.5, 48000.0);
        assert_abs_diff_eq!(node.magnitude_db(12000.0), 1.25, epsilon = 0.05);
        assert_abs_diff_eq!(node.magnitude_db(100.0), 0.0, epsilon = 0.05);
    }

    #[test]
    fn test_highpass_q_in_decibels() {
        // 0.7 dB of resonance is about 1.08 linear Q: slight bump at the corner
        let node = BiquadNode::new(BiquadKind::Highpass, 30.0, 0.7, 0.0, 44100.0);
        assert!(node.magnitude_db(30.0) > 0.0);
        assert!(node.magnitude_db(5.0) < -20.0);
        assert_abs_diff_eq!(node.magnitude_db(1000.0), 0.0, epsilon = 0.01);
    }

    #[test]
    fn test_unity_ratio_compressor_is_identity() {
        let mut node = DynamicsCompressorNode::new(0.0, 10.0, 1.0, 0.02, 0.25, 44100.0);
        let input = sine(440.0, 0.99, 4096, 44100.0);
        let mut out = input.clone();
        node.process(&mut out);
        assert_eq!(input, out);
        assert_eq!(node.reduction(), 0.0);
    }

    #[test]
    fn test_compressor_curve_with_knee() {
        let node = DynamicsCompressorNode::new(-18.0, 10.0, 3.0, 0.02, 0.25, 44100.0);
        assert_eq!(node.curve(-40.0), 0.0);
        // Well above the knee: (1/3 - 1) * 12
        assert_abs_diff_eq!(node.curve(-6.0), -8.0, epsilon = 1e-4);
        // Knee midpoint: half of the knee's quadratic onset
        assert!(node.curve(-18.0) < 0.0 && node.curve(-18.0) > -2.0);
    }

    #[test]
    fn test_limiter_settings_reduce_peaks() {
        let mut node = DynamicsCompressorNode::new(-6.0, 0.0, 20.0, 0.001, 0.05, 44100.0);
        let mut frames = sine(440.0, 0.9, 44100, 44100.0);
        node.process(&mut frames);
        let tail = &frames[frames.len() / 2..];
        assert!(peak(tail) < 0.88, "peak {}", peak(tail));
        assert!(node.reduction() > 0.0);
    }

    #[test]
    fn test_gain_node() {
        let mut node = GainNode::new(0.5);
        let mut frames = vec![1.0, -1.0];
        node.process(&mut frames);
        assert_eq!(frames, vec![0.5, -0.5]);
        node.set_gain(-3.0);
        assert_eq!(node.gain(), 0.0);
    }
}
