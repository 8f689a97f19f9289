//! Decoded Audio Buffer
//!
//! The in-memory decode of the loaded file. Once built it is never mutated;
//! transport, preview graph and visualization share it through an `Arc`.

use std::sync::Arc;

use crate::error::{Result, WorthyError};

// ============================================================================
// Decoded Audio
// ============================================================================

/// Read-only planar audio at the file's own sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

/// Shared handle to decoded audio
pub type SharedAudio = Arc<DecodedAudio>;

impl DecodedAudio {
    /// Build from planar channel data
    ///
    /// # Errors
    /// * `InvalidAudio` - No channels, mismatched channel lengths or a zero sample rate
    pub fn from_planar(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if channels.is_empty() {
            return Err(WorthyError::InvalidAudio {
                reason: "audio has no channels".to_string(),
                source: None,
            });
        }
        if sample_rate == 0 {
            return Err(WorthyError::InvalidAudio {
                reason: "sample rate is zero".to_string(),
                source: None,
            });
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(WorthyError::InvalidAudio {
                reason: "channels have different lengths".to_string(),
                source: None,
            });
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Build from interleaved samples
    ///
    /// # Example
    /// ```
    /// use worthy::engine::DecodedAudio;
    ///
    /// let audio = DecodedAudio::from_interleaved(&[0.1, 0.2, 0.3, 0.4], 2, 44100).unwrap();
    /// assert_eq!(audio.frames(), 2);
    /// assert_eq!(audio.channel(1), &[0.2, 0.4]);
    /// ```
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Result<Self> {
        if channel_count == 0 {
            return Err(WorthyError::InvalidAudio {
                reason: "audio has no channels".to_string(),
                source: None,
            });
        }
        let frames = samples.len() / channel_count;
        let channels = (0..channel_count)
            .map(|ch| (0..frames).map(|f| samples[f * channel_count + ch]).collect())
            .collect();
        Self::from_planar(channels, sample_rate)
    }

    pub fn into_shared(self) -> SharedAudio {
        Arc::new(self)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of sample frames
    pub fn frames(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Stereo frame at `index`; mono is duplicated, extra channels are folded
    /// into left (even) and right (odd)
    #[inline]
    pub fn stereo_frame(&self, index: usize) -> (f32, f32) {
        match self.channels.len() {
            1 => {
                let s = self.channels[0][index];
                (s, s)
            }
            2 => (self.channels[0][index], self.channels[1][index]),
            n => {
                let (mut l, mut r) = (0.0, 0.0);
                for (ch, data) in self.channels.iter().enumerate() {
                    if ch % 2 == 0 {
                        l += data[index];
                    } else {
                        r += data[index];
                    }
                }
                let left_count = n.div_ceil(2) as f32;
                let right_count = (n / 2) as f32;
                (l / left_count, r / right_count)
            }
        }
    }

    /// Planar stereo copy in double precision
    pub fn to_stereo_f64(&self) -> (Vec<f64>, Vec<f64>) {
        let frames = self.frames();
        let mut left = Vec::with_capacity(frames);
        let mut right = Vec::with_capacity(frames);
        for i in 0..frames {
            let (l, r) = self.stereo_frame(i);
            left.push(l as f64);
            right.push(r as f64);
        }
        (left, right)
    }

    /// Absolute peak across all channels
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0_f32, |m, s| m.max(s.abs()))
    }

    /// RMS across all channels
    pub fn rms(&self) -> f32 {
        let count = self.frames() * self.num_channels();
        if count == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .channels
            .iter()
            .flat_map(|c| c.iter())
            .map(|s| (*s as f64) * (*s as f64))
            .sum();
        (sum / count as f64).sqrt() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_interleaved_deinterleaves() {
        let audio = DecodedAudio::from_interleaved(&[1.0, -1.0, 0.5, -0.5], 2, 48000).unwrap();
        assert_eq!(audio.channel(0), &[1.0, 0.5]);
        assert_eq!(audio.channel(1), &[-1.0, -0.5]);
        assert_eq!(audio.duration_secs(), 2.0 / 48000.0);
    }

    #[test]
    fn test_rejects_ragged_channels() {
        let err = DecodedAudio::from_planar(vec![vec![0.0; 3], vec![0.0; 2]], 44100).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_AUDIO");
        assert!(DecodedAudio::from_planar(vec![], 44100).is_err());
        assert!(DecodedAudio::from_planar(vec![vec![0.0]], 0).is_err());
    }

    #[test]
    fn test_mono_upmix_duplicates() {
        let audio = DecodedAudio::from_planar(vec![vec![0.25, -0.5]], 44100).unwrap();
        let (l, r) = audio.to_stereo_f64();
        assert_eq!(l, vec![0.25, -0.5]);
        assert_eq!(l, r);
    }

    #[test]
    fn test_multichannel_folds_to_stereo() {
        let audio =
            DecodedAudio::from_planar(vec![vec![0.2], vec![0.4], vec![0.6]], 44100).unwrap();
        let (l, r) = audio.stereo_frame(0);
        assert!((l - 0.4).abs() < 1e-6);
        assert!((r - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_peak_and_rms() {
        let audio = DecodedAudio::from_planar(vec![vec![0.5, -0.5], vec![0.5, -0.5]], 44100).unwrap();
        assert_eq!(audio.peak(), 0.5);
        assert!((audio.rms() - 0.5).abs() < 1e-6);
    }
}
