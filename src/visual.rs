//! Visualization data
//!
//! Arrays handed to the waveform and spectrum displays. Waveform data is
//! computed once per loaded file from the first channel; spectrum bars are
//! mapped from the analyser tap on every refresh.

use crate::engine::DecodedAudio;

/// Default number of waveform / envelope points
pub const DEFAULT_WAVEFORM_POINTS: usize = 2048;
/// Default bass-envelope low-pass corner
pub const DEFAULT_BASS_CUTOFF_HZ: f32 = 200.0;
/// Default number of spectrum bars
pub const DEFAULT_SPECTRUM_BARS: usize = 64;
pub const SPECTRUM_MIN_HZ: f32 = 20.0;
pub const SPECTRUM_MAX_HZ: f32 = 20000.0;

fn window_size(frames: usize, points: usize) -> usize {
    (frames / points.max(1)).max(1)
}

/// Absolute peak per window, clamped to [0, 1]
///
/// # Arguments
/// * `audio` - Decoded source; only the first channel is read
/// * `points` - Number of windows
pub fn waveform_peaks(audio: &DecodedAudio, points: usize) -> Vec<f32> {
    if audio.is_empty() || points == 0 {
        return vec![0.0; points];
    }
    let channel = audio.channel(0);
    let size = window_size(channel.len(), points);

    (0..points)
        .map(|i| {
            let start = (i * size).min(channel.len());
            let end = (start + size).min(channel.len());
            channel[start..end]
                .iter()
                .fold(0.0_f32, |m, s| m.max(s.abs()))
                .min(1.0)
        })
        .collect()
}

/// Low-frequency energy per window, normalised so the loudest window is 1
///
/// The first channel runs through a one-pole low-pass at `cutoff_hz`; each
/// window's RMS is divided by the maximum (floored at 1e-6).
pub fn bass_envelope(audio: &DecodedAudio, points: usize, cutoff_hz: f32) -> Vec<f32> {
    if audio.is_empty() || points == 0 {
        return vec![0.0; points];
    }
    let channel = audio.channel(0);
    let size = window_size(channel.len(), points);
    let alpha = (-2.0 * std::f32::consts::PI * cutoff_hz / audio.sample_rate() as f32).exp();

    let mut low = 0.0_f32;
    let envelope: Vec<f32> = (0..points)
        .map(|i| {
            let start = (i * size).min(channel.len());
            let end = (start + size).min(channel.len());
            let mut sum_sq = 0.0_f32;
            for s in &channel[start..end] {
                low += (1.0 - alpha) * (s - low);
                sum_sq += low * low;
            }
            let count = end - start;
            if count > 0 {
                (sum_sq / count as f32).sqrt()
            } else {
                0.0
            }
        })
        .collect();

    let max = envelope.iter().copied().fold(1e-6_f32, f32::max);
    envelope.into_iter().map(|v| v / max).collect()
}

/// Map analyser bins onto display bars between 20 Hz and 20 kHz
///
/// # Arguments
/// * `freq_data` - Byte magnitudes from the analyser (bins up to Nyquist)
/// * `sample_rate` - Rate the analyser ran at
/// * `bars` - Number of bars (at least 2)
/// * `log_scale` - Log-spaced bar frequencies instead of linear
pub fn spectrum_bars(freq_data: &[u8], sample_rate: u32, bars: usize, log_scale: bool) -> Vec<u8> {
    let bars = bars.max(2);
    let bin_count = freq_data.len();
    let nyquist = sample_rate as f32 / 2.0;
    let (lo, hi) = (SPECTRUM_MIN_HZ, SPECTRUM_MAX_HZ);

    (0..bars)
        .map(|i| {
            let ratio = i as f32 / (bars - 1) as f32;
            let freq = if log_scale {
                10.0_f32.powf(lo.log10() + ratio * (hi.log10() - lo.log10()))
            } else {
                lo + ratio * (hi - lo)
            };
            let bin = ((freq / nyquist) * bin_count as f32).floor() as usize;
            freq_data.get(bin).copied().unwrap_or(0)
        })
        .collect()
}
