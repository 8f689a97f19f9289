//! Offline sample-rate conversion
//!
//! FFT-based synchronous resampling (rubato) of planar stereo audio. The
//! resampler's own delay is trimmed so the output is time-aligned with the
//! input and exactly `round(frames * to / from)` frames long.

use rubato::{FftFixedInOut, Resampler};

use crate::error::{Result, WorthyError};

/// Frames per resampler chunk
const CHUNK_FRAMES: usize = 1024;

fn resample_error(e: impl std::fmt::Display) -> WorthyError {
    WorthyError::render(format!("resampling failed: {}", e))
}

/// Number of frames produced when converting `frames` from `from` Hz to `to` Hz
pub fn output_frames(frames: usize, from: u32, to: u32) -> usize {
    ((frames as u128 * to as u128 + from as u128 / 2) / from as u128) as usize
}

/// Resample planar stereo from `from` Hz to `to` Hz
///
/// Identical rates return copies of the input untouched.
pub fn resample_stereo(
    left: &[f64],
    right: &[f64],
    from: u32,
    to: u32,
) -> Result<(Vec<f64>, Vec<f64>)> {
    if from == to || left.is_empty() {
        return Ok((left.to_vec(), right.to_vec()));
    }

    let mut resampler = FftFixedInOut::<f64>::new(from as usize, to as usize, CHUNK_FRAMES, 2)
        .map_err(resample_error)?;

    let frames = left.len().min(right.len());
    let expected = output_frames(frames, from, to);
    let delay = resampler.output_delay();
    let chunk = resampler.input_frames_next();

    let mut out_l: Vec<f64> = Vec::with_capacity(expected + delay + chunk);
    let mut out_r: Vec<f64> = Vec::with_capacity(expected + delay + chunk);
    let mut pos = 0;
    let mut scratch_l = vec![0.0; chunk];
    let mut scratch_r = vec![0.0; chunk];

    while out_l.len() < expected + delay {
        // Copy the next chunk, zero-padding past the end of the input
        for i in 0..chunk {
            let idx = pos + i;
            scratch_l[i] = if idx < frames { left[idx] } else { 0.0 };
            scratch_r[i] = if idx < frames { right[idx] } else { 0.0 };
        }
        pos += chunk;

        let input = [scratch_l.as_slice(), scratch_r.as_slice()];
        let output = resampler.process(&input[..], None).map_err(resample_error)?;
        out_l.extend_from_slice(&output[0]);
        out_r.extend_from_slice(&output[1]);
    }

    let out_l = out_l[delay..delay + expected].to_vec();
    let out_r = out_r[delay..delay + expected].to_vec();
    Ok((out_l, out_r))
}
