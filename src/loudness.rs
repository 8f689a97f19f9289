//! Loudness Analyzer
//!
//! First pass of two-pass normalization. Measures integrated loudness, true
//! peak, loudness range and the gating threshold of the signal as it will
//! reach the normalization stage. Analysis never fails loudly: any error
//! yields `None`, which the render pipeline treats as "normalize blind".

use std::path::Path;

use ebur128::{EbuR128, Mode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chain::FilterChain;
use crate::dsp::{linear_to_db, ProcessorChain};
use crate::engine::decode_stereo;
use crate::params::OutputFormat;

/// Frames fed to the meter per call
const MEASURE_BLOCK: usize = 4096;

/// Result of the analysis pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoudnessMeasurement {
    /// Integrated loudness in LUFS
    pub input_i: f64,
    /// True peak in dBTP
    pub input_tp: f64,
    /// Loudness range in LU
    pub input_lra: f64,
    /// Relative gating threshold in LUFS
    pub input_thresh: f64,
}

/// Measures the loudness of an input file
pub trait LoudnessAnalyzer: Send + Sync {
    /// Measure `input` after `pre_chain` at the output format's rate
    ///
    /// Returns `None` when the measurement is unavailable for any reason.
    fn measure(
        &self,
        input: &Path,
        pre_chain: &FilterChain,
        format: &OutputFormat,
    ) -> Option<LoudnessMeasurement>;
}

/// In-process EBU R128 analyzer
#[derive(Debug, Clone, Default)]
pub struct NativeAnalyzer;

impl NativeAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl LoudnessAnalyzer for NativeAnalyzer {
    fn measure(
        &self,
        input: &Path,
        pre_chain: &FilterChain,
        format: &OutputFormat,
    ) -> Option<LoudnessMeasurement> {
        let (mut left, mut right) = match decode_stereo(input, format.sample_rate) {
            Ok(stereo) => stereo,
            Err(e) => {
                warn!("Loudness analysis could not read {}: {}", input.display(), e);
                return None;
            }
        };

        let mut processors = ProcessorChain::new(pre_chain, format.sample_rate as f64);
        for (l, r) in left
            .chunks_mut(MEASURE_BLOCK)
            .zip(right.chunks_mut(MEASURE_BLOCK))
        {
            processors.process(l, r);
        }

        measure_stereo(&left, &right, format.sample_rate)
    }
}

/// Measure planar stereo samples with EBU R128 (integrated, LRA, true peak)
///
/// Returns `None` for silence or anything the meter cannot gate.
pub fn measure_stereo(left: &[f64], right: &[f64], sample_rate: u32) -> Option<LoudnessMeasurement> {
    let mut meter = match EbuR128::new(2, sample_rate, Mode::I | Mode::LRA | Mode::TRUE_PEAK) {
        Ok(m) => m,
        Err(e) => {
            warn!("Loudness meter unavailable: {:?}", e);
            return None;
        }
    };

    let mut interleaved = Vec::with_capacity(MEASURE_BLOCK * 2);
    for (l, r) in left.chunks(MEASURE_BLOCK).zip(right.chunks(MEASURE_BLOCK)) {
        interleaved.clear();
        for (a, b) in l.iter().zip(r.iter()) {
            interleaved.push(*a);
            interleaved.push(*b);
        }
        meter.add_frames_f64(&interleaved).ok()?;
    }

    let input_i = meter.loudness_global().ok()?;
    if !input_i.is_finite() {
        debug!("Integrated loudness is not finite (silent input)");
        return None;
    }

    let peak = (0..2)
        .filter_map(|ch| meter.true_peak(ch).ok())
        .fold(0.0_f64, f64::max);
    let input_tp = linear_to_db(peak);
    let input_lra = meter.loudness_range().unwrap_or(0.0);
    let input_thresh = meter.relative_threshold().ok()?;

    let measurement = LoudnessMeasurement {
        input_i,
        input_tp,
        input_lra,
        input_thresh,
    };
    debug!(?measurement, "Loudness measured");
    Some(measurement)
}

/// String-encoded loudnorm JSON report
#[derive(Deserialize)]
struct LoudnormReport {
    input_i: String,
    input_tp: String,
    input_lra: String,
    input_thresh: String,
}

/// Extract a measurement from ffmpeg's `loudnorm=...:print_format=json` stderr
///
/// # Example
/// ```
/// use worthy::loudness::parse_loudnorm_report;
///
/// let stderr = r#"[Parsed_loudnorm_0 @ 0x1]
/// {
///     "input_i" : "-23.10",
///     "input_tp" : "-5.02",
///     "input_lra" : "6.40",
///     "input_thresh" : "-33.44",
///     "output_i" : "-14.02"
/// }"#;
/// let m = parse_loudnorm_report(stderr).unwrap();
/// assert_eq!(m.input_i, -23.10);
/// ```
pub fn parse_loudnorm_report(stderr: &str) -> Option<LoudnessMeasurement> {
    let key = stderr.rfind("\"input_i\"")?;
    let start = stderr[..key].rfind('{')?;
    let end = key + stderr[key..].find('}')?;
    let report: LoudnormReport = serde_json::from_str(&stderr[start..=end]).ok()?;

    let parse = |s: &str| s.trim().parse::<f64>().ok().filter(|v| v.is_finite());
    Some(LoudnessMeasurement {
        input_i: parse(&report.input_i)?,
        input_tp: parse(&report.input_tp)?,
        input_lra: parse(&report.input_lra)?,
        input_thresh: parse(&report.input_thresh)?,
    })
}
