//! Offline Render Pipeline
//!
//! Drives one export: validate the output format, probe the input, run the
//! analysis pass when normalization is requested, build the stage list from
//! the measurement, execute it on a [`RenderStrategy`] and report progress.
//!
//! Progress is monotonic and ends at exactly 100 on success. With
//! normalization the first 10% is the analysis milestone and the render
//! fraction is mapped onto the remaining 90%.
//!
//! Failed or cancelled exports leave no output file behind.

pub mod ffmpeg;
pub mod job;
pub mod native;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::chain::FilterChain;
use crate::engine::{probe, sha256_file};
use crate::error::{Result, WorthyError};
use crate::loudness::LoudnessMeasurement;
use crate::params::{MasteringParams, OutputFormat};

pub use ffmpeg::FfmpegRenderer;
pub use job::{ExportJob, RenderEvent};
pub use native::NativeRenderer;

/// Progress reported once analysis starts
pub const ANALYSIS_STARTED_PERCENT: f64 = 5.0;
/// Progress reserved for the completed analysis pass
pub const ANALYSIS_DONE_PERCENT: f64 = 10.0;
/// Render progress is held below this until the output is finalized
const RENDER_PROGRESS_CAP: f64 = 99.0;

// ============================================================================
// Cancellation
// ============================================================================

/// Shared flag checked at every progress checkpoint
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(WorthyError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Turns backend completion fractions into the caller's percentage stream
pub struct ProgressReporter<'a> {
    sink: &'a mut dyn FnMut(f64),
    two_pass: bool,
    last: Option<f64>,
}

impl<'a> ProgressReporter<'a> {
    /// # Arguments
    /// * `two_pass` - Normalization requested; reserves the first 10%
    /// * `sink` - Receives each new percentage
    pub fn new(two_pass: bool, sink: &'a mut dyn FnMut(f64)) -> Self {
        Self {
            sink,
            two_pass,
            last: None,
        }
    }

    fn emit(&mut self, percent: f64) {
        if percent.is_nan() {
            return;
        }
        let percent = percent.clamp(0.0, 100.0);
        if self.last.map_or(true, |last| percent > last) {
            self.last = Some(percent);
            (self.sink)(percent);
        }
    }

    pub fn analysis_started(&mut self) {
        self.emit(ANALYSIS_STARTED_PERCENT);
    }

    /// The analysis pass finished (with or without a measurement)
    pub fn analysis_done(&mut self) {
        self.emit(ANALYSIS_DONE_PERCENT);
    }

    /// Map a render completion fraction (0..1) onto the percentage stream
    pub fn render_fraction(&mut self, fraction: f64) {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        let percent = if self.two_pass {
            ANALYSIS_DONE_PERCENT + fraction * (100.0 - ANALYSIS_DONE_PERCENT)
        } else {
            fraction * 100.0
        };
        self.emit(percent.min(RENDER_PROGRESS_CAP));
    }

    pub fn complete(&mut self) {
        self.emit(100.0);
    }

    /// Last value sent to the sink
    pub fn last(&self) -> Option<f64> {
        self.last
    }
}

// ============================================================================
// Requests, reports and strategies
// ============================================================================

/// One export: input, destination and the settings to render with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub params: MasteringParams,
}

impl RenderRequest {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, params: MasteringParams) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            params,
        }
    }
}

/// Summary of a finished export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderReport {
    pub job_id: Uuid,
    pub output: PathBuf,
    pub format: OutputFormat,
    /// Analysis result, when normalization ran with a measurement
    pub measurement: Option<LoudnessMeasurement>,
    /// Normalization used measured values (linear correction)
    pub two_pass: bool,
    pub frames_written: u64,
    pub duration_secs: f64,
    /// SHA-256 of the output file
    pub sha256: String,
}

/// An offline engine able to measure and execute a stage list
pub trait RenderStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Analysis pass; `None` means the measurement is unavailable
    fn measure(
        &self,
        input: &Path,
        pre_chain: &FilterChain,
        format: &OutputFormat,
    ) -> Option<LoudnessMeasurement>;

    /// Render `input` through `chain` into `output`
    ///
    /// Calls `on_fraction` with the completion fraction (0..1) and checks
    /// `cancel` at each checkpoint. Returns the number of frames written.
    fn execute(
        &self,
        input: &Path,
        output: &Path,
        chain: &FilterChain,
        format: &OutputFormat,
        on_fraction: &mut dyn FnMut(f64),
        cancel: &CancellationToken,
    ) -> Result<u64>;
}

/// Exports are always WAV; the path has to say so
fn is_wav_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("wav"))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn discard_partial(output: &Path) {
    if output.exists() {
        if let Err(e) = std::fs::remove_file(output) {
            warn!("Could not remove partial output {}: {}", output.display(), e);
        }
    }
}

/// Run one export to completion
///
/// # Arguments
/// * `strategy` - Backend that measures and renders
/// * `request` - Input, output and settings
/// * `progress` - Receives the monotonic percentage stream
/// * `cancel` - Checked between passes and at every render checkpoint
///
/// # Errors
/// * `InvalidParameter` - Unsupported sample rate or bit depth, an output
///   path without a `.wav` extension, or output equal to input
/// * `FileNotFound` / `ProbeFailed` - The input cannot be read; nothing is rendered
/// * `Cancelled` - Cancellation was requested
/// * `RenderFailed` - The backend failed; its message is kept verbatim
pub fn render(
    strategy: &dyn RenderStrategy,
    request: &RenderRequest,
    progress: &mut dyn FnMut(f64),
    cancel: &CancellationToken,
) -> Result<RenderReport> {
    render_with_id(strategy, request, Uuid::new_v4(), progress, cancel)
}

pub(crate) fn render_with_id(
    strategy: &dyn RenderStrategy,
    request: &RenderRequest,
    job_id: Uuid,
    progress: &mut dyn FnMut(f64),
    cancel: &CancellationToken,
) -> Result<RenderReport> {
    let started = Instant::now();
    let params = &request.params;
    let format = OutputFormat::try_from(params)?;

    if !is_wav_path(&request.output) {
        return Err(WorthyError::invalid_parameter(
            "output",
            request.output.display(),
            "a path ending in .wav",
        ));
    }
    if same_file(&request.input, &request.output) {
        return Err(WorthyError::invalid_parameter(
            "output",
            request.output.display(),
            "a path different from the input",
        ));
    }

    let info = probe(&request.input)?;
    info!(
        %job_id,
        backend = strategy.name(),
        input = %request.input.display(),
        duration = info.duration,
        "Export started"
    );

    let mut reporter = ProgressReporter::new(params.normalize_loudness, progress);

    let measurement = if params.normalize_loudness {
        reporter.analysis_started();
        cancel.check()?;
        let pre_chain = FilterChain::pre_normalization(params);
        let measurement = strategy.measure(&request.input, &pre_chain, &format);
        match &measurement {
            Some(m) => info!(%job_id, input_i = m.input_i, input_tp = m.input_tp, "Analysis pass complete"),
            None => warn!(%job_id, "Loudness measurement unavailable; normalizing blind"),
        }
        reporter.analysis_done();
        measurement
    } else {
        None
    };
    cancel.check()?;

    let chain = FilterChain::build(params, measurement.as_ref());
    let result = strategy.execute(
        &request.input,
        &request.output,
        &chain,
        &format,
        &mut |fraction| reporter.render_fraction(fraction),
        cancel,
    );

    let frames_written = match result.and_then(|frames| cancel.check().map(|_| frames)) {
        Ok(frames) => frames,
        Err(e) => {
            discard_partial(&request.output);
            match &e {
                WorthyError::Cancelled => info!(%job_id, "Export cancelled"),
                other => warn!(%job_id, "Export failed: {}", other),
            }
            return Err(e);
        }
    };

    let sha256 = match sha256_file(&request.output) {
        Ok(hash) => hash,
        Err(e) => {
            discard_partial(&request.output);
            return Err(e);
        }
    };
    reporter.complete();

    let report = RenderReport {
        job_id,
        output: request.output.clone(),
        format,
        measurement,
        two_pass: chain.is_two_pass(),
        frames_written,
        duration_secs: frames_written as f64 / format.sample_rate as f64,
        sha256,
    };
    info!(
        %job_id,
        frames = report.frames_written,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Export finished"
    );
    Ok(report)
}
