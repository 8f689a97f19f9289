//! In-process renderer
//!
//! Decode, conform to stereo at the output rate, run the stage list block by
//! block and stream the result into a WAV file. Latency introduced by
//! lookahead stages is compensated so the output stays sample-aligned with
//! the input and has exactly the resampled length.

use std::path::Path;

use tracing::debug;

use super::{CancellationToken, RenderStrategy};
use crate::chain::FilterChain;
use crate::dsp::ProcessorChain;
use crate::engine::{decode_stereo, WavSink};
use crate::error::Result;
use crate::loudness::{LoudnessAnalyzer, LoudnessMeasurement, NativeAnalyzer};
use crate::params::OutputFormat;

/// Default frames per processing block
pub const DEFAULT_BLOCK_FRAMES: usize = 4096;

/// Renders with the crate's own DSP and the EBU R128 meter
#[derive(Debug, Clone)]
pub struct NativeRenderer {
    block_frames: usize,
    analyzer: NativeAnalyzer,
}

impl NativeRenderer {
    pub fn new() -> Self {
        Self::with_block_frames(DEFAULT_BLOCK_FRAMES)
    }

    /// # Arguments
    /// * `block_frames` - Frames per block; also the progress/cancel granularity
    pub fn with_block_frames(block_frames: usize) -> Self {
        Self {
            block_frames: block_frames.max(1),
            analyzer: NativeAnalyzer::new(),
        }
    }

    pub fn block_frames(&self) -> usize {
        self.block_frames
    }
}

impl Default for NativeRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderStrategy for NativeRenderer {
    fn name(&self) -> &'static str {
        "native"
    }

    fn measure(
        &self,
        input: &Path,
        pre_chain: &FilterChain,
        format: &OutputFormat,
    ) -> Option<LoudnessMeasurement> {
        self.analyzer.measure(input, pre_chain, format)
    }

    fn execute(
        &self,
        input: &Path,
        output: &Path,
        chain: &FilterChain,
        format: &OutputFormat,
        on_fraction: &mut dyn FnMut(f64),
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let (mut left, mut right) = decode_stereo(input, format.sample_rate)?;
        cancel.check()?;

        let total = left.len();
        let mut processors = ProcessorChain::new(chain, format.sample_rate as f64);
        let latency = processors.latency();
        debug!(
            stages = ?processors.names(),
            latency,
            frames = total,
            "Native render starting"
        );

        let mut sink = WavSink::create(output, format)?;
        let mut skip = latency;
        on_fraction(0.0);

        let mut done = 0;
        for (l, r) in left
            .chunks_mut(self.block_frames)
            .zip(right.chunks_mut(self.block_frames))
        {
            cancel.check()?;
            processors.process(l, r);
            let drop = skip.min(l.len());
            skip -= drop;
            sink.write_frames(&l[drop..], &r[drop..])?;
            done += l.len();
            on_fraction(done as f64 / total.max(1) as f64);
        }

        // Flush the lookahead tail with silence
        let mut tail_l = vec![0.0; self.block_frames];
        let mut tail_r = vec![0.0; self.block_frames];
        let mut remaining = latency;
        while remaining > 0 {
            cancel.check()?;
            let n = remaining.min(self.block_frames);
            tail_l[..n].fill(0.0);
            tail_r[..n].fill(0.0);
            processors.process(&mut tail_l[..n], &mut tail_r[..n]);
            let drop = skip.min(n);
            skip -= drop;
            sink.write_frames(&tail_l[drop..n], &tail_r[drop..n])?;
            remaining -= n;
        }

        let frames = sink.finalize()?;
        on_fraction(1.0);
        Ok(frames)
    }
}
