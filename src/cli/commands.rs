//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::chain::ffmpeg::filter_graph;
use crate::chain::FilterChain;
use crate::config::{Backend, EngineConfig};
use crate::engine::{decode, format_time, probe as probe_file, write_wav};
use crate::error::Result;
use crate::params::{BitDepth, MasteringParams, OutputFormat};
use crate::preview::{PreviewGraph, PreviewStrategy};
use crate::render::{ExportJob, RenderEvent, RenderRequest};

/// Settings from a JSON file, or the defaults
pub fn load_params(settings: Option<&Path>) -> Result<MasteringParams> {
    match settings {
        Some(path) => MasteringParams::from_json_file(path),
        None => Ok(MasteringParams::default()),
    }
}

/// Print stream and container facts for a file.
pub fn probe(input: &Path) -> Result<()> {
    let info = probe_file(input)?;

    println!("File:        {}", input.display());
    println!("Duration:    {} ({:.3}s)", format_time(info.duration), info.duration);
    println!("Sample rate: {} Hz", info.sample_rate);
    println!("Channels:    {}", info.channels);
    println!("Codec:       {}", info.codec);
    println!("Container:   {}", info.format);
    match info.bit_rate {
        Some(rate) => println!("Bit rate:    {} kb/s", rate / 1000),
        None => println!("Bit rate:    unknown"),
    }

    Ok(())
}

/// Run the analysis pass and print the measurement.
pub fn measure(input: &Path, settings: Option<&Path>, config: &EngineConfig) -> Result<()> {
    let params = load_params(settings)?;
    let format = OutputFormat::try_from(&params)?;
    probe_file(input)?;

    let strategy = config.strategy();
    info!("Measuring {} with the {} backend", input.display(), strategy.name());
    let pre_chain = FilterChain::pre_normalization(&params);

    match strategy.measure(input, &pre_chain, &format) {
        Some(m) => {
            println!("Integrated: {:.2} LUFS", m.input_i);
            println!("True peak:  {:.2} dBTP", m.input_tp);
            println!("Range:      {:.2} LU", m.input_lra);
            println!("Threshold:  {:.2} LUFS", m.input_thresh);
        }
        None => println!("Measurement unavailable (export would normalize blind)"),
    }

    Ok(())
}

/// Print the stage list for a settings file.
///
/// Normalization is shown in its blind form since no input is measured.
pub fn chain(settings: Option<&Path>, json: bool) -> Result<()> {
    let params = load_params(settings)?;
    let chain = FilterChain::build(&params, None);

    if json {
        println!("{}", serde_json::to_string_pretty(chain.stages())?);
        return Ok(());
    }

    match filter_graph(&chain) {
        Some(graph) => println!("{}", graph),
        None => println!("(passthrough: output encoding only)"),
    }

    Ok(())
}

/// Export a mastered file, printing progress.
///
/// The export runs as a background job polled at the configured interval,
/// the same way an interactive front end drives it.
pub fn render(
    input: &Path,
    output: &Path,
    settings: Option<&Path>,
    backend: Option<Backend>,
    config: &EngineConfig,
) -> Result<()> {
    let params = load_params(settings)?;
    let normalize = params.normalize_loudness;
    let strategy = config.strategy_for(backend.unwrap_or(config.backend));
    let mut job = ExportJob::spawn(strategy, RenderRequest::new(input, output, params));
    info!(job_id = %job.id(), "Export job started");

    let mut stderr = std::io::stderr();
    let result = loop {
        let mut outcome = None;
        for event in job.poll() {
            match event {
                RenderEvent::Progress(p) => {
                    let _ = write!(stderr, "\rExporting... {:>3.0}%", p);
                    let _ = stderr.flush();
                }
                RenderEvent::Finished(report) => outcome = Some(Ok(report)),
                RenderEvent::Failed(e) => outcome = Some(Err(e)),
            }
        }
        match outcome {
            Some(result) => break result,
            None => std::thread::sleep(config.poll_interval()),
        }
    };
    eprintln!();
    let report = result?;

    println!("Exported:   {}", report.output.display());
    println!(
        "Format:     {} Hz, {}-bit, {} channels",
        report.format.sample_rate,
        report.format.bit_depth.bits(),
        report.format.channels
    );
    println!("Duration:   {}", format_time(report.duration_secs));
    match report.measurement {
        Some(m) => println!("Normalized: two-pass from {:.2} LUFS", m.input_i),
        None if normalize => println!("Normalized: blind (no measurement)"),
        None => {}
    }
    println!("SHA-256:    {}", report.sha256);

    Ok(())
}

/// Run the preview graph over a whole file and write what it would play.
pub fn preview(
    input: &Path,
    output: &Path,
    settings: Option<&Path>,
    bypass: bool,
    config: &EngineConfig,
) -> Result<()> {
    let params = load_params(settings)?;
    let audio = decode(input)?.into_shared();

    let mut graph = PreviewGraph::new();
    graph.connect(audio.clone());
    graph.configure(&params);
    graph.set_bypass(bypass);
    info!(bypass, "Running preview graph over {}", input.display());

    let block = config.preview_block_frames.max(1);
    let mut samples = Vec::with_capacity(audio.frames() * 2);
    let mut buffer = vec![0.0_f32; block * 2];
    let mut frame = 0;
    while frame < audio.frames() {
        let n = block.min(audio.frames() - frame);
        for i in 0..n {
            let (l, r) = audio.stereo_frame(frame + i);
            buffer[2 * i] = l;
            buffer[2 * i + 1] = r;
        }
        graph.process(&mut buffer[..2 * n]);
        samples.extend_from_slice(&buffer[..2 * n]);
        frame += n;
    }

    let depth = BitDepth::try_from(params.bit_depth)?;
    write_wav(output, &samples, 2, audio.sample_rate(), depth)?;
    println!(
        "Preview written: {} ({} Hz, {})",
        output.display(),
        audio.sample_rate(),
        if bypass { "bypassed" } else { "processed" }
    );

    Ok(())
}
