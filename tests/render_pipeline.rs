//! Integration Tests
//!
//! End-to-end tests for the offline render pipeline.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use test_case::test_case;

use worthy::chain::FilterChain;
use worthy::engine::{decode, probe, write_wav};
use worthy::loudness::{measure_stereo, LoudnessMeasurement};
use worthy::params::{BitDepth, MasteringParams, OutputFormat, ParamUpdate};
use worthy::render::{render, CancellationToken, NativeRenderer, RenderRequest, RenderStrategy};
use worthy::Result;

/// Helper to write a mono test tone
fn write_tone(path: &Path, freq: f32, amp: f32, seconds: f32, sample_rate: u32) {
    let frames = (sample_rate as f32 * seconds) as usize;
    let samples: Vec<f32> = (0..frames)
        .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
        .collect();
    write_wav(path, &samples, 1, sample_rate, BitDepth::Pcm16).unwrap();
}

fn run(
    strategy: &dyn RenderStrategy,
    input: &Path,
    output: &Path,
    params: MasteringParams,
) -> (Result<worthy::render::RenderReport>, Vec<f64>) {
    let mut progress = Vec::new();
    let request = RenderRequest::new(input, output, params);
    let result = render(strategy, &request, &mut |p| progress.push(p), &CancellationToken::new());
    (result, progress)
}

fn output_loudness(path: &Path) -> LoudnessMeasurement {
    let audio = decode(path).unwrap();
    let (l, r) = audio.to_stereo_f64();
    measure_stereo(&l, &r, audio.sample_rate()).unwrap()
}

// === End-to-end scenarios ===

#[test]
fn test_two_pass_mono_to_stereo_master() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("mono.wav");
    let output = dir.path().join("master.wav");
    write_tone(&input, 997.0, 0.1, 5.0, 44100);

    let params = MasteringParams::default()
        .apply(ParamUpdate::NormalizeLoudness(true))
        .apply(ParamUpdate::TruePeakLimit(true))
        .apply(ParamUpdate::TruePeakCeiling(-1.0));
    let (result, progress) = run(&NativeRenderer::new(), &input, &output, params);
    let report = result.unwrap();

    assert!(report.measurement.is_some(), "analysis pass should measure");
    assert!(report.two_pass);

    let reader = hound::WavReader::open(&output).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 44100);
    assert_eq!(spec.bits_per_sample, 16);

    let loudness = output_loudness(&output);
    assert!(loudness.input_tp <= -1.0, "true peak {} dBTP", loudness.input_tp);
    assert!((loudness.input_i + 14.0).abs() < 0.5, "output {} LUFS", loudness.input_i);

    // Progress: analysis milestones, monotonic, exactly 100 at the end
    assert_eq!(progress.first(), Some(&5.0));
    assert!(progress.contains(&10.0));
    assert!(progress.windows(2).all(|w| w[1] >= w[0]));
    assert_eq!(progress.last(), Some(&100.0));
}

#[test]
fn test_loud_input_is_limited_to_ceiling() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("loud.wav");
    let output = dir.path().join("master.wav");
    write_tone(&input, 120.0, 0.95, 3.0, 44100);

    let params = MasteringParams::default()
        .apply(ParamUpdate::EqLow(9.0))
        .apply(ParamUpdate::TruePeakLimit(true))
        .apply(ParamUpdate::TruePeakCeiling(-3.0));
    let (result, _) = run(&NativeRenderer::new(), &input, &output, params);
    result.unwrap();

    let true_peak = output_loudness(&output).input_tp;
    assert!(true_peak <= -3.0, "true peak {} dBTP", true_peak);
}

#[test]
fn test_intersample_peaks_are_limited() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("intersample.wav");
    let output = dir.path().join("master.wav");

    // Quarter-rate tone at 45 degrees: samples reach 0.85, the waveform 1.2
    let samples: Vec<f32> = (0..2 * 44100)
        .map(|i| 1.2 * (std::f32::consts::FRAC_PI_2 * i as f32 + std::f32::consts::FRAC_PI_4).sin())
        .collect();
    write_wav(&input, &samples, 1, 44100, BitDepth::Pcm16).unwrap();
    assert!(output_loudness(&input).input_tp > 1.0);

    let params = MasteringParams::default()
        .apply(ParamUpdate::TruePeakLimit(true))
        .apply(ParamUpdate::TruePeakCeiling(-1.0));
    let (result, _) = run(&NativeRenderer::new(), &input, &output, params);
    result.unwrap();

    let true_peak = output_loudness(&output).input_tp;
    assert!(true_peak <= -1.0, "true peak {} dBTP", true_peak);
    assert!(true_peak > -2.0, "over-limited to {} dBTP", true_peak);
}

#[test]
fn test_neutral_params_are_passthrough() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("out.wav");
    write_tone(&input, 440.0, 0.7, 1.0, 44100);

    let params = MasteringParams::default();
    assert!(FilterChain::build(&params, None).is_passthrough());
    let (result, progress) = run(&NativeRenderer::new(), &input, &output, params);
    result.unwrap();
    assert_eq!(progress.first(), Some(&0.0));
    assert_eq!(progress.last(), Some(&100.0));

    let src: Vec<i16> = hound::WavReader::open(&input)
        .unwrap()
        .samples::<i16>()
        .map(|s| s.unwrap())
        .collect();
    let out: Vec<i16> = hound::WavReader::open(&output)
        .unwrap()
        .samples::<i16>()
        .map(|s| s.unwrap())
        .collect();

    assert_eq!(out.len(), src.len() * 2);
    for (i, s) in src.iter().enumerate() {
        assert_eq!(out[2 * i], *s, "left frame {}", i);
        assert_eq!(out[2 * i + 1], *s, "right frame {}", i);
    }
}

#[test_case(44100, 16 ; "cd")]
#[test_case(48000, 24 ; "video")]
#[test_case(96000, 32 ; "hires")]
#[test_case(22050, 16 ; "downsampled")]
fn test_output_format_matches_request(sample_rate: u32, bits: u16) {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("out.wav");
    write_tone(&input, 440.0, 0.5, 0.5, 44100);

    let params = MasteringParams::default()
        .apply(ParamUpdate::SampleRate(sample_rate))
        .apply(ParamUpdate::BitDepth(bits))
        .apply(ParamUpdate::GlueCompression(true));
    let (result, _) = run(&NativeRenderer::new(), &input, &output, params);
    let report = result.unwrap();

    let spec = hound::WavReader::open(&output).unwrap().spec();
    assert_eq!(spec.sample_rate, sample_rate);
    assert_eq!(spec.bits_per_sample, bits);
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);

    let expected = (22050.0 * sample_rate as f64 / 44100.0).round() as u64;
    assert!(report.frames_written.abs_diff(expected) <= 1);
    assert_eq!(report.format, OutputFormat::new(sample_rate, bits).unwrap());
}

#[test]
fn test_invalid_bit_depth_fails_before_rendering() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("out.wav");
    write_tone(&input, 440.0, 0.5, 0.2, 44100);

    let params = MasteringParams::default().apply(ParamUpdate::BitDepth(20));
    let (result, progress) = run(&NativeRenderer::new(), &input, &output, params);
    assert_eq!(result.unwrap_err().error_code(), "INVALID_PARAMETER");
    assert!(progress.is_empty());
    assert!(!output.exists());

    let params = MasteringParams::default().apply(ParamUpdate::SampleRate(44000));
    let (result, _) = run(&NativeRenderer::new(), &input, &output, params);
    assert_eq!(result.unwrap_err().error_code(), "INVALID_PARAMETER");
}

#[test]
fn test_render_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.wav");
    write_tone(&input, 330.0, 0.4, 2.0, 44100);

    let params = MasteringParams::default()
        .apply(ParamUpdate::CleanLowEnd(true))
        .apply(ParamUpdate::CenterBass(true))
        .apply(ParamUpdate::CutMud(true))
        .apply(ParamUpdate::AddAir(true))
        .apply(ParamUpdate::GlueCompression(true))
        .apply(ParamUpdate::NormalizeLoudness(true))
        .apply(ParamUpdate::TruePeakLimit(true));

    let a = dir.path().join("a.wav");
    let b = dir.path().join("b.wav");
    let first = run(&NativeRenderer::new(), &input, &a, params.clone()).0.unwrap();
    let second = run(&NativeRenderer::new(), &input, &b, params).0.unwrap();
    assert_eq!(first.sha256, second.sha256);
    assert_ne!(first.job_id, second.job_id);
}

#[test]
fn test_unreadable_input_fails_probe_and_render() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.mp3");
    let garbage = dir.path().join("garbage.wav");
    std::fs::write(&garbage, b"definitely not audio").unwrap();

    assert_eq!(probe(&missing).unwrap_err().error_code(), "FILE_NOT_FOUND");
    assert_eq!(probe(&garbage).unwrap_err().error_code(), "PROBE_FAILED");

    let output = dir.path().join("out.wav");
    let params = MasteringParams::default().apply(ParamUpdate::NormalizeLoudness(true));
    let (result, progress) = run(&NativeRenderer::new(), &garbage, &output, params);
    assert_eq!(result.unwrap_err().error_code(), "PROBE_FAILED");
    assert!(progress.is_empty(), "render must not start");
    assert!(!output.exists());
}

/// Backend whose analysis always fails
struct BlindRenderer(NativeRenderer);

impl RenderStrategy for BlindRenderer {
    fn name(&self) -> &'static str {
        "blind"
    }

    fn measure(&self, _: &Path, _: &FilterChain, _: &OutputFormat) -> Option<LoudnessMeasurement> {
        None
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
        self.0.execute(input, output, chain, format, on_fraction, cancel)
    }
}

#[test]
fn test_missing_measurement_falls_back_to_blind_mode() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("out.wav");
    write_tone(&input, 997.0, 0.05, 6.0, 44100);

    let params = MasteringParams::default().apply(ParamUpdate::NormalizeLoudness(true));
    let (result, progress) = run(&BlindRenderer(NativeRenderer::new()), &input, &output, params);
    let report = result.unwrap();

    assert!(report.measurement.is_none());
    assert!(!report.two_pass);
    assert_eq!(progress.last(), Some(&100.0));
    // Still reserves the analysis share of the progress bar
    assert!(progress.contains(&10.0));

    let loudness = output_loudness(&output);
    assert!((loudness.input_i + 14.0).abs() < 2.0, "output {} LUFS", loudness.input_i);
}

#[test]
fn test_cancelled_export_leaves_nothing() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("out.wav");
    write_tone(&input, 440.0, 0.5, 1.0, 44100);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let request = RenderRequest::new(&input, &output, MasteringParams::default());
    let err = render(&NativeRenderer::new(), &request, &mut |_| {}, &cancel).unwrap_err();
    assert_eq!(err.error_code(), "CANCELLED");
    assert!(!output.exists());
}

#[test]
fn test_compressed_output_path_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("master.mp3");
    write_tone(&input, 440.0, 0.5, 0.2, 44100);

    let (result, progress) = run(&NativeRenderer::new(), &input, &output, MasteringParams::default());
    let err = result.unwrap_err();
    assert_eq!(err.error_code(), "INVALID_PARAMETER");
    assert!(err.to_string().contains(".wav"));
    assert!(progress.is_empty());
    assert!(!output.exists());
}

#[test]
fn test_output_must_differ_from_input() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.wav");
    write_tone(&input, 440.0, 0.5, 0.2, 44100);

    let (result, _) = run(&NativeRenderer::new(), &input, &input, MasteringParams::default());
    assert_eq!(result.unwrap_err().error_code(), "INVALID_PARAMETER");
    assert!(input.exists());
}

// === ffmpeg backend ===

fn ffmpeg() -> worthy::render::FfmpegRenderer {
    let path = std::env::var("WORTHY_FFMPEG").unwrap_or_else(|_| "ffmpeg".to_string());
    worthy::render::FfmpegRenderer::new(PathBuf::from(path))
}

#[test]
#[ignore = "requires an ffmpeg executable"]
fn test_ffmpeg_two_pass_master() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("mono.wav");
    let output = dir.path().join("master.wav");
    write_tone(&input, 997.0, 0.1, 5.0, 44100);

    let params = MasteringParams::default()
        .apply(ParamUpdate::NormalizeLoudness(true))
        .apply(ParamUpdate::TruePeakLimit(true));
    let (result, progress) = run(&ffmpeg(), &input, &output, params);
    let report = result.unwrap();

    assert!(report.measurement.is_some());
    let spec = hound::WavReader::open(&output).unwrap().spec();
    assert_eq!((spec.channels, spec.sample_rate, spec.bits_per_sample), (2, 44100, 16));
    let loudness = output_loudness(&output);
    assert!(loudness.input_tp <= -1.0, "true peak {} dBTP", loudness.input_tp);
    assert!((loudness.input_i + 14.0).abs() < 0.5);
    assert_eq!(progress.last(), Some(&100.0));
}

#[test]
#[ignore = "requires an ffmpeg executable"]
fn test_ffmpeg_failure_message_is_verbatim() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.wav");
    write_tone(&input, 440.0, 0.5, 0.5, 44100);

    let output = dir.path().join("no-such-dir").join("out.wav");
    let (result, _) = run(&ffmpeg(), &input, &output, MasteringParams::default());
    let err = result.unwrap_err();
    assert_eq!(err.error_code(), "RENDER_FAILED");
    assert!(!err.to_string().is_empty());
}
