//! External ffmpeg backend
//!
//! Runs the stage list as an ffmpeg `-af` graph. Progress comes from
//! `-progress pipe:1` (`out_time_us` against the probed duration); stderr is
//! drained on a helper thread and its tail becomes the failure message.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;

use tracing::{debug, warn};

use super::{CancellationToken, RenderStrategy};
use crate::chain::ffmpeg::{analysis_graph, filter_graph, output_args};
use crate::chain::FilterChain;
use crate::engine::probe;
use crate::error::{Result, WorthyError};
use crate::loudness::{parse_loudnorm_report, LoudnessAnalyzer, LoudnessMeasurement};
use crate::params::OutputFormat;

/// Stderr lines kept for the failure message
const STDERR_TAIL_LINES: usize = 8;

fn spawn_error(executable: &Path, e: std::io::Error) -> WorthyError {
    if e.kind() == std::io::ErrorKind::NotFound {
        WorthyError::BackendUnavailable {
            backend: "ffmpeg".to_string(),
            reason: format!("{} not found", executable.display()),
        }
    } else {
        WorthyError::BackendUnavailable {
            backend: "ffmpeg".to_string(),
            reason: e.to_string(),
        }
    }
}

/// Parse one `-progress` line into elapsed output seconds
///
/// ffmpeg reports `out_time_us` and, despite the name, `out_time_ms`
/// in microseconds.
pub fn parse_progress_line(line: &str) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => {
            let us: i64 = value.trim().parse().ok()?;
            (us >= 0).then(|| us as f64 / 1_000_000.0)
        }
        _ => None,
    }
}

/// Keep the last non-empty lines of a stderr stream, joined by newlines
fn tail_lines(lines: &VecDeque<String>) -> String {
    lines.iter().cloned().collect::<Vec<_>>().join("\n")
}

/// Renderer and analyzer driving an ffmpeg executable
#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    executable: PathBuf,
}

impl FfmpegRenderer {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Check that the executable can be launched
    pub fn check_available(&self) -> Result<()> {
        let status = Command::new(&self.executable)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| spawn_error(&self.executable, e))?;
        if status.success() {
            Ok(())
        } else {
            Err(WorthyError::BackendUnavailable {
                backend: "ffmpeg".to_string(),
                reason: format!("`-version` exited with {}", status),
            })
        }
    }

    fn render_args(&self, input: &Path, output: &Path, chain: &FilterChain, format: &OutputFormat) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-nostats".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input.display().to_string(),
        ];
        if let Some(graph) = filter_graph(chain) {
            args.push("-af".to_string());
            args.push(graph);
        }
        args.extend(output_args(format));
        args.push("-progress".to_string());
        args.push("pipe:1".to_string());
        args.push(output.display().to_string());
        args
    }

    fn kill(child: &mut Child) {
        if let Err(e) = child.kill() {
            debug!("ffmpeg already exited: {}", e);
        }
        let _ = child.wait();
    }
}

impl LoudnessAnalyzer for FfmpegRenderer {
    fn measure(
        &self,
        input: &Path,
        pre_chain: &FilterChain,
        format: &OutputFormat,
    ) -> Option<LoudnessMeasurement> {
        let output = Command::new(&self.executable)
            .args(["-hide_banner", "-nostdin", "-nostats", "-i"])
            .arg(input)
            .arg("-af")
            .arg(analysis_graph(pre_chain, format))
            .args(["-f", "null", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();

        match output {
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                let measurement = parse_loudnorm_report(&stderr);
                if measurement.is_none() {
                    warn!(status = %out.status, "ffmpeg analysis produced no usable report");
                }
                measurement
            }
            Err(e) => {
                warn!("ffmpeg analysis could not start: {}", e);
                None
            }
        }
    }
}

impl RenderStrategy for FfmpegRenderer {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn measure(
        &self,
        input: &Path,
        pre_chain: &FilterChain,
        format: &OutputFormat,
    ) -> Option<LoudnessMeasurement> {
        LoudnessAnalyzer::measure(self, input, pre_chain, format)
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
        let duration = probe(input).map(|info| info.duration).unwrap_or(0.0);
        let args = self.render_args(input, output, chain, format);
        debug!(args = ?args, "Spawning ffmpeg");

        let mut child = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&self.executable, e))?;

        let stderr = child.stderr.take();
        let stderr_reader = thread::spawn(move || {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            if let Some(stderr) = stderr {
                for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            tail
        });

        on_fraction(0.0);
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines().map_while(|l| l.ok()) {
                if cancel.is_cancelled() {
                    Self::kill(&mut child);
                    let _ = stderr_reader.join();
                    return Err(WorthyError::Cancelled);
                }
                if let Some(seconds) = parse_progress_line(&line) {
                    if duration > 0.0 {
                        on_fraction((seconds / duration).min(1.0));
                    }
                }
            }
        }

        let status = child.wait()?;
        let tail = stderr_reader.join().unwrap_or_default();
        cancel.check()?;

        if !status.success() {
            let message = tail_lines(&tail);
            return Err(WorthyError::render(if message.is_empty() {
                format!("ffmpeg exited with {}", status)
            } else {
                message
            }));
        }

        let frames = hound::WavReader::open(output)
            .map(|reader| reader.duration() as u64)
            .map_err(|e| WorthyError::render(format!("ffmpeg output unreadable: {}", e)))?;
        on_fraction(1.0);
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::write_wav;
    use crate::params::{BitDepth, MasteringParams, ParamUpdate};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parse_progress_line() {
        assert_eq!(parse_progress_line("out_time_us=2500000"), Some(2.5));
        assert_eq!(parse_progress_line("out_time_ms=500000"), Some(0.5));
        assert_eq!(parse_progress_line("out_time_us=N/A"), None);
        assert_eq!(parse_progress_line("out_time_us=-9223372036854775807"), None);
        assert_eq!(parse_progress_line("progress=continue"), None);
        assert_eq!(parse_progress_line("bitrate=1411.2kbits/s"), None);
    }

    #[test]
    fn test_render_args() {
        let renderer = FfmpegRenderer::new("ffmpeg");
        let params = MasteringParams::default().apply(ParamUpdate::CleanLowEnd(true));
        let args = renderer.render_args(
            Path::new("in.mp3"),
            Path::new("out.wav"),
            &FilterChain::build(&params, None),
            &OutputFormat::new(44100, 16).unwrap(),
        );
        assert_eq!(
            args,
            vec![
                "-hide_banner", "-nostdin", "-nostats", "-y", "-i", "in.mp3", "-af",
                "highpass=f=30", "-c:a", "pcm_s16le", "-ar", "44100", "-ac", "2", "-f", "wav",
                "-progress", "pipe:1", "out.wav",
            ]
        );
    }

    #[test]
    fn test_passthrough_has_no_af() {
        let renderer = FfmpegRenderer::new("ffmpeg");
        let args = renderer.render_args(
            Path::new("in.wav"),
            Path::new("out.wav"),
            &FilterChain::default(),
            &OutputFormat::new(48000, 24).unwrap(),
        );
        assert!(!args.iter().any(|a| a == "-af"));
    }

    #[test]
    fn test_missing_executable_is_unavailable() {
        let renderer = FfmpegRenderer::new("/no/such/ffmpeg-binary");
        let err = renderer.check_available().unwrap_err();
        assert_eq!(err.error_code(), "BACKEND_UNAVAILABLE");

        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.wav");
        write_wav(&input, &[0.0; 200], 1, 44100, BitDepth::Pcm16).unwrap();
        let err = renderer
            .execute(
                &input,
                &dir.path().join("out.wav"),
                &FilterChain::default(),
                &OutputFormat::new(44100, 16).unwrap(),
                &mut |_| {},
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert_eq!(err.error_code(), "BACKEND_UNAVAILABLE");
        assert_eq!(
            LoudnessAnalyzer::measure(
                &renderer,
                &input,
                &FilterChain::default(),
                &OutputFormat::new(44100, 16).unwrap()
            ),
            None
        );
    }
}
