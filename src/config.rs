//! Engine configuration
//!
//! Settings that shape how the engine runs rather than how the audio sounds.
//! Defaults work without any file; a JSON file can override them and the
//! `WORTHY_BACKEND` / `WORTHY_FFMPEG` environment variables win over both.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, WorthyError};
use crate::render::native::DEFAULT_BLOCK_FRAMES;
use crate::render::{FfmpegRenderer, NativeRenderer, RenderStrategy};
use crate::visual::{DEFAULT_BASS_CUTOFF_HZ, DEFAULT_WAVEFORM_POINTS};

pub const ENV_BACKEND: &str = "WORTHY_BACKEND";
pub const ENV_FFMPEG: &str = "WORTHY_FFMPEG";

/// Offline render engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Native,
    Ffmpeg,
}

impl Backend {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "native" => Some(Backend::Native),
            "ffmpeg" => Some(Backend::Ffmpeg),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Native => "native",
            Backend::Ffmpeg => "ffmpeg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: Backend,
    pub ffmpeg_path: PathBuf,
    /// Frames per offline block (progress and cancellation granularity)
    pub block_frames: usize,
    pub waveform_points: usize,
    pub bass_cutoff_hz: f32,
    /// Poll interval for transport position and export progress, in milliseconds
    pub poll_interval_ms: u64,
    /// Frames per preview pull
    pub preview_block_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Native,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            block_frames: DEFAULT_BLOCK_FRAMES,
            waveform_points: DEFAULT_WAVEFORM_POINTS,
            bass_cutoff_hz: DEFAULT_BASS_CUTOFF_HZ,
            poll_interval_ms: 100,
            preview_block_frames: 512,
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| WorthyError::FileNotFound {
            path: path.display().to_string(),
            source: Some(e),
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Defaults, then `path` if given, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_json_file(p)?,
            None => Self::default(),
        };
        config.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `WORTHY_BACKEND` / `WORTHY_FFMPEG` from `lookup`
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup(ENV_BACKEND) {
            self.backend = Backend::from_name(&value).ok_or_else(|| {
                WorthyError::invalid_parameter(ENV_BACKEND, &value, "native or ffmpeg")
            })?;
            debug!(backend = self.backend.name(), "Backend set from environment");
        }
        if let Some(value) = lookup(ENV_FFMPEG) {
            if !value.is_empty() {
                self.ffmpeg_path = PathBuf::from(value);
            }
        }
        Ok(self)
    }

    /// How often interactive loops poll transport and export progress
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Render strategy for the configured backend
    pub fn strategy(&self) -> Arc<dyn RenderStrategy> {
        self.strategy_for(self.backend)
    }

    pub fn strategy_for(&self, backend: Backend) -> Arc<dyn RenderStrategy> {
        match backend {
            Backend::Native => Arc::new(NativeRenderer::with_block_frames(self.block_frames)),
            Backend::Ffmpeg => Arc::new(FfmpegRenderer::new(&self.ffmpeg_path)),
        }
    }
}
