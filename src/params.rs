//! Parameter Model
//!
//! The flat settings record shared by the live preview graph and the offline
//! render pipeline. A record is never mutated while a pass is using it:
//! `apply` returns a fresh copy, and each pass takes its own clone.
//!
//! Ranges are documented here but not enforced here. Output sample rate and
//! bit depth are checked when an [`OutputFormat`] is built, which is the
//! render-pipeline boundary.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorthyError};

/// Default true-peak ceiling in dB
pub const DEFAULT_CEILING_DB: f64 = -1.0;

/// Default output sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default output bit depth
pub const DEFAULT_BIT_DEPTH: u16 = 16;

/// Documented EQ gain range in dB (UI slider limits)
pub const EQ_GAIN_RANGE_DB: (f64, f64) = (-12.0, 12.0);

/// Sample rates accepted for export
pub const SUPPORTED_SAMPLE_RATES: [u32; 11] = [
    8000, 11025, 16000, 22050, 32000, 44100, 48000, 88200, 96000, 176400, 192000,
];

/// Bit depths accepted for export (integer PCM)
pub const SUPPORTED_BIT_DEPTHS: [u16; 3] = [16, 24, 32];

/// Output channel count; exports are always stereo
pub const OUTPUT_CHANNELS: u16 = 2;

/// Gains of the five fixed EQ bands, in dB
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EqGains {
    pub low: f64,
    pub low_mid: f64,
    pub mid: f64,
    pub high_mid: f64,
    pub high: f64,
}

impl EqGains {
    pub fn new(low: f64, low_mid: f64, mid: f64, high_mid: f64, high: f64) -> Self {
        Self {
            low,
            low_mid,
            mid,
            high_mid,
            high,
        }
    }

    /// Gains in band order (low to high)
    pub fn as_array(&self) -> [f64; 5] {
        [self.low, self.low_mid, self.mid, self.high_mid, self.high]
    }

    pub fn is_flat(&self) -> bool {
        self.as_array().iter().all(|g| *g == 0.0)
    }
}

/// Named EQ curves offered next to the sliders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqPreset {
    Flat,
    Vocal,
    Bass,
    Bright,
    Warm,
    Suno,
}

impl EqPreset {
    pub const ALL: [EqPreset; 6] = [
        EqPreset::Flat,
        EqPreset::Vocal,
        EqPreset::Bass,
        EqPreset::Bright,
        EqPreset::Warm,
        EqPreset::Suno,
    ];

    pub fn gains(&self) -> EqGains {
        match self {
            EqPreset::Flat => EqGains::new(0.0, 0.0, 0.0, 0.0, 0.0),
            EqPreset::Vocal => EqGains::new(-2.0, -1.0, 2.0, 3.0, 1.0),
            EqPreset::Bass => EqGains::new(6.0, 3.0, 0.0, -1.0, -2.0),
            EqPreset::Bright => EqGains::new(-1.0, 0.0, 1.0, 3.0, 5.0),
            EqPreset::Warm => EqGains::new(3.0, 2.0, 0.0, -2.0, -3.0),
            EqPreset::Suno => EqGains::new(1.0, -2.0, 1.0, -1.0, 2.0),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EqPreset::Flat => "flat",
            EqPreset::Vocal => "vocal",
            EqPreset::Bass => "bass",
            EqPreset::Bright => "bright",
            EqPreset::Warm => "warm",
            EqPreset::Suno => "suno",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// The canonical settings record for one preview or render pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasteringParams {
    pub normalize_loudness: bool,
    pub true_peak_limit: bool,
    pub clean_low_end: bool,
    pub center_bass: bool,
    pub cut_mud: bool,
    pub tame_harshness: bool,
    pub add_air: bool,
    pub glue_compression: bool,
    /// Limiter ceiling in dB
    pub true_peak_ceiling_db: f64,
    pub eq: EqGains,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Output bit depth (16/24/32)
    pub bit_depth: u16,
}

impl Default for MasteringParams {
    fn default() -> Self {
        Self {
            normalize_loudness: false,
            true_peak_limit: false,
            clean_low_end: false,
            center_bass: false,
            cut_mud: false,
            tame_harshness: false,
            add_air: false,
            glue_compression: false,
            true_peak_ceiling_db: DEFAULT_CEILING_DB,
            eq: EqGains::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            bit_depth: DEFAULT_BIT_DEPTH,
        }
    }
}

/// A single user edit to the parameter record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum ParamUpdate {
    NormalizeLoudness(bool),
    TruePeakLimit(bool),
    CleanLowEnd(bool),
    CenterBass(bool),
    CutMud(bool),
    TameHarshness(bool),
    AddAir(bool),
    GlueCompression(bool),
    TruePeakCeiling(f64),
    EqLow(f64),
    EqLowMid(f64),
    EqMid(f64),
    EqHighMid(f64),
    EqHigh(f64),
    Eq(EqGains),
    SampleRate(u32),
    BitDepth(u16),
}

impl ParamUpdate {
    /// Whether the edit only changes the export encoding (no audible effect in preview)
    pub fn is_format_only(&self) -> bool {
        matches!(self, ParamUpdate::SampleRate(_) | ParamUpdate::BitDepth(_))
    }
}

impl MasteringParams {
    /// Return a new record with `update` applied
    pub fn apply(&self, update: ParamUpdate) -> Self {
        let mut next = self.clone();
        match update {
            ParamUpdate::NormalizeLoudness(v) => next.normalize_loudness = v,
            ParamUpdate::TruePeakLimit(v) => next.true_peak_limit = v,
            ParamUpdate::CleanLowEnd(v) => next.clean_low_end = v,
            ParamUpdate::CenterBass(v) => next.center_bass = v,
            ParamUpdate::CutMud(v) => next.cut_mud = v,
            ParamUpdate::TameHarshness(v) => next.tame_harshness = v,
            ParamUpdate::AddAir(v) => next.add_air = v,
            ParamUpdate::GlueCompression(v) => next.glue_compression = v,
            ParamUpdate::TruePeakCeiling(v) => next.true_peak_ceiling_db = v,
            ParamUpdate::EqLow(v) => next.eq.low = v,
            ParamUpdate::EqLowMid(v) => next.eq.low_mid = v,
            ParamUpdate::EqMid(v) => next.eq.mid = v,
            ParamUpdate::EqHighMid(v) => next.eq.high_mid = v,
            ParamUpdate::EqHigh(v) => next.eq.high = v,
            ParamUpdate::Eq(gains) => next.eq = gains,
            ParamUpdate::SampleRate(v) => next.sample_rate = v,
            ParamUpdate::BitDepth(v) => next.bit_depth = v,
        }
        next
    }

    /// Return a new record with the preset's EQ curve
    pub fn with_preset(&self, preset: EqPreset) -> Self {
        self.apply(ParamUpdate::Eq(preset.gains()))
    }

    /// True when no processing stage is enabled
    pub fn is_neutral(&self) -> bool {
        !(self.normalize_loudness
            || self.true_peak_limit
            || self.clean_low_end
            || self.center_bass
            || self.cut_mud
            || self.tame_harshness
            || self.add_air
            || self.glue_compression)
            && self.eq.is_flat()
    }

    /// Limiter ceiling as a linear gain: `10^(ceiling/20)`
    pub fn ceiling_linear(&self) -> f64 {
        10f64.powf(self.true_peak_ceiling_db / 20.0)
    }

    /// Load a settings record from a JSON file
    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Sample encoding of the exported file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitDepth {
    Pcm16,
    Pcm24,
    Pcm32,
}

impl BitDepth {
    pub fn bits(&self) -> u16 {
        match self {
            BitDepth::Pcm16 => 16,
            BitDepth::Pcm24 => 24,
            BitDepth::Pcm32 => 32,
        }
    }

    /// Largest positive integer sample value (as f64)
    pub fn full_scale(&self) -> f64 {
        match self {
            BitDepth::Pcm16 => 32768.0,
            BitDepth::Pcm24 => 8388608.0,
            BitDepth::Pcm32 => 2147483648.0,
        }
    }

    /// Little-endian signed PCM codec name
    pub fn codec_name(&self) -> &'static str {
        match self {
            BitDepth::Pcm16 => "pcm_s16le",
            BitDepth::Pcm24 => "pcm_s24le",
            BitDepth::Pcm32 => "pcm_s32le",
        }
    }
}

impl TryFrom<u16> for BitDepth {
    type Error = WorthyError;

    fn try_from(bits: u16) -> Result<Self> {
        match bits {
            16 => Ok(BitDepth::Pcm16),
            24 => Ok(BitDepth::Pcm24),
            32 => Ok(BitDepth::Pcm32),
            other => Err(WorthyError::invalid_parameter(
                "bit_depth",
                other,
                "16, 24 or 32",
            )),
        }
    }
}

/// Validated encoding of the exported file: WAV, stereo, integer PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub bit_depth: BitDepth,
    pub channels: u16,
}

impl OutputFormat {
    pub fn new(sample_rate: u32, bits: u16) -> Result<Self> {
        if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
            return Err(WorthyError::invalid_parameter(
                "sample_rate",
                sample_rate,
                "a standard rate between 8000 and 192000 Hz",
            ));
        }
        Ok(Self {
            sample_rate,
            bit_depth: BitDepth::try_from(bits)?,
            channels: OUTPUT_CHANNELS,
        })
    }
}

impl TryFrom<&MasteringParams> for OutputFormat {
    type Error = WorthyError;

    fn try_from(params: &MasteringParams) -> Result<Self> {
        OutputFormat::new(params.sample_rate, params.bit_depth)
    }
}
