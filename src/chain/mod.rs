//! Filter chain construction
//!
//! Turns a [`MasteringParams`] record (plus an optional loudness measurement)
//! into an ordered list of backend-independent [`Stage`] descriptors. Both
//! render backends consume the same list; the ffmpeg backend translates it
//! into an `-af` filter string, the native backend into processors.
//!
//! Stage order is fixed:
//! high-pass, crossfeed, 5-band EQ, mud cut, harshness cuts, air shelf,
//! glue compressor, loudness normalization, limiter.

pub mod ffmpeg;

use serde::{Deserialize, Serialize};

use crate::loudness::LoudnessMeasurement;
use crate::params::MasteringParams;

// ============================================================================
// Constants
// ============================================================================

/// High-pass corner for "clean low end"
pub const HIGHPASS_HZ: f64 = 30.0;
/// Butterworth Q used for the high-pass stage
pub const HIGHPASS_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

pub const CROSSFEED_STRENGTH: f64 = 0.3;
pub const CROSSFEED_RANGE: f64 = 0.5;
pub const CROSSFEED_LEVEL_IN: f64 = 0.9;

/// Center frequencies of the five EQ bands
pub const EQ_FREQUENCIES: [f64; 5] = [80.0, 250.0, 1000.0, 4000.0, 12000.0];

/// Fixed band widths, matching the order of [`EQ_FREQUENCIES`]
pub const EQ_WIDTHS: [BandWidth; 5] = [
    BandWidth::Hz(100.0),
    BandWidth::Q(1.0),
    BandWidth::Q(1.0),
    BandWidth::Q(1.0),
    BandWidth::Hz(2000.0),
];

pub const MUD_FREQUENCY: f64 = 250.0;
pub const MUD_Q: f64 = 1.5;
pub const MUD_GAIN_DB: f64 = -3.0;

/// (frequency, Q, gain dB) of the two harshness cuts
pub const HARSH_CUTS: [(f64, f64, f64); 2] = [(4000.0, 2.0, -2.0), (6000.0, 1.5, -1.5)];

pub const AIR_FREQUENCY: f64 = 12000.0;
pub const AIR_GAIN_DB: f64 = 2.5;
pub const AIR_SLOPE: f64 = 0.5;

/// Glue threshold as linear amplitude (about -18 dBFS)
pub const GLUE_THRESHOLD: f64 = 0.125;
pub const GLUE_RATIO: f64 = 3.0;
pub const GLUE_ATTACK_MS: f64 = 20.0;
pub const GLUE_RELEASE_MS: f64 = 250.0;
/// Linear makeup gain (unity)
pub const GLUE_MAKEUP: f64 = 1.0;
/// Linear knee width (about 9 dB)
pub const GLUE_KNEE: f64 = 2.828_427_12;

pub const TARGET_I: f64 = -14.0;
pub const TARGET_TP: f64 = -2.0;
pub const TARGET_LRA: f64 = 11.0;
/// Loudness range target used by blind single-pass normalization
pub const BLIND_TARGET_LRA: f64 = 20.0;

pub const LIMITER_ATTACK_MS: f64 = 0.1;
pub const LIMITER_RELEASE_MS: f64 = 50.0;

// ============================================================================
// Stage descriptors
// ============================================================================

/// Bandwidth of a peaking/shelving band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BandWidth {
    /// Bandwidth in Hz
    Hz(f64),
    /// Quality factor
    Q(f64),
}

impl BandWidth {
    /// Equivalent Q at `frequency`
    pub fn to_q(self, frequency: f64) -> f64 {
        match self {
            BandWidth::Q(q) => q,
            BandWidth::Hz(width) => {
                if width <= 0.0 {
                    0.707
                } else {
                    frequency / width
                }
            }
        }
    }
}

/// How the loudness normalization stage corrects level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NormMode {
    /// Second pass of a two-pass run: fixed correction from measured stats
    Linear { measured: LoudnessMeasurement },
    /// Blind single pass: level is ridden from a running estimate
    Dynamic,
}

/// One DSP processing step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stage {
    HighPass {
        frequency: f64,
        q: f64,
    },
    Crossfeed {
        strength: f64,
        range: f64,
        level_in: f64,
    },
    Equalizer {
        frequency: f64,
        width: BandWidth,
        gain_db: f64,
    },
    HighShelf {
        frequency: f64,
        gain_db: f64,
        slope: f64,
    },
    Compressor {
        /// Linear threshold
        threshold: f64,
        ratio: f64,
        attack_ms: f64,
        release_ms: f64,
        /// Linear makeup gain
        makeup: f64,
        /// Linear knee width
        knee: f64,
    },
    LoudnessNorm {
        target_i: f64,
        target_tp: f64,
        target_lra: f64,
        mode: NormMode,
    },
    Limiter {
        /// Linear ceiling
        limit: f64,
        attack_ms: f64,
        release_ms: f64,
    },
}

impl Stage {
    /// Short identifier used in logs and listings
    pub fn name(&self) -> &'static str {
        match self {
            Stage::HighPass { .. } => "highpass",
            Stage::Crossfeed { .. } => "crossfeed",
            Stage::Equalizer { .. } => "equalizer",
            Stage::HighShelf { .. } => "high_shelf",
            Stage::Compressor { .. } => "compressor",
            Stage::LoudnessNorm { .. } => "loudness_norm",
            Stage::Limiter { .. } => "limiter",
        }
    }
}

/// Ordered stage list for one render pass
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterChain {
    stages: Vec<Stage>,
}

impl FilterChain {
    /// Build the full chain for `params`
    ///
    /// # Arguments
    /// * `params` - The settings record for this pass
    /// * `measurement` - First-pass result; `None` selects blind normalization
    ///
    /// # Example
    /// ```
    /// use worthy::chain::FilterChain;
    /// use worthy::params::MasteringParams;
    ///
    /// let chain = FilterChain::build(&MasteringParams::default(), None);
    /// assert!(chain.is_passthrough());
    /// ```
    pub fn build(params: &MasteringParams, measurement: Option<&LoudnessMeasurement>) -> Self {
        let mut chain = Self::pre_normalization(params);

        if params.normalize_loudness {
            let stage = match measurement {
                Some(m) => Stage::LoudnessNorm {
                    target_i: TARGET_I,
                    target_tp: TARGET_TP,
                    target_lra: TARGET_LRA,
                    mode: NormMode::Linear { measured: *m },
                },
                None => Stage::LoudnessNorm {
                    target_i: TARGET_I,
                    target_tp: TARGET_TP,
                    target_lra: BLIND_TARGET_LRA,
                    mode: NormMode::Dynamic,
                },
            };
            chain.stages.push(stage);
        }

        if params.true_peak_limit {
            chain.stages.push(Stage::Limiter {
                limit: params.ceiling_linear(),
                attack_ms: LIMITER_ATTACK_MS,
                release_ms: LIMITER_RELEASE_MS,
            });
        }

        chain
    }

    /// Stages that run ahead of loudness normalization
    ///
    /// This is the signal the analysis pass measures.
    pub fn pre_normalization(params: &MasteringParams) -> Self {
        let mut stages = Vec::new();

        if params.clean_low_end {
            stages.push(Stage::HighPass {
                frequency: HIGHPASS_HZ,
                q: HIGHPASS_Q,
            });
        }

        if params.center_bass {
            stages.push(Stage::Crossfeed {
                strength: CROSSFEED_STRENGTH,
                range: CROSSFEED_RANGE,
                level_in: CROSSFEED_LEVEL_IN,
            });
        }

        for ((frequency, width), gain_db) in EQ_FREQUENCIES
            .iter()
            .zip(EQ_WIDTHS.iter())
            .zip(params.eq.as_array())
        {
            if gain_db != 0.0 {
                stages.push(Stage::Equalizer {
                    frequency: *frequency,
                    width: *width,
                    gain_db,
                });
            }
        }

        if params.cut_mud {
            stages.push(Stage::Equalizer {
                frequency: MUD_FREQUENCY,
                width: BandWidth::Q(MUD_Q),
                gain_db: MUD_GAIN_DB,
            });
        }

        if params.tame_harshness {
            for (frequency, q, gain_db) in HARSH_CUTS {
                stages.push(Stage::Equalizer {
                    frequency,
                    width: BandWidth::Q(q),
                    gain_db,
                });
            }
        }

        if params.add_air {
            stages.push(Stage::HighShelf {
                frequency: AIR_FREQUENCY,
                gain_db: AIR_GAIN_DB,
                slope: AIR_SLOPE,
            });
        }

        if params.glue_compression {
            stages.push(Stage::Compressor {
                threshold: GLUE_THRESHOLD,
                ratio: GLUE_RATIO,
                attack_ms: GLUE_ATTACK_MS,
                release_ms: GLUE_RELEASE_MS,
                makeup: GLUE_MAKEUP,
                knee: GLUE_KNEE,
            });
        }

        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// True when only output encoding (resample, channel fix, codec) remains
    pub fn is_passthrough(&self) -> bool {
        self.stages.is_empty()
    }

    /// Whether the chain carries a normalization stage driven by a measurement
    pub fn is_two_pass(&self) -> bool {
        self.stages.iter().any(|s| {
            matches!(
                s,
                Stage::LoudnessNorm {
                    mode: NormMode::Linear { .. },
                    ..
                }
            )
        })
    }
}

impl<'a> IntoIterator for &'a FilterChain {
    type Item = &'a Stage;
    type IntoIter = std::slice::Iter<'a, Stage>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.iter()
    }
}
