//! Live Preview Graph
//!
//! Real-time rendition of the mastering chain for auditioning while the
//! transport plays. The topology is fixed:
//!
//! ```text
//! highpass -> eq x5 -> mud -> harsh -> air -> glue -> limiter -> analyser -> output
//! ```
//!
//! Parameter edits and the global bypass only rewrite node settings; the graph
//! is reconnected (filter history cleared, [`PreviewGraph::connection_epoch`]
//! advanced) only when a new source buffer is connected.
//!
//! The nodes are simpler single-precision primitives than the offline
//! processors, so preview and export agree perceptually, not sample for
//! sample. The exported file is the reference.

pub mod analyser;
pub mod nodes;

use tracing::debug;

use crate::engine::SharedAudio;
use crate::params::{MasteringParams, DEFAULT_SAMPLE_RATE};

pub use analyser::AnalyserNode;
pub use nodes::{BiquadKind, BiquadNode, DynamicsCompressorNode, GainNode};

// ============================================================================
// Node settings
// ============================================================================

pub const HIGHPASS_HZ: f32 = 30.0;
/// Corner used when the high-pass is neutral
pub const HIGHPASS_NEUTRAL_HZ: f32 = 1.0;
/// Resonance in dB
pub const HIGHPASS_Q_DB: f32 = 0.7;

pub const EQ_FREQUENCIES: [f32; 5] = [80.0, 250.0, 1000.0, 4000.0, 12000.0];
pub const EQ_Q: f32 = 1.0;

pub const MUD_HZ: f32 = 250.0;
pub const MUD_Q: f32 = 1.5;
pub const MUD_GAIN_DB: f32 = -3.0;

pub const HARSH_HZ: f32 = 4500.0;
pub const HARSH_Q: f32 = 1.5;
pub const HARSH_GAIN_DB: f32 = -2.5;

pub const AIR_HZ: f32 = 12000.0;
pub const AIR_GAIN_DB: f32 = 2.5;

pub const GLUE_THRESHOLD_DB: f32 = -18.0;
pub const GLUE_KNEE_DB: f32 = 10.0;
pub const GLUE_RATIO: f32 = 3.0;
pub const GLUE_ATTACK_S: f32 = 0.02;
pub const GLUE_RELEASE_S: f32 = 0.25;

pub const LIMITER_RATIO: f32 = 20.0;
pub const LIMITER_ATTACK_S: f32 = 0.001;
pub const LIMITER_RELEASE_S: f32 = 0.05;

/// Node names in signal order
pub const NODE_ORDER: [&str; 13] = [
    "highpass",
    "eq_low",
    "eq_low_mid",
    "eq_mid",
    "eq_high_mid",
    "eq_high",
    "mud",
    "harsh",
    "air",
    "glue",
    "limiter",
    "analyser",
    "output",
];

// ============================================================================
// Strategy
// ============================================================================

/// A real-time realization of the mastering chain
pub trait PreviewStrategy: Send {
    /// Bind a new source buffer; this is the only operation that reconnects
    fn connect(&mut self, source: SharedAudio);

    /// Drop the source binding
    fn disconnect(&mut self);

    /// Apply a parameter record to the node settings
    fn configure(&mut self, params: &MasteringParams);

    /// Force every node to neutral settings (or restore them)
    fn set_bypass(&mut self, bypass: bool);

    /// Process interleaved stereo in place
    fn process(&mut self, frames: &mut [f32]);
}

/// The fixed preview node chain
#[derive(Debug)]
pub struct PreviewGraph {
    sample_rate: f32,
    params: MasteringParams,
    bypass: bool,
    source: Option<SharedAudio>,
    epoch: u64,

    highpass: BiquadNode,
    eq: [BiquadNode; 5],
    mud: BiquadNode,
    harsh: BiquadNode,
    air: BiquadNode,
    glue: DynamicsCompressorNode,
    limiter: DynamicsCompressorNode,
    analyser: AnalyserNode,
    output: GainNode,
}

impl PreviewGraph {
    pub fn new() -> Self {
        let sr = DEFAULT_SAMPLE_RATE as f32;
        let eq_kind = |i: usize| match i {
            0 => BiquadKind::Lowshelf,
            4 => BiquadKind::Highshelf,
            _ => BiquadKind::Peaking,
        };
        let mut graph = Self {
            sample_rate: sr,
            params: MasteringParams::default(),
            bypass: false,
            source: None,
            epoch: 0,
            highpass: BiquadNode::new(BiquadKind::Highpass, HIGHPASS_NEUTRAL_HZ, HIGHPASS_Q_DB, 0.0, sr),
            eq: std::array::from_fn(|i| BiquadNode::new(eq_kind(i), EQ_FREQUENCIES[i], EQ_Q, 0.0, sr)),
            mud: BiquadNode::new(BiquadKind::Peaking, MUD_HZ, MUD_Q, 0.0, sr),
            harsh: BiquadNode::new(BiquadKind::Peaking, HARSH_HZ, HARSH_Q, 0.0, sr),
            air: BiquadNode::new(BiquadKind::Highshelf, AIR_HZ, 0.0, 0.0, sr),
            glue: DynamicsCompressorNode::new(0.0, GLUE_KNEE_DB, 1.0, GLUE_ATTACK_S, GLUE_RELEASE_S, sr),
            limiter: DynamicsCompressorNode::new(0.0, 0.0, 1.0, LIMITER_ATTACK_S, LIMITER_RELEASE_S, sr),
            analyser: AnalyserNode::new(),
            output: GainNode::new(1.0),
        };
        graph.apply_settings();
        graph
    }

    /// Advances each time a new source is connected
    pub fn connection_epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_connected(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<&SharedAudio> {
        self.source.as_ref()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn params(&self) -> &MasteringParams {
        &self.params
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    pub fn highpass(&self) -> &BiquadNode {
        &self.highpass
    }

    pub fn eq_bands(&self) -> &[BiquadNode; 5] {
        &self.eq
    }

    pub fn mud(&self) -> &BiquadNode {
        &self.mud
    }

    pub fn harsh(&self) -> &BiquadNode {
        &self.harsh
    }

    pub fn air(&self) -> &BiquadNode {
        &self.air
    }

    pub fn glue(&self) -> &DynamicsCompressorNode {
        &self.glue
    }

    pub fn limiter(&self) -> &DynamicsCompressorNode {
        &self.limiter
    }

    pub fn output(&self) -> &GainNode {
        &self.output
    }

    /// Spectrum tap for the visualization refresh
    pub fn analyser_mut(&mut self) -> &mut AnalyserNode {
        &mut self.analyser
    }

    /// Push node settings for the current params and bypass flag
    fn apply_settings(&mut self) {
        let p = &self.params;
        let on = |enabled: bool| enabled && !self.bypass;

        let hp_freq = if on(p.clean_low_end) {
            HIGHPASS_HZ
        } else {
            HIGHPASS_NEUTRAL_HZ
        };
        self.highpass.set(hp_freq, HIGHPASS_Q_DB, 0.0);

        for (node, gain) in self.eq.iter_mut().zip(p.eq.as_array()) {
            node.set_gain(if self.bypass { 0.0 } else { gain as f32 });
        }

        self.mud.set_gain(if on(p.cut_mud) { MUD_GAIN_DB } else { 0.0 });
        self.harsh.set_gain(if on(p.tame_harshness) { HARSH_GAIN_DB } else { 0.0 });
        self.air.set_gain(if on(p.add_air) { AIR_GAIN_DB } else { 0.0 });

        if on(p.glue_compression) {
            self.glue.set(GLUE_THRESHOLD_DB, GLUE_KNEE_DB, GLUE_RATIO, GLUE_ATTACK_S, GLUE_RELEASE_S);
        } else {
            self.glue.set(0.0, GLUE_KNEE_DB, 1.0, GLUE_ATTACK_S, GLUE_RELEASE_S);
        }

        if on(p.true_peak_limit) {
            self.limiter.set(
                p.true_peak_ceiling_db as f32,
                0.0,
                LIMITER_RATIO,
                LIMITER_ATTACK_S,
                LIMITER_RELEASE_S,
            );
        } else {
            self.limiter.set(0.0, 0.0, 1.0, LIMITER_ATTACK_S, LIMITER_RELEASE_S);
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        if self.sample_rate == sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        self.highpass.set_sample_rate(sample_rate);
        for node in self.eq.iter_mut() {
            node.set_sample_rate(sample_rate);
        }
        self.mud.set_sample_rate(sample_rate);
        self.harsh.set_sample_rate(sample_rate);
        self.air.set_sample_rate(sample_rate);
        self.glue.set_sample_rate(sample_rate);
        self.limiter.set_sample_rate(sample_rate);
    }

    fn reset_state(&mut self) {
        self.highpass.reset();
        for node in self.eq.iter_mut() {
            node.reset();
        }
        self.mud.reset();
        self.harsh.reset();
        self.air.reset();
        self.glue.reset();
        self.limiter.reset();
        self.analyser.reset();
    }
}

impl Default for PreviewGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewStrategy for PreviewGraph {
    fn connect(&mut self, source: SharedAudio) {
        self.set_sample_rate(source.sample_rate() as f32);
        self.reset_state();
        self.source = Some(source);
        self.epoch += 1;
        debug!(epoch = self.epoch, sample_rate = self.sample_rate, "Preview graph connected");
    }

    fn disconnect(&mut self) {
        if self.source.take().is_some() {
            debug!("Preview graph disconnected");
        }
    }

    fn configure(&mut self, params: &MasteringParams) {
        self.params = params.clone();
        self.apply_settings();
    }

    fn set_bypass(&mut self, bypass: bool) {
        if self.bypass != bypass {
            self.bypass = bypass;
            self.apply_settings();
            debug!(bypass, "Preview bypass changed");
        }
    }

    fn process(&mut self, frames: &mut [f32]) {
        self.highpass.process(frames);
        for node in self.eq.iter_mut() {
            node.process(frames);
        }
        self.mud.process(frames);
        self.harsh.process(frames);
        self.air.process(frames);
        self.glue.process(frames);
        self.limiter.process(frames);
        self.analyser.process(frames);
        self.output.process(frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DecodedAudio;
    use crate::params::ParamUpdate;
    use approx::assert_abs_diff_eq;

    fn sine(freq: f32, amp: f32, frames: usize, sr: f32) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let s = amp * (2.0 * std::f32::consts::PI * freq * i as f32 / sr).sin();
                [s, s]
            })
            .collect()
    }

    fn rms(frames: &[f32]) -> f32 {
        (frames.iter().map(|s| s * s).sum::<f32>() / frames.len() as f32).sqrt()
    }

    fn source(sr: u32) -> SharedAudio {
        DecodedAudio::from_planar(vec![vec![0.0; 1000]], sr)
            .unwrap()
            .into_shared()
    }

    #[test]
    fn test_default_graph_is_neutral() {
        let graph = PreviewGraph::new();
        assert_eq!(graph.highpass().frequency(), HIGHPASS_NEUTRAL_HZ);
        assert!(graph.eq_bands().iter().all(|b| b.gain_db() == 0.0));
        assert_eq!(graph.mud().gain_db(), 0.0);
        assert_eq!(graph.glue().ratio(), 1.0);
        assert_eq!(graph.limiter().ratio(), 1.0);
        assert_eq!(graph.output().gain(), 1.0);
        assert_eq!(NODE_ORDER.first(), Some(&"highpass"));
        assert_eq!(NODE_ORDER.last(), Some(&"output"));
    }

    #[test]
    fn test_configure_sets_enabled_values() {
        let mut graph = PreviewGraph::new();
        let params = MasteringParams::default()
            .apply(ParamUpdate::CleanLowEnd(true))
            .apply(ParamUpdate::CutMud(true))
            .apply(ParamUpdate::TameHarshness(true))
            .apply(ParamUpdate::AddAir(true))
            .apply(ParamUpdate::GlueCompression(true))
            .apply(ParamUpdate::TruePeakLimit(true))
            .apply(ParamUpdate::TruePeakCeiling(-3.0))
            .apply(ParamUpdate::EqHigh(4.0));
        graph.configure(&params);

        assert_eq!(graph.highpass().frequency(), HIGHPASS_HZ);
        assert_eq!(graph.eq_bands()[4].gain_db(), 4.0);
        assert_eq!(graph.eq_bands()[4].kind(), BiquadKind::Highshelf);
        assert_eq!(graph.mud().gain_db(), MUD_GAIN_DB);
        assert_eq!(graph.harsh().gain_db(), HARSH_GAIN_DB);
        assert_eq!(graph.air().gain_db(), AIR_GAIN_DB);
        assert_eq!(graph.glue().threshold(), GLUE_THRESHOLD_DB);
        assert_eq!(graph.glue().ratio(), GLUE_RATIO);
        assert_eq!(graph.limiter().threshold(), -3.0);
        assert_eq!(graph.limiter().knee(), 0.0);
        assert_eq!(graph.limiter().ratio(), LIMITER_RATIO);
    }

    #[test]
    fn test_bypass_neutralises_without_reconnecting() {
        let mut graph = PreviewGraph::new();
        graph.connect(source(48000));
        let epoch = graph.connection_epoch();
        graph.configure(
            &MasteringParams::default()
                .apply(ParamUpdate::EqMid(6.0))
                .apply(ParamUpdate::CleanLowEnd(true))
                .apply(ParamUpdate::GlueCompression(true)),
        );

        graph.set_bypass(true);
        assert_eq!(graph.connection_epoch(), epoch);
        assert!(graph.is_connected());
        assert_eq!(graph.eq_bands()[2].gain_db(), 0.0);
        assert_eq!(graph.highpass().frequency(), HIGHPASS_NEUTRAL_HZ);
        assert_eq!(graph.glue().ratio(), 1.0);

        graph.set_bypass(false);
        assert_eq!(graph.connection_epoch(), epoch);
        assert_eq!(graph.eq_bands()[2].gain_db(), 6.0);
        // Parameters set while bypassed are remembered
        graph.set_bypass(true);
        graph.configure(&MasteringParams::default().apply(ParamUpdate::EqLow(-4.0)));
        assert_eq!(graph.eq_bands()[0].gain_db(), 0.0);
        graph.set_bypass(false);
        assert_eq!(graph.eq_bands()[0].gain_db(), -4.0);
    }

    #[test]
    fn test_connect_advances_epoch_and_rate() {
        let mut graph = PreviewGraph::new();
        assert_eq!(graph.connection_epoch(), 0);
        graph.connect(source(48000));
        graph.connect(source(96000));
        assert_eq!(graph.connection_epoch(), 2);
        assert_eq!(graph.sample_rate(), 96000.0);
        graph.disconnect();
        assert!(!graph.is_connected());
        assert_eq!(graph.connection_epoch(), 2);
    }

    #[test]
    fn test_bypassed_graph_passes_audio() {
        let mut graph = PreviewGraph::new();
        graph.connect(source(44100));
        graph.configure(&MasteringParams::default().apply(ParamUpdate::EqMid(9.0)));
        graph.set_bypass(true);

        let input = sine(1000.0, 0.5, 4096, 44100.0);
        let mut out = input.clone();
        graph.process(&mut out);
        for (a, b) in input.iter().zip(out.iter()).skip(2000) {
            assert_abs_diff_eq!(a, b, epsilon = 2e-3);
        }
    }

    #[test]
    fn test_mid_boost_is_audible() {
        let mut graph = PreviewGraph::new();
        graph.connect(source(44100));
        graph.configure(&MasteringParams::default().apply(ParamUpdate::EqMid(6.0)));

        let input = sine(1000.0, 0.1, 8192, 44100.0);
        let mut out = input.clone();
        graph.process(&mut out);
        let gain_db = 20.0 * (rms(&out[4096..]) / rms(&input[4096..])).log10();
        assert_abs_diff_eq!(gain_db, 6.0, epsilon = 0.3);
    }
}
