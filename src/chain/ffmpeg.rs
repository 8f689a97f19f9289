//! ffmpeg filter-graph translation
//!
//! Renders a [`FilterChain`] into the comma-separated `-af` expression and the
//! output-encoding arguments understood by the ffmpeg executable.

use super::{BandWidth, FilterChain, NormMode, Stage, TARGET_I, TARGET_LRA, TARGET_TP};
use crate::params::OutputFormat;

/// Filter used by the measurement pass
pub fn analysis_filter() -> String {
    format!(
        "loudnorm=I={}:TP={}:LRA={}:print_format=json",
        TARGET_I, TARGET_TP, TARGET_LRA
    )
}

/// Translate one stage into an ffmpeg filter expression
pub fn stage_filter(stage: &Stage) -> String {
    match stage {
        Stage::HighPass { frequency, .. } => format!("highpass=f={}", frequency),
        Stage::Crossfeed {
            strength,
            range,
            level_in,
        } => format!(
            "crossfeed=strength={}:range={}:level_in={}",
            strength, range, level_in
        ),
        Stage::Equalizer {
            frequency,
            width,
            gain_db,
        } => {
            let (t, w) = match width {
                BandWidth::Hz(w) => ("h", w),
                BandWidth::Q(q) => ("q", q),
            };
            format!("equalizer=f={}:t={}:w={}:g={}", frequency, t, w, gain_db)
        }
        Stage::HighShelf {
            frequency,
            gain_db,
            slope,
        } => {
            // `t=s` selects slope width; 0.5 is ffmpeg's default shelf slope
            if (*slope - 0.5).abs() < f64::EPSILON {
                format!("treble=g={}:f={}:t=s", gain_db, frequency)
            } else {
                format!("treble=g={}:f={}:t=s:w={}", gain_db, frequency, slope)
            }
        }
        Stage::Compressor {
            threshold,
            ratio,
            attack_ms,
            release_ms,
            makeup,
            ..
        } => format!(
            "acompressor=threshold={}:ratio={}:attack={}:release={}:makeup={}",
            threshold, ratio, attack_ms, release_ms, makeup
        ),
        Stage::LoudnessNorm {
            target_i,
            target_tp,
            target_lra,
            mode,
        } => match mode {
            NormMode::Linear { measured } => format!(
                "loudnorm=I={}:TP={}:LRA={}:measured_I={}:measured_TP={}:measured_LRA={}:measured_thresh={}:linear=true",
                target_i,
                target_tp,
                target_lra,
                measured.input_i,
                measured.input_tp,
                measured.input_lra,
                measured.input_thresh
            ),
            NormMode::Dynamic => format!(
                "loudnorm=I={}:TP={}:LRA={}:linear=false",
                target_i, target_tp, target_lra
            ),
        },
        // level=disabled keeps alimiter from auto-raising output back to 0 dBFS
        Stage::Limiter {
            limit,
            attack_ms,
            release_ms,
        } => format!(
            "alimiter=limit={}:attack={}:release={}:level=disabled",
            limit, attack_ms, release_ms
        ),
    }
}

/// Full `-af` expression, or `None` for a passthrough chain
pub fn filter_graph(chain: &FilterChain) -> Option<String> {
    if chain.is_passthrough() {
        return None;
    }
    Some(
        chain
            .stages()
            .iter()
            .map(stage_filter)
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Measurement graph: conform to stereo at the output rate, run the
/// pre-normalization stages, then the loudnorm report
pub fn analysis_graph(pre_chain: &FilterChain, format: &OutputFormat) -> String {
    let mut filters = vec![
        format!("aresample={}", format.sample_rate),
        "aformat=channel_layouts=stereo".to_string(),
    ];
    filters.extend(pre_chain.stages().iter().map(stage_filter));
    filters.push(analysis_filter());
    filters.join(",")
}

/// Output encoding arguments: resample, force stereo, integer PCM, WAV container
pub fn output_args(format: &OutputFormat) -> Vec<String> {
    vec![
        "-c:a".to_string(),
        format.bit_depth.codec_name().to_string(),
        "-ar".to_string(),
        format.sample_rate.to_string(),
        "-ac".to_string(),
        format.channels.to_string(),
        "-f".to_string(),
        "wav".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loudness::LoudnessMeasurement;
    use crate::params::{EqGains, MasteringParams, ParamUpdate};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_eq_bands_translate() {
        let params = MasteringParams {
            eq: EqGains::new(3.0, -1.5, 2.0, 1.0, 4.0),
            ..MasteringParams::default()
        };
        let graph = filter_graph(&FilterChain::build(&params, None)).unwrap();
        assert_eq!(
            graph,
            "equalizer=f=80:t=h:w=100:g=3,\
             equalizer=f=250:t=q:w=1:g=-1.5,\
             equalizer=f=1000:t=q:w=1:g=2,\
             equalizer=f=4000:t=q:w=1:g=1,\
             equalizer=f=12000:t=h:w=2000:g=4"
        );
    }

    #[test]
    fn test_fixed_stages_translate() {
        let params = MasteringParams {
            clean_low_end: true,
            center_bass: true,
            cut_mud: true,
            tame_harshness: true,
            add_air: true,
            glue_compression: true,
            ..MasteringParams::default()
        };
        let graph = filter_graph(&FilterChain::build(&params, None)).unwrap();
        assert_eq!(
            graph.split(',').collect::<Vec<_>>(),
            vec![
                "highpass=f=30",
                "crossfeed=strength=0.3:range=0.5:level_in=0.9",
                "equalizer=f=250:t=q:w=1.5:g=-3",
                "equalizer=f=4000:t=q:w=2:g=-2",
                "equalizer=f=6000:t=q:w=1.5:g=-1.5",
                "treble=g=2.5:f=12000:t=s",
                "acompressor=threshold=0.125:ratio=3:attack=20:release=250:makeup=1",
            ]
        );
    }

    #[test]
    fn test_loudnorm_linear_and_blind() {
        let params = MasteringParams::default().apply(ParamUpdate::NormalizeLoudness(true));
        let measured = LoudnessMeasurement {
            input_i: -23.5,
            input_tp: -6.25,
            input_lra: 7.0,
            input_thresh: -34.0,
        };
        assert_eq!(
            filter_graph(&FilterChain::build(&params, Some(&measured))).unwrap(),
            "loudnorm=I=-14:TP=-2:LRA=11:measured_I=-23.5:measured_TP=-6.25:\
             measured_LRA=7:measured_thresh=-34:linear=true"
        );
        assert_eq!(
            filter_graph(&FilterChain::build(&params, None)).unwrap(),
            "loudnorm=I=-14:TP=-2:LRA=20:linear=false"
        );
    }

    #[test]
    fn test_limiter_translation() {
        let params = MasteringParams::default()
            .apply(ParamUpdate::TruePeakLimit(true))
            .apply(ParamUpdate::TruePeakCeiling(0.0));
        assert_eq!(
            filter_graph(&FilterChain::build(&params, None)).unwrap(),
            "alimiter=limit=1:attack=0.1:release=50:level=disabled"
        );
    }

    #[test]
    fn test_passthrough_has_no_filter_graph() {
        assert_eq!(filter_graph(&FilterChain::default()), None);
    }

    #[test]
    fn test_output_args() {
        let format = OutputFormat::new(48000, 24).unwrap();
        assert_eq!(
            output_args(&format),
            vec!["-c:a", "pcm_s24le", "-ar", "48000", "-ac", "2", "-f", "wav"]
        );
        assert_eq!(
            analysis_filter(),
            "loudnorm=I=-14:TP=-2:LRA=11:print_format=json"
        );
    }

    #[test]
    fn test_analysis_graph_conforms_then_measures() {
        let params = MasteringParams::default()
            .apply(ParamUpdate::CleanLowEnd(true))
            .apply(ParamUpdate::NormalizeLoudness(true));
        let format = OutputFormat::new(48000, 16).unwrap();
        assert_eq!(
            analysis_graph(&FilterChain::pre_normalization(&params), &format),
            "aresample=48000,aformat=channel_layouts=stereo,highpass=f=30,\
             loudnorm=I=-14:TP=-2:LRA=11:print_format=json"
        );
    }
}
