//! Audio file I/O
//!
//! Probing and decoding of common input containers (MP3, WAV, FLAC, AAC/M4A,
//! OGG) through Symphonia, and streaming WAV output through hound.
//!
//! Exports are always integer PCM; the sample scale is 2^(bits-1) so a
//! full-scale float of -1.0 maps exactly onto the most negative code.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::engine::buffer::DecodedAudio;
use crate::engine::resample::resample_stereo;
use crate::error::{Result, WorthyError};
use crate::params::{BitDepth, OutputFormat};

/// Stream and container facts about an input file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Average bit rate in bits per second (file size over duration)
    pub bit_rate: Option<u64>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Short codec name, e.g. `pcm_s16le`, `mp3`, `flac`
    pub codec: String,
    /// Container name, e.g. `wav`, `mp3`, `flac`
    pub format: String,
}

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>> {
    let file = File::open(path).map_err(|e| WorthyError::FileNotFound {
        path: path.display().to_string(),
        source: Some(e),
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| WorthyError::ProbeFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    Ok(probed.format)
}

/// Read duration, rates and codec information without decoding audio
///
/// # Errors
/// * `FileNotFound` - The path does not exist or cannot be opened
/// * `ProbeFailed` - The file is not a readable audio container
pub fn probe(path: &Path) -> Result<AudioInfo> {
    let mut format = open_format(path)?;
    let path_str = path.display().to_string();

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| WorthyError::ProbeFailed {
            path: path_str.clone(),
            reason: "no audio stream".to_string(),
        })?;

    let params = track.codec_params.clone();
    let track_id = track.id;

    let sample_rate = params.sample_rate.ok_or_else(|| WorthyError::ProbeFailed {
        path: path_str.clone(),
        reason: "unknown sample rate".to_string(),
    })?;
    let channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);

    let codec = symphonia::default::get_codecs()
        .get_codec(params.codec)
        .map(|d| d.short_name.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let duration = match (params.n_frames, params.time_base) {
        (Some(frames), Some(tb)) => {
            let t = tb.calc_time(frames);
            t.seconds as f64 + t.frac
        }
        (Some(frames), None) => frames as f64 / sample_rate as f64,
        (None, _) => {
            // Container has no frame count; walk the packets
            let mut ts = 0u64;
            while let Ok(packet) = format.next_packet() {
                if packet.track_id() == track_id {
                    ts += packet.dur;
                }
            }
            match params.time_base {
                Some(tb) => {
                    let t = tb.calc_time(ts);
                    t.seconds as f64 + t.frac
                }
                None => ts as f64 / sample_rate as f64,
            }
        }
    };

    let file_size = std::fs::metadata(path)?.len();
    let bit_rate = if duration > 0.0 {
        Some((file_size as f64 * 8.0 / duration).round() as u64)
    } else {
        None
    };

    let info = AudioInfo {
        duration,
        bit_rate,
        sample_rate,
        channels,
        codec,
        format: sniff_container(path).unwrap_or_else(|| "unknown".to_string()),
    };
    debug!(?info, "Probed {}", path.display());
    Ok(info)
}

/// Identify the container from its leading bytes
fn sniff_container(path: &Path) -> Option<String> {
    let mut header = [0u8; 12];
    let mut file = File::open(path).ok()?;
    let n = file.read(&mut header).ok()?;
    let header = &header[..n];

    let name = if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WAVE" {
        "wav"
    } else if header.starts_with(b"fLaC") {
        "flac"
    } else if header.starts_with(b"OggS") {
        "ogg"
    } else if header.len() >= 8 && &header[4..8] == b"ftyp" {
        "mov,mp4,m4a"
    } else if header.starts_with(b"ID3") {
        "mp3"
    } else if header.len() >= 2 && header[0] == 0xFF && (header[1] & 0xF6) == 0xF0 {
        "aac"
    } else if header.len() >= 2 && header[0] == 0xFF && (header[1] & 0xE0) == 0xE0 {
        "mp3"
    } else {
        return None;
    };
    Some(name.to_string())
}

/// Decode the first audio track of a file into memory
///
/// # Errors
/// * `FileNotFound` - The path does not exist
/// * `ProbeFailed` - The container cannot be opened
/// * `UnsupportedFormat` - No decoder exists for the codec
/// * `InvalidAudio` - The stream is corrupt or holds no samples
pub fn decode(path: &Path) -> Result<DecodedAudio> {
    let mut format = open_format(path)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| WorthyError::ProbeFailed {
            path: path.display().to_string(),
            reason: "no audio stream".to_string(),
        })?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| WorthyError::UnsupportedFormat {
            format: e.to_string(),
        })?;

    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut channel_count = codec_params.channels.map(|c| c.count()).unwrap_or(0);
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(WorthyError::InvalidAudio {
                    reason: format!("failed to read packet: {}", e),
                    source: Some(Box::new(e)),
                })
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Skip corrupt frames the way players do
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => {
                return Err(WorthyError::InvalidAudio {
                    reason: format!("decoder failed: {}", e),
                    source: Some(Box::new(e)),
                })
            }
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channel_count = spec.channels.count();

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() || channel_count == 0 {
        return Err(WorthyError::InvalidAudio {
            reason: "no audio samples decoded".to_string(),
            source: None,
        });
    }

    let audio = DecodedAudio::from_interleaved(&samples, channel_count, sample_rate)?;
    debug!(
        frames = audio.frames(),
        channels = audio.num_channels(),
        sample_rate = audio.sample_rate(),
        "Decoded {}",
        path.display()
    );
    Ok(audio)
}

/// Decode `path` into planar stereo at `sample_rate`
///
/// Mono is duplicated to both channels; other rates are converted.
pub fn decode_stereo(path: &Path, sample_rate: u32) -> Result<(Vec<f64>, Vec<f64>)> {
    let audio = decode(path)?;
    let (left, right) = audio.to_stereo_f64();
    resample_stereo(&left, &right, audio.sample_rate(), sample_rate)
}

fn hound_error(e: hound::Error) -> WorthyError {
    match e {
        hound::Error::IoError(io) => WorthyError::Io(io),
        other => WorthyError::render(other.to_string()),
    }
}

/// Quantize one float sample to an integer PCM code
#[inline]
pub fn quantize(sample: f64, depth: BitDepth) -> i32 {
    let scale = depth.full_scale();
    (sample * scale).round().clamp(-scale, scale - 1.0) as i32
}

// ============================================================================
// Streaming WAV writer
// ============================================================================

/// Incremental stereo WAV writer for rendered output
pub struct WavSink {
    writer: WavWriter<std::io::BufWriter<File>>,
    depth: BitDepth,
    frames: u64,
}

impl WavSink {
    pub fn create(path: &Path, format: &OutputFormat) -> Result<Self> {
        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: format.bit_depth.bits(),
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec).map_err(hound_error)?;
        Ok(Self {
            writer,
            depth: format.bit_depth,
            frames: 0,
        })
    }

    /// Append planar stereo frames
    pub fn write_frames(&mut self, left: &[f64], right: &[f64]) -> Result<()> {
        for (l, r) in left.iter().zip(right.iter()) {
            for s in [*l, *r] {
                let code = quantize(s, self.depth);
                let written = match self.depth {
                    BitDepth::Pcm16 => self.writer.write_sample(code as i16),
                    BitDepth::Pcm24 | BitDepth::Pcm32 => self.writer.write_sample(code),
                };
                written.map_err(hound_error)?;
            }
        }
        self.frames += left.len().min(right.len()) as u64;
        Ok(())
    }

    /// Flush the header and return the number of frames written
    pub fn finalize(self) -> Result<u64> {
        let frames = self.frames;
        self.writer.finalize().map_err(hound_error)?;
        Ok(frames)
    }
}

/// Write interleaved float samples as integer PCM WAV
pub fn write_wav(
    path: &Path,
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
    depth: BitDepth,
) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: depth.bits(),
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).map_err(hound_error)?;
    for s in samples {
        let code = quantize(*s as f64, depth);
        let written = match depth {
            BitDepth::Pcm16 => writer.write_sample(code as i16),
            BitDepth::Pcm24 | BitDepth::Pcm32 => writer.write_sample(code),
        };
        written.map_err(hound_error)?;
    }
    writer.finalize().map_err(hound_error)
}

/// SHA-256 of a file's bytes as lowercase hex
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}
