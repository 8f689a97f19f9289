//! Audio Engine Module
//!
//! Core audio plumbing shared by preview and render:
//! - Decoded buffer shared read-only across components
//! - Probe, decode and WAV encode
//! - Offline resampling
//! - Transport state machine and its clock

pub mod buffer;
pub mod clock;
pub mod io;
pub mod resample;
pub mod transport;

pub use buffer::{DecodedAudio, SharedAudio};
pub use clock::{Clock, ManualClock, SystemClock};
pub use io::{decode, decode_stereo, probe, sha256_file, write_wav, AudioInfo, WavSink};
pub use resample::resample_stereo;
pub use transport::{format_time, BufferSource, Transport, TransportState, TransportTick};
