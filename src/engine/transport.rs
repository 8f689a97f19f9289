//! Transport State Machine
//!
//! Play/pause/stop/seek against the shared decoded buffer. Live position is
//! derived from an anchor timestamp on a [`Clock`]; the audio itself is pulled
//! from the active [`BufferSource`].
//!
//! A fresh source (new generation) is created on every play and on every seek
//! while playing. Nothing else replaces the source, so preview parameter
//! changes and bypass toggles never interrupt playback.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::buffer::SharedAudio;
use crate::engine::clock::Clock;

/// Transport states representing the current playback mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TransportState {
    /// No source; position reset to the start
    #[default]
    Stopped,
    /// A source is running
    Playing,
    /// Position kept, no source
    Paused,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "Stopped"),
            TransportState::Playing => write!(f, "Playing"),
            TransportState::Paused => write!(f, "Paused"),
        }
    }
}

// ============================================================================
// Playable source
// ============================================================================

/// A read cursor over the shared buffer, bound to a start offset
#[derive(Debug, Clone)]
pub struct BufferSource {
    audio: SharedAudio,
    cursor: usize,
    generation: u64,
}

impl BufferSource {
    fn new(audio: SharedAudio, offset_secs: f64, generation: u64) -> Self {
        let cursor = ((offset_secs * audio.sample_rate() as f64).round() as usize).min(audio.frames());
        Self {
            audio,
            cursor,
            generation,
        }
    }

    /// Identifies this source; increments each time a source is created
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current read position in frames
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate()
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.audio.frames()
    }

    /// Fill interleaved stereo `out`; frames past the end are silence
    ///
    /// Returns the number of frames read from the buffer.
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        let mut read = 0;
        for frame in out.chunks_exact_mut(2) {
            if self.cursor < self.audio.frames() {
                let (l, r) = self.audio.stereo_frame(self.cursor);
                frame[0] = l;
                frame[1] = r;
                self.cursor += 1;
                read += 1;
            } else {
                frame[0] = 0.0;
                frame[1] = 0.0;
            }
        }
        read
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Result of one position poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportTick {
    /// Position to display, in seconds
    pub position: f64,
    /// Playback reached the end of the media during this poll
    pub ended: bool,
}

/// Owns playback state: mode, offset, anchor and the active source
#[derive(Debug, Clone)]
pub struct Transport {
    state: TransportState,
    /// Stored offset in seconds (position at the last transition)
    offset: f64,
    /// Clock time when the current source started
    anchor: f64,
    audio: Option<SharedAudio>,
    source: Option<BufferSource>,
    next_generation: u64,
    clock: Arc<dyn Clock>,
    /// User is dragging the seek bar
    seeking: bool,
    displayed_position: f64,
}

impl Transport {
    /// Create a stopped transport with no media
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    /// use worthy::engine::{ManualClock, Transport};
    ///
    /// let transport = Transport::new(Arc::new(ManualClock::new()));
    /// assert!(transport.is_stopped());
    /// ```
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: TransportState::Stopped,
            offset: 0.0,
            anchor: 0.0,
            audio: None,
            source: None,
            next_generation: 0,
            clock,
            seeking: false,
            displayed_position: 0.0,
        }
    }

    /// Replace the media; the transport is stopped and rewound
    pub fn load(&mut self, audio: SharedAudio) {
        self.stop();
        debug!(duration = audio.duration_secs(), "Transport media loaded");
        self.audio = Some(audio);
    }

    /// Drop the media (e.g. preview disabled for the current file)
    pub fn unload(&mut self) {
        self.stop();
        self.audio = None;
    }

    pub fn has_media(&self) -> bool {
        self.audio.is_some()
    }

    /// Media duration in seconds (0 with no media)
    pub fn duration(&self) -> f64 {
        self.audio.as_ref().map(|a| a.duration_secs()).unwrap_or(0.0)
    }

    fn start_source(&mut self, offset: f64) {
        if let Some(audio) = self.audio.as_ref() {
            self.next_generation += 1;
            self.source = Some(BufferSource::new(
                Arc::clone(audio),
                offset,
                self.next_generation,
            ));
            self.offset = offset;
            self.anchor = self.clock.now();
        }
    }

    // ========================================================================
    // Standard Transport Controls
    // ========================================================================

    /// Start playback from the stored offset
    ///
    /// State transitions: Stopped/Paused -> Playing
    pub fn play(&mut self) {
        match self.state {
            TransportState::Stopped | TransportState::Paused => {
                if self.audio.is_none() {
                    warn!("[TRANSPORT] Play ignored: no media loaded");
                    return;
                }
                let offset = if self.offset >= self.duration() {
                    0.0
                } else {
                    self.offset
                };
                self.start_source(offset);
                self.state = TransportState::Playing;
                debug!("[TRANSPORT] Play from {:.3}s", offset);
            }
            TransportState::Playing => {
                debug!("[TRANSPORT] Already playing");
            }
        }
    }

    /// Pause playback, keeping the position
    ///
    /// State transitions: Playing -> Paused
    pub fn pause(&mut self) {
        match self.state {
            TransportState::Playing => {
                self.offset = self.position();
                self.source = None;
                self.state = TransportState::Paused;
                self.displayed_position = self.offset;
                debug!("[TRANSPORT] Paused at {:.3}s", self.offset);
            }
            TransportState::Paused | TransportState::Stopped => {
                debug!("[TRANSPORT] Pause ignored in {}", self.state);
            }
        }
    }

    /// Toggle between playing and paused
    pub fn toggle(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Stop playback and rewind
    ///
    /// State transitions: Any -> Stopped (offset 0)
    pub fn stop(&mut self) {
        self.source = None;
        self.offset = 0.0;
        self.state = TransportState::Stopped;
        self.displayed_position = 0.0;
        debug!("[TRANSPORT] Stopped, position reset to 0");
    }

    /// Move to `position` seconds, clamped to [0, duration]
    ///
    /// While playing, the current source is replaced by one starting at the
    /// new offset and playback continues. Otherwise only the stored offset
    /// and displayed time change.
    pub fn seek(&mut self, position: f64) {
        let target = position.clamp(0.0, self.duration());
        if self.is_playing() {
            self.start_source(target);
        } else {
            self.offset = target;
        }
        self.displayed_position = target;
        debug!("[TRANSPORT] Seek to {:.3}s", target);
    }

    // ========================================================================
    // Seek drag
    // ========================================================================

    /// User grabbed the seek bar; polls stop writing the displayed position
    pub fn begin_seek_drag(&mut self) {
        self.seeking = true;
    }

    /// Update the displayed position only
    pub fn drag_to(&mut self, position: f64) {
        self.displayed_position = position.clamp(0.0, self.duration());
    }

    /// Release the seek bar at `position` and seek there
    pub fn end_seek_drag(&mut self, position: f64) {
        self.seeking = false;
        self.seek(position);
    }

    pub fn is_seeking(&self) -> bool {
        self.seeking
    }

    // ========================================================================
    // Position
    // ========================================================================

    /// Live position in seconds
    pub fn position(&self) -> f64 {
        match self.state {
            TransportState::Playing => {
                let elapsed = self.clock.now() - self.anchor;
                (self.offset + elapsed.max(0.0)).min(self.duration())
            }
            _ => self.offset,
        }
    }

    /// Position as last shown to the user
    pub fn displayed_position(&self) -> f64 {
        self.displayed_position
    }

    /// Periodic poll: detects natural end and refreshes the displayed position
    pub fn tick(&mut self) -> TransportTick {
        if self.is_playing() {
            let source_done = self.source.as_ref().map(|s| s.is_finished()).unwrap_or(true);
            if source_done || self.position() >= self.duration() {
                debug!("[TRANSPORT] Reached end of media");
                self.stop();
                return TransportTick {
                    position: 0.0,
                    ended: true,
                };
            }
        }

        if !self.seeking {
            self.displayed_position = self.position();
        }
        TransportTick {
            position: self.displayed_position,
            ended: false,
        }
    }

    // ========================================================================
    // State Queries
    // ========================================================================

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state == TransportState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state == TransportState::Stopped
    }

    /// The active source while playing
    pub fn source_mut(&mut self) -> Option<&mut BufferSource> {
        self.source.as_mut()
    }

    /// Generation of the active source, if any
    pub fn source_generation(&self) -> Option<u64> {
        self.source.as_ref().map(|s| s.generation())
    }
}

/// Format seconds as `M:SS`
///
/// # Example
/// ```
/// use worthy::engine::format_time;
/// assert_eq!(format_time(75.4), "1:15");
/// ```
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::DecodedAudio;
    use crate::engine::clock::ManualClock;
    use approx::assert_relative_eq;

    /// 10 seconds of mono audio at 1 kHz sample rate
    fn fixture() -> (Transport, ManualClock) {
        let clock = ManualClock::new();
        let mut transport = Transport::new(Arc::new(clock.clone()));
        let audio = DecodedAudio::from_planar(vec![vec![0.5; 10_000]], 1000)
            .unwrap()
            .into_shared();
        transport.load(audio);
        (transport, clock)
    }

    // ------------------------------------------------------------------------
    // Default State
    // ------------------------------------------------------------------------

    #[test]
    fn test_default_state_is_stopped() {
        let transport = Transport::new(Arc::new(ManualClock::new()));
        assert!(transport.is_stopped());
        assert!(!transport.has_media());
        assert_eq!(transport.position(), 0.0);
        assert_eq!(transport.state().to_string(), "Stopped");
    }

    #[test]
    fn test_play_without_media_is_ignored() {
        let mut transport = Transport::new(Arc::new(ManualClock::new()));
        transport.play();
        assert!(transport.is_stopped());
    }

    // ------------------------------------------------------------------------
    // State Transitions
    // ------------------------------------------------------------------------

    #[test]
    fn test_play_pause_resume() {
        let (mut transport, clock) = fixture();
        transport.play();
        assert!(transport.is_playing());
        assert_eq!(transport.source_generation(), Some(1));

        clock.advance(2.5);
        transport.pause();
        assert!(transport.is_paused());
        assert_relative_eq!(transport.position(), 2.5);
        assert_eq!(transport.source_generation(), None);

        clock.advance(100.0);
        assert_relative_eq!(transport.position(), 2.5);

        transport.play();
        clock.advance(1.0);
        assert_relative_eq!(transport.position(), 3.5);
        assert_eq!(transport.source_generation(), Some(2));
    }

    #[test]
    fn test_stop_resets_position() {
        let (mut transport, clock) = fixture();
        transport.play();
        clock.advance(4.0);
        transport.stop();
        assert!(transport.is_stopped());
        assert_eq!(transport.position(), 0.0);
        assert_eq!(transport.displayed_position(), 0.0);
    }

    #[test]
    fn test_toggle() {
        let (mut transport, _clock) = fixture();
        transport.toggle();
        assert!(transport.is_playing());
        transport.toggle();
        assert!(transport.is_paused());
    }

    // ------------------------------------------------------------------------
    // Seeking
    // ------------------------------------------------------------------------

    #[test]
    fn test_seek_while_paused_round_trips() {
        let (mut transport, _clock) = fixture();
        transport.seek(3.25);
        assert_relative_eq!(transport.position(), 3.25);
        assert_relative_eq!(transport.displayed_position(), 3.25);
        assert!(!transport.is_playing());
    }

    #[test]
    fn test_seek_is_clamped() {
        let (mut transport, _clock) = fixture();
        transport.seek(-4.0);
        assert_eq!(transport.position(), 0.0);
        transport.seek(99.0);
        assert_eq!(transport.position(), 10.0);
    }

    #[test]
    fn test_seek_while_playing_restarts_source() {
        let (mut transport, clock) = fixture();
        transport.play();
        clock.advance(1.0);
        transport.seek(6.0);
        assert!(transport.is_playing());
        assert_eq!(transport.source_generation(), Some(2));
        assert_eq!(transport.source_mut().map(|s| s.cursor()), Some(6000));

        clock.advance(0.5);
        assert_relative_eq!(transport.position(), 6.5);
    }

    #[test]
    fn test_seek_drag_suppresses_poll() {
        let (mut transport, clock) = fixture();
        transport.play();
        transport.begin_seek_drag();
        transport.drag_to(8.0);
        clock.advance(1.0);
        let tick = transport.tick();
        assert_eq!(tick.position, 8.0);
        assert!(transport.is_seeking());

        transport.end_seek_drag(8.0);
        assert!(!transport.is_seeking());
        clock.advance(0.5);
        let tick = transport.tick();
        assert_relative_eq!(tick.position, 8.5);
    }

    // ------------------------------------------------------------------------
    // Polling and natural end
    // ------------------------------------------------------------------------

    #[test]
    fn test_tick_updates_display() {
        let (mut transport, clock) = fixture();
        transport.play();
        clock.advance(0.1);
        let tick = transport.tick();
        assert!(!tick.ended);
        assert_relative_eq!(tick.position, 0.1);
    }

    #[test]
    fn test_natural_end_stops_and_rewinds() {
        let (mut transport, clock) = fixture();
        transport.seek(9.0);
        transport.play();
        clock.advance(1.5);
        let tick = transport.tick();
        assert!(tick.ended);
        assert!(transport.is_stopped());
        assert_eq!(transport.position(), 0.0);
    }

    #[test]
    fn test_source_read_pads_with_silence() {
        let (mut transport, _clock) = fixture();
        transport.seek(9.999);
        transport.play();
        let source = transport.source_mut().unwrap();
        let mut out = [1.0f32; 8];
        let read = source.read(&mut out);
        assert_eq!(read, 1);
        assert_eq!(out, [0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(source.is_finished());
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(59.99), "0:59");
        assert_eq!(format_time(61.0), "1:01");
        assert_eq!(format_time(3600.0), "60:00");
        assert_eq!(format_time(f64::NAN), "0:00");
    }
}
