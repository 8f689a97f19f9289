//! Session
//!
//! Owns everything the interactive side needs: the parameter record, the
//! bypass flag, transport, preview graph, the current file and at most one
//! running export. All changes go through [`Session::update`], which takes a
//! [`Command`] and returns the [`Event`]s a front end should react to.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::{
    decode, format_time, probe, AudioInfo, Clock, SharedAudio, SystemClock, Transport, TransportState,
};
use crate::error::{Result, WorthyError};
use crate::params::{EqPreset, MasteringParams, ParamUpdate};
use crate::preview::{PreviewGraph, PreviewStrategy};
use crate::render::{ExportJob, RenderEvent, RenderReport, RenderRequest, RenderStrategy};
use crate::visual::{bass_envelope, spectrum_bars, waveform_peaks, DEFAULT_SPECTRUM_BARS};

/// User intents
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    LoadFile(PathBuf),
    ParameterChanged(ParamUpdate),
    ApplyPreset(EqPreset),
    ToggleBypass,
    TransportPlay,
    TransportPause,
    TransportToggle,
    TransportStop,
    Seek(f64),
    SeekDragStart,
    SeekDragMove(f64),
    SeekDragEnd(f64),
    /// Periodic poll: transport position and export progress
    Tick,
    ExportRequested { output: PathBuf },
    CancelExport,
}

/// Things that happened, in order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Event {
    FileLoaded { path: PathBuf, info: AudioInfo },
    LoadFailed { path: PathBuf, message: String },
    /// The file can be exported but not auditioned
    PreviewDisabled { reason: String },
    WaveformReady { peaks: Vec<f32>, bass: Vec<f32> },
    ParamsChanged(MasteringParams),
    BypassChanged(bool),
    TransportChanged(TransportState),
    Position { seconds: f64, display: String },
    PlaybackEnded,
    ExportStarted { job_id: Uuid },
    ExportProgress(f64),
    ExportFinished(RenderReport),
    ExportFailed { message: String },
    ExportCancelled,
    ExportRejected { code: &'static str, reason: String },
    /// Log-spaced analyser bars (0..=255), sent on each tick while playing
    Spectrum { bars: Vec<u8> },
}

/// Interactive state of one editing session
pub struct Session {
    config: EngineConfig,
    params: MasteringParams,
    bypass: bool,
    transport: Transport,
    preview: PreviewGraph,
    strategy: Arc<dyn RenderStrategy>,
    file: Option<PathBuf>,
    info: Option<AudioInfo>,
    audio: Option<SharedAudio>,
    export: Option<ExportJob>,
}

impl Session {
    /// Session on the wall clock with the configured render backend
    pub fn new(config: EngineConfig) -> Self {
        let strategy = config.strategy();
        Self::with_parts(config, strategy, Arc::new(SystemClock::new()))
    }

    pub fn with_parts(config: EngineConfig, strategy: Arc<dyn RenderStrategy>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            params: MasteringParams::default(),
            bypass: false,
            transport: Transport::new(clock),
            preview: PreviewGraph::new(),
            strategy,
            file: None,
            info: None,
            audio: None,
            export: None,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn params(&self) -> &MasteringParams {
        &self.params
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn preview(&self) -> &PreviewGraph {
        &self.preview
    }

    pub fn preview_mut(&mut self) -> &mut PreviewGraph {
        &mut self.preview
    }

    pub fn file(&self) -> Option<&PathBuf> {
        self.file.as_ref()
    }

    pub fn info(&self) -> Option<&AudioInfo> {
        self.info.as_ref()
    }

    /// Preview is available for the current file
    pub fn can_preview(&self) -> bool {
        self.audio.is_some()
    }

    pub fn is_exporting(&self) -> bool {
        self.export.is_some()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// How often a front end should send [`Command::Tick`]
    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval()
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Apply one command and report what changed
    pub fn update(&mut self, command: Command) -> Vec<Event> {
        debug!(?command, "Session command");
        match command {
            Command::LoadFile(path) => self.load(path),
            Command::ParameterChanged(update) => self.set_params(self.params.apply(update)),
            Command::ApplyPreset(preset) => self.set_params(self.params.with_preset(preset)),
            Command::ToggleBypass => {
                self.bypass = !self.bypass;
                self.preview.set_bypass(self.bypass);
                vec![Event::BypassChanged(self.bypass)]
            }
            Command::TransportPlay => self.transport_op(Transport::play),
            Command::TransportPause => self.transport_op(Transport::pause),
            Command::TransportToggle => self.transport_op(Transport::toggle),
            Command::TransportStop => self.transport_op(Transport::stop),
            Command::Seek(t) => {
                self.transport.seek(t);
                vec![self.position_event(self.transport.displayed_position())]
            }
            Command::SeekDragStart => {
                self.transport.begin_seek_drag();
                Vec::new()
            }
            Command::SeekDragMove(t) => {
                self.transport.drag_to(t);
                vec![self.position_event(self.transport.displayed_position())]
            }
            Command::SeekDragEnd(t) => {
                self.transport.end_seek_drag(t);
                vec![self.position_event(self.transport.displayed_position())]
            }
            Command::Tick => self.tick(),
            Command::ExportRequested { output } => self.start_export(output),
            Command::CancelExport => {
                if let Some(job) = &self.export {
                    info!(job_id = %job.id(), "Export cancellation requested");
                    job.cancel();
                }
                Vec::new()
            }
        }
    }

    /// Pull preview audio for an output device callback
    ///
    /// Fills interleaved stereo `out` from the active source through the
    /// preview graph; silence when not playing. Returns frames read.
    pub fn render_block(&mut self, out: &mut [f32]) -> usize {
        match self.transport.source_mut() {
            Some(source) if self.audio.is_some() => {
                let read = source.read(out);
                self.preview.process(out);
                read
            }
            _ => {
                out.iter_mut().for_each(|s| *s = 0.0);
                0
            }
        }
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    fn load(&mut self, path: PathBuf) -> Vec<Event> {
        let info = match probe(&path) {
            Ok(info) => info,
            Err(e) => {
                warn!("Load failed for {}: {}", path.display(), e);
                return vec![Event::LoadFailed {
                    message: e.friendly_message(),
                    path,
                }];
            }
        };

        let mut events = vec![Event::FileLoaded {
            path: path.clone(),
            info: info.clone(),
        }];
        self.file = Some(path.clone());
        self.info = Some(info);

        match decode(&path) {
            Ok(audio) => {
                let audio = audio.into_shared();
                events.push(Event::WaveformReady {
                    peaks: waveform_peaks(&audio, self.config.waveform_points),
                    bass: bass_envelope(&audio, self.config.waveform_points, self.config.bass_cutoff_hz),
                });
                self.transport.load(Arc::clone(&audio));
                self.preview.connect(Arc::clone(&audio));
                self.preview.configure(&self.params);
                self.audio = Some(audio);
            }
            Err(e) => {
                let err = WorthyError::PreviewUnavailable {
                    reason: e.to_string(),
                };
                warn!("{} ({})", err, path.display());
                self.transport.unload();
                self.preview.disconnect();
                self.audio = None;
                events.push(Event::PreviewDisabled {
                    reason: err.to_string(),
                });
            }
        }
        events.push(Event::TransportChanged(self.transport.state()));
        events
    }

    fn set_params(&mut self, params: MasteringParams) -> Vec<Event> {
        self.params = params;
        self.preview.configure(&self.params);
        vec![Event::ParamsChanged(self.params.clone())]
    }

    fn transport_op(&mut self, op: fn(&mut Transport)) -> Vec<Event> {
        let before = self.transport.state();
        op(&mut self.transport);
        let after = self.transport.state();
        if before != after {
            vec![Event::TransportChanged(after)]
        } else {
            Vec::new()
        }
    }

    fn position_event(&self, seconds: f64) -> Event {
        Event::Position {
            seconds,
            display: format_time(seconds),
        }
    }

    fn tick(&mut self) -> Vec<Event> {
        let mut events = Vec::new();

        let was_playing = self.transport.is_playing();
        let tick = self.transport.tick();
        if tick.ended {
            events.push(Event::PlaybackEnded);
            events.push(Event::TransportChanged(TransportState::Stopped));
            events.push(self.position_event(0.0));
        } else if was_playing {
            if !self.transport.is_seeking() {
                events.push(self.position_event(tick.position));
            }
            if self.audio.is_some() {
                let sample_rate = self.preview.sample_rate() as u32;
                let data = self.preview.analyser_mut().byte_frequency_data();
                events.push(Event::Spectrum {
                    bars: spectrum_bars(&data, sample_rate, DEFAULT_SPECTRUM_BARS, true),
                });
            }
        }

        if let Some(job) = self.export.as_mut() {
            for event in job.poll() {
                events.push(match event {
                    RenderEvent::Progress(p) => Event::ExportProgress(p),
                    RenderEvent::Finished(report) => Event::ExportFinished(report),
                    RenderEvent::Failed(WorthyError::Cancelled) => Event::ExportCancelled,
                    RenderEvent::Failed(e) => Event::ExportFailed {
                        message: e.to_string(),
                    },
                });
            }
            if job.is_finished() {
                self.export = None;
            }
        }
        events
    }

    fn start_export(&mut self, output: PathBuf) -> Vec<Event> {
        match self.request_export(output) {
            Ok(job_id) => vec![Event::ExportStarted { job_id }],
            Err(e) => {
                warn!("Export rejected: {}", e);
                vec![Event::ExportRejected {
                    code: e.error_code(),
                    reason: e.friendly_message(),
                }]
            }
        }
    }

    /// Start exporting the loaded file with the current parameters
    ///
    /// # Errors
    /// * `ExportInProgress` - Another export has not finished yet
    /// * `InvalidParameter` - No file is loaded
    pub fn request_export(&mut self, output: PathBuf) -> Result<Uuid> {
        if let Some(job) = &self.export {
            return Err(WorthyError::ExportInProgress {
                job_id: job.id().to_string(),
            });
        }
        let input = self.file.clone().ok_or_else(|| {
            WorthyError::invalid_parameter("input", "none", "a loaded file")
        })?;

        let request = RenderRequest::new(input, output, self.params.clone());
        let job = ExportJob::spawn(Arc::clone(&self.strategy), request);
        let job_id = job.id();
        info!(%job_id, backend = self.strategy.name(), "Export requested");
        self.export = Some(job);
        Ok(job_id)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("file", &self.file)
            .field("params", &self.params)
            .field("bypass", &self.bypass)
            .field("transport", &self.transport.state())
            .field("exporting", &self.export.is_some())
            .finish()
    }
}
