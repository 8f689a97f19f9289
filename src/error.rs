//! Error handling for Worthy
//!
//! All errors carry recovery suggestions so the interactive layer can show
//! something actionable next to the failure.

use thiserror::Error;

/// Result type alias for Worthy operations
pub type Result<T> = std::result::Result<T, WorthyError>;

/// Main error type for Worthy operations
#[derive(Error, Debug)]
pub enum WorthyError {
    // File Errors
    #[error("File not found: {path}")]
    FileNotFound {
        path: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Cannot read audio file '{path}': {reason}")]
    ProbeFailed { path: String, reason: String },

    #[error("Invalid audio file: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // Parameter Errors
    #[error("Invalid parameter '{param}': got {value}, expected {expected}")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    // Render Errors
    #[error("{message}")]
    RenderFailed { message: String },

    #[error("Export cancelled")]
    Cancelled,

    #[error("An export is already running (job {job_id})")]
    ExportInProgress { job_id: String },

    #[error("Render backend '{backend}' unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    // Preview Errors
    #[error("Preview unavailable: {reason}")]
    PreviewUnavailable { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorthyError {
    /// Shorthand for an engine failure whose message is surfaced verbatim
    pub fn render(message: impl Into<String>) -> Self {
        WorthyError::RenderFailed {
            message: message.into(),
        }
    }

    /// Shorthand for a parameter validation failure
    pub fn invalid_parameter(
        param: impl Into<String>,
        value: impl ToString,
        expected: impl Into<String>,
    ) -> Self {
        WorthyError::InvalidParameter {
            param: param.into(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            WorthyError::FileNotFound { .. } => "FILE_NOT_FOUND",
            WorthyError::ProbeFailed { .. } => "PROBE_FAILED",
            WorthyError::InvalidAudio { .. } => "INVALID_AUDIO",
            WorthyError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            WorthyError::InvalidParameter { .. } => "INVALID_PARAMETER",
            WorthyError::RenderFailed { .. } => "RENDER_FAILED",
            WorthyError::Cancelled => "CANCELLED",
            WorthyError::ExportInProgress { .. } => "EXPORT_IN_PROGRESS",
            WorthyError::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            WorthyError::PreviewUnavailable { .. } => "PREVIEW_UNAVAILABLE",
            WorthyError::Io(_) => "IO_ERROR",
            WorthyError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable without restarting the session
    pub fn is_recoverable(&self) -> bool {
        match self {
            WorthyError::FileNotFound { .. } => true,
            WorthyError::ProbeFailed { .. } => true,
            WorthyError::InvalidAudio { .. } => true,
            WorthyError::UnsupportedFormat { .. } => true,
            WorthyError::InvalidParameter { .. } => true,
            WorthyError::Cancelled => true,
            WorthyError::ExportInProgress { .. } => true,
            WorthyError::PreviewUnavailable { .. } => true,
            _ => false,
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            WorthyError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            WorthyError::ProbeFailed { .. } | WorthyError::InvalidAudio { .. } => vec![
                "Check if the file plays in another application",
                "The file may be corrupted - try re-exporting from source",
                "Supported inputs: MP3, WAV, FLAC, AAC, M4A",
            ],
            WorthyError::UnsupportedFormat { .. } => vec![
                "Convert to WAV or FLAC first",
                "Supported inputs: MP3, WAV, FLAC, AAC, M4A",
            ],
            WorthyError::InvalidParameter { .. } => vec![
                "Use a bit depth of 16, 24 or 32",
                "Use a standard sample rate such as 44100 or 48000 Hz",
            ],
            WorthyError::RenderFailed { .. } => vec![
                "Check there is enough free disk space at the output location",
                "Try exporting to a different folder",
            ],
            WorthyError::ExportInProgress { .. } => {
                vec!["Wait for the running export to finish or cancel it"]
            }
            WorthyError::BackendUnavailable { .. } => vec![
                "Install ffmpeg or point WORTHY_FFMPEG at the executable",
                "Switch to the native backend",
            ],
            WorthyError::PreviewUnavailable { .. } => vec![
                "Export still works - the preview decoder could not read this file",
            ],
            _ => vec![],
        }
    }

    /// Get a user-friendly message for this error
    pub fn friendly_message(&self) -> String {
        match self {
            WorthyError::FileNotFound { path, .. } => {
                format!("I couldn't find the file at '{}'.", path)
            }
            WorthyError::ProbeFailed { path, reason } => {
                format!("'{}' doesn't look like audio I can read ({}).", path, reason)
            }
            WorthyError::Cancelled => "Export cancelled. No file was written.".to_string(),
            WorthyError::RenderFailed { message } => format!("Export failed: {}", message),
            _ => self.to_string(),
        }
    }
}
