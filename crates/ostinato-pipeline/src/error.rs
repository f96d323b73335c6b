//! Error types for ostinato-pipeline.

use thiserror::Error;

use crate::capture::CaptureError;

/// Error type for pipeline setup and stage execution.
#[derive(Error, Debug)]
pub enum Error {
    #[error("capture: {0}")]
    Capture(#[from] CaptureError),

    #[error("buffer exchange: {0}")]
    Cab(#[from] ostinato_cab::Error),

    #[error("task: {0}")]
    Task(#[from] ostinato_rt::Error),

    #[error("analysis: {0}")]
    Analysis(#[from] ostinato_analysis::Error),

    #[error("file registry is full ({capacity} entries)")]
    BankFull { capacity: usize },

    #[error("no open file at index {index}")]
    InvalidFile { index: usize },

    #[error("file {index} has no recorded reference")]
    NoReference { index: usize },

    #[error("stage started without its configuration payload")]
    MissingStageConfig,

    #[cfg(feature = "audio-input")]
    #[error("no input device available")]
    DeviceNotAvailable,

    #[cfg(feature = "audio-input")]
    #[error("unsupported input sample format: {0}")]
    UnsupportedFormat(String),

    #[cfg(feature = "audio-input")]
    #[error("failed to query input config")]
    InputConfig(#[from] cpal::DefaultStreamConfigError),

    #[cfg(feature = "audio-input")]
    #[error("failed to build input stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[cfg(feature = "audio-input")]
    #[error("failed to start input stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
