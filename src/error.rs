//! Centralized error type for the ostinato umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate
//! boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("task: {0}")]
    Rt(#[from] ostinato_rt::Error),

    #[error("buffer exchange: {0}")]
    Cab(#[from] ostinato_cab::Error),

    #[error("analysis: {0}")]
    Analysis(#[from] ostinato_analysis::Error),

    #[error("pipeline: {0}")]
    Pipeline(#[from] ostinato_pipeline::Error),

    #[error("invalid engine configuration: {0}")]
    Config(String),

    #[error("the pipeline is already running")]
    AlreadyRunning,

    #[error("the pipeline is not running")]
    NotRunning,

    #[error("file {index} already has a running matcher")]
    AlreadyArmed { index: usize },

    #[error("file {index} is not armed")]
    NotArmed { index: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
