//! Error types for ostinato-cab.

use thiserror::Error;

/// Error type for CAB construction and exchange operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Nothing has been published since init or the last reset. Periodic
    /// readers poll again next period.
    #[error("no value has been published")]
    Empty,

    #[error("a CAB needs at least 2 buffers, got {requested}")]
    TooFewBuffers { requested: usize },

    #[error("requested {requested} buffers, compiled maximum is {max}")]
    TooManyBuffers { requested: usize, max: usize },

    /// Another write reservation is outstanding; the CAB is single-producer.
    #[error("a write reservation is already outstanding")]
    WriterBusy,

    /// Every buffer is published or held. The capacity ≥ readers + 1 sizing
    /// contract has been violated by the caller.
    #[error("no free buffer: pool overcommitted beyond capacity - 1 readers")]
    NoFreeBuffer,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
