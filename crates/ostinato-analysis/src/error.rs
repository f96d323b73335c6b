//! Error types for ostinato-analysis.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Transform lengths must be even so the Nyquist bin exists and the
    /// half-complex packing is unambiguous.
    #[error("transform length {0} is not an even number of at least 2")]
    UnsupportedLength(usize),

    #[error("buffer length {found} does not match transform length {expected}")]
    LengthMismatch { expected: usize, found: usize },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
