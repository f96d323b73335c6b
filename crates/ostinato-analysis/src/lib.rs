//! Spectral analysis for pattern matching.
//!
//! Real-input transforms in the packed half-complex layout plus the
//! correlation arithmetic the matcher stages run on them:
//!
//! - [`HalfComplexFft`]: in-place real forward/inverse transform with a
//!   reusable plan, allocation-free after construction
//! - [`CrossCorrelator`]: peak of the circular cross-correlation of two
//!   half-complex spectra
//! - [`block_energy`] / [`normalized_correlation`]: the self-correlation
//!   scalar and the unit-normalized match score built from it

pub mod error;
pub use error::{Error, Result};

mod spectrum;
pub use spectrum::HalfComplexFft;

mod correlation;
pub use correlation::{block_energy, normalized_correlation, CrossCorrelator};
