//! Cross-correlation of half-complex spectra.
//!
//! The matcher stages score a live spectrum against a pre-recorded
//! reference: multiply one spectrum by the conjugate of the other bin by
//! bin, inverse-transform the product, and take the maximum time-domain
//! value as the unnormalized correlation. Dividing its square by the
//! product of the two blocks' self-correlations yields a score that is
//! 1.0 for a signal matched against itself.

use crate::error::{Error, Result};
use crate::spectrum::HalfComplexFft;

/// Self-correlation of a sample block: its zero-lag autocorrelation, the
/// plain sum of squares.
pub fn block_energy(samples: &[f32]) -> f32 {
    samples.iter().map(|x| x * x).sum()
}

/// Normalized match score from an unnormalized correlation peak and the
/// two blocks' self-correlations.
///
/// Zero-energy blocks (silence) score 0.0 rather than dividing by zero.
pub fn normalized_correlation(peak: f32, energy_a: f32, energy_b: f32) -> f32 {
    let denom = energy_a * energy_b;
    if denom <= f32::EPSILON {
        return 0.0;
    }
    (peak * peak) / denom
}

/// Computes circular cross-correlation peaks between packed half-complex
/// spectra of a fixed length.
///
/// Owns the inverse-transform plan and scratch buffers, so repeated
/// scoring allocates nothing.
pub struct CrossCorrelator {
    fft: HalfComplexFft,
    product: Vec<f32>,
    lags: Vec<f32>,
}

impl CrossCorrelator {
    pub fn new(len: usize) -> Result<Self> {
        let fft = HalfComplexFft::new(len)?;
        Ok(Self {
            fft,
            product: vec![0.0; len],
            lags: vec![0.0; len],
        })
    }

    pub fn len(&self) -> usize {
        self.fft.len()
    }

    /// Maximum time-domain value of the cross-correlation of `a` with `b`.
    ///
    /// Both inputs are packed half-complex spectra as produced by
    /// [`HalfComplexFft::forward`]. The element-wise product with the
    /// conjugate is formed in the packed layout directly; DC and Nyquist
    /// are pure real and multiply as plain scalars.
    pub fn peak(&mut self, a: &[f32], b: &[f32]) -> Result<f32> {
        let n = self.fft.len();
        for buf in [a, b] {
            if buf.len() != n {
                return Err(Error::LengthMismatch {
                    expected: n,
                    found: buf.len(),
                });
            }
        }

        self.product[0] = a[0] * b[0];
        self.product[n / 2] = a[n / 2] * b[n / 2];
        for k in 1..n / 2 {
            let (ar, ai) = (a[k], a[n - k]);
            let (br, bi) = (b[k], b[n - k]);
            self.product[k] = ar * br + ai * bi;
            self.product[n - k] = ai * br - ar * bi;
        }

        self.fft.inverse(&self.product, &mut self.lags)?;
        Ok(self.lags.iter().copied().fold(f32::MIN, f32::max))
    }
}
