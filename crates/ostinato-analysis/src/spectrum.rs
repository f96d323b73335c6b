//! Packed half-complex real transforms.
//!
//! A length-n real signal transforms into n/2+1 non-redundant complex
//! bins. The packed layout stores them in n floats:
//!
//! ```text
//! [ re(0), re(1), ..., re(n/2), im(n/2 - 1), ..., im(1) ]
//! ```
//!
//! so bin k's imaginary part sits at index n-k. The DC bin and, for the
//! even lengths supported here, the Nyquist bin are pure real and carry no
//! imaginary slot. This is the classic FFTW halfcomplex convention, which
//! keeps a full spectrum in place inside a real-sized buffer.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Forward/inverse real transform with a reusable plan.
///
/// Planning and scratch allocation happen once at construction; the
/// per-block transform itself allocates nothing, which is what the
/// periodic stages require.
pub struct HalfComplexFft {
    len: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    work: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl HalfComplexFft {
    /// Plans transforms of length `len` (even, at least 2).
    pub fn new(len: usize) -> Result<Self> {
        if len < 2 || len % 2 != 0 {
            return Err(Error::UnsupportedLength(len));
        }
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Ok(Self {
            len,
            forward,
            inverse,
            work: vec![Complex::default(); len],
            scratch: vec![Complex::default(); scratch_len],
        })
    }

    /// Transform length in samples.
    pub fn len(&self) -> usize {
        self.len
    }

    fn check_len(&self, buf: &[f32]) -> Result<()> {
        if buf.len() != self.len {
            return Err(Error::LengthMismatch {
                expected: self.len,
                found: buf.len(),
            });
        }
        Ok(())
    }

    /// Forward transform of `samples` into the packed layout in `spectrum`.
    pub fn forward(&mut self, samples: &[f32], spectrum: &mut [f32]) -> Result<()> {
        self.check_len(samples)?;
        self.check_len(spectrum)?;

        for (w, s) in self.work.iter_mut().zip(samples) {
            *w = Complex::new(*s, 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.work, &mut self.scratch);

        let n = self.len;
        spectrum[0] = self.work[0].re;
        spectrum[n / 2] = self.work[n / 2].re;
        for k in 1..n / 2 {
            spectrum[k] = self.work[k].re;
            spectrum[n - k] = self.work[k].im;
        }
        Ok(())
    }

    /// Inverse transform of a packed `spectrum` back into `samples`.
    ///
    /// Scaled by 1/n so that forward followed by inverse reproduces the
    /// input.
    pub fn inverse(&mut self, spectrum: &[f32], samples: &mut [f32]) -> Result<()> {
        self.check_len(spectrum)?;
        self.check_len(samples)?;

        let n = self.len;
        self.work[0] = Complex::new(spectrum[0], 0.0);
        self.work[n / 2] = Complex::new(spectrum[n / 2], 0.0);
        for k in 1..n / 2 {
            let bin = Complex::new(spectrum[k], spectrum[n - k]);
            self.work[k] = bin;
            self.work[n - k] = bin.conj();
        }
        self.inverse
            .process_with_scratch(&mut self.work, &mut self.scratch);

        let scale = 1.0 / n as f32;
        for (s, w) in samples.iter_mut().zip(&self.work) {
            *s = w.re * scale;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Direct O(n^2) DFT used as the reference.
    fn naive_dft(samples: &[f32]) -> Vec<Complex<f32>> {
        let n = samples.len();
        (0..n)
            .map(|k| {
                samples
                    .iter()
                    .enumerate()
                    .map(|(i, &x)| {
                        let angle = -2.0 * std::f64::consts::PI * (k * i) as f64 / n as f64;
                        Complex::new(
                            x * angle.cos() as f32,
                            x * angle.sin() as f32,
                        )
                    })
                    .sum()
            })
            .collect()
    }

    fn test_signal(n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| {
                let t = i as f32 / n as f32;
                (2.0 * std::f32::consts::PI * 3.0 * t).sin()
                    + 0.5 * (2.0 * std::f32::consts::PI * 7.0 * t).cos()
            })
            .collect()
    }

    #[test]
    fn odd_and_degenerate_lengths_rejected() {
        assert!(matches!(
            HalfComplexFft::new(15),
            Err(Error::UnsupportedLength(15))
        ));
        assert!(matches!(
            HalfComplexFft::new(0),
            Err(Error::UnsupportedLength(0))
        ));
    }

    #[test]
    fn mismatched_buffer_lengths_rejected() {
        let mut fft = HalfComplexFft::new(16).unwrap();
        let samples = vec![0.0; 16];
        let mut spectrum = vec![0.0; 8];
        assert!(matches!(
            fft.forward(&samples, &mut spectrum),
            Err(Error::LengthMismatch {
                expected: 16,
                found: 8
            })
        ));
    }

    #[test]
    fn packing_matches_naive_dft() {
        let n = 32;
        let samples = test_signal(n);
        let mut fft = HalfComplexFft::new(n).unwrap();
        let mut spectrum = vec![0.0; n];
        fft.forward(&samples, &mut spectrum).unwrap();

        let reference = naive_dft(&samples);
        assert_relative_eq!(spectrum[0], reference[0].re, epsilon = 1e-3);
        assert_relative_eq!(spectrum[n / 2], reference[n / 2].re, epsilon = 1e-3);
        for k in 1..n / 2 {
            assert_relative_eq!(spectrum[k], reference[k].re, epsilon = 1e-3);
            assert_relative_eq!(spectrum[n - k], reference[k].im, epsilon = 1e-3);
        }
    }

    #[test]
    fn forward_inverse_round_trip() {
        let n = 64;
        let samples = test_signal(n);
        let mut fft = HalfComplexFft::new(n).unwrap();
        let mut spectrum = vec![0.0; n];
        let mut restored = vec![0.0; n];

        fft.forward(&samples, &mut spectrum).unwrap();
        fft.inverse(&spectrum, &mut restored).unwrap();

        for (a, b) in samples.iter().zip(&restored) {
            assert_relative_eq!(a, b, epsilon = 1e-4);
        }
    }
}
