// FFT module - Fast Fourier Transform computation
//
// Spectra are taken over the first `SPECTRAL_LEN` samples of a window with a
// rectangular window, so dominant-bin positions match a plain DFT.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Number of samples used for spectral features
pub const SPECTRAL_LEN: usize = 256;

/// FFT processor that computes positive-frequency magnitude spectra
pub struct FftProcessor {
    fft: Arc<dyn Fft<f64>>,
    fft_size: usize,
}

impl FftProcessor {
    /// Create a new FFT processor
    ///
    /// # Arguments
    /// * `fft_size` - Transform length (256 for the pipeline)
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        Self { fft, fft_size }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Compute magnitudes of the strictly positive frequency bins
    ///
    /// Element `i` of the result is bin `i + 1`. Bin 0 (DC) and the Nyquist
    /// bin of even lengths are excluded, matching `fftfreq(n) > 0`.
    ///
    /// # Returns
    /// `None` if `signal` is shorter than the transform length
    pub fn positive_magnitudes(&self, signal: &[f64]) -> Option<Vec<f64>> {
        if signal.len() < self.fft_size {
            return None;
        }

        let mut buffer: Vec<Complex<f64>> = signal[..self.fft_size]
            .iter()
            .map(|&x| Complex::new(x, 0.0))
            .collect();
        self.fft.process(&mut buffer);

        let last_positive = (self.fft_size - 1) / 2;
        Some(
            buffer[1..=last_positive]
                .iter()
                .map(|c| c.norm())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_bin_count() {
        let fft = FftProcessor::new(SPECTRAL_LEN);
        let spectrum = fft.positive_magnitudes(&vec![0.0; SPECTRAL_LEN]).unwrap();
        assert_eq!(spectrum.len(), 127);

        let odd = FftProcessor::new(255);
        assert_eq!(odd.positive_magnitudes(&vec![0.0; 255]).unwrap().len(), 127);
    }

    #[test]
    fn test_short_signal_has_no_spectrum() {
        let fft = FftProcessor::new(SPECTRAL_LEN);
        assert!(fft.positive_magnitudes(&[1.0; 100]).is_none());
    }

    #[test]
    fn test_pure_bin_peaks_at_its_index() {
        let fft = FftProcessor::new(SPECTRAL_LEN);
        let signal: Vec<f64> = (0..SPECTRAL_LEN)
            .map(|i| (2.0 * std::f64::consts::PI * 10.0 * i as f64 / SPECTRAL_LEN as f64).cos())
            .collect();
        let spectrum = fft.positive_magnitudes(&signal).unwrap();
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i + 1)
            .unwrap();
        assert_eq!(peak, 10);
    }
}
