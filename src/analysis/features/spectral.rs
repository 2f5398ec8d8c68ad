// Spectral module - Frequency-domain feature extraction
//
// Inputs are positive-bin magnitude spectra from `FftProcessor`, where
// element `i` corresponds to bin `i + 1`.

/// Guard against log2(0) in the entropy sum
const ENTROPY_EPSILON: f64 = 1e-12;

/// Spectral feature computation functions
pub struct SpectralFeatures {
    sample_rate: f64,
    fft_size: usize,
}

impl SpectralFeatures {
    /// Create a new spectral features processor
    ///
    /// # Arguments
    /// * `sample_rate` - Sample rate in Hz
    /// * `fft_size` - FFT length the spectra were computed with
    pub fn new(sample_rate: f64, fft_size: usize) -> Self {
        Self {
            sample_rate,
            fft_size,
        }
    }

    fn bin_frequency(&self, index: usize) -> f64 {
        (index + 1) as f64 * self.sample_rate / self.fft_size as f64
    }

    /// Frequency of the largest-magnitude positive bin
    ///
    /// Ties resolve to the lowest frequency. A spectrum with no energy has
    /// no dominant frequency and yields 0.
    pub fn compute_dominant_frequency(&self, spectrum: &[f64]) -> f64 {
        let mut best: Option<(usize, f64)> = None;
        for (i, &mag) in spectrum.iter().enumerate() {
            match best {
                Some((_, top)) if mag <= top => {}
                _ => best = Some((i, mag)),
            }
        }
        match best {
            Some((i, mag)) if mag > 0.0 => self.bin_frequency(i),
            _ => 0.0,
        }
    }

    /// Shannon entropy (bits) of the normalised power spectrum
    ///
    /// Formula: H = -Σ p_i log2(p_i + ε), p_i = |X_i|² / Σ|X_j|²
    ///
    /// An all-zero spectrum is left unnormalised and yields 0.
    pub fn compute_entropy(&self, spectrum: &[f64]) -> f64 {
        let power: Vec<f64> = spectrum.iter().map(|m| m * m).collect();
        let total: f64 = power.iter().sum();
        let norm = if total > 0.0 { total } else { 1.0 };

        -power
            .iter()
            .map(|p| {
                let p = p / norm;
                p * (p + ENTROPY_EPSILON).log2()
            })
            .sum::<f64>()
    }

    /// Spectral centroid in Hz
    ///
    /// Formula: centroid = Σ(f_i × |X_i|) / Σ|X_i|
    pub fn compute_centroid(&self, spectrum: &[f64]) -> f64 {
        let magnitude_sum: f64 = spectrum.iter().sum();
        if magnitude_sum <= 1e-12 {
            return 0.0;
        }
        let weighted: f64 = spectrum
            .iter()
            .enumerate()
            .map(|(i, &mag)| self.bin_frequency(i) * mag)
            .sum();
        weighted / magnitude_sum
    }
}
