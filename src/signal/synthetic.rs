// SyntheticSource - deterministic tremor-like EMG generator
//
// filtered(t) = A sin(2πft) + Σ_{h=2,3} (0.3A/h) sin(2πhft) + N(0, (noise·A)²)
// raw(t)      = baseline + filtered(t)
//
// Noise comes from a seeded StdRng, so two sources with the same config
// produce identical streams.

use super::{Sample, SampleLink};
use super::source::LinkStats;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::time::{Duration, Instant};

/// Synthetic generator parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    pub frequency_hz: f64,
    pub amplitude: f64,
    pub sample_rate_hz: f64,
    /// Gaussian noise standard deviation relative to amplitude
    pub noise_level: f64,
    /// Add the 2nd and 3rd harmonics
    pub harmonics: bool,
    /// Offset added to form the raw ADC value (12-bit midpoint)
    pub baseline: f64,
    pub seed: u64,
    /// Emit samples at `sample_rate_hz` in wall-clock time instead of on demand
    pub paced: bool,
    /// Stop after this many samples
    pub limit: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 5.0,
            amplitude: 50.0,
            sample_rate_hz: 200.0,
            noise_level: 0.1,
            harmonics: true,
            baseline: 2048.0,
            seed: 42,
            paced: false,
            limit: None,
        }
    }
}

/// Deterministic sample source
pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: StdRng,
    index: u64,
    started: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            index: 0,
            started: None,
        }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// Generate the first `n` filtered values without pacing
    pub fn take_filtered(config: SyntheticConfig, n: usize) -> Vec<f64> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            paced: false,
            limit: None,
            ..config
        });
        (0..n).map(|_| source.next_value()).collect()
    }

    /// Box-Muller standard normal
    fn gaussian(&mut self) -> f64 {
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    fn next_value(&mut self) -> f64 {
        let c = &self.config;
        let t = self.index as f64 / c.sample_rate_hz;
        let mut value = c.amplitude * (2.0 * PI * c.frequency_hz * t).sin();
        if c.harmonics {
            for h in [2.0, 3.0] {
                value += c.amplitude * (0.3 / h) * (2.0 * PI * c.frequency_hz * h * t).sin();
            }
        }
        let noise_std = c.amplitude * c.noise_level;
        if noise_std > 0.0 {
            value += noise_std * self.gaussian();
        }
        self.index += 1;
        value
    }
}

impl SampleLink for SyntheticSource {
    fn read_sample(&mut self) -> Option<Sample> {
        if let Some(limit) = self.config.limit {
            if self.index >= limit {
                return None;
            }
        }

        let now = Instant::now();
        if self.config.paced {
            let started = *self.started.get_or_insert(now);
            let due = started
                + Duration::from_secs_f64(self.index as f64 / self.config.sample_rate_hz);
            if now < due {
                return None;
            }
        }

        let filtered = self.next_value();
        Some(Sample::new(self.config.baseline + filtered, filtered, now))
    }

    fn stats(&self) -> LinkStats {
        LinkStats {
            samples: self.index,
            ..LinkStats::default()
        }
    }

    fn is_exhausted(&self) -> bool {
        self.config.limit.is_some_and(|limit| self.index >= limit)
    }
}
