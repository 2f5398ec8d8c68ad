// Temporal module - Time-domain feature extraction
//
// Statistics use the population convention (divide by N), so `std` is the
// square root of `variance` and `rms² = variance + mean²`.

pub fn compute_mean(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    signal.iter().sum::<f64>() / signal.len() as f64
}

pub fn compute_variance(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let mean = compute_mean(signal);
    signal.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / signal.len() as f64
}

/// Sum of squared samples
pub fn compute_energy(signal: &[f64]) -> f64 {
    signal.iter().map(|x| x * x).sum()
}

pub fn compute_rms(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    (compute_energy(signal) / signal.len() as f64).sqrt()
}

/// Count sign changes between consecutive nonzero samples
///
/// Exact zeros carry no sign and are skipped, so `[1, 0, -1]` is one
/// crossing and a run of zeros is none.
pub fn compute_zero_crossings(signal: &[f64]) -> usize {
    let mut previous_positive: Option<bool> = None;
    let mut crossings = 0;
    for &x in signal {
        if x == 0.0 {
            continue;
        }
        let positive = x > 0.0;
        if let Some(prev) = previous_positive {
            if prev != positive {
                crossings += 1;
            }
        }
        previous_positive = Some(positive);
    }
    crossings
}

/// Zero crossings per sample
pub fn compute_zero_crossing_rate(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    compute_zero_crossings(signal) as f64 / signal.len() as f64
}
