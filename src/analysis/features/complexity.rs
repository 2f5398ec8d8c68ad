// Hjorth parameters
//
// mobility   = rms(x') / rms(x)
// complexity = (rms(x'') / rms(x')) / mobility
//
// x' and x'' are the first and second differences over the full window.
// Any zero denominator yields 0.

use super::temporal::compute_rms;

fn differences(signal: &[f64]) -> Vec<f64> {
    signal.windows(2).map(|w| w[1] - w[0]).collect()
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Returns `(mobility, complexity)`
pub fn compute_hjorth(signal: &[f64]) -> (f64, f64) {
    let first = differences(signal);
    let second = differences(&first);

    let rms_signal = compute_rms(signal);
    let rms_first = compute_rms(&first);
    let rms_second = compute_rms(&second);

    let mobility = ratio(rms_first, rms_signal);
    let complexity = ratio(ratio(rms_second, rms_first), mobility);
    (mobility, complexity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_is_degenerate() {
        assert_eq!(compute_hjorth(&[0.0; 300]), (0.0, 0.0));
    }

    #[test]
    fn test_constant_signal_has_zero_mobility() {
        // Nonzero RMS but flat derivative
        assert_eq!(compute_hjorth(&[2.0; 64]), (0.0, 0.0));
    }

    #[test]
    fn test_sine_complexity_close_to_one() {
        let signal: Vec<f64> = (0..1000)
            .map(|i| (2.0 * std::f64::consts::PI * 5.0 * i as f64 / 200.0).sin())
            .collect();
        let (mobility, complexity) = compute_hjorth(&signal);
        // a sampled sine differentiates to amplitude 2*sin(pi*f/fs)
        let expected = 2.0 * (std::f64::consts::PI * 5.0 / 200.0).sin();
        assert!((mobility - expected).abs() < 0.01, "mobility {}", mobility);
        assert!((complexity - 1.0).abs() < 0.05, "complexity {}", complexity);
    }
}
