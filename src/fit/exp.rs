//! Single exponential decay: `y = yoffset + amp * exp(-t / tau)`

use super::WaveformSample;

/// Evaluate the exponential at each time point.
#[must_use]
pub fn evaluate(params: &[f64], times: &[f64]) -> Vec<f64> {
    let (yoffset, amp, tau) = (params[0], params[1], params[2]);
    times
        .iter()
        .map(|&t| amp.mul_add((-t / tau).exp(), yoffset))
        .collect()
}

/// Analytic gradient of the residual norm with respect to `[yoffset, amp, tau]`.
///
/// ```text
/// norm     = sqrt(Σ (yoffset + amp·e^(−t/tau) − y)²)
/// ∂/∂yoff  = (N·yoffset + Σ amp·e^(−t/tau) − Σ y) / norm
/// ∂/∂amp   = Σ (yoffset + amp·e^(−t/tau) − y)·e^(−t/tau) / norm
/// ∂/∂tau   = Σ amp·(yoffset + amp·e^(−t/tau) − y)·e^(−t/tau)·t / tau² / norm
/// ```
///
/// The gradient is undefined when the norm is zero (a perfect fit). That case
/// returns a zero vector instead of propagating `NaN`.
#[must_use]
pub fn norm_gradient(params: &[f64], sample: &WaveformSample) -> Vec<f64> {
    let (yoffset, amp, tau) = (params[0], params[1], params[2]);
    let mut sum_sq = 0.0;
    let mut d_yoff = 0.0;
    let mut d_amp = 0.0;
    let mut d_tau = 0.0;
    for (&t, &y) in sample.times().iter().zip(sample.values()) {
        let decay = (-t / tau).exp();
        let residual = amp.mul_add(decay, yoffset) - y;
        sum_sq += residual * residual;
        // N·yoffset + Σ amp·e − Σ y is Σ residual
        d_yoff += residual;
        d_amp += residual * decay;
        d_tau += amp * residual * decay * t / (tau * tau);
    }
    let norm = sum_sq.sqrt();
    // TODO: decide whether a zero residual should stop the minimizer outright
    // instead of reporting a flat gradient.
    if norm == 0.0 || !norm.is_finite() {
        return vec![0.0; 3];
    }
    vec![d_yoff / norm, d_amp / norm, d_tau / norm]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn residual_norm(params: &[f64], sample: &WaveformSample) -> f64 {
        evaluate(params, sample.times())
            .iter()
            .zip(sample.values())
            .map(|(m, y)| (m - y).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    #[test]
    fn test_evaluate_at_zero_is_offset_plus_amp() {
        let y = evaluate(&[-0.07, 0.01, 0.02], &[0.0]);
        assert!((y[0] - (-0.06)).abs() < 1e-15);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let sample = WaveformSample::regular(0.0, 0.01, vec![0.3, 0.2, 0.15, 0.12, 0.1, 0.09])
            .unwrap();
        let params = [0.05, 0.2, 0.04];
        let analytic = norm_gradient(&params, &sample);
        for i in 0..3 {
            let h = 1e-7;
            let mut plus = params;
            let mut minus = params;
            plus[i] += h;
            minus[i] -= h;
            let numeric =
                (residual_norm(&plus, &sample) - residual_norm(&minus, &sample)) / (2.0 * h);
            assert!(
                (numeric - analytic[i]).abs() < 1e-4,
                "component {i}: numeric {numeric} vs analytic {}",
                analytic[i]
            );
        }
    }

    #[test]
    fn test_gradient_zero_at_perfect_fit() {
        let params = [0.0, 1.0, 0.5];
        let times: Vec<f64> = (0..10).map(|i| f64::from(i) * 0.1).collect();
        let values = evaluate(&params, &times);
        let sample = WaveformSample::new(times, values).unwrap();
        let grad = norm_gradient(&params, &sample);
        assert!(grad.iter().all(|g| *g == 0.0));
    }
}
