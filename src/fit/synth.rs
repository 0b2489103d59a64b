//! Synthetic waveforms for exercising and comparing fit methods.
//!
//! Parameters are drawn uniformly from physiological ranges. Noise is white
//! gaussian noise convolved with a decaying exponential kernel, which gives it
//! the low-frequency drift seen in real recordings.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use super::{FitModel, FitResult, WaveformSample};
use crate::Result;

const KERNEL_DURATION: f64 = 0.1;
const KERNEL_GAIN: f64 = 0.01;

/// One generated example.
#[derive(Debug, Clone)]
pub struct SyntheticExample {
    /// Model used to generate the trace
    pub model: FitModel,
    /// True parameters
    pub params: Vec<f64>,
    /// Noisy trace
    pub sample: WaveformSample,
    /// Noiseless trace at the same times
    pub true_values: Vec<f64>,
}

fn time_base(duration: f64, sample_rate: f64) -> Vec<f64> {
    let dt = 1.0 / sample_rate;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let n = (duration * sample_rate - 1e-9).ceil() as usize;
    #[allow(clippy::cast_precision_loss)]
    (0..n).map(|i| i as f64 * dt).collect()
}

/// Exponentially filtered gaussian noise of length `len`.
fn filtered_noise<R: Rng + ?Sized>(rng: &mut R, len: usize, dt: f64, tau: f64, amp: f64) -> Vec<f64> {
    let kernel = time_base(KERNEL_DURATION, 1.0 / dt)
        .into_iter()
        .map(|t| KERNEL_GAIN * (-t / tau).exp())
        .collect::<Vec<_>>();
    let raw: Vec<f64> = (0..len + kernel.len())
        .map(|_| {
            let z: f64 = StandardNormal.sample(rng);
            amp * z
        })
        .collect();
    // "valid" convolution, truncated to the trace length
    (0..len)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * raw[i + kernel.len() - 1 - k])
                .sum()
        })
        .collect()
}

/// Generates noisy single-exponential traces.
#[derive(Debug, Clone)]
pub struct ExpGenerator {
    times: Vec<f64>,
    dt: f64,
}

impl ExpGenerator {
    /// Generator for traces of `duration` seconds at `sample_rate` Hz.
    #[must_use]
    pub fn new(duration: f64, sample_rate: f64) -> Self {
        Self {
            times: time_base(duration, sample_rate),
            dt: 1.0 / sample_rate,
        }
    }

    /// Draw one example.
    ///
    /// # Errors
    ///
    /// Returns an error only if the time base is degenerate (fewer than two samples).
    pub fn make_example<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<SyntheticExample> {
        let params = vec![
            rng.gen_range(-80e-3..-60e-3),
            rng.gen_range(-100e-3..100e-3),
            rng.gen_range(5e-3..500e-3),
        ];
        let model = FitModel::ExponentialDecay;
        let true_values = model.evaluate(&params, &self.times);
        let noise_amp = rng.gen_range(0.001..0.01);
        let noise = filtered_noise(rng, self.times.len(), self.dt, 50e-3, noise_amp);
        let values = true_values.iter().zip(&noise).map(|(y, n)| y + n).collect();
        Ok(SyntheticExample {
            model,
            params,
            sample: WaveformSample::new(self.times.clone(), values)?,
            true_values,
        })
    }
}

/// Generates noisy PSP traces.
#[derive(Debug, Clone)]
pub struct PspGenerator {
    times: Vec<f64>,
    dt: f64,
    model: FitModel,
}

impl PspGenerator {
    /// Generator for traces of `duration` seconds at `sample_rate` Hz using the default PSP template.
    #[must_use]
    pub fn new(duration: f64, sample_rate: f64) -> Self {
        Self {
            times: time_base(duration, sample_rate),
            dt: 1.0 / sample_rate,
            model: FitModel::psp(),
        }
    }

    /// Draw one example. Decay tau is 2–10× the rise time.
    ///
    /// # Errors
    ///
    /// Returns an error only if the time base is degenerate (fewer than two samples).
    pub fn make_example<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<SyntheticExample> {
        let rise_time = rng.gen_range(0.5e-3..10e-3);
        let params = vec![
            rng.gen_range(-80e-3..-60e-3),
            rng.gen_range(-10e-3..10e-3),
            rise_time,
            rng.gen_range(2.0..10.0) * rise_time,
        ];
        let true_values = self.model.evaluate(&params, &self.times);
        let noise_tau = rng.gen_range(10e-3..100e-3);
        let noise_amp = rng.gen_range(0.001..0.003);
        let noise = filtered_noise(rng, self.times.len(), self.dt, noise_tau, noise_amp);
        let values = true_values.iter().zip(&noise).map(|(y, n)| y + n).collect();
        Ok(SyntheticExample {
            model: self.model,
            params,
            sample: WaveformSample::new(self.times.clone(), values)?,
            true_values,
        })
    }
}

/// How far a fit landed from the generating parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FitComparison {
    /// `true − fitted` per parameter
    pub param_errors: Vec<(&'static str, f64)>,
    /// Residual norm between the fitted curve and the noiseless trace
    pub true_error: f64,
}

impl FitComparison {
    /// Compare a fit result against the example that produced its input.
    #[must_use]
    pub fn new(example: &SyntheticExample, result: &FitResult) -> Self {
        let param_errors = example
            .model
            .param_names()
            .iter()
            .zip(example.params.iter().zip(result.params()))
            .map(|(name, (truth, fitted))| (*name, truth - fitted))
            .collect();
        let fitted = result.evaluate(example.sample.times());
        let true_error = fitted
            .iter()
            .zip(&example.true_values)
            .map(|(f, t)| (f - t).powi(2))
            .sum::<f64>()
            .sqrt();
        Self {
            param_errors,
            true_error,
        }
    }
}
