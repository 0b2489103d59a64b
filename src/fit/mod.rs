//! Waveform Fit Engine
//!
//! Estimates parameters of a parametric waveform model from a noisy time
//! series, either by nonlinear least-squares minimization or with a learned
//! point estimator.
//!
//! ## Models
//!
//! | Model              | Parameters                                  |
//! |--------------------|---------------------------------------------|
//! | `ExponentialDecay` | `[yoffset, amp, tau]`                       |
//! | `Psp`              | `[yoffset, amp, rise_time, decay_tau]`      |
//!
//! ## Initial guess
//!
//! - `yoffset₀ = y_last`, `amp₀ = y_first − yoffset₀`
//! - exponential: `tau₀ = t_last − t_first`
//! - PSP: `decay_tau₀ = t_last − t_first`, `rise_time₀ = decay_tau₀ / 3`
//!
//! ## Usage
//!
//! ```rust
//! use synphys_core::fit::{fit, evaluate, FitModel, WaveformSample};
//!
//! let times: Vec<f64> = (0..=50).map(|i| f64::from(i) * 0.02).collect();
//! let values = evaluate(&FitModel::ExponentialDecay, &[-0.05, 0.05, 0.3], &times);
//! let sample = WaveformSample::new(times, values)?;
//!
//! let result = fit(&FitModel::ExponentialDecay, &sample);
//! assert!(result.success());
//! assert!((result.params()[2] - 0.3).abs() < 0.03);
//! # Ok::<(), synphys_core::Error>(())
//! ```
//!
//! A fit that does not converge is not an error: the result carries
//! `success = false` and the best parameters found, so aggregation never
//! blocks on a single bad fit.

mod estimator;
mod exp;
mod minimize;
mod psp;
mod sample;
pub mod synth;

pub use estimator::{normalize, Activation, DenseLayer, DenseRegressor, WaveformRegressor};
pub use minimize::{minimize, MinimizeOptions, MinimizeReport};
pub use psp::{rise_tau, DEFAULT_RISE_POWER, DEFAULT_XOFFSET, PSP_BOUNDS};
pub use sample::WaveformSample;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Parametric waveform family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitModel {
    /// `y = yoffset + amp · exp(−t / tau)`
    ExponentialDecay,
    /// Rise/decay post-synaptic potential template with fixed onset and rise power.
    Psp {
        /// Onset time (seconds)
        xoffset: f64,
        /// Exponent of the rising phase
        rise_power: f64,
    },
}

impl FitModel {
    /// PSP model with the default onset (10 ms) and rise power (2).
    #[must_use]
    pub const fn psp() -> Self {
        Self::Psp {
            xoffset: DEFAULT_XOFFSET,
            rise_power: DEFAULT_RISE_POWER,
        }
    }

    /// Short name used in logs and exported tables.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ExponentialDecay => "exponential_decay",
            Self::Psp { .. } => "psp",
        }
    }

    /// Ordered parameter names.
    #[must_use]
    pub const fn param_names(&self) -> &'static [&'static str] {
        match self {
            Self::ExponentialDecay => &["yoffset", "amp", "tau"],
            Self::Psp { .. } => &["yoffset", "amp", "rise_time", "decay_tau"],
        }
    }

    /// Number of parameters.
    #[must_use]
    pub const fn param_count(&self) -> usize {
        self.param_names().len()
    }

    /// Evaluate the model at each time point.
    ///
    /// # Panics
    ///
    /// Panics if `params` has fewer entries than [`FitModel::param_count`].
    #[must_use]
    pub fn evaluate(&self, params: &[f64], times: &[f64]) -> Vec<f64> {
        assert!(
            params.len() >= self.param_count(),
            "{} needs {} parameters, got {}",
            self.name(),
            self.param_count(),
            params.len()
        );
        match *self {
            Self::ExponentialDecay => exp::evaluate(params, times),
            Self::Psp {
                xoffset,
                rise_power,
            } => psp::evaluate(params, times, xoffset, rise_power),
        }
    }

    /// Euclidean norm of `model(params, t) − y`.
    #[must_use]
    pub fn residual_norm(&self, params: &[f64], sample: &WaveformSample) -> f64 {
        self.evaluate(params, sample.times())
            .iter()
            .zip(sample.values())
            .map(|(m, y)| (m - y).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Deterministic starting point for the minimizer.
    #[must_use]
    pub fn initial_guess(&self, sample: &WaveformSample) -> Vec<f64> {
        let yoffset = sample.last();
        let amp = sample.first() - yoffset;
        let span = sample.duration();
        match self {
            Self::ExponentialDecay => vec![yoffset, amp, span],
            Self::Psp { .. } => vec![yoffset, amp, span / 3.0, span],
        }
    }

    /// Box constraints, if the model is bounded.
    #[must_use]
    pub const fn bounds(&self) -> Option<&'static [(f64, f64)]> {
        match self {
            Self::ExponentialDecay => None,
            Self::Psp { .. } => Some(&PSP_BOUNDS),
        }
    }

    /// Closed-form gradient of the residual norm, when one exists.
    #[must_use]
    pub fn gradient(&self, params: &[f64], sample: &WaveformSample) -> Option<Vec<f64>> {
        match self {
            Self::ExponentialDecay => Some(exp::norm_gradient(params, sample)),
            Self::Psp { .. } => None,
        }
    }

    const fn has_analytic_gradient(&self) -> bool {
        matches!(self, Self::ExponentialDecay)
    }
}

/// Evaluate `model` with `params` at `times`. Deterministic.
#[must_use]
pub fn evaluate(model: &FitModel, params: &[f64], times: &[f64]) -> Vec<f64> {
    model.evaluate(params, times)
}

/// Fit `model` to `sample` with the minimizer and default options.
///
/// Uses the analytic gradient when the model has one.
#[must_use]
pub fn fit(model: &FitModel, sample: &WaveformSample) -> FitResult {
    FitEngine::minimizer(*model).fit_minimize(*model, sample)
}

/// How a [`FitEngine`] produces parameters.
#[derive(Debug, Clone)]
pub enum FitMethod {
    /// Nonlinear least-squares minimization of the residual norm.
    Minimize {
        /// Model to fit
        model: FitModel,
        /// Use the closed-form gradient when the model provides one
        analytic_gradient: bool,
    },
    /// Learned forward estimator for the PSP model.
    Estimate {
        /// Model the estimator's outputs parameterize
        model: FitModel,
        /// Regression surface
        regressor: Arc<dyn WaveformRegressor>,
    },
}

impl FitMethod {
    /// The model this method fits.
    #[must_use]
    pub const fn model(&self) -> &FitModel {
        match self {
            Self::Minimize { model, .. } | Self::Estimate { model, .. } => model,
        }
    }
}

type GradientFn = fn(&FitModel, &[f64], &WaveformSample) -> Option<Vec<f64>>;

/// Stateless fitting engine, safe to share across threads.
///
/// The gradient strategy is resolved once at construction.
#[derive(Debug, Clone)]
pub struct FitEngine {
    name: String,
    method: FitMethod,
    options: MinimizeOptions,
    gradient: Option<GradientFn>,
}

impl FitEngine {
    /// Create an engine for a method.
    #[must_use]
    pub fn new(name: impl Into<String>, method: FitMethod, options: MinimizeOptions) -> Self {
        let gradient: Option<GradientFn> = match &method {
            FitMethod::Minimize {
                model,
                analytic_gradient: true,
            } if model.has_analytic_gradient() => Some(FitModel::gradient),
            _ => None,
        };
        Self {
            name: name.into(),
            method,
            options,
            gradient,
        }
    }

    /// Minimizer engine with default options and analytic gradient when available.
    #[must_use]
    pub fn minimizer(model: FitModel) -> Self {
        Self::new(
            "minimize",
            FitMethod::Minimize {
                model,
                analytic_gradient: true,
            },
            MinimizeOptions::default(),
        )
    }

    /// Engine name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fitting method.
    #[must_use]
    pub const fn method(&self) -> &FitMethod {
        &self.method
    }

    /// Whether the minimizer is driven by a closed-form gradient.
    #[must_use]
    pub const fn uses_analytic_gradient(&self) -> bool {
        self.gradient.is_some()
    }

    /// Evaluate the engine's model.
    #[must_use]
    pub fn evaluate(&self, params: &[f64], times: &[f64]) -> Vec<f64> {
        self.method.model().evaluate(params, times)
    }

    /// Fit one sample.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` when an estimator is paired with a
    /// non-PSP model or its expected input length does not match the sample.
    /// Minimizer fits never fail.
    pub fn fit(&self, sample: &WaveformSample) -> Result<FitResult> {
        match &self.method {
            FitMethod::Minimize { model, .. } => Ok(self.fit_minimize(*model, sample)),
            FitMethod::Estimate { model, regressor } => {
                self.fit_estimate(*model, regressor.as_ref(), sample)
            }
        }
    }

    /// Fit many independent samples, in parallel when the `rayon` feature is on.
    #[must_use]
    pub fn fit_batch(&self, samples: &[WaveformSample]) -> Vec<Result<FitResult>> {
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            samples.par_iter().map(|s| self.fit(s)).collect()
        }
        #[cfg(not(feature = "rayon"))]
        {
            samples.iter().map(|s| self.fit(s)).collect()
        }
    }

    fn fit_minimize(&self, model: FitModel, sample: &WaveformSample) -> FitResult {
        let start = Instant::now();
        let init = model.initial_guess(sample);

        // Minimize ½·norm²: same argmin as the norm, smooth at a perfect fit
        let objective = |p: &[f64]| 0.5 * model.residual_norm(p, sample).powi(2);
        let gradient_fn = self.gradient;
        let gradient = |p: &[f64]| {
            let norm = model.residual_norm(p, sample);
            gradient_fn
                .and_then(|g| g(&model, p, sample))
                .unwrap_or_else(|| vec![0.0; p.len()])
                .into_iter()
                .map(|d| d * norm)
                .collect::<Vec<f64>>()
        };
        let grad_ref: Option<&minimize::Gradient<'_>> = if gradient_fn.is_some() {
            Some(&gradient)
        } else {
            None
        };

        let report = minimize(&objective, grad_ref, &init, model.bounds(), &self.options);
        let fit_time = start.elapsed();
        let error = (2.0 * report.fun).sqrt();

        debug!(
            engine = %self.name,
            model = model.name(),
            success = report.success,
            iterations = report.iterations,
            error,
            reason = report.message,
            "waveform fit finished"
        );

        FitResult {
            method: self.name.clone(),
            model,
            params: report.x,
            initial: init,
            error: Some(error),
            iterations: Some(report.iterations),
            evaluations: Some(report.evaluations),
            success: report.success,
            fit_time,
        }
    }

    fn fit_estimate(
        &self,
        model: FitModel,
        regressor: &dyn WaveformRegressor,
        sample: &WaveformSample,
    ) -> Result<FitResult> {
        if !matches!(model, FitModel::Psp { .. }) {
            return Err(Error::InvalidInput(format!(
                "estimators predict PSP parameters, not {}",
                model.name()
            )));
        }
        if regressor.input_len() != sample.len() {
            return Err(Error::InvalidInput(format!(
                "estimator expects {} samples, waveform has {}",
                regressor.input_len(),
                sample.len()
            )));
        }
        let start = Instant::now();
        let (normalized, offset, scale) = normalize(sample.values());
        let out = regressor.predict(&normalized);
        let params = vec![out[0].mul_add(scale, offset), out[1] * scale, out[2], out[3]];

        debug!(engine = %self.name, model = model.name(), "waveform estimate finished");

        Ok(FitResult {
            method: self.name.clone(),
            model,
            params,
            initial: vec![offset, scale],
            error: None,
            iterations: None,
            evaluations: None,
            success: true,
            fit_time: start.elapsed(),
        })
    }
}

/// Parameters and diagnostics from one fit. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    method: String,
    model: FitModel,
    params: Vec<f64>,
    initial: Vec<f64>,
    error: Option<f64>,
    iterations: Option<usize>,
    evaluations: Option<usize>,
    success: bool,
    fit_time: Duration,
}

impl FitResult {
    /// Name of the engine that produced this result.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Fitted model.
    #[must_use]
    pub const fn model(&self) -> &FitModel {
        &self.model
    }

    /// Fitted parameter vector, ordered as [`FitModel::param_names`].
    #[must_use]
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// Look up a fitted parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<f64> {
        self.model
            .param_names()
            .iter()
            .position(|n| *n == name)
            .map(|i| self.params[i])
    }

    /// Starting point. For estimator results this is `[offset, scale]`
    /// used to normalize the waveform.
    #[must_use]
    pub fn initial(&self) -> &[f64] {
        &self.initial
    }

    /// Achieved residual norm; `None` for estimator results.
    #[must_use]
    pub const fn error(&self) -> Option<f64> {
        self.error
    }

    /// Minimizer iterations; `None` for estimator results.
    #[must_use]
    pub const fn iterations(&self) -> Option<usize> {
        self.iterations
    }

    /// Objective evaluations; `None` for estimator results.
    #[must_use]
    pub const fn evaluations(&self) -> Option<usize> {
        self.evaluations
    }

    /// Whether the fit converged.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.success
    }

    /// Wall-clock fit duration.
    #[must_use]
    pub const fn fit_time(&self) -> Duration {
        self.fit_time
    }

    /// Evaluate the fitted model at `times`.
    #[must_use]
    pub fn evaluate(&self, times: &[f64]) -> Vec<f64> {
        self.model.evaluate(&self.params, times)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp_sample(params: &[f64]) -> WaveformSample {
        let times: Vec<f64> = (0..=50).map(|i| f64::from(i) * 0.02).collect();
        let values = evaluate(&FitModel::ExponentialDecay, params, &times);
        WaveformSample::new(times, values).unwrap()
    }

    #[test]
    fn test_initial_guess_exponential() {
        let sample = WaveformSample::new(vec![0.5, 1.0, 2.5], vec![3.0, 2.0, 1.0]).unwrap();
        let init = FitModel::ExponentialDecay.initial_guess(&sample);
        assert_eq!(init, vec![1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_initial_guess_psp() {
        let sample = WaveformSample::new(vec![0.0, 0.03, 0.06], vec![0.0, 0.4, -0.2]).unwrap();
        let init = FitModel::psp().initial_guess(&sample);
        assert!((init[0] - (-0.2)).abs() < f64::EPSILON);
        assert!((init[1] - 0.2).abs() < f64::EPSILON);
        assert!((init[2] - 0.02).abs() < 1e-15);
        assert!((init[3] - 0.06).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fit_recovers_exponential() {
        let truth = [-0.05, 0.05, 0.3];
        let result = fit(&FitModel::ExponentialDecay, &exp_sample(&truth));
        assert!(result.success());
        for (got, want) in result.params().iter().zip(truth) {
            assert!(((got - want) / want).abs() < 0.01, "{got} vs {want}");
        }
        assert!(result.error().unwrap() < 1e-6);
        assert_eq!(result.initial().len(), 3);
    }

    #[test]
    fn test_engine_without_gradient_still_fits() {
        let engine = FitEngine::new(
            "no_jac",
            FitMethod::Minimize {
                model: FitModel::ExponentialDecay,
                analytic_gradient: false,
            },
            MinimizeOptions::default(),
        );
        assert!(!engine.uses_analytic_gradient());
        let result = engine.fit(&exp_sample(&[0.0, 1.0, 0.2])).unwrap();
        assert!((result.param("tau").unwrap() - 0.2).abs() < 0.01);
    }

    #[test]
    fn test_psp_never_requests_analytic_gradient() {
        let engine = FitEngine::minimizer(FitModel::psp());
        assert!(!engine.uses_analytic_gradient());
    }

    #[test]
    fn test_nonconvergence_still_returns_params() {
        let engine = FitEngine::new(
            "starved",
            FitMethod::Minimize {
                model: FitModel::ExponentialDecay,
                analytic_gradient: true,
            },
            MinimizeOptions {
                max_iterations: 1,
                ..MinimizeOptions::default()
            },
        );
        let result = engine.fit(&exp_sample(&[-0.05, 0.05, 0.3])).unwrap();
        assert!(!result.success());
        assert_eq!(result.params().len(), 3);
        assert_eq!(result.iterations(), Some(1));
    }

    #[test]
    fn test_param_lookup_by_name() {
        let result = fit(&FitModel::ExponentialDecay, &exp_sample(&[0.0, 1.0, 0.25]));
        assert!(result.param("rise_time").is_none());
        assert!(result.param("tau").is_some());
    }
}
