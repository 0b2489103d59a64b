//! Waveform samples - immutable (time, amplitude) series

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// An ordered series of `(time, amplitude)` pairs.
///
/// Times are in seconds and strictly increasing; the sampling interval may be
/// fixed or variable. Samples are immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformSample {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl WaveformSample {
    /// Create a sample from explicit time and value vectors.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the lengths differ, fewer than two
    /// points are given, any value is non-finite, or times are not strictly
    /// increasing.
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if times.len() != values.len() {
            return Err(Error::InvalidInput(format!(
                "time and value lengths differ ({} vs {})",
                times.len(),
                values.len()
            )));
        }
        if times.len() < 2 {
            return Err(Error::InvalidInput(
                "waveform needs at least 2 samples".to_string(),
            ));
        }
        if times.iter().chain(values.iter()).any(|v| !v.is_finite()) {
            return Err(Error::InvalidInput(
                "waveform contains non-finite values".to_string(),
            ));
        }
        if let Some(i) = times.windows(2).position(|w| w[1] <= w[0]) {
            return Err(Error::InvalidInput(format!(
                "times must be strictly increasing (index {})",
                i + 1
            )));
        }
        Ok(Self { times, values })
    }

    /// Create a regularly sampled waveform starting at `t0` with interval `dt`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `dt` is not positive or the values are
    /// rejected by [`WaveformSample::new`].
    pub fn regular(t0: f64, dt: f64, values: Vec<f64>) -> Result<Self> {
        if !(dt > 0.0) {
            return Err(Error::InvalidInput(format!(
                "sample interval must be positive, got {dt}"
            )));
        }
        #[allow(clippy::cast_precision_loss)]
        let times = (0..values.len()).map(|i| t0 + dt * i as f64).collect();
        Self::new(times, values)
    }

    /// Sample times in seconds.
    #[must_use]
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Sample amplitudes.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of samples (always >= 2).
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false; kept for API symmetry with collections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Time between first and last sample.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.times[self.times.len() - 1] - self.times[0]
    }

    /// Time of the first sample.
    #[must_use]
    pub fn start_time(&self) -> f64 {
        self.times[0]
    }

    /// First amplitude.
    #[must_use]
    pub fn first(&self) -> f64 {
        self.values[0]
    }

    /// Last amplitude.
    #[must_use]
    pub fn last(&self) -> f64 {
        self.values[self.values.len() - 1]
    }
}
