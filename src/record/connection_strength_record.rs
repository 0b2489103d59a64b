//! Per-pair connection strength summary
//!
//! One record per ordered cell pair, with a block of statistics for each clamp
//! mode (current clamp and voltage clamp). Each block compares foreground pulse
//! responses against baseline windows and carries a PSP fit of the averaged
//! response.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How the analysis treated the synapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SynapseType {
    /// Excitatory
    #[serde(rename = "ex")]
    Excitatory,
    /// Inhibitory
    #[serde(rename = "in")]
    Inhibitory,
}

impl SynapseType {
    /// Short label, `"ex"` or `"in"`.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Excitatory => "ex",
            Self::Inhibitory => "in",
        }
    }

    /// Parse `"ex"` or `"in"`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for any other label.
    pub fn from_label(label: &str) -> Result<Self> {
        match label {
            "ex" => Ok(Self::Excitatory),
            "in" => Ok(Self::Inhibitory),
            other => Err(Error::InvalidInput(format!(
                "synapse type must be \"ex\" or \"in\", got {other:?}"
            ))),
        }
    }
}

/// Foreground vs baseline statistics of one response metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    /// Foreground mean
    pub mean: Option<f64>,
    /// Foreground population standard deviation
    pub stdev: Option<f64>,
    /// Baseline mean
    pub base_mean: Option<f64>,
    /// Baseline population standard deviation
    pub base_stdev: Option<f64>,
    /// Two-sample t-test p-value, foreground vs baseline
    pub ttest: Option<f64>,
    /// Two-sample Kolmogorov-Smirnov p-value, foreground vs baseline
    pub ks2samp: Option<f64>,
}

/// PSP fit of an averaged response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PspFitBlock {
    /// Peak amplitude
    pub amp: f64,
    /// Onset time
    pub xoffset: f64,
    /// Baseline
    pub yoffset: f64,
    /// Onset to peak time
    pub rise_time: f64,
    /// Rise exponent of the template
    pub rise_power: f64,
    /// Decay time constant
    pub decay_tau: f64,
    /// Amplitude of a secondary exponential; not produced by the PSP template
    pub exp_amp: Option<f64>,
    /// Residual RMS normalized by the standard deviation of the response
    pub nrmse: f64,
}

/// All statistics for one clamp mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClampStats {
    /// Number of pooled pulse responses
    pub n_samples: usize,
    /// Mean stimulus crosstalk in foreground windows
    pub crosstalk_mean: Option<f64>,
    /// Mean stimulus crosstalk in baseline windows
    pub base_crosstalk_mean: Option<f64>,
    /// Response amplitude
    pub amp: MetricStats,
    /// Deconvolved response amplitude
    pub deconv_amp: MetricStats,
    /// Response latency
    pub latency: MetricStats,
    /// Average response trace
    pub average_response: Option<Vec<f64>>,
    /// Time of the first sample of the average response
    pub average_response_t0: Option<f64>,
    /// Standard deviation of the averaged baseline
    pub average_base_stdev: Option<f64>,
    /// PSP fit of the average response
    pub fit: Option<PspFitBlock>,
}

/// Aggregated strength of one ordered pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStrengthRecord {
    /// Pair these statistics belong to
    pub pair_id: u64,
    /// Excitatory or inhibitory treatment, if decided
    pub synapse_type: Option<SynapseType>,
    /// Current clamp statistics
    pub ic: ClampStats,
    /// Voltage clamp statistics
    pub vc: ClampStats,
}

impl ConnectionStrengthRecord {
    /// Empty record for a pair.
    #[must_use]
    pub fn new(pair_id: u64, synapse_type: Option<SynapseType>) -> Self {
        Self {
            pair_id,
            synapse_type,
            ic: ClampStats::default(),
            vc: ClampStats::default(),
        }
    }

    /// Total pooled pulse responses over both clamp modes.
    #[must_use]
    pub const fn total_samples(&self) -> usize {
        self.ic.n_samples + self.vc.n_samples
    }

    /// Check record consistency before it is persisted.
    ///
    /// # Errors
    ///
    /// Returns `Error::DataQuality` when pulses were pooled but neither clamp
    /// mode carries a fit.
    pub fn validate(&self) -> Result<()> {
        if self.total_samples() > 0 && self.ic.fit.is_none() && self.vc.fit.is_none() {
            return Err(Error::data_quality(
                format!("pair {}", self.pair_id),
                "fit",
                "pulse responses present but no clamp mode has a fit",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> PspFitBlock {
        PspFitBlock {
            amp: 1e-3,
            xoffset: 0.01,
            yoffset: -0.07,
            rise_time: 2e-3,
            rise_power: 2.0,
            decay_tau: 20e-3,
            exp_amp: None,
            nrmse: 0.1,
        }
    }

    #[test]
    fn test_empty_record_is_valid() {
        let record = ConnectionStrengthRecord::new(1, None);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_pulses_without_fit_rejected() {
        let mut record = ConnectionStrengthRecord::new(7, Some(SynapseType::Excitatory));
        record.ic.n_samples = 12;
        let err = record.validate().unwrap_err();
        assert!(err.is_record_scoped());
        assert!(err.to_string().contains("pair 7"));

        record.vc.fit = Some(block());
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_synapse_type_labels() {
        assert_eq!(SynapseType::from_label("ex").unwrap(), SynapseType::Excitatory);
        assert_eq!(SynapseType::Inhibitory.label(), "in");
        assert!(SynapseType::from_label("gap").is_err());
        let json = serde_json::to_string(&ConnectionStrengthRecord::new(1, Some(SynapseType::Inhibitory))).unwrap();
        assert!(json.contains("\"synapse_type\":\"in\""));
    }
}
