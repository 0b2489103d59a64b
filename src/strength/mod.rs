//! Connection strength aggregation
//!
//! Each pulse delivered to the presynaptic cell yields a response measurement
//! in a foreground window; matching baseline windows give the null
//! distribution. For each clamp mode the foreground and baseline measurements
//! are summarized and compared, and the averaged response is fitted with the
//! PSP template.

pub mod stats;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fit::{FitEngine, FitModel, WaveformSample};
use crate::record::{
    ClampStats, ConnectionStrengthRecord, Experiment, MetricStats, Pair, PspFitBlock, SynapseType,
};
use crate::Result;

/// Measurements taken from one response (or baseline) window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PulseMeasurement {
    /// Response amplitude
    pub amp: f64,
    /// Amplitude of the deconvolved response
    pub deconv_amp: Option<f64>,
    /// Onset latency
    pub latency: Option<f64>,
    /// Stimulus crosstalk
    pub crosstalk: Option<f64>,
}

/// Pooled windows of one clamp mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClampPulses {
    /// Windows following a presynaptic spike
    pub foreground: Vec<PulseMeasurement>,
    /// Windows without a presynaptic spike
    pub background: Vec<PulseMeasurement>,
    /// Average of the foreground responses
    pub average_response: Option<WaveformSample>,
}

/// All measurements of one pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairPulses {
    /// Excitatory or inhibitory treatment
    pub synapse_type: Option<SynapseType>,
    /// Current clamp windows
    pub ic: ClampPulses,
    /// Voltage clamp windows
    pub vc: ClampPulses,
}

/// Supplies pulse measurements for pairs.
pub trait PulseSource: Send + Sync + std::fmt::Debug {
    /// Measurements for a pair, `None` if the pair was never stimulated.
    ///
    /// # Errors
    ///
    /// Implementation specific; an error fails the experiment's job.
    fn pair_pulses(&self, experiment: &Experiment, pair: &Pair) -> Result<Option<PairPulses>>;
}

/// In-memory pulse measurements keyed by pair id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PulseTable {
    pairs: BTreeMap<u64, PairPulses>,
}

impl PulseTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the measurements of a pair.
    pub fn insert(&mut self, pair_id: u64, pulses: PairPulses) {
        self.pairs.insert(pair_id, pulses);
    }
}

impl PulseSource for PulseTable {
    fn pair_pulses(&self, _experiment: &Experiment, pair: &Pair) -> Result<Option<PairPulses>> {
        Ok(self.pairs.get(&pair.id).cloned())
    }
}

fn metric_stats(foreground: &[f64], background: &[f64]) -> MetricStats {
    MetricStats {
        mean: stats::mean(foreground),
        stdev: stats::stdev(foreground),
        base_mean: stats::mean(background),
        base_stdev: stats::stdev(background),
        ttest: stats::ttest_ind(foreground, background),
        ks2samp: stats::ks_2samp(foreground, background).map(|(_, p)| p),
    }
}

fn collect(windows: &[PulseMeasurement], field: impl Fn(&PulseMeasurement) -> Option<f64>) -> Vec<f64> {
    windows.iter().filter_map(field).collect()
}

/// Fit the averaged response and summarize the fit.
///
/// Times are taken relative to the first sample so the template onset lines
/// up with the stimulus.
fn fit_average(response: &WaveformSample, engine: &FitEngine) -> Result<PspFitBlock> {
    let t0 = response.start_time();
    let times = response.times().iter().map(|t| t - t0).collect();
    let sample = WaveformSample::new(times, response.values().to_vec())?;
    let result = engine.fit(&sample)?;

    let (xoffset, rise_power) = match result.model() {
        FitModel::Psp { xoffset, rise_power } => (*xoffset, *rise_power),
        FitModel::ExponentialDecay => (0.0, 1.0),
    };
    let fitted = result.evaluate(sample.times());
    let residual: Vec<f64> = fitted.iter().zip(sample.values()).map(|(f, y)| f - y).collect();
    let rms = stats::mean(&residual.iter().map(|r| r * r).collect::<Vec<_>>())
        .unwrap_or(0.0)
        .sqrt();
    let spread = stats::stdev(sample.values()).filter(|s| *s > 0.0).unwrap_or(1.0);

    let param = |name: &str| result.param(name).unwrap_or(f64::NAN);
    Ok(PspFitBlock {
        amp: param("amp"),
        xoffset,
        yoffset: param("yoffset"),
        rise_time: param("rise_time"),
        rise_power,
        decay_tau: result.param("decay_tau").or_else(|| result.param("tau")).unwrap_or(f64::NAN),
        exp_amp: None,
        nrmse: rms / spread,
    })
}

fn clamp_stats(pulses: &ClampPulses, engine: &FitEngine) -> Result<ClampStats> {
    let fg = &pulses.foreground;
    let bg = &pulses.background;
    let mut clamp = ClampStats {
        n_samples: fg.len(),
        crosstalk_mean: stats::mean(&collect(fg, |m| m.crosstalk)),
        base_crosstalk_mean: stats::mean(&collect(bg, |m| m.crosstalk)),
        amp: metric_stats(&collect(fg, |m| Some(m.amp)), &collect(bg, |m| Some(m.amp))),
        deconv_amp: metric_stats(&collect(fg, |m| m.deconv_amp), &collect(bg, |m| m.deconv_amp)),
        latency: metric_stats(&collect(fg, |m| m.latency), &collect(bg, |m| m.latency)),
        ..ClampStats::default()
    };

    if let Some(response) = &pulses.average_response {
        let fit = fit_average(response, engine)?;
        let onset = response.start_time() + fit.xoffset;
        let baseline: Vec<f64> = response
            .times()
            .iter()
            .zip(response.values())
            .filter(|(t, _)| **t < onset)
            .map(|(_, v)| *v)
            .collect();
        clamp.average_response = Some(response.values().to_vec());
        clamp.average_response_t0 = Some(response.start_time());
        clamp.average_base_stdev = stats::stdev(&baseline);
        clamp.fit = Some(fit);
    }
    Ok(clamp)
}

/// Build the connection strength record of a pair.
///
/// # Errors
///
/// Propagates fit-engine input errors; the record itself is not validated here.
pub fn aggregate_pair(pair: &Pair, pulses: &PairPulses, engine: &FitEngine) -> Result<ConnectionStrengthRecord> {
    let record = ConnectionStrengthRecord {
        pair_id: pair.id,
        synapse_type: pulses.synapse_type,
        ic: clamp_stats(&pulses.ic, engine)?,
        vc: clamp_stats(&pulses.vc, engine)?,
    };
    debug!(
        pair = pair.id,
        ic_samples = record.ic.n_samples,
        vc_samples = record.vc.n_samples,
        "Aggregated connection strength"
    );
    Ok(record)
}
