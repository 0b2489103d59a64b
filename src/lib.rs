//! # synphys-core: Multipatch Synaptic Physiology Analysis Core
//!
//! **Version**: 0.1.0
//!
//! Waveform fitting and dependency-aware pipeline scheduling for a
//! multipatch electrophysiology database.
//!
//! ## Components
//!
//! - [`fit`]: parametric waveform models (exponential decay, PSP template)
//!   fitted by bounded quasi-Newton minimization or a learned estimator
//! - [`pipeline`]: analysis modules arranged in a dependency DAG; decides
//!   which jobs need (re)processing from dependency completion times and
//!   external-source content hashes
//! - [`morphology`]: normalization of free-form categorical annotations into
//!   typed morphology records
//! - [`strength`]: per-pair connection strength statistics
//! - [`store`]: the record store contract and an in-memory implementation
//! - [`export`]: Arrow/Parquet export of fit results
//! - [`record`]: experiment, cell, pair and derived analysis records
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Example Usage
//!
//! ```rust
//! use synphys_core::fit::{FitEngine, FitModel, WaveformSample};
//!
//! let times: Vec<f64> = (0..=50).map(|i| f64::from(i) * 0.02).collect();
//! let values: Vec<f64> = times.iter().map(|t| -0.05 + 0.05 * (-t / 0.3).exp()).collect();
//! let sample = WaveformSample::new(times, values)?;
//!
//! let engine = FitEngine::minimizer(FitModel::ExponentialDecay);
//! let result = engine.fit(&sample)?;
//! assert!(result.success());
//! # Ok::<(), synphys_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod export;
pub mod fit;
pub mod morphology;
pub mod pipeline;
pub mod record;
pub mod store;
pub mod strength;

pub use error::{Error, Result};
