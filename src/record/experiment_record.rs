//! Experiment and slice records - roots of the per-experiment data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata the pipeline reads from an experiment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentMeta {
    /// LIMS cluster grouping the cells recorded in this experiment.
    pub lims_cell_cluster_id: Option<u64>,
}

/// Experiment record.
///
/// `ext_id` is the stable external identifier used as the pipeline job id;
/// `acq_timestamp` is the acquisition time (unix seconds) it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    id: u64,
    ext_id: String,
    acq_timestamp: f64,
    slice_id: Option<u64>,
    storage_path: Option<String>,
    meta: ExperimentMeta,
    modified_at: DateTime<Utc>,
}

impl Experiment {
    /// Create an experiment; `ext_id` is formatted from the timestamp.
    #[must_use]
    pub fn new(id: u64, acq_timestamp: f64) -> Self {
        ExperimentBuilder::new(id, acq_timestamp).build()
    }

    /// Builder for experiments with optional fields.
    #[must_use]
    pub fn builder(id: u64, acq_timestamp: f64) -> ExperimentBuilder {
        ExperimentBuilder::new(id, acq_timestamp)
    }

    /// Database id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// External id (pipeline job id).
    #[must_use]
    pub fn ext_id(&self) -> &str {
        &self.ext_id
    }

    /// Acquisition timestamp, unix seconds.
    #[must_use]
    pub const fn acq_timestamp(&self) -> f64 {
        self.acq_timestamp
    }

    /// Slice this experiment was recorded from.
    #[must_use]
    pub const fn slice_id(&self) -> Option<u64> {
        self.slice_id
    }

    /// Path of the raw data relative to the data root.
    #[must_use]
    pub fn storage_path(&self) -> Option<&str> {
        self.storage_path.as_deref()
    }

    /// Experiment metadata.
    #[must_use]
    pub const fn meta(&self) -> &ExperimentMeta {
        &self.meta
    }

    /// Last modification time of the record.
    #[must_use]
    pub const fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }
}

/// Builder for `Experiment`.
#[derive(Debug)]
pub struct ExperimentBuilder {
    id: u64,
    acq_timestamp: f64,
    ext_id: Option<String>,
    slice_id: Option<u64>,
    storage_path: Option<String>,
    meta: ExperimentMeta,
    modified_at: DateTime<Utc>,
}

impl ExperimentBuilder {
    /// Create a builder with required fields.
    #[must_use]
    pub fn new(id: u64, acq_timestamp: f64) -> Self {
        Self {
            id,
            acq_timestamp,
            ext_id: None,
            slice_id: None,
            storage_path: None,
            meta: ExperimentMeta::default(),
            modified_at: Utc::now(),
        }
    }

    /// Override the external id (default: timestamp with 3 decimals).
    #[must_use]
    pub fn ext_id(mut self, ext_id: impl Into<String>) -> Self {
        self.ext_id = Some(ext_id.into());
        self
    }

    /// Set the slice id.
    #[must_use]
    pub const fn slice_id(mut self, slice_id: u64) -> Self {
        self.slice_id = Some(slice_id);
        self
    }

    /// Set the raw data storage path.
    #[must_use]
    pub fn storage_path(mut self, path: impl Into<String>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Set the LIMS cell cluster id.
    #[must_use]
    pub const fn lims_cell_cluster_id(mut self, cluster_id: u64) -> Self {
        self.meta.lims_cell_cluster_id = Some(cluster_id);
        self
    }

    /// Set a custom modification timestamp.
    #[must_use]
    pub const fn modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = modified_at;
        self
    }

    /// Build the `Experiment`.
    #[must_use]
    pub fn build(self) -> Experiment {
        Experiment {
            id: self.id,
            ext_id: self
                .ext_id
                .unwrap_or_else(|| format!("{:.3}", self.acq_timestamp)),
            acq_timestamp: self.acq_timestamp,
            slice_id: self.slice_id,
            storage_path: self.storage_path,
            meta: self.meta,
            modified_at: self.modified_at,
        }
    }
}

/// Slice record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    /// Database id
    pub id: u64,
    /// Acquisition timestamp of the slice, unix seconds
    pub acq_timestamp: f64,
    /// Species name, e.g. "mouse" or "human"
    pub species: Option<String>,
    /// Animal age in days
    pub age: Option<u32>,
}
