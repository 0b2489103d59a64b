//! External lookups feeding the morphology import
//!
//! The morphology annotation database and LIMS are collaborators outside the
//! pipeline. Both are reached through narrow traits so the importer and the
//! freshness check can run against files, fixtures or live services.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{content_hash, MorphologyRow};
use crate::config::MorphologyConfig;
use crate::{Error, Result};

/// Snapshot of the external morphology annotations, keyed by LIMS specimen id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MorphologyTable {
    rows: BTreeMap<u64, MorphologyRow>,
}

impl MorphologyTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the row of a specimen.
    pub fn insert(&mut self, specimen_id: u64, row: MorphologyRow) {
        self.rows.insert(specimen_id, row);
    }

    /// Row for a specimen.
    #[must_use]
    pub fn lookup(&self, specimen_id: u64) -> Option<&MorphologyRow> {
        self.rows.get(&specimen_id)
    }

    /// Content hash of a specimen's row.
    ///
    /// A specimen without a row hashes like an empty row, so "not annotated"
    /// is a stable, comparable state.
    #[must_use]
    pub fn content_hash(&self, specimen_id: u64) -> String {
        self.lookup(specimen_id)
            .map_or_else(|| content_hash(&MorphologyRow::new()), content_hash)
    }

    /// Number of specimens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parse a flat JSON object `{"<specimen id>": {column: value, ...}, ...}`.
    ///
    /// # Errors
    ///
    /// `Error::Json` for malformed JSON, `Error::InvalidInput` for a key that
    /// is not an integer specimen id.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, MorphologyRow> = serde_json::from_str(json)?;
        let rows: BTreeMap<u64, MorphologyRow> = raw
            .into_iter()
            .map(|(key, row)| {
                key.trim()
                    .parse::<u64>()
                    .map(|id| (id, row))
                    .map_err(|_| Error::InvalidInput(format!("specimen id {key:?} is not an integer")))
            })
            .collect::<Result<_>>()?;
        Ok(Self { rows })
    }
}

/// Provider of morphology snapshots.
pub trait MorphologySource: Send + Sync + std::fmt::Debug {
    /// Read the current state of the source.
    ///
    /// # Errors
    ///
    /// `Error::LookupUnavailable` when the source cannot be reached; other
    /// errors when its content is malformed.
    fn snapshot(&self) -> Result<MorphologyTable>;
}

impl MorphologySource for MorphologyTable {
    fn snapshot(&self) -> Result<MorphologyTable> {
        Ok(self.clone())
    }
}

/// Morphology annotations exported to a flat JSON file.
///
/// The file is re-read on every snapshot.
#[derive(Debug, Clone)]
pub struct JsonMorphologySource {
    path: PathBuf,
}

impl JsonMorphologySource {
    /// Source backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MorphologySource for JsonMorphologySource {
    fn snapshot(&self) -> Result<MorphologyTable> {
        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::LookupUnavailable(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let table = MorphologyTable::from_json_str(&json)?;
        debug!(path = %self.path.display(), specimens = table.len(), "Loaded morphology snapshot");
        Ok(table)
    }
}

/// Source that always reports itself unavailable.
///
/// Stands in for the desktop database driver, which has no Rust binding.
#[derive(Debug, Clone)]
pub struct UnavailableSource {
    reason: String,
}

impl UnavailableSource {
    /// Unavailable source with an explanation.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl MorphologySource for UnavailableSource {
    fn snapshot(&self) -> Result<MorphologyTable> {
        Err(Error::LookupUnavailable(self.reason.clone()))
    }
}

/// Pick the morphology source named by the configuration.
///
/// A configured database file takes precedence over the JSON export, as in
/// deployments that have both; since no database driver is compiled in, that
/// choice yields an [`UnavailableSource`].
#[must_use]
pub fn open_morphology_source(config: &MorphologyConfig) -> Arc<dyn MorphologySource> {
    if let Some(db) = &config.access_db {
        return Arc::new(UnavailableSource::new(format!(
            "morphology database driver not available for {}",
            db.display()
        )));
    }
    match &config.json_file {
        Some(path) => Arc::new(JsonMorphologySource::new(path.clone())),
        None => Arc::new(UnavailableSource::new("no morphology source configured")),
    }
}

/// LIMS queries used by the morphology import and freshness check.
pub trait LimsLookup: Send + Sync + std::fmt::Debug {
    /// Cortical layer annotation of a specimen, as LIMS spells it (e.g. "Layer 2/3").
    ///
    /// # Errors
    ///
    /// `Error::LookupUnavailable` when LIMS cannot be reached.
    fn cell_layer(&self, specimen_id: u64) -> Result<Option<String>>;

    /// Specimen ids of the cells in a cluster, `None` for an unknown cluster.
    ///
    /// # Errors
    ///
    /// `Error::LookupUnavailable` when LIMS cannot be reached.
    fn cluster_cells(&self, cluster_id: u64) -> Result<Option<Vec<u64>>>;
}

/// In-memory LIMS snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimsTable {
    layers: BTreeMap<u64, String>,
    clusters: BTreeMap<u64, Vec<u64>>,
}

impl LimsTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a specimen's layer.
    #[must_use]
    pub fn with_layer(mut self, specimen_id: u64, layer: impl Into<String>) -> Self {
        self.layers.insert(specimen_id, layer.into());
        self
    }

    /// Set the specimens of a cluster.
    #[must_use]
    pub fn with_cluster(mut self, cluster_id: u64, specimens: Vec<u64>) -> Self {
        self.clusters.insert(cluster_id, specimens);
        self
    }
}

impl LimsLookup for LimsTable {
    fn cell_layer(&self, specimen_id: u64) -> Result<Option<String>> {
        Ok(self.layers.get(&specimen_id).cloned())
    }

    fn cluster_cells(&self, cluster_id: u64) -> Result<Option<Vec<u64>>> {
        Ok(self.clusters.get(&cluster_id).cloned())
    }
}
