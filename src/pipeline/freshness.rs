//! Freshness checks against sources the pipeline does not track

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::morphology::{LimsLookup, MorphologySource, MorphologyTable};
use crate::store::RecordStore;
use crate::{Error, Result};

/// Decides which candidate jobs are out of date with respect to an external source.
pub trait FreshnessCheck: Send + Sync {
    /// Subset of `candidates` whose stored output no longer matches the source.
    ///
    /// # Errors
    ///
    /// Any error means the source could not be checked; the scheduler then
    /// reports no ready jobs for the module.
    fn stale_jobs(&self, store: &dyn RecordStore, candidates: &[String]) -> Result<BTreeSet<String>>;
}

/// Compares stored morphology hashes with the current annotation table.
#[derive(Debug, Clone)]
pub struct MorphologyFreshness {
    source: Arc<dyn MorphologySource>,
    lims: Arc<dyn LimsLookup>,
}

impl MorphologyFreshness {
    /// Check against `source`, resolving clusters through `lims`.
    #[must_use]
    pub fn new(source: Arc<dyn MorphologySource>, lims: Arc<dyn LimsLookup>) -> Self {
        Self { source, lims }
    }

    fn experiment_is_stale(
        &self,
        store: &dyn RecordStore,
        table: &MorphologyTable,
        job_id: &str,
    ) -> Result<bool> {
        let experiment = match store.experiment_by_ext_id(job_id) {
            Ok(experiment) => experiment,
            Err(Error::NotFound(_)) => return Ok(true),
            Err(e) => return Err(e),
        };
        let Some(cluster) = experiment.meta().lims_cell_cluster_id else {
            return Ok(false);
        };
        let Some(specimens) = self.lims.cluster_cells(cluster)? else {
            return Ok(false);
        };
        for specimen_id in specimens {
            let current = table.content_hash(specimen_id);
            let stored = store.morphology_for_specimen(specimen_id);
            // A record without a stored hash was never compared against the source
            let matches = match stored.as_slice() {
                [record] => record.morpho_db_hash.as_deref() == Some(current.as_str()),
                _ => false,
            };
            if !matches {
                debug!(job = job_id, specimen = specimen_id, "Morphology source changed");
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl FreshnessCheck for MorphologyFreshness {
    fn stale_jobs(&self, store: &dyn RecordStore, candidates: &[String]) -> Result<BTreeSet<String>> {
        let table = self.source.snapshot()?;
        let mut stale = BTreeSet::new();
        for job_id in candidates {
            if self.experiment_is_stale(store, &table, job_id)? {
                stale.insert(job_id.clone());
            }
        }
        Ok(stale)
    }
}
