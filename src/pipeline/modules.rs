//! Built-in pipeline modules

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{FreshnessCheck, MorphologyFreshness, PipelineModule};
use crate::fit::FitEngine;
use crate::morphology::{import_experiment, ImportSources, LimsLookup, MorphologySource, PipetteTable};
use crate::store::RecordStore;
use crate::strength::{aggregate_pair, PulseSource};
use crate::Result;

/// Root module: one job per stored experiment.
///
/// Experiments are created outside the pipeline; this module only confirms
/// that each one resolves to exactly one record so dependents can rely on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExperimentModule;

impl ExperimentModule {
    /// Module name.
    pub const NAME: &'static str = "experiment";
}

impl PipelineModule for ExperimentModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn discover_jobs(&self, store: &dyn RecordStore) -> Result<BTreeMap<String, DateTime<Utc>>> {
        Ok(store
            .experiments()
            .into_iter()
            .map(|e| (e.ext_id().to_string(), e.modified_at()))
            .collect())
    }

    fn process_job(&self, store: &dyn RecordStore, job_id: &str) -> Result<()> {
        let experiment = store.experiment_by_ext_id(job_id)?;
        debug!(
            job = job_id,
            cells = store.cells_for_experiment(experiment.id()).len(),
            pairs = store.pairs_for_experiment(experiment.id()).len(),
            "Experiment available"
        );
        Ok(())
    }

    fn drop_job_records(&self, _store: &dyn RecordStore, _job_id: &str) -> Result<usize> {
        Ok(0)
    }
}

/// Imports cell morphology for each experiment.
#[derive(Debug, Clone)]
pub struct MorphologyModule {
    source: Arc<dyn MorphologySource>,
    lims: Arc<dyn LimsLookup>,
    pipettes: Arc<PipetteTable>,
    freshness: MorphologyFreshness,
}

impl MorphologyModule {
    /// Module name.
    pub const NAME: &'static str = "morphology";

    /// Create the module from its external sources.
    #[must_use]
    pub fn new(
        source: Arc<dyn MorphologySource>,
        lims: Arc<dyn LimsLookup>,
        pipettes: Arc<PipetteTable>,
    ) -> Self {
        let freshness = MorphologyFreshness::new(Arc::clone(&source), Arc::clone(&lims));
        Self {
            source,
            lims,
            pipettes,
            freshness,
        }
    }
}

impl PipelineModule for MorphologyModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn dependencies(&self) -> &[&str] {
        &[ExperimentModule::NAME]
    }

    fn freshness(&self) -> Option<&dyn FreshnessCheck> {
        Some(&self.freshness)
    }

    fn process_job(&self, store: &dyn RecordStore, job_id: &str) -> Result<()> {
        let experiment = store.experiment_by_ext_id(job_id)?;
        let table = self.source.snapshot()?;
        let sources = ImportSources {
            pipettes: &self.pipettes,
            morphology: &table,
            lims: self.lims.as_ref(),
        };
        let report = import_experiment(store, &experiment, &sources)?;
        report.persist(store);
        if !report.is_clean() {
            warn!(
                job = job_id,
                failed_cells = report.errors.len(),
                "Morphology imported with per-cell errors"
            );
        }
        Ok(())
    }

    fn drop_job_records(&self, store: &dyn RecordStore, job_id: &str) -> Result<usize> {
        let experiment = store.experiment_by_ext_id(job_id)?;
        Ok(store.delete_morphology_for_experiment(experiment.id()))
    }
}

/// Aggregates per-pair connection strength from pulse measurements.
#[derive(Debug, Clone)]
pub struct ConnectionStrengthModule {
    pulses: Arc<dyn PulseSource>,
    engine: FitEngine,
}

impl ConnectionStrengthModule {
    /// Module name.
    pub const NAME: &'static str = "connection_strength";

    /// Create the module; `engine` fits the averaged responses.
    #[must_use]
    pub fn new(pulses: Arc<dyn PulseSource>, engine: FitEngine) -> Self {
        Self { pulses, engine }
    }
}

impl PipelineModule for ConnectionStrengthModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn dependencies(&self) -> &[&str] {
        &[ExperimentModule::NAME]
    }

    fn process_job(&self, store: &dyn RecordStore, job_id: &str) -> Result<()> {
        let experiment = store.experiment_by_ext_id(job_id)?;
        let mut stored = 0_usize;
        for pair in store.pairs_for_experiment(experiment.id()) {
            let Some(pulses) = self.pulses.pair_pulses(&experiment, &pair)? else {
                continue;
            };
            let record = aggregate_pair(&pair, &pulses, &self.engine)?;
            match record.validate() {
                Ok(()) => {
                    store.put_connection_strength(record);
                    stored += 1;
                }
                Err(e) if e.is_record_scoped() => {
                    warn!(job = job_id, pair = pair.id, error = %e, "Skipping connection strength for pair");
                }
                Err(e) => return Err(e),
            }
        }
        debug!(job = job_id, pairs = stored, "Stored connection strength");
        Ok(())
    }

    fn drop_job_records(&self, store: &dyn RecordStore, job_id: &str) -> Result<usize> {
        let experiment = store.experiment_by_ext_id(job_id)?;
        Ok(store.delete_connection_strength_for_experiment(experiment.id()))
    }
}
