//! Pipeline Freshness & Dependency Scheduler
//!
//! Modules form a DAG through their declared dependencies. Every module
//! processes jobs identified by an experiment's external id; a job of a
//! dependent module becomes ready once all of its dependencies finished the
//! same job successfully.
//!
//! ## Readiness
//!
//! [`Pipeline::ready_jobs`] returns, per job id, the readiness timestamp: the
//! latest completion time among the dependencies. Modules that also read an
//! external source register a [`FreshnessCheck`]; jobs whose stored output no
//! longer matches the source have their readiness bumped to "now". If the
//! source cannot be checked the module reports no ready jobs at all.
//!
//! ## Staleness and execution
//!
//! [`Pipeline::stale_jobs`] narrows the ready jobs to those whose last run is
//! missing, failed or older than the readiness timestamp.
//! [`Pipeline::run_module`] is a sequential driver for those jobs. It runs at
//! most one recomputation per (module, job) at a time; concurrent runners
//! must provide that guarantee themselves.

mod freshness;
mod jobs;
mod modules;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use freshness::{FreshnessCheck, MorphologyFreshness};
pub use jobs::{JobStatus, JobTable, PipelineJobRecord};
pub use modules::{ConnectionStrengthModule, ExperimentModule, MorphologyModule};

use crate::store::RecordStore;
use crate::{Error, Result};

/// A processing stage of the pipeline.
pub trait PipelineModule: Send + Sync {
    /// Unique module name.
    fn name(&self) -> &str;

    /// Names of the modules whose output this module consumes.
    fn dependencies(&self) -> &[&str] {
        &[]
    }

    /// Jobs of a root module (no dependencies) with their source timestamps.
    ///
    /// # Errors
    ///
    /// Store or source errors.
    fn discover_jobs(&self, _store: &dyn RecordStore) -> Result<BTreeMap<String, DateTime<Utc>>> {
        Ok(BTreeMap::new())
    }

    /// Check against an external source the pipeline does not track.
    fn freshness(&self) -> Option<&dyn FreshnessCheck> {
        None
    }

    /// Produce this module's records for one job.
    ///
    /// # Errors
    ///
    /// Any error marks the job failed; other jobs still run.
    fn process_job(&self, store: &dyn RecordStore, job_id: &str) -> Result<()>;

    /// Delete this module's records for one job; returns the number removed.
    ///
    /// # Errors
    ///
    /// Store errors.
    fn drop_job_records(&self, store: &dyn RecordStore, job_id: &str) -> Result<usize>;
}

/// Readiness of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReadiness {
    /// Time at which the job's dependencies were satisfied
    pub dep_time: DateTime<Utc>,
}

/// Outcome of [`Pipeline::run_module`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Module that ran
    pub module: String,
    /// Jobs that succeeded
    pub succeeded: Vec<String>,
    /// Jobs that failed, with the error message
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    /// Number of jobs attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Builder that validates the module graph.
#[derive(Default)]
pub struct PipelineBuilder {
    modules: Vec<Arc<dyn PipelineModule>>,
}

impl PipelineBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module.
    #[must_use]
    pub fn module(mut self, module: Arc<dyn PipelineModule>) -> Self {
        self.modules.push(module);
        self
    }

    /// Validate the graph and build the pipeline.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidInput` for duplicate module names
    /// - `Error::UnknownModule` for a dependency that was not added
    /// - `Error::DependencyCycle` when the dependencies are not a DAG
    pub fn build(self, store: Arc<dyn RecordStore>) -> Result<Pipeline> {
        let mut by_name: FxHashMap<String, Arc<dyn PipelineModule>> = FxHashMap::default();
        let mut registration = Vec::with_capacity(self.modules.len());
        for module in self.modules {
            let name = module.name().to_string();
            if by_name.contains_key(&name) {
                return Err(Error::InvalidInput(format!("module {name} registered twice")));
            }
            registration.push(name.clone());
            by_name.insert(name, module);
        }
        for module in by_name.values() {
            for dep in module.dependencies() {
                if !by_name.contains_key(*dep) {
                    return Err(Error::UnknownModule(format!(
                        "{dep} (dependency of {})",
                        module.name()
                    )));
                }
            }
        }
        let order = topological_order(&registration, &by_name)?;
        debug!(order = ?order, "Pipeline built");
        Ok(Pipeline {
            store,
            modules: by_name,
            order,
            jobs: JobTable::new(),
        })
    }
}

/// Kahn's algorithm, breaking ties by registration order.
fn topological_order(
    registration: &[String],
    modules: &FxHashMap<String, Arc<dyn PipelineModule>>,
) -> Result<Vec<String>> {
    let mut done: FxHashSet<&str> = FxHashSet::default();
    let mut order = Vec::with_capacity(registration.len());
    while order.len() < registration.len() {
        let next = registration.iter().find(|name| {
            !done.contains(name.as_str())
                && modules[name.as_str()]
                    .dependencies()
                    .iter()
                    .all(|dep| done.contains(dep))
        });
        let Some(next) = next else {
            let blocked = registration
                .iter()
                .find(|name| !done.contains(name.as_str()))
                .cloned()
                .unwrap_or_default();
            return Err(Error::DependencyCycle(blocked));
        };
        done.insert(next.as_str());
        order.push(next.clone());
    }
    Ok(order)
}

/// Registered modules, their job records and the store they write to.
pub struct Pipeline {
    store: Arc<dyn RecordStore>,
    modules: FxHashMap<String, Arc<dyn PipelineModule>>,
    order: Vec<String>,
    jobs: JobTable,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("order", &self.order)
            .field("jobs", &self.jobs.len())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Start building a pipeline.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Module names in dependency order.
    #[must_use]
    pub fn update_order(&self) -> &[String] {
        &self.order
    }

    /// The record store.
    #[must_use]
    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// Job records of all modules.
    #[must_use]
    pub const fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    /// Look up a module.
    ///
    /// # Errors
    ///
    /// `Error::UnknownModule` if no module has this name.
    pub fn module(&self, name: &str) -> Result<&Arc<dyn PipelineModule>> {
        self.modules
            .get(name)
            .ok_or_else(|| Error::UnknownModule(name.to_string()))
    }

    /// Finished jobs of a module with finish time and success flag.
    #[must_use]
    pub fn finished_jobs(&self, module: &str) -> BTreeMap<String, (DateTime<Utc>, bool)> {
        self.jobs.finished_jobs(module)
    }

    /// Jobs of `module` that are ready to run, with their readiness timestamps.
    ///
    /// # Errors
    ///
    /// `Error::UnknownModule`, or a store error from a root module's job
    /// discovery. Failures of an external freshness source are not errors:
    /// they are logged and yield an empty map.
    pub fn ready_jobs(&self, module: &str) -> Result<BTreeMap<String, JobReadiness>> {
        let m = self.module(module)?;
        let deps = m.dependencies();

        let mut ready: BTreeMap<String, JobReadiness> = if deps.is_empty() {
            m.discover_jobs(self.store())?
                .into_iter()
                .map(|(job, dep_time)| (job, JobReadiness { dep_time }))
                .collect()
        } else {
            self.jobs_finished_by_all(deps)
        };

        if let Some(check) = m.freshness() {
            let candidates: Vec<String> = ready.keys().cloned().collect();
            match check.stale_jobs(self.store(), &candidates) {
                Ok(stale) => {
                    let now = Utc::now();
                    for job in &stale {
                        if let Some(readiness) = ready.get_mut(job) {
                            readiness.dep_time = now;
                        }
                    }
                    debug!(module, candidates = candidates.len(), stale = stale.len(), "Freshness checked");
                }
                Err(e) => {
                    warn!(module, error = %e, "Skipping module: external source unavailable");
                    return Ok(BTreeMap::new());
                }
            }
        }
        Ok(ready)
    }

    /// Jobs every dependency finished successfully, stamped with the latest finish.
    fn jobs_finished_by_all(&self, deps: &[&str]) -> BTreeMap<String, JobReadiness> {
        let finished: Vec<_> = deps.iter().map(|dep| self.jobs.finished_jobs(dep)).collect();
        let Some((first, rest)) = finished.split_first() else {
            return BTreeMap::new();
        };
        first
            .iter()
            .filter_map(|(job, (time, success))| {
                if !success {
                    return None;
                }
                let mut latest = *time;
                for other in rest {
                    match other.get(job) {
                        Some((t, true)) => latest = latest.max(*t),
                        _ => return None,
                    }
                }
                Some((job.clone(), JobReadiness { dep_time: latest }))
            })
            .collect()
    }

    /// Ready jobs whose output is missing, failed or older than their readiness.
    ///
    /// Jobs currently running are excluded.
    ///
    /// # Errors
    ///
    /// As [`Pipeline::ready_jobs`].
    pub fn stale_jobs(&self, module: &str) -> Result<BTreeMap<String, JobReadiness>> {
        let ready = self.ready_jobs(module)?;
        Ok(ready
            .into_iter()
            .filter(|(job, readiness)| match self.jobs.get(module, job) {
                None => true,
                Some(record) => match record.status() {
                    JobStatus::Running => false,
                    JobStatus::Pending | JobStatus::Failed => true,
                    JobStatus::Success => record
                        .dep_time()
                        .map_or(true, |ran_against| readiness.dep_time > ran_against),
                },
            })
            .collect())
    }

    /// Run every stale job of a module, one at a time.
    ///
    /// Previous records of a job are dropped before it is reprocessed. A job
    /// error is recorded on its job record and does not stop the batch.
    ///
    /// # Errors
    ///
    /// As [`Pipeline::stale_jobs`].
    pub fn run_module(&self, module: &str) -> Result<RunSummary> {
        let m = Arc::clone(self.module(module)?);
        let stale = self.stale_jobs(module)?;
        let mut summary = RunSummary {
            module: module.to_string(),
            ..RunSummary::default()
        };
        info!(module, jobs = stale.len(), "Running module");

        for (job_id, readiness) in stale {
            let mut record = PipelineJobRecord::new(module, job_id.clone()).with_dep_time(readiness.dep_time);
            record.start();
            self.jobs.upsert(record.clone());

            let outcome = m
                .drop_job_records(self.store(), &job_id)
                .and_then(|_| m.process_job(self.store(), &job_id));
            match outcome {
                Ok(()) => {
                    record.succeed();
                    summary.succeeded.push(job_id);
                }
                Err(e) => {
                    warn!(module, job = %job_id, error = %e, "Job failed");
                    record.fail(e.to_string());
                    summary.failed.push((job_id, e.to_string()));
                }
            }
            self.jobs.upsert(record);
        }

        info!(
            module,
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "Module finished"
        );
        Ok(summary)
    }

    /// Run every module in dependency order.
    ///
    /// # Errors
    ///
    /// As [`Pipeline::run_module`].
    pub fn run_all(&self) -> Result<Vec<RunSummary>> {
        self.order.iter().map(|name| self.run_module(name)).collect()
    }

    /// Modules that depend on `module`, directly or transitively, in dependency order.
    fn dependents(&self, module: &str) -> Vec<String> {
        let mut affected: BTreeSet<&str> = BTreeSet::new();
        affected.insert(module);
        let mut out = Vec::new();
        for name in &self.order {
            let m = &self.modules[name.as_str()];
            if m.dependencies().iter().any(|dep| affected.contains(dep)) {
                affected.insert(name.as_str());
                out.push(name.clone());
            }
        }
        out
    }

    /// Remove the jobs' records and job entries from `module` and every module downstream of it.
    ///
    /// Returns the number of job records removed.
    ///
    /// # Errors
    ///
    /// `Error::UnknownModule`, or the first error from a module's record deletion.
    pub fn drop_jobs(&self, module: &str, job_ids: &[&str]) -> Result<usize> {
        self.module(module)?;
        let mut targets = self.dependents(module);
        targets.reverse();
        targets.push(module.to_string());

        let mut removed = 0;
        for name in &targets {
            let m = self.module(name)?;
            for job_id in job_ids {
                let records = m.drop_job_records(self.store(), job_id)?;
                if self.jobs.remove(name, job_id).is_some() {
                    removed += 1;
                }
                debug!(module = %name, job = job_id, records, "Dropped job");
            }
        }
        Ok(removed)
    }
}
