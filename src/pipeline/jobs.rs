//! Pipeline job records - one per (module, job id)

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Job is known but has not started.
    Pending,
    /// Job is currently executing.
    Running,
    /// Job completed successfully.
    Success,
    /// Job failed with an error.
    Failed,
}

/// Execution record of one job of one module.
///
/// `dep_time` is the readiness timestamp the job was run against; a later
/// readiness timestamp means the job's output is out of date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineJobRecord {
    module: String,
    job_id: String,
    status: JobStatus,
    dep_time: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl PipelineJobRecord {
    /// Create a new job record in Pending status.
    #[must_use]
    pub fn new(module: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            job_id: job_id.into(),
            status: JobStatus::Pending,
            dep_time: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Set the readiness timestamp.
    #[must_use]
    pub const fn with_dep_time(mut self, dep_time: DateTime<Utc>) -> Self {
        self.dep_time = Some(dep_time);
        self
    }

    /// Module name.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Job id.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.status
    }

    /// Readiness timestamp the job ran against.
    #[must_use]
    pub const fn dep_time(&self) -> Option<DateTime<Utc>> {
        self.dep_time
    }

    /// Start timestamp, if started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Finish timestamp, if finished.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Error message of a failed job.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Transition to Running and stamp the start time.
    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Transition to Success and stamp the finish time.
    pub fn succeed(&mut self) {
        self.status = JobStatus::Success;
        self.finished_at = Some(Utc::now());
        self.error = None;
    }

    /// Transition to Failed, keeping the error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.into());
    }
}

/// Concurrent table of job records.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: DashMap<(String, String), PipelineJobRecord>,
}

impl JobTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of job records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Check if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Insert or replace a record.
    pub fn upsert(&self, record: PipelineJobRecord) {
        let key = (record.module.clone(), record.job_id.clone());
        self.jobs.insert(key, record);
    }

    /// Record for a job.
    #[must_use]
    pub fn get(&self, module: &str, job_id: &str) -> Option<PipelineJobRecord> {
        self.jobs
            .get(&(module.to_string(), job_id.to_string()))
            .map(|r| r.value().clone())
    }

    /// Remove a job's record.
    pub fn remove(&self, module: &str, job_id: &str) -> Option<PipelineJobRecord> {
        self.jobs
            .remove(&(module.to_string(), job_id.to_string()))
            .map(|(_, record)| record)
    }

    /// Finished jobs of a module with their finish time and success flag.
    #[must_use]
    pub fn finished_jobs(&self, module: &str) -> BTreeMap<String, (DateTime<Utc>, bool)> {
        self.jobs
            .iter()
            .filter(|r| r.module == module)
            .filter_map(|r| {
                r.finished_at
                    .map(|t| (r.job_id.clone(), (t, r.status == JobStatus::Success)))
            })
            .collect()
    }

    /// All records of a module, ordered by job id.
    #[must_use]
    pub fn jobs_for_module(&self, module: &str) -> Vec<PipelineJobRecord> {
        let mut records: Vec<_> = self
            .jobs
            .iter()
            .filter(|r| r.module == module)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_lifecycle() {
        let mut job = PipelineJobRecord::new("morphology", "1000.000");
        assert_eq!(job.status(), JobStatus::Pending);
        job.start();
        assert_eq!(job.status(), JobStatus::Running);
        assert!(job.started_at().is_some());
        job.fail("boom");
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error(), Some("boom"));
        job.succeed();
        assert!(job.error().is_none());
    }

    #[test]
    fn test_finished_jobs_skips_unfinished() {
        let table = JobTable::new();
        let mut done = PipelineJobRecord::new("experiment", "a");
        done.succeed();
        let mut failed = PipelineJobRecord::new("experiment", "b");
        failed.fail("bad");
        table.upsert(done);
        table.upsert(failed);
        table.upsert(PipelineJobRecord::new("experiment", "c"));
        table.upsert(PipelineJobRecord::new("morphology", "a"));

        let finished = table.finished_jobs("experiment");
        assert_eq!(finished.len(), 2);
        assert!(finished["a"].1);
        assert!(!finished["b"].1);
        assert_eq!(table.jobs_for_module("experiment").len(), 3);
        assert!(table.remove("experiment", "a").is_some());
        assert!(table.get("experiment", "a").is_none());
    }
}
