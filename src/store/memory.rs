//! In-memory record store using `DashMap`.
//!
//! Data is lost on process restart.

use dashmap::DashMap;

use super::{RecordStore, TIMESTAMP_TOLERANCE};
use crate::record::{
    Cell, ConnectionStrengthRecord, Experiment, MorphologyRecord, Pair, Slice,
};
use crate::{Error, Result};

/// Concurrent in-memory store.
///
/// # Example
///
/// ```rust
/// use synphys_core::record::Experiment;
/// use synphys_core::store::{MemoryStore, RecordStore};
///
/// let store = MemoryStore::new();
/// store.put_experiment(Experiment::new(1, 1_521_667_891.153));
/// let expt = store.experiment_from_timestamp(1_521_667_891.15).unwrap();
/// assert_eq!(expt.id(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    experiments: DashMap<u64, Experiment>,
    slices: DashMap<u64, Slice>,
    cells: DashMap<u64, Cell>,
    pairs: DashMap<u64, Pair>,
    morphology: DashMap<u64, MorphologyRecord>,
    connection_strength: DashMap<u64, ConnectionStrengthRecord>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of experiments.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    /// Number of morphology records.
    #[must_use]
    pub fn morphology_count(&self) -> usize {
        self.morphology.len()
    }

    /// Number of connection strength records.
    #[must_use]
    pub fn connection_strength_count(&self) -> usize {
        self.connection_strength.len()
    }

    fn cell_ids_for_experiment(&self, experiment_id: u64) -> Vec<u64> {
        self.cells
            .iter()
            .filter(|c| c.experiment_id == experiment_id)
            .map(|c| c.id)
            .collect()
    }

    fn pair_ids_for_experiment(&self, experiment_id: u64) -> Vec<u64> {
        self.pairs
            .iter()
            .filter(|p| p.experiment_id == experiment_id)
            .map(|p| p.id)
            .collect()
    }
}

fn single<T>(mut matches: Vec<T>, what: impl FnOnce() -> String) -> Result<T> {
    match matches.len() {
        0 => Err(Error::NotFound(what())),
        1 => Ok(matches.remove(0)),
        n => Err(Error::Ambiguity(format!("{n} records match {}", what()))),
    }
}

fn sorted_by_id<T>(mut rows: Vec<T>, id: impl Fn(&T) -> u64) -> Vec<T> {
    rows.sort_by_key(id);
    rows
}

impl RecordStore for MemoryStore {
    fn put_experiment(&self, experiment: Experiment) {
        self.experiments.insert(experiment.id(), experiment);
    }

    fn experiments(&self) -> Vec<Experiment> {
        let rows = self.experiments.iter().map(|e| e.value().clone()).collect();
        sorted_by_id(rows, Experiment::id)
    }

    fn experiment(&self, id: u64) -> Option<Experiment> {
        self.experiments.get(&id).map(|e| e.value().clone())
    }

    fn experiment_by_ext_id(&self, ext_id: &str) -> Result<Experiment> {
        let matches = self
            .experiments
            .iter()
            .filter(|e| e.ext_id() == ext_id)
            .map(|e| e.value().clone())
            .collect();
        single(matches, || format!("experiment with ext_id {ext_id}"))
    }

    #[allow(clippy::float_cmp)]
    fn experiment_from_timestamp(&self, ts: f64) -> Result<Experiment> {
        let exact: Vec<Experiment> = self
            .experiments
            .iter()
            .filter(|e| e.acq_timestamp() == ts)
            .map(|e| e.value().clone())
            .collect();
        if !exact.is_empty() {
            return single(exact, || format!("experiment at timestamp {ts:.3}"));
        }
        let near = self
            .experiments
            .iter()
            .filter(|e| (e.acq_timestamp() - ts).abs() < TIMESTAMP_TOLERANCE)
            .map(|e| e.value().clone())
            .collect();
        single(near, || format!("experiment at timestamp {ts:.3}"))
    }

    fn put_slice(&self, slice: Slice) {
        self.slices.insert(slice.id, slice);
    }

    #[allow(clippy::float_cmp)]
    fn slice_from_timestamp(&self, ts: f64) -> Result<Slice> {
        let matches = self
            .slices
            .iter()
            .filter(|s| s.acq_timestamp == ts)
            .map(|s| s.value().clone())
            .collect();
        single(matches, || format!("slice at timestamp {ts:.3}"))
    }

    fn put_cell(&self, cell: Cell) {
        self.cells.insert(cell.id, cell);
    }

    fn cell(&self, id: u64) -> Option<Cell> {
        self.cells.get(&id).map(|c| c.value().clone())
    }

    fn cells_for_experiment(&self, experiment_id: u64) -> Vec<Cell> {
        let rows = self
            .cells
            .iter()
            .filter(|c| c.experiment_id == experiment_id)
            .map(|c| c.value().clone())
            .collect();
        sorted_by_id(rows, |c: &Cell| c.id)
    }

    fn put_pair(&self, pair: Pair) {
        self.pairs.insert(pair.id, pair);
    }

    fn pairs_for_experiment(&self, experiment_id: u64) -> Vec<Pair> {
        let rows = self
            .pairs
            .iter()
            .filter(|p| p.experiment_id == experiment_id)
            .map(|p| p.value().clone())
            .collect();
        sorted_by_id(rows, |p: &Pair| p.id)
    }

    fn put_morphology(&self, record: MorphologyRecord) {
        self.morphology.insert(record.cell_id, record);
    }

    fn morphology_for_cell(&self, cell_id: u64) -> Option<MorphologyRecord> {
        self.morphology.get(&cell_id).map(|m| m.value().clone())
    }

    fn morphology_for_specimen(&self, specimen_id: u64) -> Vec<MorphologyRecord> {
        let cell_ids: Vec<u64> = self
            .cells
            .iter()
            .filter(|c| c.meta.lims_specimen_id == Some(specimen_id))
            .map(|c| c.id)
            .collect();
        let rows = cell_ids
            .into_iter()
            .filter_map(|id| self.morphology_for_cell(id))
            .collect();
        sorted_by_id(rows, |m: &MorphologyRecord| m.cell_id)
    }

    fn put_connection_strength(&self, record: ConnectionStrengthRecord) {
        self.connection_strength.insert(record.pair_id, record);
    }

    fn connection_strength(&self, pair_id: u64) -> Option<ConnectionStrengthRecord> {
        self.connection_strength
            .get(&pair_id)
            .map(|r| r.value().clone())
    }

    fn delete_morphology_for_experiment(&self, experiment_id: u64) -> usize {
        self.cell_ids_for_experiment(experiment_id)
            .into_iter()
            .filter(|id| self.morphology.remove(id).is_some())
            .count()
    }

    fn delete_connection_strength_for_experiment(&self, experiment_id: u64) -> usize {
        self.pair_ids_for_experiment(experiment_id)
            .into_iter()
            .filter(|id| self.connection_strength.remove(id).is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_default() {
        let store = MemoryStore::new();
        assert_eq!(store.experiment_count(), 0);
        assert!(store.experiments().is_empty());
        assert!(matches!(
            store.experiment_by_ext_id("nope"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_timestamp_exact_beats_tolerance() {
        let store = MemoryStore::new();
        store.put_experiment(Experiment::new(1, 100.000));
        store.put_experiment(Experiment::new(2, 100.005));
        assert_eq!(store.experiment_from_timestamp(100.005).unwrap().id(), 2);
        assert!(matches!(
            store.experiment_from_timestamp(100.003),
            Err(Error::Ambiguity(_))
        ));
    }

    #[test]
    fn test_delete_derived_records_scoped_to_experiment() {
        let store = MemoryStore::new();
        store.put_cell(Cell::new(1, 10, "1"));
        store.put_cell(Cell::new(2, 20, "1"));
        store.put_morphology(MorphologyRecord::new(1));
        store.put_morphology(MorphologyRecord::new(2));
        assert_eq!(store.delete_morphology_for_experiment(10), 1);
        assert!(store.morphology_for_cell(1).is_none());
        assert!(store.morphology_for_cell(2).is_some());
    }
}
