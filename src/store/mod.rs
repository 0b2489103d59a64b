//! Record store contract
//!
//! The analysis core only needs create/read/update of typed rows keyed by
//! stable identifiers. `RecordStore` captures that surface; `MemoryStore` is
//! the in-process implementation used by the pipeline and the tests.
//!
//! Timestamp lookups never guess: more than one match is an
//! [`Error::Ambiguity`](crate::Error::Ambiguity) that the caller must handle.

mod memory;

pub use memory::MemoryStore;

use crate::record::{
    Cell, ConnectionStrengthRecord, Experiment, MorphologyRecord, Pair, Slice,
};
use crate::Result;

/// Legacy timestamps were truncated to two decimals.
pub const TIMESTAMP_TOLERANCE: f64 = 0.01;

/// Typed row storage used by the pipeline modules.
pub trait RecordStore: Send + Sync {
    /// Insert or replace an experiment.
    fn put_experiment(&self, experiment: Experiment);

    /// All experiments, ordered by id.
    fn experiments(&self) -> Vec<Experiment>;

    /// Experiment by database id.
    fn experiment(&self, id: u64) -> Option<Experiment>;

    /// Experiment by external id.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` when no experiment has this id, `Error::Ambiguity`
    /// when several do.
    fn experiment_by_ext_id(&self, ext_id: &str) -> Result<Experiment>;

    /// Experiment by acquisition timestamp.
    ///
    /// An exact match wins; otherwise a match within
    /// [`TIMESTAMP_TOLERANCE`] is accepted.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` when nothing matches, `Error::Ambiguity` when more
    /// than one record matches at the same level.
    fn experiment_from_timestamp(&self, ts: f64) -> Result<Experiment>;

    /// Insert or replace a slice.
    fn put_slice(&self, slice: Slice);

    /// Slice by exact acquisition timestamp.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` or `Error::Ambiguity`.
    fn slice_from_timestamp(&self, ts: f64) -> Result<Slice>;

    /// Insert or replace a cell.
    fn put_cell(&self, cell: Cell);

    /// Cell by database id.
    fn cell(&self, id: u64) -> Option<Cell>;

    /// Cells of an experiment, ordered by id.
    fn cells_for_experiment(&self, experiment_id: u64) -> Vec<Cell>;

    /// Insert or replace a pair.
    fn put_pair(&self, pair: Pair);

    /// Pairs of an experiment, ordered by id.
    fn pairs_for_experiment(&self, experiment_id: u64) -> Vec<Pair>;

    /// Insert or replace the morphology record of a cell.
    fn put_morphology(&self, record: MorphologyRecord);

    /// Morphology record of a cell.
    fn morphology_for_cell(&self, cell_id: u64) -> Option<MorphologyRecord>;

    /// Morphology records of all cells with this LIMS specimen id.
    fn morphology_for_specimen(&self, specimen_id: u64) -> Vec<MorphologyRecord>;

    /// Insert or replace the connection strength of a pair.
    fn put_connection_strength(&self, record: ConnectionStrengthRecord);

    /// Connection strength of a pair.
    fn connection_strength(&self, pair_id: u64) -> Option<ConnectionStrengthRecord>;

    /// Remove morphology records of the experiment's cells; returns the count removed.
    fn delete_morphology_for_experiment(&self, experiment_id: u64) -> usize;

    /// Remove connection strength records of the experiment's pairs; returns the count removed.
    fn delete_connection_strength_for_experiment(&self, experiment_id: u64) -> usize;
}
