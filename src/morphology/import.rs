//! Per-experiment morphology import

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{apply_row, normalize_layer, parse_pipette_morphology};
use super::{LimsLookup, MorphologyTable};
use crate::record::{Cell, Experiment, MorphologyRecord};
use crate::store::RecordStore;
use crate::{Error, Result};

/// Experimenter notes on each pipette, keyed by experiment ext id then cell ext id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipetteTable {
    experiments: BTreeMap<String, BTreeMap<String, Option<String>>>,
}

impl PipetteTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the morphology note written for a pipette.
    pub fn set_morphology(
        &mut self,
        experiment_ext_id: impl Into<String>,
        cell_ext_id: impl Into<String>,
        note: Option<&str>,
    ) {
        self.experiments
            .entry(experiment_ext_id.into())
            .or_default()
            .insert(cell_ext_id.into(), note.map(str::to_string));
    }

    /// Morphology note for a pipette, if any was written.
    #[must_use]
    pub fn morphology(&self, experiment_ext_id: &str, cell_ext_id: &str) -> Option<&str> {
        self.experiments
            .get(experiment_ext_id)
            .and_then(|cells| cells.get(cell_ext_id))
            .and_then(Option::as_deref)
    }
}

/// Everything the import needs besides the store.
#[derive(Debug, Clone, Copy)]
pub struct ImportSources<'a> {
    /// Pipette notes
    pub pipettes: &'a PipetteTable,
    /// Snapshot of the external morphology annotations
    pub morphology: &'a MorphologyTable,
    /// LIMS lookups
    pub lims: &'a dyn LimsLookup,
}

/// Outcome of importing one experiment.
#[derive(Debug, Default)]
pub struct ImportReport {
    /// Records built for cells that imported cleanly
    pub records: Vec<MorphologyRecord>,
    /// Cells with their cell-class metadata updated
    pub cells: Vec<Cell>,
    /// Cells that failed, with the reason
    pub errors: Vec<(u64, Error)>,
}

impl ImportReport {
    /// Whether every cell imported cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Write records and updated cells to the store.
    pub fn persist(&self, store: &dyn RecordStore) {
        for cell in &self.cells {
            store.put_cell(cell.clone());
        }
        for record in &self.records {
            store.put_morphology(record.clone());
        }
    }
}

fn import_cell(
    experiment: &Experiment,
    cell: &Cell,
    sources: &ImportSources<'_>,
) -> Result<(MorphologyRecord, Cell)> {
    let note = sources.pipettes.morphology(experiment.ext_id(), &cell.ext_id);
    let mut record = MorphologyRecord::new(cell.id);
    record.pyramidal = parse_pipette_morphology(note)
        .map_err(|message| Error::data_quality(format!("cell {}", cell.id), "pipette morphology", message))?;

    if let Some(specimen_id) = cell.meta.lims_specimen_id {
        record.cortical_layer = sources
            .lims
            .cell_layer(specimen_id)?
            .as_deref()
            .and_then(normalize_layer);
        if let Some(row) = sources.morphology.lookup(specimen_id) {
            apply_row(&mut record, specimen_id, row)?;
        }
        record.morpho_db_hash = Some(sources.morphology.content_hash(specimen_id));
    }

    let mut updated = cell.clone();
    updated.apply_morpho_class(record.dendrite_type.and_then(|d| d.cell_class()));
    Ok((record, updated))
}

/// Build morphology records for every cell of an experiment.
///
/// A data-quality problem with one cell is logged and collected in the report;
/// the remaining cells are still imported.
///
/// # Errors
///
/// Errors that are not scoped to a single record (e.g. LIMS unavailable)
/// abort the whole experiment.
pub fn import_experiment(
    store: &dyn RecordStore,
    experiment: &Experiment,
    sources: &ImportSources<'_>,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for cell in store.cells_for_experiment(experiment.id()) {
        match import_cell(experiment, &cell, sources) {
            Ok((record, updated)) => {
                report.records.push(record);
                report.cells.push(updated);
            }
            Err(e) if e.is_record_scoped() => {
                warn!(experiment = experiment.ext_id(), cell = cell.id, error = %e, "Skipping morphology for cell");
                report.errors.push((cell.id, e));
            }
            Err(e) => return Err(e),
        }
    }
    debug!(
        experiment = experiment.ext_id(),
        imported = report.records.len(),
        failed = report.errors.len(),
        "Imported morphology"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morphology::LimsTable;
    use crate::record::{CellClass, DendriteType};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn setup() -> (MemoryStore, Experiment) {
        let store = MemoryStore::new();
        let expt = Experiment::builder(1, 1000.0).ext_id("1000.000").build();
        store.put_experiment(expt.clone());
        store.put_cell(Cell::new(11, 1, "1").with_specimen(501));
        store.put_cell(Cell::new(12, 1, "2").with_specimen(502));
        store.put_cell(Cell::new(13, 1, "3"));
        (store, expt)
    }

    fn morphology() -> MorphologyTable {
        let mut table = MorphologyTable::new();
        let row = json!({
            "Qual_Morpho_Type": null,
            "dendrite_type": "aspiny",
            "Apical_truncation_distance": null,
            "Axon_truncation_distance": null,
            "Axon origination": "NEI",
            "Axon_truncation": "unclear",
            "Apical_truncation": null,
        });
        table.insert(501, serde_json::from_value(row).unwrap());
        table
    }

    #[test]
    fn test_import_fills_records_and_class() {
        let (store, expt) = setup();
        let mut pipettes = PipetteTable::new();
        pipettes.set_morphology("1000.000", "1", Some("pyr"));
        let lims = LimsTable::new().with_layer(501, "Layer 5");
        let table = morphology();
        let sources = ImportSources {
            pipettes: &pipettes,
            morphology: &table,
            lims: &lims,
        };

        let report = import_experiment(&store, &expt, &sources).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.records.len(), 3);

        let first = &report.records[0];
        assert_eq!(first.pyramidal, Some(true));
        assert_eq!(first.cortical_layer.as_deref(), Some("5"));
        assert_eq!(first.dendrite_type, Some(DendriteType::Aspiny));
        assert_eq!(first.morpho_db_hash, Some(table.content_hash(501)));
        assert_eq!(report.cells[0].cell_class_nonsynaptic, Some(CellClass::Inhibitory));

        let second = &report.records[1];
        assert_eq!(second.pyramidal, None);
        // No annotation row: the empty-row hash is stored
        assert_eq!(second.morpho_db_hash, Some(table.content_hash(502)));
        assert_eq!(report.records[2].morpho_db_hash, None);

        report.persist(&store);
        assert_eq!(store.morphology_count(), 3);
        assert_eq!(store.cell(11).unwrap().meta.morpho_cell_class, Some(CellClass::Inhibitory));
    }

    #[test]
    fn test_bad_pipette_note_isolated_to_cell() {
        let (store, expt) = setup();
        let mut pipettes = PipetteTable::new();
        pipettes.set_morphology("1000.000", "2", Some("stellate"));
        let lims = LimsTable::new();
        let table = morphology();
        let sources = ImportSources {
            pipettes: &pipettes,
            morphology: &table,
            lims: &lims,
        };

        let report = import_experiment(&store, &expt, &sources).unwrap();
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, 12);
        assert!(report.errors[0].1.is_record_scoped());
    }
}
