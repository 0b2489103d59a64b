//! Cell and pair records

use serde::{Deserialize, Serialize};

/// Excitatory / inhibitory class of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellClass {
    /// Excitatory
    #[serde(rename = "ex")]
    Excitatory,
    /// Inhibitory
    #[serde(rename = "in")]
    Inhibitory,
}

/// Metadata the pipeline reads from and writes to a cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellMeta {
    /// LIMS specimen id; keys the external morphology source.
    pub lims_specimen_id: Option<u64>,
    /// Class inferred from the transgenic reporter.
    pub transgenic_cell_class: Option<CellClass>,
    /// Class inferred from dendrite morphology.
    pub morpho_cell_class: Option<CellClass>,
}

/// A recorded cell, identified within its experiment by electrode `ext_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Database id
    pub id: u64,
    /// Owning experiment
    pub experiment_id: u64,
    /// Electrode / headstage id within the experiment
    pub ext_id: String,
    /// Metadata
    pub meta: CellMeta,
    /// Class from non-synaptic evidence (transgenic and morphology)
    pub cell_class_nonsynaptic: Option<CellClass>,
}

impl Cell {
    /// Create a cell with empty metadata.
    #[must_use]
    pub fn new(id: u64, experiment_id: u64, ext_id: impl Into<String>) -> Self {
        Self {
            id,
            experiment_id,
            ext_id: ext_id.into(),
            meta: CellMeta::default(),
            cell_class_nonsynaptic: None,
        }
    }

    /// Set the LIMS specimen id.
    #[must_use]
    pub const fn with_specimen(mut self, specimen_id: u64) -> Self {
        self.meta.lims_specimen_id = Some(specimen_id);
        self
    }

    /// Set the transgenic class.
    #[must_use]
    pub const fn with_transgenic_class(mut self, class: CellClass) -> Self {
        self.meta.transgenic_cell_class = Some(class);
        self
    }

    /// Record the morphological class and reconcile the non-synaptic class.
    ///
    /// Without a transgenic class the morphological class is used directly.
    /// When both are known and disagree the non-synaptic class is cleared.
    pub fn apply_morpho_class(&mut self, morpho_class: Option<CellClass>) {
        self.meta.morpho_cell_class = morpho_class;
        match (self.meta.transgenic_cell_class, morpho_class) {
            (None, _) => self.cell_class_nonsynaptic = morpho_class,
            (Some(transgenic), Some(morpho)) if transgenic != morpho => {
                self.cell_class_nonsynaptic = None;
            }
            _ => {}
        }
    }
}

/// Ordered (pre, post) cell pair within an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    /// Database id
    pub id: u64,
    /// Owning experiment
    pub experiment_id: u64,
    /// Presynaptic cell
    pub pre_cell_id: u64,
    /// Postsynaptic cell
    pub post_cell_id: u64,
    /// Chemical synapse detected
    pub synapse: bool,
    /// Intersomatic distance in meters
    pub distance: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_morpho_class_fills_missing_transgenic() {
        let mut cell = Cell::new(1, 1, "1");
        cell.apply_morpho_class(Some(CellClass::Inhibitory));
        assert_eq!(cell.cell_class_nonsynaptic, Some(CellClass::Inhibitory));
        assert_eq!(cell.meta.morpho_cell_class, Some(CellClass::Inhibitory));
    }

    #[test]
    fn test_conflicting_classes_clear_nonsynaptic() {
        let mut cell = Cell::new(1, 1, "1").with_transgenic_class(CellClass::Excitatory);
        cell.cell_class_nonsynaptic = Some(CellClass::Excitatory);
        cell.apply_morpho_class(Some(CellClass::Inhibitory));
        assert_eq!(cell.cell_class_nonsynaptic, None);
    }

    #[test]
    fn test_agreeing_classes_keep_nonsynaptic() {
        let mut cell = Cell::new(1, 1, "1").with_transgenic_class(CellClass::Excitatory);
        cell.cell_class_nonsynaptic = Some(CellClass::Excitatory);
        cell.apply_morpho_class(Some(CellClass::Excitatory));
        assert_eq!(cell.cell_class_nonsynaptic, Some(CellClass::Excitatory));
        cell.apply_morpho_class(None);
        assert_eq!(cell.cell_class_nonsynaptic, Some(CellClass::Excitatory));
    }

    #[test]
    fn test_cell_class_serializes_short_form() {
        assert_eq!(serde_json::to_string(&CellClass::Excitatory).unwrap(), "\"ex\"");
        assert_eq!(serde_json::to_string(&CellClass::Inhibitory).unwrap(), "\"in\"");
    }
}
