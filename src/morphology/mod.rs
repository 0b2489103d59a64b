//! Morphology annotation import and normalization
//!
//! Cell morphology comes from three places:
//!
//! - the experimenter's pipette notes (`"pyr"` marks a pyramidal cell),
//! - LIMS (cortical layer, cluster membership),
//! - an external annotation table keyed by LIMS specimen id.
//!
//! Every categorical column of the annotation table must match exactly one
//! label of its enumerated set. Anything else is a data-quality error for that
//! cell only; the rest of the experiment still imports.
//!
//! The raw annotation row is hashed with [`content_hash`] and stored on the
//! record, so the pipeline can tell when the external table changed.

mod columns;
mod hash;
mod import;
mod source;

use std::collections::BTreeMap;

pub use columns::{apply_row, Column, ColumnKind, COLUMNS};
pub use hash::{canonical_form, content_hash};
pub use import::{import_experiment, ImportReport, ImportSources, PipetteTable};
pub use source::{
    open_morphology_source, JsonMorphologySource, LimsLookup, LimsTable, MorphologySource,
    MorphologyTable, UnavailableSource,
};

/// One row of the external annotation table, column name to raw value.
pub type MorphologyRow = BTreeMap<String, serde_json::Value>;

/// Interpret the experimenter's morphology note.
///
/// No note (or an empty one) means unknown; `"pyr"` means pyramidal.
///
/// # Errors
///
/// Returns a description of the problem for any other note.
pub fn parse_pipette_morphology(note: Option<&str>) -> std::result::Result<Option<bool>, String> {
    match note {
        None | Some("") => Ok(None),
        Some("pyr") => Ok(Some(true)),
        Some(other) => Err(format!("unknown morphology string {other:?}")),
    }
}

/// Normalize a LIMS layer annotation: `"Layer 2/3"` becomes `"2/3"`.
///
/// Returns `None` when nothing is left.
#[must_use]
pub fn normalize_layer(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let layer = trimmed.strip_prefix("Layer").unwrap_or(trimmed).trim();
    (!layer.is_empty()).then(|| layer.to_string())
}
