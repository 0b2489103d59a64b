//! Mapping from external annotation columns to typed record fields

use serde_json::Value;

use super::MorphologyRow;
use crate::record::{AxonOrigin, DendriteType, MorphologyRecord, Truncation};
use crate::{Error, Result};

/// Value type of an annotation column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Free text
    Text,
    /// Number, or a string that parses as one
    Float,
    /// Exactly one of a fixed set of labels
    Choice(&'static [&'static str]),
}

/// One annotation column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Column name in the external source
    pub source: &'static str,
    /// Field name in [`MorphologyRecord`]
    pub field: &'static str,
    /// Expected value type
    pub kind: ColumnKind,
}

/// Columns read from every external morphology row.
pub const COLUMNS: &[Column] = &[
    Column {
        source: "Qual_Morpho_Type",
        field: "qual_morpho_type",
        kind: ColumnKind::Text,
    },
    Column {
        source: "dendrite_type",
        field: "dendrite_type",
        kind: ColumnKind::Choice(DendriteType::LABELS),
    },
    Column {
        source: "Apical_truncation_distance",
        field: "apical_trunc_distance",
        kind: ColumnKind::Float,
    },
    Column {
        source: "Axon_truncation_distance",
        field: "axon_trunc_distance",
        kind: ColumnKind::Float,
    },
    Column {
        source: "Axon origination",
        field: "axon_origin",
        kind: ColumnKind::Choice(AxonOrigin::LABELS),
    },
    Column {
        source: "Axon_truncation",
        field: "axon_truncation",
        kind: ColumnKind::Choice(Truncation::LABELS),
    },
    Column {
        source: "Apical_truncation",
        field: "apical_truncation",
        kind: ColumnKind::Choice(Truncation::LABELS),
    },
];

/// A column value after type checking.
#[derive(Debug, Clone, PartialEq)]
enum Parsed {
    Text(String),
    Float(f64),
    Choice(&'static str),
}

struct RowParser<'a> {
    specimen_id: u64,
    row: &'a MorphologyRow,
}

impl RowParser<'_> {
    fn error(&self, column: &Column, message: String) -> Error {
        Error::data_quality(format!("specimen {}", self.specimen_id), column.source, message)
    }

    fn parse(&self, column: &Column) -> Result<Option<Parsed>> {
        let value = self
            .row
            .get(column.source)
            .ok_or_else(|| self.error(column, "column missing from source row".into()))?;
        // Blank cells mean "not annotated", same as null
        if value.is_null() || value.as_str() == Some("") {
            return Ok(None);
        }
        let parsed = match column.kind {
            ColumnKind::Text => Parsed::Text(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            ColumnKind::Float => Parsed::Float(self.parse_float(column, value)?),
            ColumnKind::Choice(labels) => {
                let text = value.as_str().unwrap_or_default();
                let matches: Vec<&'static str> =
                    labels.iter().copied().filter(|label| *label == text).collect();
                match matches.as_slice() {
                    [label] => Parsed::Choice(*label),
                    _ => {
                        return Err(self.error(
                            column,
                            format!("cannot parse annotation {value}; expected one of {labels:?}"),
                        ))
                    }
                }
            }
        };
        Ok(Some(parsed))
    }

    fn parse_float(&self, column: &Column, value: &Value) -> Result<f64> {
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| self.error(column, format!("cannot parse annotation {value} as a number")))
    }
}

fn text(parsed: Option<Parsed>) -> Option<String> {
    match parsed {
        Some(Parsed::Text(s)) => Some(s),
        _ => None,
    }
}

fn float(parsed: Option<Parsed>) -> Option<f64> {
    match parsed {
        Some(Parsed::Float(v)) => Some(v),
        _ => None,
    }
}

fn choice<T>(parsed: Option<Parsed>, from_label: fn(&str) -> Option<T>) -> Option<T> {
    match parsed {
        Some(Parsed::Choice(label)) => from_label(label),
        _ => None,
    }
}

/// Fill the annotation fields of `record` from an external row.
///
/// Either every column parses and the record is updated, or the record is
/// left untouched and a data-quality error names the specimen and column.
///
/// # Errors
///
/// `Error::DataQuality` for a missing column, a categorical value that does
/// not match exactly one label, or a float that does not parse.
pub fn apply_row(record: &mut MorphologyRecord, specimen_id: u64, row: &MorphologyRow) -> Result<()> {
    let parser = RowParser { specimen_id, row };
    let mut parsed = COLUMNS
        .iter()
        .map(|column| parser.parse(column))
        .collect::<Result<Vec<_>>>()?
        .into_iter();
    let mut next = || parsed.next().flatten();

    record.qual_morpho_type = text(next());
    record.dendrite_type = choice(next(), DendriteType::from_label);
    record.apical_trunc_distance = float(next());
    record.axon_trunc_distance = float(next());
    record.axon_origin = choice(next(), AxonOrigin::from_label);
    record.axon_truncation = choice(next(), Truncation::from_label);
    record.apical_truncation = choice(next(), Truncation::from_label);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_row() -> MorphologyRow {
        serde_json::from_value(json!({
            "Qual_Morpho_Type": "pyramidal",
            "dendrite_type": "spiny",
            "Apical_truncation_distance": "120.5",
            "Axon_truncation_distance": 80,
            "Axon origination": "soma",
            "Axon_truncation": "intact",
            "Apical_truncation": null,
            "cell_specimen_id": 42,
        }))
        .unwrap()
    }

    #[test]
    fn test_apply_full_row() {
        let mut record = MorphologyRecord::new(1);
        apply_row(&mut record, 42, &full_row()).unwrap();
        assert_eq!(record.qual_morpho_type.as_deref(), Some("pyramidal"));
        assert_eq!(record.dendrite_type, Some(DendriteType::Spiny));
        assert_eq!(record.apical_trunc_distance, Some(120.5));
        assert_eq!(record.axon_trunc_distance, Some(80.0));
        assert_eq!(record.axon_origin, Some(AxonOrigin::Soma));
        assert_eq!(record.axon_truncation, Some(Truncation::Intact));
        assert_eq!(record.apical_truncation, None);
    }

    #[test]
    fn test_unknown_label_names_record_and_column() {
        let mut row = full_row();
        row.insert("dendrite_type".into(), json!("Spiny "));
        let mut record = MorphologyRecord::new(1);
        let err = apply_row(&mut record, 42, &row).unwrap_err();
        match err {
            Error::DataQuality { record: r, field, .. } => {
                assert_eq!(r, "specimen 42");
                assert_eq!(field, "dendrite_type");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(record, MorphologyRecord::new(1));
    }

    #[test]
    fn test_bad_float_and_missing_column() {
        let mut row = full_row();
        row.insert("Axon_truncation_distance".into(), json!("far"));
        let err = apply_row(&mut MorphologyRecord::new(1), 42, &row).unwrap_err();
        assert!(err.to_string().contains("Axon_truncation_distance"));

        let mut row = full_row();
        row.remove("Axon origination");
        let err = apply_row(&mut MorphologyRecord::new(1), 42, &row).unwrap_err();
        assert!(err.to_string().contains("Axon origination"));
    }
}
