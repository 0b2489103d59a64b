//! Morphology import: annotation parsing, per-cell isolation, cell class

use std::io::Write;

use serde_json::json;
use synphys_core::morphology::{
    import_experiment, normalize_layer, parse_pipette_morphology, ImportSources, JsonMorphologySource,
    LimsLookup, LimsTable, MorphologyRow, MorphologySource, MorphologyTable, PipetteTable,
};
use synphys_core::record::{AxonOrigin, Cell, CellClass, DendriteType, Experiment, Truncation};
use synphys_core::store::{MemoryStore, RecordStore};
use synphys_core::{Error, Result};

const EXPT: &str = "1521667891.153";

fn row(dendrite: &str, axon_origin: &str, truncation: &str) -> MorphologyRow {
    serde_json::from_value(json!({
        "Qual_Morpho_Type": "basket",
        "dendrite_type": dendrite,
        "Apical_truncation_distance": null,
        "Axon_truncation_distance": "35.5",
        "Axon origination": axon_origin,
        "Axon_truncation": truncation,
        "Apical_truncation": truncation,
    }))
    .unwrap()
}

fn setup() -> (MemoryStore, Experiment) {
    let store = MemoryStore::new();
    let expt = Experiment::new(1, 1_521_667_891.153);
    store.put_experiment(expt.clone());
    store.put_cell(Cell::new(1, 1, "1").with_specimen(100));
    store.put_cell(Cell::new(2, 1, "2").with_specimen(200));
    store.put_cell(Cell::new(3, 1, "3").with_specimen(300).with_transgenic_class(CellClass::Excitatory));
    (store, expt)
}

#[test]
fn test_every_label_normalizes() {
    for dendrite in DendriteType::LABELS {
        for origin in AxonOrigin::LABELS {
            for truncation in Truncation::LABELS {
                let (store, expt) = setup();
                let mut table = MorphologyTable::new();
                table.insert(100, row(dendrite, origin, truncation));
                let sources = ImportSources {
                    pipettes: &PipetteTable::new(),
                    morphology: &table,
                    lims: &LimsTable::new(),
                };
                let report = import_experiment(&store, &expt, &sources).unwrap();
                assert!(report.is_clean(), "{dendrite}/{origin}/{truncation}");

                let record = &report.records[0];
                assert_eq!(record.dendrite_type.map(|d| d.label()), Some(*dendrite));
                assert_eq!(record.axon_origin.map(|a| a.label()), Some(*origin));
                assert_eq!(record.axon_truncation.map(|t| t.label()), Some(*truncation));
                assert_eq!(record.axon_trunc_distance, Some(35.5));
                assert_eq!(record.apical_trunc_distance, None);
            }
        }
    }
}

#[test]
fn test_bad_annotation_fails_only_that_cell() {
    let (store, expt) = setup();
    let mut table = MorphologyTable::new();
    table.insert(100, row("spiny", "soma", "intact"));
    table.insert(200, row("spiny-ish", "soma", "intact"));
    let sources = ImportSources {
        pipettes: &PipetteTable::new(),
        morphology: &table,
        lims: &LimsTable::new(),
    };

    let report = import_experiment(&store, &expt, &sources).unwrap();
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.errors.len(), 1);
    let (cell_id, error) = &report.errors[0];
    assert_eq!(*cell_id, 2);
    match error {
        Error::DataQuality { record, field, .. } => {
            assert_eq!(record, "specimen 200");
            assert_eq!(field, "dendrite_type");
        }
        other => panic!("unexpected error {other:?}"),
    }

    report.persist(&store);
    assert!(store.morphology_for_cell(1).is_some());
    assert!(store.morphology_for_cell(2).is_none());
    assert!(store.morphology_for_cell(3).is_some());
}

#[test]
fn test_morpho_class_reconciles_with_transgenic() {
    let (store, expt) = setup();
    let mut table = MorphologyTable::new();
    table.insert(100, row("spiny", "soma", "intact"));
    // Cell 3 is transgenically excitatory but morphologically aspiny
    table.insert(300, row("aspiny", "dendrite", "borderline"));
    let sources = ImportSources {
        pipettes: &PipetteTable::new(),
        morphology: &table,
        lims: &LimsTable::new(),
    };

    import_experiment(&store, &expt, &sources).unwrap().persist(&store);

    let first = store.cell(1).unwrap();
    assert_eq!(first.meta.morpho_cell_class, Some(CellClass::Excitatory));
    assert_eq!(first.cell_class_nonsynaptic, Some(CellClass::Excitatory));

    let conflicted = store.cell(3).unwrap();
    assert_eq!(conflicted.meta.morpho_cell_class, Some(CellClass::Inhibitory));
    assert_eq!(conflicted.cell_class_nonsynaptic, None);
}

#[test]
fn test_pipette_and_layer_annotations() {
    let (store, expt) = setup();
    let mut pipettes = PipetteTable::new();
    pipettes.set_morphology(EXPT, "1", Some("pyr"));
    pipettes.set_morphology(EXPT, "2", Some(""));
    let lims = LimsTable::new()
        .with_layer(100, "Layer 2/3")
        .with_layer(200, "  Layer6a ");
    let sources = ImportSources {
        pipettes: &pipettes,
        morphology: &MorphologyTable::new(),
        lims: &lims,
    };

    let report = import_experiment(&store, &expt, &sources).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.records[0].pyramidal, Some(true));
    assert_eq!(report.records[0].cortical_layer.as_deref(), Some("2/3"));
    assert_eq!(report.records[1].pyramidal, None);
    assert_eq!(report.records[1].cortical_layer.as_deref(), Some("6a"));
    assert_eq!(report.records[2].cortical_layer, None);
}

#[derive(Debug)]
struct OfflineLims;

impl LimsLookup for OfflineLims {
    fn cell_layer(&self, _specimen_id: u64) -> Result<Option<String>> {
        Err(Error::LookupUnavailable("LIMS offline".to_string()))
    }

    fn cluster_cells(&self, _cluster_id: u64) -> Result<Option<Vec<u64>>> {
        Err(Error::LookupUnavailable("LIMS offline".to_string()))
    }
}

#[test]
fn test_unreachable_lims_aborts_experiment() {
    let (store, expt) = setup();
    let sources = ImportSources {
        pipettes: &PipetteTable::new(),
        morphology: &MorphologyTable::new(),
        lims: &OfflineLims,
    };
    let result = import_experiment(&store, &expt, &sources);
    assert!(matches!(result, Err(Error::LookupUnavailable(_))));
}

#[test]
fn test_json_source_snapshot() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let content = json!({
        "100": row("sparsely spiny", "unclear", "NEI"),
        "200": {"dendrite_type": "aspiny"},
    });
    write!(file, "{content}").unwrap();

    let source = JsonMorphologySource::new(file.path());
    let table = source.snapshot().unwrap();
    assert_eq!(table.len(), 2);
    assert!(table.lookup(100).is_some());

    let (store, expt) = setup();
    let sources = ImportSources {
        pipettes: &PipetteTable::new(),
        morphology: &table,
        lims: &LimsTable::new(),
    };
    let report = import_experiment(&store, &expt, &sources).unwrap();
    // Specimen 200's row lacks most columns
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.records[0].dendrite_type, Some(DendriteType::SparselySpiny));
    assert_eq!(report.records[0].morpho_db_hash, Some(table.content_hash(100)));
}

#[test]
fn test_missing_json_file_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let source = JsonMorphologySource::new(dir.path().join("absent.json"));
    assert!(matches!(source.snapshot(), Err(Error::LookupUnavailable(_))));
}

#[test]
fn test_annotation_helpers() {
    assert_eq!(parse_pipette_morphology(None), Ok(None));
    assert_eq!(parse_pipette_morphology(Some("pyr")), Ok(Some(true)));
    assert!(parse_pipette_morphology(Some("Pyr")).is_err());
    assert_eq!(normalize_layer("Layer 4").as_deref(), Some("4"));
    assert_eq!(normalize_layer("5").as_deref(), Some("5"));
    assert_eq!(normalize_layer("Layer "), None);
}
