//! Record store contract tests against `MemoryStore`

use std::sync::Arc;
use std::thread;

use synphys_core::record::{Cell, Experiment, MorphologyRecord, Pair, Slice};
use synphys_core::store::{MemoryStore, RecordStore, TIMESTAMP_TOLERANCE};
use synphys_core::Error;

fn slice(id: u64, ts: f64) -> Slice {
    Slice {
        id,
        acq_timestamp: ts,
        species: Some("mouse".to_string()),
        age: Some(45),
    }
}

#[test]
fn test_experiment_lookup_by_ext_id() {
    let store = MemoryStore::new();
    store.put_experiment(Experiment::new(1, 1_500_000_000.123));
    store.put_experiment(Experiment::new(2, 1_500_000_100.456));

    let expt = store.experiment_by_ext_id("1500000100.456").unwrap();
    assert_eq!(expt.id(), 2);
    assert!(matches!(store.experiment_by_ext_id("0.000"), Err(Error::NotFound(_))));
}

#[test]
fn test_duplicate_ext_id_is_ambiguous() {
    let store = MemoryStore::new();
    store.put_experiment(Experiment::builder(1, 10.0).ext_id("dup").build());
    store.put_experiment(Experiment::builder(2, 20.0).ext_id("dup").build());
    assert!(matches!(store.experiment_by_ext_id("dup"), Err(Error::Ambiguity(_))));
}

#[test]
fn test_legacy_timestamp_tolerance() {
    let store = MemoryStore::new();
    // Stored truncated to two decimals
    store.put_experiment(Experiment::new(1, 1_500_000_000.12));

    let found = store.experiment_from_timestamp(1_500_000_000.123).unwrap();
    assert_eq!(found.id(), 1);
    assert!(matches!(
        store.experiment_from_timestamp(1_500_000_000.12 + 2.0 * TIMESTAMP_TOLERANCE),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_two_experiments_within_tolerance_are_ambiguous() {
    let store = MemoryStore::new();
    store.put_experiment(Experiment::new(1, 200.001));
    store.put_experiment(Experiment::new(2, 200.004));

    let err = store.experiment_from_timestamp(200.002).unwrap_err();
    assert!(matches!(err, Error::Ambiguity(_)));
    assert!(err.to_string().contains("2 records"));
}

#[test]
fn test_slice_lookup_requires_unique_match() {
    let store = MemoryStore::new();
    store.put_slice(slice(1, 50.0));
    assert_eq!(store.slice_from_timestamp(50.0).unwrap().id, 1);

    store.put_slice(slice(2, 50.0));
    assert!(matches!(store.slice_from_timestamp(50.0), Err(Error::Ambiguity(_))));
    assert!(matches!(store.slice_from_timestamp(51.0), Err(Error::NotFound(_))));
}

#[test]
fn test_morphology_by_specimen_spans_experiments() {
    let store = MemoryStore::new();
    store.put_cell(Cell::new(1, 10, "1").with_specimen(900));
    store.put_cell(Cell::new(2, 20, "4").with_specimen(900));
    store.put_cell(Cell::new(3, 20, "5").with_specimen(901));
    for id in 1..=3 {
        store.put_morphology(MorphologyRecord::new(id));
    }

    let records = store.morphology_for_specimen(900);
    assert_eq!(records.iter().map(|r| r.cell_id).collect::<Vec<_>>(), vec![1, 2]);
    assert!(store.morphology_for_specimen(999).is_empty());
}

#[test]
fn test_children_ordered_by_id() {
    let store = MemoryStore::new();
    for id in [5, 3, 4] {
        store.put_cell(Cell::new(id, 1, id.to_string()));
        store.put_pair(Pair {
            id,
            experiment_id: 1,
            pre_cell_id: 3,
            post_cell_id: 4,
            synapse: false,
            distance: Some(50e-6),
        });
    }
    let cells: Vec<u64> = store.cells_for_experiment(1).iter().map(|c| c.id).collect();
    let pairs: Vec<u64> = store.pairs_for_experiment(1).iter().map(|p| p.id).collect();
    assert_eq!(cells, vec![3, 4, 5]);
    assert_eq!(pairs, vec![3, 4, 5]);
}

#[test]
fn test_concurrent_writes() {
    let store = Arc::new(MemoryStore::new());
    let handles: Vec<_> = (0..4_u64)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..25_u64 {
                    let id = t * 100 + i;
                    #[allow(clippy::cast_precision_loss)]
                    store.put_experiment(Experiment::new(id, id as f64));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.experiment_count(), 100);
}
