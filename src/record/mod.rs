//! Typed rows of the synaptic physiology record model
//!
//! Experiments own slices, cells and pairs. Derived records (morphology,
//! connection strength) are keyed by the cell or pair they describe and are
//! produced by pipeline modules.

mod cell_record;
mod connection_strength_record;
mod experiment_record;
mod morphology_record;

pub use cell_record::{Cell, CellClass, CellMeta, Pair};
pub use connection_strength_record::{
    ClampStats, ConnectionStrengthRecord, MetricStats, PspFitBlock, SynapseType,
};
pub use experiment_record::{Experiment, ExperimentBuilder, ExperimentMeta, Slice};
pub use morphology_record::{AxonOrigin, DendriteType, MorphologyRecord, Truncation};
