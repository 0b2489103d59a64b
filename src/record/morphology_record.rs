//! Per-cell morphology annotations

use serde::{Deserialize, Serialize};

use super::CellClass;

macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            /// All labels accepted by the annotation source.
            pub const LABELS: &'static [&'static str] = &[$($label),+];

            /// Label as written in the annotation source.
            #[must_use]
            pub const fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }

            /// Parse an exact label.
            #[must_use]
            pub fn from_label(label: &str) -> Option<Self> {
                match label {
                    $($label => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

labelled_enum! {
    /// Dendrite spine density.
    DendriteType {
        /// Spiny
        Spiny => "spiny",
        /// Aspiny
        Aspiny => "aspiny",
        /// Sparsely spiny
        SparselySpiny => "sparsely spiny",
        /// Not enough information
        NotEnoughInfo => "NEI",
    }
}

labelled_enum! {
    /// Where the axon leaves the cell.
    AxonOrigin {
        /// Soma
        Soma => "soma",
        /// Dendrite
        Dendrite => "dendrite",
        /// Unclear
        Unclear => "unclear",
        /// Not enough information
        NotEnoughInfo => "NEI",
    }
}

labelled_enum! {
    /// Truncation state of a neurite.
    Truncation {
        /// Truncated
        Truncated => "truncated",
        /// Borderline
        Borderline => "borderline",
        /// Intact
        Intact => "intact",
        /// Unclear
        Unclear => "unclear",
        /// Not enough information
        NotEnoughInfo => "NEI",
    }
}

impl DendriteType {
    /// Cell class implied by the dendrite type, if any.
    #[must_use]
    pub const fn cell_class(self) -> Option<CellClass> {
        match self {
            Self::Spiny => Some(CellClass::Excitatory),
            Self::Aspiny => Some(CellClass::Inhibitory),
            Self::SparselySpiny | Self::NotEnoughInfo => None,
        }
    }
}

/// Morphology annotations for one cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MorphologyRecord {
    /// Annotated cell
    pub cell_id: u64,
    /// Pyramidal according to the pipette annotation
    pub pyramidal: Option<bool>,
    /// Cortical layer, e.g. "2/3"
    pub cortical_layer: Option<String>,
    /// Hash of the source row this record was imported from
    pub morpho_db_hash: Option<String>,
    /// Qualitative morphology type
    pub qual_morpho_type: Option<String>,
    /// Dendrite type
    pub dendrite_type: Option<DendriteType>,
    /// Distance at which the apical dendrite is truncated
    pub apical_trunc_distance: Option<f64>,
    /// Distance at which the axon is truncated
    pub axon_trunc_distance: Option<f64>,
    /// Axon origin
    pub axon_origin: Option<AxonOrigin>,
    /// Axon truncation
    pub axon_truncation: Option<Truncation>,
    /// Apical dendrite truncation
    pub apical_truncation: Option<Truncation>,
}

impl MorphologyRecord {
    /// Empty record for a cell.
    #[must_use]
    pub fn new(cell_id: u64) -> Self {
        Self {
            cell_id,
            ..Self::default()
        }
    }
}
