#![deny(missing_docs)]
#![doc = "Core data model for HDX deltaG fitting: peptide tables, per-state measurements, the residue coverage mapping, intrinsic rate tables and the shared error type."]

/// Peptide-by-residue coverage mapping.
pub mod coverage;
pub mod errors;
/// Canonical hashing helpers.
pub mod hash;
/// Per-state measurements and measurement sets.
pub mod measurement;
pub mod peptide;
pub mod rates;
pub mod rng;
/// Canonical JSON and YAML serde helpers.
pub mod serde;

pub use coverage::{CoverageMapping, CoverageRules, CoverageWeighting};
pub use errors::{ErrorInfo, HdxError};
pub use measurement::{HdxMeasurement, HdxMeasurementSet};
pub use peptide::{read_peptide_table, Peptide, PeptideRecord};
pub use rates::IntrinsicRateTable;
pub use rng::{derive_substream_seed, RngHandle};

/// Molar gas constant in J/(mol K).
pub const GAS_CONSTANT: f64 = 8.3144598;
