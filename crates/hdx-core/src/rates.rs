//! Per-residue intrinsic exchange rates supplied by an external collaborator.

use std::collections::BTreeMap;
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, HdxError};

/// Intrinsic (unprotected) exchange rates `k_int` keyed by residue number.
///
/// Rates depend on sequence context, temperature and pH and are computed
/// elsewhere. Residues absent from the table, or with non-finite rates,
/// are treated as non-exchanging (`k_int = 0`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IntrinsicRateTable {
    rates: BTreeMap<i64, f64>,
}

impl IntrinsicRateTable {
    /// Builds a table from `(residue, k_int)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (i64, f64)>) -> Result<Self, HdxError> {
        let mut rates = BTreeMap::new();
        for (r_number, k_int) in pairs {
            if k_int < 0.0 {
                return Err(HdxError::Input(
                    ErrorInfo::new("negative_k_int", "intrinsic rates must be non-negative")
                        .with_context("r_number", r_number.to_string())
                        .with_context("k_int", k_int.to_string()),
                ));
            }
            rates.insert(r_number, k_int);
        }
        Ok(Self { rates })
    }

    /// Builds a table covering `r_start..` from consecutive values.
    pub fn from_slice(r_start: i64, values: &[f64]) -> Result<Self, HdxError> {
        Self::from_pairs(
            values
                .iter()
                .enumerate()
                .map(|(offset, &k)| (r_start + offset as i64, k)),
        )
    }

    /// Reads a `r_number,k_int` table with a header row.
    pub fn read_csv<R: Read>(reader: R) -> Result<Self, HdxError> {
        #[derive(Deserialize)]
        struct Row {
            r_number: i64,
            k_int: Option<f64>,
        }
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);
        let mut pairs = Vec::new();
        for row in rdr.deserialize::<Row>() {
            let row = row.map_err(|err| {
                HdxError::Input(ErrorInfo::new("k_int_table", err.to_string()))
            })?;
            pairs.push((row.r_number, row.k_int.unwrap_or(f64::NAN)));
        }
        Self::from_pairs(pairs)
    }

    /// Exchange rate of a residue; zero when unknown.
    pub fn k_int(&self, r_number: i64) -> f64 {
        match self.rates.get(&r_number) {
            Some(&k) if k.is_finite() => k,
            _ => 0.0,
        }
    }

    /// Rates along the contiguous axis `r_start..=r_end`.
    pub fn along_axis(&self, r_start: i64, r_end: i64) -> Vec<f64> {
        (r_start..=r_end).map(|r| self.k_int(r)).collect()
    }

    /// Number of residues with an entry.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}
