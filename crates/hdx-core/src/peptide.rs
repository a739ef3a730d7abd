//! Peptide records and the uniform peptide table reader.

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::coverage::CoverageRules;
use crate::errors::{ErrorInfo, HdxError};

/// One row of an already-uniformised peptide uptake table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeptideRecord {
    /// Name of the protein state the peptide was measured in.
    pub state: String,
    /// Deuterium exposure time.
    pub exposure: f64,
    /// First residue number of the peptide (inclusive).
    pub start: i64,
    /// Last residue number of the peptide (inclusive).
    pub end: i64,
    /// One-letter amino acid sequence, empty when unknown.
    #[serde(default)]
    pub sequence: String,
    /// Deuterium uptake corrected for back-exchange, in deuterium units.
    pub uptake: f64,
    /// Standard deviation of the uptake, when reported.
    #[serde(default)]
    pub uptake_sd: Option<f64>,
}

/// Peptide identity within one state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Peptide {
    /// First residue number (inclusive).
    pub start: i64,
    /// Last residue number (inclusive).
    pub end: i64,
    /// One-letter sequence, empty when unknown.
    pub sequence: String,
}

impl Peptide {
    /// Creates a peptide, validating the residue range against the sequence.
    pub fn new(start: i64, end: i64, sequence: impl Into<String>) -> Result<Self, HdxError> {
        let sequence = sequence.into();
        if end < start {
            return Err(HdxError::Input(
                ErrorInfo::new("peptide_range", "peptide end precedes its start")
                    .with_context("start", start.to_string())
                    .with_context("end", end.to_string()),
            ));
        }
        let length = (end - start + 1) as usize;
        if !sequence.is_empty() && sequence.chars().count() != length {
            return Err(HdxError::Input(
                ErrorInfo::new(
                    "peptide_sequence_length",
                    "sequence length does not match the residue range",
                )
                .with_context("start", start.to_string())
                .with_context("end", end.to_string())
                .with_context("sequence", sequence.clone()),
            ));
        }
        Ok(Self {
            start,
            end,
            sequence,
        })
    }

    /// Number of residues spanned by the peptide.
    pub fn len(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    /// Always false; peptides span at least one residue.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Residue numbers that retain deuterium label under the given rules.
    ///
    /// The first `drop_first` residues are back-exchanged during analysis and
    /// prolines carry no amide hydrogen.
    pub fn exchangeable_residues(&self, rules: &CoverageRules) -> Vec<i64> {
        let first = self.start + rules.drop_first as i64;
        let residues: Vec<char> = self.sequence.chars().collect();
        (first..=self.end)
            .filter(|&r| {
                if !rules.ignore_prolines || residues.is_empty() {
                    return true;
                }
                residues
                    .get((r - self.start) as usize)
                    .map(|aa| !aa.eq_ignore_ascii_case(&'P'))
                    .unwrap_or(true)
            })
            .collect()
    }
}

fn table_error(err: impl ToString) -> HdxError {
    HdxError::Input(ErrorInfo::new("peptide_table", err.to_string()))
}

/// Reads peptide records from a delimited table with a header row.
///
/// Expected columns: `state,exposure,start,end,sequence,uptake,uptake_sd`;
/// `sequence` and `uptake_sd` may be empty. Empty `uptake` cells are read as
/// NaN so that the measurement keeps the gap.
pub fn read_peptide_table<R: Read>(reader: R) -> Result<Vec<PeptideRecord>, HdxError> {
    #[derive(Deserialize)]
    struct RawRecord {
        state: String,
        exposure: f64,
        start: i64,
        end: i64,
        #[serde(default)]
        sequence: String,
        uptake: Option<f64>,
        #[serde(default)]
        uptake_sd: Option<f64>,
    }

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);
    let mut records = Vec::new();
    for row in rdr.deserialize::<RawRecord>() {
        let raw = row.map_err(table_error)?;
        records.push(PeptideRecord {
            state: raw.state,
            exposure: raw.exposure,
            start: raw.start,
            end: raw.end,
            sequence: raw.sequence,
            uptake: raw.uptake.unwrap_or(f64::NAN),
            uptake_sd: raw.uptake_sd,
        });
    }
    Ok(records)
}
