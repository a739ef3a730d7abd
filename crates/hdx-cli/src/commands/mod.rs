//! Subcommands of `hdx-fit` and the file handling they share.

use std::error::Error;
use std::fs::{self, File};
use std::path::Path;

use serde::Deserialize;

use hdx_core::{read_peptide_table, HdxMeasurementSet, IntrinsicRateTable};
use hdx_global::DeltaGField;
use hdx_kinetics::fill_missing;

use crate::config::HdxConfig;

pub mod global;
pub mod guess;
pub mod pipeline;

/// Reads the uniform peptide table at `path` into one measurement per state.
pub fn load_measurements(path: &Path, config: &HdxConfig) -> Result<HdxMeasurementSet, Box<dyn Error>> {
    let records = read_peptide_table(File::open(path)?)?;
    let set = HdxMeasurementSet::from_records(
        &records,
        config.temperature,
        config.ph,
        config.coverage,
    )?;
    Ok(set)
}

/// Reads an `r_number,k_int` table.
pub fn load_rates(path: &Path) -> Result<IntrinsicRateTable, Box<dyn Error>> {
    Ok(IntrinsicRateTable::read_csv(File::open(path)?)?)
}

/// Reads an `r_number,dG` table (J/mol) shared by every state.
///
/// Gaps between the first and last residue are filled by interpolation.
pub fn load_deltag(path: &Path) -> Result<DeltaGField, Box<dyn Error>> {
    #[derive(Deserialize)]
    struct Row {
        r_number: i64,
        #[serde(rename = "dG")]
        deltag: Option<f64>,
    }
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)?;
    let mut rows = Vec::new();
    for row in rdr.deserialize::<Row>() {
        let row = row?;
        rows.push((row.r_number, row.deltag.unwrap_or(f64::NAN)));
    }
    let (Some(r_start), Some(r_end)) = (
        rows.iter().map(|(r, _)| *r).min(),
        rows.iter().map(|(r, _)| *r).max(),
    ) else {
        return Err(format!("no deltaG rows in {}", path.display()).into());
    };
    let mut values = vec![f64::NAN; (r_end - r_start + 1) as usize];
    for (r_number, deltag) in rows {
        values[(r_number - r_start) as usize] = deltag;
    }
    Ok(DeltaGField::from_residues(r_start, fill_missing(&values))?)
}

pub(crate) fn write_text(path: &Path, contents: &str) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}
