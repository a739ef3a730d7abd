//! Padded tensors of a measurement set on the shared residue axis.

use serde::{Deserialize, Serialize};

use hdx_core::{ErrorInfo, HdxError, HdxMeasurementSet, IntrinsicRateTable};

/// Measurement data aligned to `Ns x Np x Nt` and `Ns x Nr`.
///
/// States with fewer peptides or timepoints are zero padded; padded and
/// invalid entries are cleared in the mask and never reach the loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedInputs {
    /// State names in set order.
    pub names: Vec<String>,
    /// First residue of the shared axis.
    pub r_start: i64,
    /// Residues on the shared axis (`Nr`).
    pub n_residues: usize,
    /// Padded peptide dimension (`Np`).
    pub n_peptides: usize,
    /// Padded timepoint dimension (`Nt`).
    pub n_timepoints: usize,
    /// Labelling temperature per state (K).
    pub temperature: Vec<f64>,
    /// Intrinsic rates, `Ns x Nr`.
    pub k_int: Vec<f64>,
    /// Coverage weights, `Ns x Np x Nr`.
    pub coverage: Vec<f64>,
    /// Exposure times, `Ns x Nt`.
    pub timepoints: Vec<f64>,
    /// Observed uptake in deuterium units, `Ns x Np x Nt`, zero where masked.
    pub uptake: Vec<f64>,
    /// Validity of each `(state, peptide, timepoint)` entry.
    pub mask: Vec<bool>,
    /// Real peptide count per state.
    pub peptide_counts: Vec<usize>,
    /// Real timepoint count per state.
    pub timepoint_counts: Vec<usize>,
    /// Residue covered by at least one peptide of the state, `Ns x Nr`.
    pub covered: Vec<bool>,
}

impl AlignedInputs {
    /// Aligns `set` with one rate table per state, or a single table shared
    /// by every state.
    pub fn from_set(
        set: &HdxMeasurementSet,
        rates: &[IntrinsicRateTable],
    ) -> Result<Self, HdxError> {
        let ns = set.n_states();
        if rates.len() != 1 && rates.len() != ns {
            return Err(HdxError::Fit(
                ErrorInfo::new("rate_tables", "need one intrinsic rate table per state")
                    .with_context("states", ns.to_string())
                    .with_context("tables", rates.len().to_string()),
            ));
        }
        let r_start = set.r_start();
        let nr = (set.r_end() - r_start + 1) as usize;
        let np = set.max_peptides();
        let nt = set.max_timepoints();

        let mut inputs = Self {
            names: set.names(),
            r_start,
            n_residues: nr,
            n_peptides: np,
            n_timepoints: nt,
            temperature: Vec::with_capacity(ns),
            k_int: Vec::with_capacity(ns * nr),
            coverage: vec![0.0; ns * np * nr],
            timepoints: vec![0.0; ns * nt],
            uptake: vec![0.0; ns * np * nt],
            mask: vec![false; ns * np * nt],
            peptide_counts: Vec::with_capacity(ns),
            timepoint_counts: Vec::with_capacity(ns),
            covered: vec![false; ns * nr],
        };

        for (s, state) in set.states().enumerate() {
            let table = if rates.len() == 1 { &rates[0] } else { &rates[s] };
            inputs.temperature.push(state.temperature());
            inputs
                .k_int
                .extend(table.along_axis(r_start, r_start + nr as i64 - 1));
            inputs.peptide_counts.push(state.n_peptides());
            inputs.timepoint_counts.push(state.n_timepoints());

            let mapping = state.coverage();
            let offset = (mapping.r_start() - r_start) as usize;
            for p in 0..state.n_peptides() {
                for (local, &w) in mapping.row(p).iter().enumerate() {
                    let r = offset + local;
                    inputs.coverage[(s * np + p) * nr + r] = w;
                    if w > 0.0 {
                        inputs.covered[s * nr + r] = true;
                    }
                }
                for t in 0..state.n_timepoints() {
                    let idx = (s * np + p) * nt + t;
                    if state.is_valid(p, t) {
                        inputs.uptake[idx] = state.uptake(p, t);
                        inputs.mask[idx] = true;
                    }
                }
            }
            for (t, &time) in state.timepoints().iter().enumerate() {
                inputs.timepoints[s * nt + t] = time;
            }
        }
        Ok(inputs)
    }

    /// Number of states (`Ns`).
    pub fn n_states(&self) -> usize {
        self.names.len()
    }

    /// Residue numbers of the shared axis.
    pub fn r_numbers(&self) -> Vec<i64> {
        (0..self.n_residues as i64).map(|i| self.r_start + i).collect()
    }

    /// Coverage weights of one padded peptide row.
    pub fn coverage_row(&self, state: usize, peptide: usize) -> &[f64] {
        let nr = self.n_residues;
        let start = (state * self.n_peptides + peptide) * nr;
        &self.coverage[start..start + nr]
    }

    /// Flat index of a `(state, peptide, timepoint)` entry.
    pub fn entry(&self, state: usize, peptide: usize, timepoint: usize) -> usize {
        (state * self.n_peptides + peptide) * self.n_timepoints + timepoint
    }

    /// Number of states covering each residue.
    pub fn coverage_multiplicity(&self) -> Vec<usize> {
        let nr = self.n_residues;
        (0..nr)
            .map(|r| (0..self.n_states()).filter(|&s| self.covered[s * nr + r]).count())
            .collect()
    }

    /// Number of valid entries.
    pub fn n_valid(&self) -> usize {
        self.mask.iter().filter(|&&valid| valid).count()
    }
}
