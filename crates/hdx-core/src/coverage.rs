//! Fixed peptide-by-residue weighting used by the forward model.

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, HdxError};
use crate::peptide::Peptide;

fn default_drop_first() -> usize {
    1
}

fn default_ignore_prolines() -> bool {
    true
}

/// Weight assigned to each exchangeable residue of a peptide.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CoverageWeighting {
    /// Exchangeable residues weigh 1, all others 0.
    #[default]
    Incidence,
    /// Smooth edge weighting `σ((r - lo + ½)/w) · σ((hi + ½ - r)/w)`.
    ///
    /// Each row is rescaled so it still sums to the peptide's exchangeable
    /// count: the shape only redistributes uptake between residues.
    /// Independent of temperature; approaches [`CoverageWeighting::Incidence`]
    /// as `width` goes to zero.
    Sigmoid {
        /// Edge width in residues.
        width: f64,
    },
}

/// Rules deciding which residues of a peptide report on deuterium uptake.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageRules {
    /// Number of N-terminal residues per peptide that lose their label.
    #[serde(default = "default_drop_first")]
    pub drop_first: usize,
    /// Exclude prolines (no amide hydrogen) from the exchangeable set.
    #[serde(default = "default_ignore_prolines")]
    pub ignore_prolines: bool,
    /// Weighting applied to exchangeable residues.
    #[serde(default)]
    pub weighting: CoverageWeighting,
}

impl Default for CoverageRules {
    fn default() -> Self {
        Self {
            drop_first: default_drop_first(),
            ignore_prolines: default_ignore_prolines(),
            weighting: CoverageWeighting::default(),
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

fn coverage_error(code: &str, message: &str) -> HdxError {
    HdxError::Coverage(ErrorInfo::new(code, message))
}

/// Dense `Np x Nr` weight matrix mapping residue quantities onto peptides.
///
/// Rows follow the peptide order supplied at construction, columns the
/// contiguous residue axis `r_start..=r_end`. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageMapping {
    r_start: i64,
    n_residues: usize,
    peptides: Vec<Peptide>,
    rules: CoverageRules,
    weights: Vec<f64>,
    counts: Vec<usize>,
}

impl CoverageMapping {
    /// Builds the mapping over the residue span covered by `peptides`.
    pub fn new(peptides: &[Peptide], rules: CoverageRules) -> Result<Self, HdxError> {
        let r_start = peptides
            .iter()
            .map(|p| p.start)
            .min()
            .ok_or_else(|| coverage_error("coverage_empty", "no peptides supplied"))?;
        let r_end = peptides.iter().map(|p| p.end).max().unwrap_or(r_start);
        Self::with_axis(peptides, rules, r_start, r_end)
    }

    /// Builds the mapping over an explicit residue axis `r_start..=r_end`.
    ///
    /// Used when several states share one residue numbering.
    pub fn with_axis(
        peptides: &[Peptide],
        rules: CoverageRules,
        r_start: i64,
        r_end: i64,
    ) -> Result<Self, HdxError> {
        if r_end < r_start {
            return Err(coverage_error(
                "coverage_axis",
                "residue axis end precedes its start",
            ));
        }
        if let CoverageWeighting::Sigmoid { width } = rules.weighting {
            if !(width.is_finite() && width > 0.0) {
                return Err(HdxError::Config(
                    ErrorInfo::new("coverage_sigmoid_width", "sigmoid width must be positive")
                        .with_context("width", width.to_string()),
                ));
            }
        }
        let n_residues = (r_end - r_start + 1) as usize;
        let mut weights = vec![0.0; peptides.len() * n_residues];
        let mut counts = Vec::with_capacity(peptides.len());
        for (row, peptide) in peptides.iter().enumerate() {
            if peptide.start < r_start || peptide.end > r_end {
                return Err(HdxError::Coverage(
                    ErrorInfo::new("coverage_outside_axis", "peptide exceeds the residue axis")
                        .with_context("start", peptide.start.to_string())
                        .with_context("end", peptide.end.to_string()),
                ));
            }
            let lo = (peptide.start + rules.drop_first as i64) as f64;
            let hi = peptide.end as f64;
            let exchangeable = peptide.exchangeable_residues(&rules);
            let cells = &mut weights[row * n_residues..(row + 1) * n_residues];
            for &r in &exchangeable {
                cells[(r - r_start) as usize] = match rules.weighting {
                    CoverageWeighting::Incidence => 1.0,
                    CoverageWeighting::Sigmoid { width } => {
                        let rf = r as f64;
                        sigmoid((rf - lo + 0.5) / width) * sigmoid((hi + 0.5 - rf) / width)
                    }
                };
            }
            let total: f64 = cells.iter().sum();
            if total > 0.0 {
                let scale = exchangeable.len() as f64 / total;
                cells.iter_mut().for_each(|w| *w *= scale);
            }
            counts.push(exchangeable.len());
        }
        Ok(Self {
            r_start,
            n_residues,
            peptides: peptides.to_vec(),
            rules,
            weights,
            counts,
        })
    }

    /// Number of peptide rows.
    pub fn n_peptides(&self) -> usize {
        self.peptides.len()
    }

    /// Number of residue columns.
    pub fn n_residues(&self) -> usize {
        self.n_residues
    }

    /// First residue number on the axis.
    pub fn r_start(&self) -> i64 {
        self.r_start
    }

    /// Last residue number on the axis.
    pub fn r_end(&self) -> i64 {
        self.r_start + self.n_residues as i64 - 1
    }

    /// Residue numbers of all columns.
    pub fn r_numbers(&self) -> Vec<i64> {
        (self.r_start..=self.r_end()).collect()
    }

    /// Column index of a residue number, if on the axis.
    pub fn residue_index(&self, r_number: i64) -> Option<usize> {
        if r_number < self.r_start || r_number > self.r_end() {
            None
        } else {
            Some((r_number - self.r_start) as usize)
        }
    }

    /// Peptides in row order.
    pub fn peptides(&self) -> &[Peptide] {
        &self.peptides
    }

    /// Rules used to build the mapping.
    pub fn rules(&self) -> &CoverageRules {
        &self.rules
    }

    /// Weight row of a peptide.
    pub fn row(&self, peptide: usize) -> &[f64] {
        &self.weights[peptide * self.n_residues..(peptide + 1) * self.n_residues]
    }

    /// Weight of a residue column within a peptide row.
    pub fn weight(&self, peptide: usize, residue: usize) -> f64 {
        self.weights[peptide * self.n_residues + residue]
    }

    /// Computes `X @ values` for a per-residue vector.
    pub fn apply(&self, values: &[f64]) -> Vec<f64> {
        debug_assert_eq!(values.len(), self.n_residues);
        (0..self.n_peptides())
            .map(|p| {
                self.row(p)
                    .iter()
                    .zip(values)
                    .filter(|(w, _)| **w != 0.0)
                    .map(|(w, v)| w * v)
                    .sum()
            })
            .collect()
    }

    /// Computes `Xᵀ @ values` for a per-peptide vector.
    pub fn apply_transpose(&self, values: &[f64]) -> Vec<f64> {
        debug_assert_eq!(values.len(), self.n_peptides());
        let mut out = vec![0.0; self.n_residues];
        for (p, value) in values.iter().enumerate() {
            for (slot, w) in out.iter_mut().zip(self.row(p)) {
                if *w != 0.0 {
                    *slot += w * value;
                }
            }
        }
        out
    }

    /// Number of exchangeable residues per peptide, the maximum uptake in D.
    ///
    /// Equal to the row sums under every weighting.
    pub fn exchangeable_counts(&self) -> Vec<f64> {
        self.counts.iter().map(|&n| n as f64).collect()
    }

    /// Column sums: the (weighted) number of peptides reporting on a residue.
    pub fn coverage_counts(&self) -> Vec<f64> {
        self.apply_transpose(&vec![1.0; self.n_peptides()])
    }

    /// Whether each residue is reported on by at least one peptide.
    pub fn has_coverage(&self) -> Vec<bool> {
        self.coverage_counts().into_iter().map(|c| c > 0.0).collect()
    }

    /// Copy of the mapping with every non-empty row scaled to sum to one.
    pub fn normalized(&self) -> Self {
        let mut out = self.clone();
        for (p, total) in self.exchangeable_counts().into_iter().enumerate() {
            if total > 0.0 {
                for w in &mut out.weights[p * self.n_residues..(p + 1) * self.n_residues] {
                    *w /= total;
                }
            }
        }
        out
    }
}
