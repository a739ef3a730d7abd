//! Per-state uptake measurements and multi-state sets.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::coverage::{CoverageMapping, CoverageRules};
use crate::errors::{ErrorInfo, HdxError};
use crate::peptide::{Peptide, PeptideRecord};

fn measurement_error(code: &str, message: &str, state: &str) -> HdxError {
    HdxError::Input(ErrorInfo::new(code, message).with_context("state", state))
}

/// Uptake of every peptide of one protein state at every exposure time.
///
/// The design is uniform: each peptide has one slot per exposure time.
/// Missing measurements are kept as NaN and reported invalid by
/// [`HdxMeasurement::is_valid`]; fitting routines exclude them.
#[derive(Debug, Clone)]
pub struct HdxMeasurement {
    name: String,
    temperature: f64,
    ph: f64,
    timepoints: Vec<f64>,
    coverage: Arc<CoverageMapping>,
    uptake: Vec<f64>,
    uptake_sd: Vec<f64>,
    excluded: Vec<bool>,
}

impl HdxMeasurement {
    /// Builds the measurement of `state` from a peptide table.
    ///
    /// Records of other states are ignored. Temperature is in Kelvin.
    pub fn from_records(
        state: &str,
        records: &[PeptideRecord],
        temperature: f64,
        ph: f64,
        rules: CoverageRules,
    ) -> Result<Self, HdxError> {
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(HdxError::Config(
                ErrorInfo::new("temperature", "temperature must be a positive Kelvin value")
                    .with_context("temperature", temperature.to_string()),
            ));
        }
        if !ph.is_finite() {
            return Err(HdxError::config("ph", "pH must be finite"));
        }

        let rows: Vec<&PeptideRecord> = records.iter().filter(|r| r.state == state).collect();
        if rows.is_empty() {
            return Err(measurement_error(
                "state_empty",
                "no peptide records for state",
                state,
            ));
        }

        let mut timepoints = Vec::new();
        let mut peptides: BTreeMap<(i64, i64), Peptide> = BTreeMap::new();
        for row in &rows {
            if !(row.exposure.is_finite() && row.exposure >= 0.0) {
                return Err(HdxError::Input(
                    ErrorInfo::new("exposure", "exposure times must be finite and non-negative")
                        .with_context("state", state)
                        .with_context("exposure", row.exposure.to_string()),
                ));
            }
            timepoints.push(row.exposure);
            match peptides.get(&(row.start, row.end)) {
                Some(existing) => {
                    if !row.sequence.is_empty()
                        && !existing.sequence.is_empty()
                        && existing.sequence != row.sequence
                    {
                        return Err(HdxError::Input(
                            ErrorInfo::new(
                                "sequence_conflict",
                                "peptide reported with two different sequences",
                            )
                            .with_context("state", state)
                            .with_context("start", row.start.to_string())
                            .with_context("end", row.end.to_string()),
                        ));
                    }
                    if existing.sequence.is_empty() && !row.sequence.is_empty() {
                        let upgraded = Peptide::new(row.start, row.end, row.sequence.clone())?;
                        peptides.insert((row.start, row.end), upgraded);
                    }
                }
                None => {
                    let peptide = Peptide::new(row.start, row.end, row.sequence.clone())?;
                    peptides.insert((row.start, row.end), peptide);
                }
            }
        }
        timepoints.sort_by(f64::total_cmp);
        timepoints.dedup();

        let peptides: Vec<Peptide> = peptides.into_values().collect();
        let coverage = CoverageMapping::new(&peptides, rules)?;
        let nt = timepoints.len();
        let mut uptake = vec![f64::NAN; peptides.len() * nt];
        let mut uptake_sd = vec![f64::NAN; peptides.len() * nt];
        let mut seen = vec![false; peptides.len() * nt];
        for row in rows {
            let p = peptides
                .binary_search_by(|pep| (pep.start, pep.end).cmp(&(row.start, row.end)))
                .map_err(|_| measurement_error("peptide_lookup", "peptide index missing", state))?;
            let t = timepoints
                .binary_search_by(|tp| tp.total_cmp(&row.exposure))
                .map_err(|_| measurement_error("time_lookup", "timepoint index missing", state))?;
            let idx = p * nt + t;
            if seen[idx] {
                return Err(HdxError::Input(
                    ErrorInfo::new("duplicate_record", "peptide measured twice at one exposure")
                        .with_context("state", state)
                        .with_context("start", row.start.to_string())
                        .with_context("end", row.end.to_string())
                        .with_context("exposure", row.exposure.to_string()),
                ));
            }
            seen[idx] = true;
            uptake[idx] = row.uptake;
            uptake_sd[idx] = row.uptake_sd.unwrap_or(f64::NAN);
        }

        Ok(Self {
            name: state.to_string(),
            temperature,
            ph,
            timepoints,
            coverage: Arc::new(coverage),
            excluded: vec![false; uptake.len()],
            uptake,
            uptake_sd,
        })
    }

    /// State name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Labelling temperature in Kelvin.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Labelling pH.
    pub fn ph(&self) -> f64 {
        self.ph
    }

    /// Sorted unique exposure times.
    pub fn timepoints(&self) -> &[f64] {
        &self.timepoints
    }

    /// Number of peptides (`Np`).
    pub fn n_peptides(&self) -> usize {
        self.coverage.n_peptides()
    }

    /// Number of exposure times (`Nt`).
    pub fn n_timepoints(&self) -> usize {
        self.timepoints.len()
    }

    /// Shared coverage mapping of this state.
    pub fn coverage(&self) -> &Arc<CoverageMapping> {
        &self.coverage
    }

    /// Peptides in row order.
    pub fn peptides(&self) -> &[Peptide] {
        self.coverage.peptides()
    }

    /// Residue numbers of the state's own axis.
    pub fn r_numbers(&self) -> Vec<i64> {
        self.coverage.r_numbers()
    }

    /// Uptake in deuterium units.
    pub fn uptake(&self, peptide: usize, timepoint: usize) -> f64 {
        self.uptake[peptide * self.n_timepoints() + timepoint]
    }

    /// Uptake of one peptide across all exposure times.
    pub fn uptake_row(&self, peptide: usize) -> &[f64] {
        let nt = self.n_timepoints();
        &self.uptake[peptide * nt..(peptide + 1) * nt]
    }

    /// Uptake standard deviation, NaN when not reported.
    pub fn uptake_sd(&self, peptide: usize, timepoint: usize) -> f64 {
        self.uptake_sd[peptide * self.n_timepoints() + timepoint]
    }

    /// Whether an entry takes part in fitting.
    pub fn is_valid(&self, peptide: usize, timepoint: usize) -> bool {
        let idx = peptide * self.n_timepoints() + timepoint;
        !self.excluded[idx] && self.uptake[idx].is_finite()
    }

    /// Marks an entry as invalid without touching its value.
    pub fn exclude(&mut self, peptide: usize, timepoint: usize) -> Result<(), HdxError> {
        let idx = self.checked_index(peptide, timepoint)?;
        self.excluded[idx] = true;
        Ok(())
    }

    /// Overwrites the uptake of one entry.
    pub fn set_uptake(
        &mut self,
        peptide: usize,
        timepoint: usize,
        value: f64,
    ) -> Result<(), HdxError> {
        let idx = self.checked_index(peptide, timepoint)?;
        self.uptake[idx] = value;
        Ok(())
    }

    /// Uptake as percentage of the peptide's exchangeable residues (`Np x Nt`).
    ///
    /// Invalid entries and peptides without exchangeable residues are NaN.
    pub fn percent_uptake(&self) -> Vec<f64> {
        let nt = self.n_timepoints();
        let counts = self.coverage.exchangeable_counts();
        let mut out = vec![f64::NAN; self.uptake.len()];
        for (p, count) in counts.into_iter().enumerate() {
            if count <= 0.0 {
                continue;
            }
            for t in 0..nt {
                if self.is_valid(p, t) {
                    out[p * nt + t] = 100.0 * self.uptake(p, t) / count;
                }
            }
        }
        out
    }

    fn checked_index(&self, peptide: usize, timepoint: usize) -> Result<usize, HdxError> {
        if peptide >= self.n_peptides() || timepoint >= self.n_timepoints() {
            return Err(HdxError::Input(
                ErrorInfo::new("entry_index", "peptide or timepoint index out of range")
                    .with_context("state", self.name.clone())
                    .with_context("peptide", peptide.to_string())
                    .with_context("timepoint", timepoint.to_string()),
            ));
        }
        Ok(peptide * self.n_timepoints() + timepoint)
    }
}

/// Several states sharing one residue numbering, fitted jointly.
#[derive(Debug, Clone)]
pub struct HdxMeasurementSet {
    states: IndexMap<String, HdxMeasurement>,
}

impl HdxMeasurementSet {
    /// Creates a set; state names must be unique.
    pub fn new(states: Vec<HdxMeasurement>) -> Result<Self, HdxError> {
        if states.is_empty() {
            return Err(HdxError::input("set_empty", "a measurement set needs a state"));
        }
        let mut map = IndexMap::new();
        for state in states {
            let name = state.name().to_string();
            if map.insert(name.clone(), state).is_some() {
                return Err(measurement_error(
                    "duplicate_state",
                    "state names must be unique",
                    &name,
                ));
            }
        }
        Ok(Self { states: map })
    }

    /// Builds one measurement per distinct state of the table, in first-seen order.
    pub fn from_records(
        records: &[PeptideRecord],
        temperature: f64,
        ph: f64,
        rules: CoverageRules,
    ) -> Result<Self, HdxError> {
        let mut names: Vec<&str> = Vec::new();
        for record in records {
            if !names.contains(&record.state.as_str()) {
                names.push(&record.state);
            }
        }
        let states = names
            .into_iter()
            .map(|name| HdxMeasurement::from_records(name, records, temperature, ph, rules))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(states)
    }

    /// Number of states (`Ns`).
    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    /// States in insertion order.
    pub fn states(&self) -> impl Iterator<Item = &HdxMeasurement> {
        self.states.values()
    }

    /// State by position.
    pub fn state(&self, index: usize) -> Option<&HdxMeasurement> {
        self.states.get_index(index).map(|(_, state)| state)
    }

    /// State by name.
    pub fn get(&self, name: &str) -> Option<&HdxMeasurement> {
        self.states.get(name)
    }

    /// State names in order.
    pub fn names(&self) -> Vec<String> {
        self.states.keys().cloned().collect()
    }

    /// First residue of the shared axis.
    pub fn r_start(&self) -> i64 {
        self.states
            .values()
            .map(|s| s.coverage().r_start())
            .min()
            .unwrap_or(0)
    }

    /// Last residue of the shared axis.
    pub fn r_end(&self) -> i64 {
        self.states
            .values()
            .map(|s| s.coverage().r_end())
            .max()
            .unwrap_or(0)
    }

    /// Largest peptide count across states.
    pub fn max_peptides(&self) -> usize {
        self.states.values().map(|s| s.n_peptides()).max().unwrap_or(0)
    }

    /// Largest timepoint count across states.
    pub fn max_timepoints(&self) -> usize {
        self.states.values().map(|s| s.n_timepoints()).max().unwrap_or(0)
    }
}

impl From<HdxMeasurement> for HdxMeasurementSet {
    fn from(state: HdxMeasurement) -> Self {
        let mut states = IndexMap::new();
        states.insert(state.name().to_string(), state);
        Self { states }
    }
}
