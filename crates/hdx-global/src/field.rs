//! Residue-resolved deltaG values of one or more states.

use serde::{Deserialize, Serialize};

use hdx_core::{ErrorInfo, HdxError, IntrinsicRateTable};
use hdx_kinetics::{deltag_from_rate, fill_missing, InitialGuessResult};

/// DeltaG values in J/mol on a contiguous residue axis, `Ns x Nr`.
///
/// A field with a single row is broadcast to every state when used as a
/// starting guess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaGField {
    r_start: i64,
    n_states: usize,
    n_residues: usize,
    values: Vec<f64>,
}

impl DeltaGField {
    /// Field from a row-major `n_states x (values.len() / n_states)` matrix.
    pub fn new(r_start: i64, n_states: usize, values: Vec<f64>) -> Result<Self, HdxError> {
        if n_states == 0 || values.is_empty() || values.len() % n_states != 0 {
            return Err(HdxError::Fit(
                ErrorInfo::new("deltag_shape", "deltaG values do not form a state matrix")
                    .with_context("states", n_states.to_string())
                    .with_context("values", values.len().to_string()),
            ));
        }
        Ok(Self {
            r_start,
            n_states,
            n_residues: values.len() / n_states,
            values,
        })
    }

    /// Single-row field.
    pub fn from_residues(r_start: i64, values: Vec<f64>) -> Result<Self, HdxError> {
        Self::new(r_start, 1, values)
    }

    /// Converts per-residue rates to deltaG on `r_start..=r_end`.
    ///
    /// Residues without a usable rate are filled by linear interpolation
    /// between finite neighbours.
    pub fn from_rates(
        r_start: i64,
        r_end: i64,
        rates: &[(i64, f64)],
        k_int: &IntrinsicRateTable,
        temperature: f64,
    ) -> Result<Self, HdxError> {
        let nr = (r_end - r_start + 1).max(0) as usize;
        let mut values = vec![f64::NAN; nr];
        for &(r_number, rate) in rates {
            if (r_start..=r_end).contains(&r_number) {
                values[(r_number - r_start) as usize] =
                    deltag_from_rate(rate, k_int.k_int(r_number), temperature);
            }
        }
        Self::from_residues(r_start, fill_missing(&values))
    }

    /// Stacks first-stage guesses, one per state, on `r_start..=r_end`.
    pub fn from_guesses(
        r_start: i64,
        r_end: i64,
        guesses: &[InitialGuessResult],
        k_int: &[IntrinsicRateTable],
        temperatures: &[f64],
    ) -> Result<Self, HdxError> {
        if guesses.is_empty()
            || guesses.len() != temperatures.len()
            || (k_int.len() != 1 && k_int.len() != guesses.len())
        {
            return Err(HdxError::fit(
                "guess_shape",
                "need one guess and temperature per state and one rate table or one per state",
            ));
        }
        let mut values = Vec::new();
        for (s, guess) in guesses.iter().enumerate() {
            let table = if k_int.len() == 1 { &k_int[0] } else { &k_int[s] };
            let rates: Vec<(i64, f64)> = guess
                .rows
                .iter()
                .map(|row| (row.r_number, row.fit.rate))
                .collect();
            let row = Self::from_rates(r_start, r_end, &rates, table, temperatures[s])?;
            values.extend(row.values);
        }
        Self::new(r_start, guesses.len(), values)
    }

    /// First residue number.
    pub fn r_start(&self) -> i64 {
        self.r_start
    }

    /// Number of rows.
    pub fn n_states(&self) -> usize {
        self.n_states
    }

    /// Number of residues per row.
    pub fn n_residues(&self) -> usize {
        self.n_residues
    }

    /// Row-major values in J/mol.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// One state's row.
    pub fn row(&self, state: usize) -> &[f64] {
        &self.values[state * self.n_residues..(state + 1) * self.n_residues]
    }

    /// Value of a residue in a state, `None` off the axis.
    pub fn get(&self, state: usize, r_number: i64) -> Option<f64> {
        if state >= self.n_states || r_number < self.r_start {
            return None;
        }
        let r = (r_number - self.r_start) as usize;
        (r < self.n_residues).then(|| self.values[state * self.n_residues + r])
    }

    /// Values for `n_states` states on the given axis, broadcasting a single row.
    pub(crate) fn expand(
        &self,
        r_start: i64,
        n_residues: usize,
        n_states: usize,
    ) -> Result<Vec<f64>, HdxError> {
        if self.r_start != r_start || self.n_residues != n_residues {
            return Err(HdxError::Fit(
                ErrorInfo::new("guess_axis", "initial deltaG axis differs from the data axis")
                    .with_context("guess_start", self.r_start.to_string())
                    .with_context("guess_residues", self.n_residues.to_string())
                    .with_context("data_start", r_start.to_string())
                    .with_context("data_residues", n_residues.to_string()),
            ));
        }
        let values = if self.n_states == n_states {
            self.values.clone()
        } else if self.n_states == 1 {
            self.values.repeat(n_states)
        } else {
            return Err(HdxError::Fit(
                ErrorInfo::new("guess_states", "initial deltaG rows differ from the state count")
                    .with_context("guess_states", self.n_states.to_string())
                    .with_context("data_states", n_states.to_string()),
            ));
        };
        if values.iter().any(|v| !v.is_finite()) {
            return Err(HdxError::Fit(
                ErrorInfo::new("guess_not_finite", "initial deltaG contains non-finite values")
                    .with_hint("fill gaps before fitting"),
            ));
        }
        Ok(values)
    }
}
