//! Read-only outcome of a global fit.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use hdx_core::hash::stable_hash_string;
use hdx_core::serde::to_canonical_json_bytes;
use hdx_core::{ErrorInfo, HdxError};

use crate::config::GlobalFitConfig;
use crate::field::DeltaGField;
use crate::forward::{ForwardModel, KJ};
use crate::inputs::AlignedInputs;

/// Why the epoch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Gradient max-norm reached the convergence tolerance.
    Converged,
    /// Patience used up without improvement.
    EarlyStopped,
    /// Configured number of epochs done.
    EpochLimitReached,
    /// Loss or gradient became non-finite.
    Diverged,
    /// Stop requested through the stop handle.
    Cancelled,
}

impl StopReason {
    /// Snake-case label used in exports.
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::Converged => "converged",
            StopReason::EarlyStopped => "early_stopped",
            StopReason::EpochLimitReached => "epoch_limit_reached",
            StopReason::Diverged => "diverged",
            StopReason::Cancelled => "cancelled",
        }
    }
}

/// Loss terms of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossRecord {
    /// 1-based epoch.
    pub epoch: usize,
    /// Total loss.
    pub loss: f64,
    /// Sum of squared residuals.
    pub data_loss: f64,
    /// Neighbour penalty.
    pub reg1: f64,
    /// Cross-state penalty.
    pub reg2: f64,
}

/// Convergence metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Convergence {
    /// Epochs evaluated.
    pub epochs_run: usize,
    /// Epoch whose parameters were returned, when any epoch was evaluated.
    pub best_epoch: Option<usize>,
    /// Loss at the best epoch.
    pub best_loss: f64,
    /// Terminal state.
    pub stop_reason: StopReason,
}

/// One row of [`FitResult::output`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidueOutput {
    /// State name.
    pub state: String,
    /// Residue number.
    pub r_number: i64,
    /// DeltaG in J/mol.
    pub deltag: f64,
    /// Observed exchange rate.
    pub k_obs: f64,
    /// Standard error of deltaG in J/mol, NaN when unavailable.
    pub covariance: f64,
}

/// Squared residuals `Ns x Np x Nt`; masked and padded entries are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquaredErrors {
    n_states: usize,
    n_peptides: usize,
    n_timepoints: usize,
    values: Vec<Option<f64>>,
}

impl SquaredErrors {
    /// Tensor dimensions `(Ns, Np, Nt)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.n_states, self.n_peptides, self.n_timepoints)
    }

    /// Squared error of an entry, `None` when masked or out of range.
    pub fn get(&self, state: usize, peptide: usize, timepoint: usize) -> Option<f64> {
        if state >= self.n_states || peptide >= self.n_peptides || timepoint >= self.n_timepoints {
            return None;
        }
        self.values[(state * self.n_peptides + peptide) * self.n_timepoints + timepoint]
    }

    /// Sum over valid entries.
    pub fn total(&self) -> f64 {
        self.values.iter().flatten().sum()
    }

    /// Number of valid entries.
    pub fn count(&self) -> usize {
        self.values.iter().flatten().count()
    }
}

#[derive(Serialize)]
struct Digest<'a> {
    states: &'a [String],
    r_start: i64,
    params: &'a [f64],
    losses: &'a [LossRecord],
    convergence: &'a Convergence,
    config: &'a GlobalFitConfig,
}

/// Outcome of [`crate::fit_deltag_global`] and its batch form.
#[derive(Debug, Clone, Serialize)]
pub struct FitResult {
    #[serde(skip)]
    inputs: Arc<AlignedInputs>,
    states: Vec<String>,
    r_numbers: Vec<i64>,
    #[serde(skip)]
    params: Vec<f64>,
    deltag: Vec<f64>,
    k_obs: Vec<f64>,
    covariance: Option<Vec<f64>>,
    scales: Vec<f64>,
    predicted: Vec<f64>,
    losses: Vec<LossRecord>,
    convergence: Convergence,
    config: GlobalFitConfig,
    hash: String,
}

impl FitResult {
    pub(crate) fn assemble(
        model: &ForwardModel,
        inputs: Arc<AlignedInputs>,
        params: Vec<f64>,
        losses: Vec<LossRecord>,
        convergence: Convergence,
        config: GlobalFitConfig,
        covariance: Option<Vec<f64>>,
    ) -> Result<Self, HdxError> {
        let n = inputs.n_states() * inputs.n_residues;
        let deltag: Vec<f64> = params[..n].iter().map(|p| p * KJ).collect();
        let k_obs = model.rates(&params)?;
        let scales = if params.len() > n {
            params[n..].to_vec()
        } else {
            vec![1.0; inputs.n_states()]
        };
        let predicted = model.predict(&params)?;
        let hash = stable_hash_string(&Digest {
            states: &inputs.names,
            r_start: inputs.r_start,
            params: &params,
            losses: &losses,
            convergence: &convergence,
            config: &config,
        })?;
        Ok(Self {
            states: inputs.names.clone(),
            r_numbers: inputs.r_numbers(),
            inputs,
            params,
            deltag,
            k_obs,
            covariance,
            scales,
            predicted,
            losses,
            convergence,
            config,
            hash,
        })
    }

    /// State names in fit order.
    pub fn states(&self) -> &[String] {
        &self.states
    }

    /// Residue numbers of the shared axis.
    pub fn r_numbers(&self) -> &[i64] {
        &self.r_numbers
    }

    /// Fitted deltaG field (J/mol).
    pub fn deltag(&self) -> Result<DeltaGField, HdxError> {
        DeltaGField::new(self.inputs.r_start, self.states.len(), self.deltag.clone())
    }

    /// Fitted deltaG of a state by name.
    pub fn deltag_of(&self, state: &str) -> Option<&[f64]> {
        let s = self.state_index(state)?;
        let nr = self.r_numbers.len();
        Some(&self.deltag[s * nr..(s + 1) * nr])
    }

    /// Observed rates `Ns x Nr`.
    pub fn k_obs(&self) -> &[f64] {
        &self.k_obs
    }

    /// Standard errors `Ns x Nr` in J/mol, when computed.
    pub fn covariance(&self) -> Option<&[f64]> {
        self.covariance.as_deref()
    }

    /// Uptake scale factor per state (1 unless fitted).
    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    /// Predicted uptake `Ns x Np x Nt` at the measured timepoints.
    pub fn predicted(&self) -> &[f64] {
        &self.predicted
    }

    /// Loss per epoch.
    pub fn losses(&self) -> &[LossRecord] {
        &self.losses
    }

    /// Convergence metadata.
    pub fn convergence(&self) -> &Convergence {
        &self.convergence
    }

    /// Terminal state of the loop.
    pub fn stop_reason(&self) -> StopReason {
        self.convergence.stop_reason
    }

    /// Configuration the fit ran with.
    pub fn config(&self) -> &GlobalFitConfig {
        &self.config
    }

    /// Aligned inputs the fit ran on.
    pub fn inputs(&self) -> &AlignedInputs {
        &self.inputs
    }

    /// SHA-256 of the canonical parameters, loss curve, metadata and config.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    fn state_index(&self, state: &str) -> Option<usize> {
        self.states.iter().position(|name| name == state)
    }

    /// Per state, per residue deltaG, rate and standard error.
    pub fn output(&self) -> Vec<ResidueOutput> {
        let nr = self.r_numbers.len();
        let mut rows = Vec::with_capacity(self.deltag.len());
        for (s, state) in self.states.iter().enumerate() {
            for (r, &r_number) in self.r_numbers.iter().enumerate() {
                let i = s * nr + r;
                rows.push(ResidueOutput {
                    state: state.clone(),
                    r_number,
                    deltag: self.deltag[i],
                    k_obs: self.k_obs[i],
                    covariance: self
                        .covariance
                        .as_ref()
                        .map(|cov| cov[i])
                        .unwrap_or(f64::NAN),
                });
            }
        }
        rows
    }

    /// Squared residuals of the returned parameters.
    pub fn get_squared_errors(&self) -> SquaredErrors {
        let inputs = &self.inputs;
        let values = self
            .predicted
            .iter()
            .zip(&inputs.uptake)
            .zip(&inputs.mask)
            .map(|((d, y), &valid)| valid.then(|| (d - y) * (d - y)))
            .collect();
        SquaredErrors {
            n_states: inputs.n_states(),
            n_peptides: inputs.n_peptides,
            n_timepoints: inputs.n_timepoints,
            values,
        }
    }

    /// Predicted uptake of every peptide of `state` at `times`, `Np x times`.
    pub fn predict_uptake(&self, state: &str, times: &[f64]) -> Result<Vec<f64>, HdxError> {
        let s = self.state_index(state).ok_or_else(|| {
            HdxError::Fit(
                ErrorInfo::new("unknown_state", "state is not part of this fit")
                    .with_context("state", state),
            )
        })?;
        ForwardModel::cpu(&self.inputs)?.predict_at(&self.params, s, times)
    }

    /// Canonical JSON of the full result.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, HdxError> {
        to_canonical_json_bytes(self)
    }
}
