//! The epoch loop as an explicit state machine.

use std::sync::Arc;

use candle_core::{Tensor, Var};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use hdx_core::{HdxError, HdxMeasurement, HdxMeasurementSet, IntrinsicRateTable};

use crate::config::GlobalFitConfig;
use crate::covariance::standard_errors;
use crate::early_stop::{Checkpoint, EarlyStopping};
use crate::field::DeltaGField;
use crate::forward::{tensor_error, to_host, ForwardModel, Penalties, KJ};
use crate::inputs::AlignedInputs;
use crate::observer::{EpochProgress, FitObserver, NullObserver, StopHandle};
use crate::optim::Stepper;
use crate::result::{Convergence, FitResult, LossRecord, StopReason};

/// Lifecycle of a [`GlobalDeltaGOptimizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitState {
    /// Constructed, no epoch run.
    Initialized,
    /// At least one epoch run, not finished.
    Running,
    /// See [`StopReason::Converged`].
    Converged,
    /// See [`StopReason::EarlyStopped`].
    EarlyStopped,
    /// See [`StopReason::EpochLimitReached`].
    EpochLimitReached,
    /// See [`StopReason::Diverged`].
    Diverged,
    /// See [`StopReason::Cancelled`].
    Cancelled,
}

impl From<StopReason> for FitState {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::Converged => FitState::Converged,
            StopReason::EarlyStopped => FitState::EarlyStopped,
            StopReason::EpochLimitReached => FitState::EpochLimitReached,
            StopReason::Diverged => FitState::Diverged,
            StopReason::Cancelled => FitState::Cancelled,
        }
    }
}

impl FitState {
    /// Terminal reason, `None` while the fit can still advance.
    pub fn stop_reason(self) -> Option<StopReason> {
        match self {
            FitState::Initialized | FitState::Running => None,
            FitState::Converged => Some(StopReason::Converged),
            FitState::EarlyStopped => Some(StopReason::EarlyStopped),
            FitState::EpochLimitReached => Some(StopReason::EpochLimitReached),
            FitState::Diverged => Some(StopReason::Diverged),
            FitState::Cancelled => Some(StopReason::Cancelled),
        }
    }
}

/// Gradient-based fit of deltaG to the uptake of one or more states.
pub struct GlobalDeltaGOptimizer {
    inputs: Arc<AlignedInputs>,
    model: ForwardModel,
    config: GlobalFitConfig,
    penalties: Penalties,
    params: Var,
    best_params: Tensor,
    last_finite: Tensor,
    stepper: Stepper,
    early: EarlyStopping,
    losses: Vec<LossRecord>,
    epoch: usize,
    state: FitState,
    stop: StopHandle,
}

impl GlobalDeltaGOptimizer {
    /// Optimizer over aligned inputs starting from `initial` (J/mol).
    ///
    /// The device is opened before anything else is checked.
    pub fn new(
        inputs: Arc<AlignedInputs>,
        initial: &DeltaGField,
        config: GlobalFitConfig,
    ) -> Result<Self, HdxError> {
        let device = config.device()?;
        config.validate()?;
        if inputs.n_valid() == 0 {
            return Err(HdxError::fit("no_valid_data", "no valid uptake entry to fit"));
        }
        let mut params: Vec<f64> = initial
            .expand(inputs.r_start, inputs.n_residues, inputs.n_states())?
            .into_iter()
            .map(|g| g / KJ)
            .collect();
        if config.fit_scaling {
            params.extend(std::iter::repeat(1.0).take(inputs.n_states()));
        }
        let model = ForwardModel::new(&inputs, &device, config.dtype)?;
        let params = Var::from_tensor(&model.params(&params)?).map_err(tensor_error)?;
        let snapshot = params.as_tensor().copy().map_err(tensor_error)?;
        Ok(Self {
            penalties: Penalties::from(&config),
            stepper: Stepper::new(&config, &params)?,
            early: EarlyStopping::new(config.stop_loss, config.stop_patience),
            best_params: snapshot.clone(),
            last_finite: snapshot,
            params,
            model,
            inputs,
            config,
            losses: Vec::new(),
            epoch: 0,
            state: FitState::Initialized,
            stop: StopHandle::new(),
        })
    }

    /// Optimizer for every state of `set`.
    pub fn for_set(
        set: &HdxMeasurementSet,
        rates: &[IntrinsicRateTable],
        initial: &DeltaGField,
        config: GlobalFitConfig,
    ) -> Result<Self, HdxError> {
        config.check_device()?;
        let inputs = AlignedInputs::from_set(set, rates)?;
        Self::new(Arc::new(inputs), initial, config)
    }

    /// Replaces the stop handle polled at every epoch boundary.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// A clone of the stop handle.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FitState {
        self.state
    }

    /// Epochs evaluated so far.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Loss curve so far.
    pub fn losses(&self) -> &[LossRecord] {
        &self.losses
    }

    /// Current parameters as deltaG in J/mol.
    pub fn current_deltag(&self) -> Result<Vec<f64>, HdxError> {
        let n = self.inputs.n_states() * self.inputs.n_residues;
        let params = to_host(self.params.as_tensor())?;
        Ok(params[..n].iter().map(|p| p * KJ).collect())
    }

    /// Step size used by the following epochs.
    pub fn learning_rate(&self) -> f64 {
        self.stepper.learning_rate()
    }

    /// Replaces the step size for the following epochs.
    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.stepper.set_learning_rate(learning_rate);
    }

    fn snapshot(&self) -> Result<Tensor, HdxError> {
        self.params.as_tensor().copy().map_err(tensor_error)
    }

    fn finish(
        &mut self,
        reason: StopReason,
        observer: &mut dyn FitObserver,
    ) -> Result<FitState, HdxError> {
        if reason != StopReason::Diverged {
            self.params.set(&self.best_params).map_err(tensor_error)?;
        }
        self.state = reason.into();
        info!(
            "global fit finished after {} epochs: {} (best loss {:.6})",
            self.epoch,
            reason.as_str(),
            self.early.best()
        );
        observer.on_finish(reason);
        Ok(self.state)
    }

    /// Runs one epoch: evaluate, record, test stop rules, then step.
    pub fn step(&mut self, observer: &mut dyn FitObserver) -> Result<FitState, HdxError> {
        match self.state {
            FitState::Initialized => {
                info!(
                    "global fit of {} state(s), {} residues, {} valid entries",
                    self.inputs.n_states(),
                    self.inputs.n_residues,
                    self.inputs.n_valid()
                );
                self.state = FitState::Running;
            }
            FitState::Running => {}
            _ => {
                return Err(HdxError::fit(
                    "optimizer_finished",
                    "the fit already reached a terminal state",
                ))
            }
        }
        if self.stop.is_stop_requested() {
            return self.finish(StopReason::Cancelled, observer);
        }

        self.epoch += 1;
        let (evaluation, grads) = self.model.evaluate_var(&self.params, &self.penalties)?;
        if !evaluation.is_finite() {
            warn!(
                "non-finite loss or gradient at epoch {}, returning last finite parameters",
                self.epoch
            );
            self.params.set(&self.last_finite).map_err(tensor_error)?;
            return self.finish(StopReason::Diverged, observer);
        }
        self.last_finite = self.snapshot()?;
        self.losses.push(LossRecord {
            epoch: self.epoch,
            loss: evaluation.loss,
            data_loss: evaluation.data_loss,
            reg1: evaluation.reg1,
            reg2: evaluation.reg2,
        });
        let checkpoint = self.early.update(self.epoch, evaluation.loss);
        if checkpoint == Checkpoint::Improved {
            self.best_params = self.snapshot()?;
        }

        let gradient_norm = evaluation.gradient_max_norm();
        if self.config.log_interval > 0 && self.epoch % self.config.log_interval == 0 {
            debug!(
                "epoch {}: loss {:.6} (data {:.6}, reg1 {:.6}, reg2 {:.6}), |grad| {:.3e}",
                self.epoch,
                evaluation.loss,
                evaluation.data_loss,
                evaluation.reg1,
                evaluation.reg2,
                gradient_norm
            );
            observer.on_epoch(&EpochProgress {
                epoch: self.epoch,
                loss: evaluation.loss,
                best_loss: self.early.best(),
                gradient_max_norm: gradient_norm,
            });
        }

        if gradient_norm <= self.config.convergence_tolerance {
            return self.finish(StopReason::Converged, observer);
        }
        if checkpoint == Checkpoint::Exhausted {
            return self.finish(StopReason::EarlyStopped, observer);
        }

        self.stepper.step(&grads)?;
        if self.epoch >= self.config.epochs {
            return self.finish(StopReason::EpochLimitReached, observer);
        }
        Ok(self.state)
    }

    /// Steps until a terminal state and assembles the result.
    pub fn run(mut self, observer: &mut dyn FitObserver) -> Result<FitResult, HdxError> {
        while self.state.stop_reason().is_none() {
            self.step(observer)?;
        }
        self.into_result()
    }

    /// Result of a finished fit.
    pub fn into_result(self) -> Result<FitResult, HdxError> {
        let stop_reason = self.state.stop_reason().ok_or_else(|| {
            HdxError::fit("optimizer_running", "the fit has not reached a terminal state")
        })?;
        let params = to_host(self.params.as_tensor())?;
        let covariance = if self.config.covariance {
            let exact = ForwardModel::cpu(&self.inputs)?;
            Some(standard_errors(&exact, &self.inputs, &params, &self.penalties)?)
        } else {
            None
        };
        let convergence = Convergence {
            epochs_run: self.epoch,
            best_epoch: self.early.best_epoch(),
            best_loss: self.early.best(),
            stop_reason,
        };
        FitResult::assemble(
            &self.model,
            self.inputs,
            params,
            self.losses,
            convergence,
            self.config,
            covariance,
        )
    }
}

/// Fits the deltaG of a single state.
pub fn fit_deltag_global(
    measurement: &HdxMeasurement,
    rates: &IntrinsicRateTable,
    initial: &DeltaGField,
    config: &GlobalFitConfig,
) -> Result<FitResult, HdxError> {
    config.check_device()?;
    let set = HdxMeasurementSet::from(measurement.clone());
    fit_deltag_global_batch(&set, std::slice::from_ref(rates), initial, config)
}

/// Fits several states jointly, coupling residues covered in more than
/// one state through the `r2` penalty.
pub fn fit_deltag_global_batch(
    set: &HdxMeasurementSet,
    rates: &[IntrinsicRateTable],
    initial: &DeltaGField,
    config: &GlobalFitConfig,
) -> Result<FitResult, HdxError> {
    GlobalDeltaGOptimizer::for_set(set, rates, initial, config.clone())?.run(&mut NullObserver)
}
