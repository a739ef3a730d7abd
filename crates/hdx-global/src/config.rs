//! Configuration of the global optimizer.

use candle_core::DType;
use serde::{Deserialize, Serialize};

use hdx_core::{ErrorInfo, HdxError};

/// Compute device requested for the epoch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Host CPU.
    #[default]
    Cpu,
    /// First CUDA device; needs the `cuda` feature and a visible GPU.
    Accelerator,
}

/// Floating point precision of parameters and predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    /// Single precision tensors.
    Float32,
    /// Double precision.
    #[default]
    Float64,
}

impl Dtype {
    /// Matching candle element type.
    pub fn candle(self) -> DType {
        match self {
            Dtype::Float32 => DType::F32,
            Dtype::Float64 => DType::F64,
        }
    }
}

/// Norm of the smoothness and cross-state penalties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegularizerNorm {
    /// Absolute differences.
    #[default]
    L1,
    /// Squared differences.
    L2,
}

/// Gradient step rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    /// Adam with bias correction.
    #[default]
    Adam,
    /// Stochastic gradient descent with momentum.
    Sgd,
}

fn default_epochs() -> usize {
    100_000
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_momentum() -> f64 {
    0.5
}

fn default_beta1() -> f64 {
    0.9
}

fn default_beta2() -> f64 {
    0.999
}

fn default_adam_epsilon() -> f64 {
    1e-8
}

fn default_stop_loss() -> f64 {
    0.01
}

fn default_stop_patience() -> usize {
    50
}

fn default_convergence_tolerance() -> f64 {
    1e-9
}

fn default_r1() -> f64 {
    2.0
}

fn default_log_interval() -> usize {
    1000
}

fn default_covariance() -> bool {
    true
}

/// Settings of one global fit. Parameters are expressed in kJ/mol inside
/// the optimizer, so the learning rate is in kJ/mol per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalFitConfig {
    /// Maximum number of epochs.
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Fixed step size.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Step rule.
    #[serde(default)]
    pub optimizer: OptimizerKind,
    /// Momentum of the SGD rule.
    #[serde(default = "default_momentum")]
    pub momentum: f64,
    /// Nesterov look-ahead of the SGD rule.
    #[serde(default)]
    pub nesterov: bool,
    /// First moment decay of Adam.
    #[serde(default = "default_beta1")]
    pub beta1: f64,
    /// Second moment decay of Adam.
    #[serde(default = "default_beta2")]
    pub beta2: f64,
    /// Denominator guard of Adam.
    #[serde(default = "default_adam_epsilon")]
    pub adam_epsilon: f64,
    /// Minimum loss decrease counted as an improvement.
    #[serde(default = "default_stop_loss")]
    pub stop_loss: f64,
    /// Non-improving epochs tolerated before stopping.
    #[serde(default = "default_stop_patience")]
    pub stop_patience: usize,
    /// Gradient max-norm at which the fit is converged.
    #[serde(default = "default_convergence_tolerance")]
    pub convergence_tolerance: f64,
    /// Weight of the neighbouring-residue penalty.
    #[serde(default = "default_r1")]
    pub r1: f64,
    /// Weight of the cross-state penalty.
    #[serde(default)]
    pub r2: f64,
    /// Penalty norm.
    #[serde(default)]
    pub regularizer: RegularizerNorm,
    /// Fit one uptake scale factor per state.
    #[serde(default)]
    pub fit_scaling: bool,
    /// Compute device.
    #[serde(default)]
    pub device: Device,
    /// Numeric precision.
    #[serde(default)]
    pub dtype: Dtype,
    /// Epochs between debug checkpoints and observer notifications.
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,
    /// Estimate per-residue standard errors after the fit.
    #[serde(default = "default_covariance")]
    pub covariance: bool,
}

impl Default for GlobalFitConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            optimizer: OptimizerKind::default(),
            momentum: default_momentum(),
            nesterov: false,
            beta1: default_beta1(),
            beta2: default_beta2(),
            adam_epsilon: default_adam_epsilon(),
            stop_loss: default_stop_loss(),
            stop_patience: default_stop_patience(),
            convergence_tolerance: default_convergence_tolerance(),
            r1: default_r1(),
            r2: 0.0,
            regularizer: RegularizerNorm::default(),
            fit_scaling: false,
            device: Device::default(),
            dtype: Dtype::default(),
            log_interval: default_log_interval(),
            covariance: default_covariance(),
        }
    }
}

fn invalid(code: &str, message: &str, value: f64) -> HdxError {
    HdxError::Config(ErrorInfo::new(code, message).with_context("value", value.to_string()))
}

impl GlobalFitConfig {
    /// Opens the configured compute device.
    ///
    /// An accelerator request fails with [`HdxError::Device`] when the build
    /// lacks CUDA support or no GPU answers; there is no silent CPU fallback.
    pub fn device(&self) -> Result<candle_core::Device, HdxError> {
        match self.device {
            Device::Cpu => Ok(candle_core::Device::Cpu),
            Device::Accelerator => candle_core::Device::new_cuda(0).map_err(|err| {
                HdxError::Device(
                    ErrorInfo::new("device_unavailable", err.to_string())
                        .with_context("device", "accelerator")
                        .with_hint("build with the `cuda` feature on a CUDA host, or set `device: cpu`"),
                )
            }),
        }
    }

    /// Fails with [`HdxError::Device`] when [`GlobalFitConfig::device`] does.
    pub fn check_device(&self) -> Result<(), HdxError> {
        self.device().map(|_| ())
    }

    /// Checks the numeric settings.
    pub fn validate(&self) -> Result<(), HdxError> {
        if self.epochs == 0 {
            return Err(HdxError::config("epochs", "at least one epoch is required"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(invalid(
                "learning_rate",
                "learning rate must be finite and positive",
                self.learning_rate,
            ));
        }
        if self.stop_patience == 0 {
            return Err(HdxError::config(
                "stop_patience",
                "early stopping patience must be at least one epoch",
            ));
        }
        for (code, value) in [("r1", self.r1), ("r2", self.r2)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(code, "regularization weights must be non-negative", value));
            }
        }
        if !(self.stop_loss.is_finite() && self.stop_loss >= 0.0) {
            return Err(invalid("stop_loss", "stop_loss must be non-negative", self.stop_loss));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(invalid("momentum", "momentum must lie in [0, 1)", self.momentum));
        }
        for (code, value) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&value) {
                return Err(invalid(code, "Adam decay rates must lie in [0, 1)", value));
            }
        }
        if !(self.adam_epsilon > 0.0) {
            return Err(invalid(
                "adam_epsilon",
                "Adam epsilon must be positive",
                self.adam_epsilon,
            ));
        }
        Ok(())
    }
}
