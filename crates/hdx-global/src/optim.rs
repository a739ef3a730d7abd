//! First-order step rules over candle variables.

use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};

use hdx_core::HdxError;

use crate::config::{GlobalFitConfig, OptimizerKind};
use crate::forward::tensor_error;

/// Settings of [`MomentumSgd`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SgdParams {
    /// Step size.
    pub lr: f64,
    /// Velocity decay.
    pub momentum: f64,
    /// Nesterov look-ahead.
    pub nesterov: bool,
}

/// Gradient descent with (optionally Nesterov) momentum.
///
/// The first step uses the raw gradient as velocity.
pub struct MomentumSgd {
    vars: Vec<(Var, Option<Tensor>)>,
    params: SgdParams,
}

impl Optimizer for MomentumSgd {
    type Config = SgdParams;

    fn new(vars: Vec<Var>, params: SgdParams) -> candle_core::Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|var| var.dtype().is_float())
            .map(|var| (var, None))
            .collect();
        Ok(Self { vars, params })
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr;
    }

    fn step(&mut self, grads: &GradStore) -> candle_core::Result<()> {
        let SgdParams { lr, momentum, nesterov } = self.params;
        for (var, velocity) in self.vars.iter_mut() {
            let Some(grad) = grads.get(var.as_tensor()) else {
                continue;
            };
            let next = match velocity.as_ref() {
                Some(previous) => previous.affine(momentum, 0.0)?.add(grad)?,
                None => grad.clone(),
            };
            let update = if nesterov {
                grad.add(&next.affine(momentum, 0.0)?)?
            } else {
                next.clone()
            };
            var.set(&var.as_tensor().sub(&update.affine(lr, 0.0)?)?.detach())?;
            *velocity = Some(next.detach());
        }
        Ok(())
    }
}

/// Step rule selected by the configuration.
pub enum Stepper {
    /// candle's AdamW without weight decay.
    Adam(AdamW),
    /// See [`MomentumSgd`].
    Sgd(MomentumSgd),
}

impl Stepper {
    /// Step rule of `config` updating `params` in place.
    pub fn new(config: &GlobalFitConfig, params: &Var) -> Result<Self, HdxError> {
        let vars = vec![params.clone()];
        let stepper = match config.optimizer {
            OptimizerKind::Adam => Stepper::Adam(
                AdamW::new(
                    vars,
                    ParamsAdamW {
                        lr: config.learning_rate,
                        beta1: config.beta1,
                        beta2: config.beta2,
                        eps: config.adam_epsilon,
                        weight_decay: 0.0,
                    },
                )
                .map_err(tensor_error)?,
            ),
            OptimizerKind::Sgd => Stepper::Sgd(
                MomentumSgd::new(
                    vars,
                    SgdParams {
                        lr: config.learning_rate,
                        momentum: config.momentum,
                        nesterov: config.nesterov,
                    },
                )
                .map_err(tensor_error)?,
            ),
        };
        Ok(stepper)
    }

    /// Applies one update from the gradients of the last backward pass.
    pub fn step(&mut self, grads: &GradStore) -> Result<(), HdxError> {
        match self {
            Stepper::Adam(adam) => adam.step(grads),
            Stepper::Sgd(sgd) => sgd.step(grads),
        }
        .map_err(tensor_error)
    }

    /// Current step size.
    pub fn learning_rate(&self) -> f64 {
        match self {
            Stepper::Adam(adam) => adam.learning_rate(),
            Stepper::Sgd(sgd) => sgd.learning_rate(),
        }
    }

    /// Replaces the step size for all later steps.
    pub fn set_learning_rate(&mut self, lr: f64) {
        match self {
            Stepper::Adam(adam) => adam.set_learning_rate(lr),
            Stepper::Sgd(sgd) => sgd.set_learning_rate(lr),
        }
    }
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;
    use crate::forward::to_host;

    fn linear_grads(var: &Var, slope: &[f64]) -> GradStore {
        let slope = Tensor::new(slope, &Device::Cpu).unwrap();
        var.as_tensor().mul(&slope).unwrap().sum_all().unwrap().backward().unwrap()
    }

    #[test]
    fn adam_first_step_has_learning_rate_size() {
        let var = Var::new(&[1.0f64, -1.0], &Device::Cpu).unwrap();
        let config = GlobalFitConfig {
            learning_rate: 0.1,
            ..GlobalFitConfig::default()
        };
        let mut adam = Stepper::new(&config, &var).unwrap();
        adam.step(&linear_grads(&var, &[3.0, -0.5])).unwrap();
        let params = to_host(var.as_tensor()).unwrap();
        assert!((params[0] - 0.9).abs() < 1e-6);
        assert!((params[1] + 0.9).abs() < 1e-6);
    }

    #[test]
    fn sgd_momentum_accumulates() {
        let var = Var::new(&[0.0f64], &Device::Cpu).unwrap();
        let mut sgd = MomentumSgd::new(
            vec![var.clone()],
            SgdParams {
                lr: 0.1,
                momentum: 0.5,
                nesterov: false,
            },
        )
        .unwrap();
        sgd.step(&linear_grads(&var, &[1.0])).unwrap();
        sgd.step(&linear_grads(&var, &[1.0])).unwrap();
        let params = to_host(var.as_tensor()).unwrap();
        assert!((params[0] + 0.1 + 0.15).abs() < 1e-12);
    }

    #[test]
    fn zero_learning_rate_freezes_parameters() {
        let var = Var::new(&[2.0f64, 3.0], &Device::Cpu).unwrap();
        let mut adam = Stepper::new(&GlobalFitConfig::default(), &var).unwrap();
        adam.set_learning_rate(0.0);
        assert_eq!(adam.learning_rate(), 0.0);
        adam.step(&linear_grads(&var, &[1.0, -4.0])).unwrap();
        assert_eq!(to_host(var.as_tensor()).unwrap(), vec![2.0, 3.0]);
    }
}
