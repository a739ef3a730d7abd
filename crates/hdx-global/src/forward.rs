//! Forward model and loss of the global fit on candle tensors.
//!
//! `D[s,p,t] = a_s sum_r X[s,p,r] (1 - exp(-k_obs[s,r] t[s,t]))` with
//! `k_obs` from the exchange relation. Parameters are deltaG in kJ/mol,
//! stored `Ns x Nr`, optionally followed by one scale factor per state.
//! Gradients come from candle's reverse-mode autograd.

use candle_core::backprop::GradStore;
use candle_core::{DType, Device, Tensor, Var};

use hdx_core::{ErrorInfo, HdxError, GAS_CONSTANT};

use crate::config::{Dtype, GlobalFitConfig, RegularizerNorm};
use crate::inputs::AlignedInputs;

/// J/mol per kJ/mol.
pub const KJ: f64 = 1000.0;

pub(crate) fn tensor_error(err: candle_core::Error) -> HdxError {
    HdxError::Fit(ErrorInfo::new("tensor", err.to_string()))
}

/// Copies a tensor of any shape to the host as `f64`, row-major.
pub fn to_host(tensor: &Tensor) -> Result<Vec<f64>, HdxError> {
    tensor
        .flatten_all()
        .and_then(|t| t.to_dtype(DType::F64))
        .and_then(|t| t.to_vec1::<f64>())
        .map_err(tensor_error)
}

fn scalar(tensor: &Tensor) -> Result<f64, HdxError> {
    tensor
        .to_dtype(DType::F64)
        .and_then(|t| t.to_scalar::<f64>())
        .map_err(tensor_error)
}

/// Loss terms and gradient at one parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Total loss.
    pub loss: f64,
    /// Sum of squared residuals over valid entries.
    pub data_loss: f64,
    /// Weighted neighbouring-residue penalty.
    pub reg1: f64,
    /// Weighted cross-state penalty.
    pub reg2: f64,
    /// Gradient with respect to every parameter.
    pub gradient: Vec<f64>,
}

impl Evaluation {
    /// Largest absolute gradient component.
    pub fn gradient_max_norm(&self) -> f64 {
        self.gradient.iter().fold(0.0, |acc, g| acc.max(g.abs()))
    }

    /// Whether loss and gradient are all finite.
    pub fn is_finite(&self) -> bool {
        self.loss.is_finite() && self.gradient.iter().all(|g| g.is_finite())
    }
}

/// Penalty settings of the loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penalties {
    /// Neighbour weight.
    pub r1: f64,
    /// Cross-state weight.
    pub r2: f64,
    /// Norm.
    pub norm: RegularizerNorm,
}

impl From<&GlobalFitConfig> for Penalties {
    fn from(config: &GlobalFitConfig) -> Self {
        Self {
            r1: config.r1,
            r2: config.r2,
            norm: config.regularizer,
        }
    }
}

struct LossTerms {
    total: Tensor,
    data: Tensor,
    reg1: Tensor,
    reg2: Tensor,
}

/// Sum of `|d|^q` over every element of `diff`.
///
/// The L1 sign factor is detached, so its gradient is `sign(d)` and
/// vanishes at `d = 0`.
fn penalty_sum(diff: &Tensor, norm: RegularizerNorm) -> candle_core::Result<Tensor> {
    match norm {
        RegularizerNorm::L1 => {
            let fixed = diff.detach();
            let zeros = fixed.zeros_like()?;
            let sign = fixed
                .gt(&zeros)?
                .to_dtype(diff.dtype())?
                .sub(&fixed.lt(&zeros)?.to_dtype(diff.dtype())?)?;
            diff.mul(&sign)?.sum_all()
        }
        RegularizerNorm::L2 => diff.sqr()?.sum_all(),
    }
}

/// The aligned inputs of a fit as tensors on one device.
///
/// Shapes: coverage `Ns x Np x Nr`, times `Ns x 1 x Nt`, uptake and mask
/// `Ns x Np x Nt`, intrinsic rates `Ns x Nr`.
pub struct ForwardModel {
    n_states: usize,
    n_residues: usize,
    peptide_counts: Vec<usize>,
    device: Device,
    dtype: DType,
    coverage: Tensor,
    times: Tensor,
    uptake: Tensor,
    mask: Tensor,
    k_int: Tensor,
    inv_rt: Tensor,
    pairs: Option<(Tensor, Tensor)>,
    n_pairs: usize,
}

impl ForwardModel {
    /// Uploads `inputs` to `device` in precision `dtype`.
    pub fn new(inputs: &AlignedInputs, device: &Device, dtype: Dtype) -> Result<Self, HdxError> {
        let ns = inputs.n_states();
        let (np, nt, nr) = (inputs.n_peptides, inputs.n_timepoints, inputs.n_residues);
        let dtype = dtype.candle();
        let upload = |values: &[f64], shape: &[usize]| -> Result<Tensor, HdxError> {
            Tensor::from_slice(values, shape, device)
                .and_then(|t| t.to_dtype(dtype))
                .map_err(tensor_error)
        };

        let mask: Vec<f64> = inputs.mask.iter().map(|&v| if v { 1.0 } else { 0.0 }).collect();
        let inv_rt: Vec<f64> = inputs
            .temperature
            .iter()
            .map(|&t| KJ / (GAS_CONSTANT * t))
            .collect();

        let (mut left, mut right) = (Vec::new(), Vec::new());
        for r in 0..nr {
            let states: Vec<usize> = (0..ns).filter(|&s| inputs.covered[s * nr + r]).collect();
            for (n, &s1) in states.iter().enumerate() {
                for &s2 in &states[n + 1..] {
                    left.push((s1 * nr + r) as u32);
                    right.push((s2 * nr + r) as u32);
                }
            }
        }
        let n_pairs = left.len();
        let pairs = if n_pairs > 0 {
            let left = Tensor::from_vec(left, n_pairs, device).map_err(tensor_error)?;
            let right = Tensor::from_vec(right, n_pairs, device).map_err(tensor_error)?;
            Some((left, right))
        } else {
            None
        };

        Ok(Self {
            n_states: ns,
            n_residues: nr,
            peptide_counts: inputs.peptide_counts.clone(),
            device: device.clone(),
            dtype,
            coverage: upload(&inputs.coverage, &[ns, np, nr])?,
            times: upload(&inputs.timepoints, &[ns, 1, nt])?,
            uptake: upload(&inputs.uptake, &[ns, np, nt])?,
            mask: upload(&mask, &[ns, np, nt])?,
            k_int: upload(&inputs.k_int, &[ns, nr])?,
            inv_rt: upload(&inv_rt, &[ns, 1])?,
            pairs,
            n_pairs,
        })
    }

    /// Double precision model on the host CPU.
    pub fn cpu(inputs: &AlignedInputs) -> Result<Self, HdxError> {
        Self::new(inputs, &Device::Cpu, Dtype::Float64)
    }

    /// Device holding the tensors.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Parameter tensor from host values, in the model's device and precision.
    pub fn params(&self, values: &[f64]) -> Result<Tensor, HdxError> {
        Tensor::from_slice(values, values.len(), &self.device)
            .and_then(|t| t.to_dtype(self.dtype))
            .map_err(tensor_error)
    }

    fn deltag(&self, params: &Tensor) -> candle_core::Result<Tensor> {
        let n = self.n_states * self.n_residues;
        params.narrow(0, 0, n)?.reshape((self.n_states, self.n_residues))
    }

    fn rate_tensor(&self, params: &Tensor) -> candle_core::Result<Tensor> {
        let x = self.deltag(params)?.broadcast_mul(&self.inv_rt)?.neg()?;
        self.k_int.mul(&candle_nn::ops::sigmoid(&x)?)
    }

    /// Uptake `Ns x Np x T` at `times` of shape `Ns x 1 x T` or `1 x 1 x T`.
    fn uptake_tensor(&self, params: &Tensor, times: &Tensor) -> candle_core::Result<Tensor> {
        let n = self.n_states * self.n_residues;
        let exchanged = self
            .rate_tensor(params)?
            .unsqueeze(2)?
            .broadcast_mul(times)?
            .neg()?
            .exp()?
            .affine(-1.0, 1.0)?;
        let uptake = self.coverage.matmul(&exchanged)?;
        if params.dim(0)? > n {
            let scale = params.narrow(0, n, self.n_states)?.reshape((self.n_states, 1, 1))?;
            uptake.broadcast_mul(&scale)
        } else {
            Ok(uptake)
        }
    }

    fn loss_terms(&self, params: &Tensor, penalties: &Penalties) -> candle_core::Result<LossTerms> {
        let (ns, nr) = (self.n_states, self.n_residues);
        let residual = self
            .uptake_tensor(params, &self.times)?
            .sub(&self.uptake)?
            .mul(&self.mask)?;
        let data = residual.sqr()?.sum_all()?;
        let zero = Tensor::zeros((), self.dtype, &self.device)?;

        let reg1 = if penalties.r1 > 0.0 && nr > 1 {
            let deltag = self.deltag(params)?;
            let diff = deltag.narrow(1, 1, nr - 1)?.sub(&deltag.narrow(1, 0, nr - 1)?)?;
            let pairs = ns * (nr - 1);
            penalty_sum(&diff, penalties.norm)?.affine(penalties.r1 / pairs as f64, 0.0)?
        } else {
            zero.clone()
        };

        let reg2 = match &self.pairs {
            Some((left, right)) if penalties.r2 > 0.0 => {
                let flat = params.narrow(0, 0, ns * nr)?;
                let diff = flat.index_select(left, 0)?.sub(&flat.index_select(right, 0)?)?;
                penalty_sum(&diff, penalties.norm)?
                    .affine(penalties.r2 / self.n_pairs as f64, 0.0)?
            }
            _ => zero,
        };

        let total = data.add(&reg1)?.add(&reg2)?;
        Ok(LossTerms {
            total,
            data,
            reg1,
            reg2,
        })
    }

    /// Loss terms at `params` and the gradient store of the total loss.
    pub fn evaluate_var(
        &self,
        params: &Var,
        penalties: &Penalties,
    ) -> Result<(Evaluation, GradStore), HdxError> {
        let terms = self
            .loss_terms(params.as_tensor(), penalties)
            .map_err(tensor_error)?;
        let grads = terms.total.backward().map_err(tensor_error)?;
        let gradient = match grads.get(params.as_tensor()) {
            Some(gradient) => to_host(gradient)?,
            None => vec![0.0; params.as_tensor().elem_count()],
        };
        let data_loss = scalar(&terms.data)?;
        let reg1 = scalar(&terms.reg1)?;
        let reg2 = scalar(&terms.reg2)?;
        let evaluation = Evaluation {
            loss: data_loss + reg1 + reg2,
            data_loss,
            reg1,
            reg2,
            gradient,
        };
        Ok((evaluation, grads))
    }

    /// Loss and gradient at host parameters `params`.
    pub fn evaluate(&self, params: &[f64], penalties: &Penalties) -> Result<Evaluation, HdxError> {
        let var = Var::from_tensor(&self.params(params)?).map_err(tensor_error)?;
        Ok(self.evaluate_var(&var, penalties)?.0)
    }

    /// Observed rates `Ns x Nr` for deltaG parameters in kJ/mol.
    pub fn rates(&self, params: &[f64]) -> Result<Vec<f64>, HdxError> {
        let params = self.params(params)?;
        to_host(&self.rate_tensor(&params).map_err(tensor_error)?)
    }

    /// Predicted uptake `Ns x Np x Nt`; padded entries are zero.
    pub fn predict(&self, params: &[f64]) -> Result<Vec<f64>, HdxError> {
        let params = self.params(params)?;
        to_host(&self.uptake_tensor(&params, &self.times).map_err(tensor_error)?)
    }

    /// Uptake of the peptides of one state at arbitrary times, `Np x times`.
    ///
    /// Non-positive times predict zero uptake.
    pub fn predict_at(&self, params: &[f64], state: usize, times: &[f64]) -> Result<Vec<f64>, HdxError> {
        let np = self.peptide_counts[state];
        let clamped: Vec<f64> = times.iter().map(|&t| t.max(0.0)).collect();
        let times = Tensor::from_slice(&clamped, (1, 1, clamped.len()), &self.device)
            .and_then(|t| t.to_dtype(self.dtype))
            .map_err(tensor_error)?;
        let params = self.params(params)?;
        let uptake = self
            .uptake_tensor(&params, &times)
            .and_then(|u| u.narrow(0, state, 1)?.narrow(1, 0, np))
            .map_err(tensor_error)?;
        to_host(&uptake)
    }
}
