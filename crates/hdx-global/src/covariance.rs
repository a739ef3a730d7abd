//! Per-residue standard errors from the curvature of the loss.

use log::warn;
use nalgebra::DMatrix;

use hdx_core::HdxError;

use crate::config::RegularizerNorm;
use crate::forward::{ForwardModel, Penalties, KJ};
use crate::inputs::AlignedInputs;

const STEP: f64 = 1e-4;

/// Exact curvature of the L2 penalties inside one state's block.
fn penalty_curvature(inputs: &AlignedInputs, penalties: &Penalties, state: usize) -> DMatrix<f64> {
    let (ns, nr) = (inputs.n_states(), inputs.n_residues);
    let mut h = DMatrix::<f64>::zeros(nr, nr);
    if penalties.norm != RegularizerNorm::L2 {
        return h;
    }
    let pairs = ns * nr.saturating_sub(1);
    if penalties.r1 > 0.0 && pairs > 0 {
        let w = 2.0 * penalties.r1 / pairs as f64;
        for r in 0..nr - 1 {
            h[(r, r)] += w;
            h[(r + 1, r + 1)] += w;
            h[(r, r + 1)] -= w;
            h[(r + 1, r)] -= w;
        }
    }
    if penalties.r2 > 0.0 && ns > 1 {
        let multiplicity = inputs.coverage_multiplicity();
        let terms: usize = multiplicity.iter().map(|&m| m * m.saturating_sub(1) / 2).sum();
        if terms > 0 {
            let w = 2.0 * penalties.r2 / terms as f64;
            for r in 0..nr {
                if inputs.covered[state * nr + r] && multiplicity[r] > 1 {
                    h[(r, r)] += w * (multiplicity[r] - 1) as f64;
                }
            }
        }
    }
    h
}

/// Standard errors `Ns x Nr` in J/mol.
///
/// Each state's block of the Hessian is built from central differences of
/// the autograd data gradient of `model` plus the exact penalty curvature,
/// then inverted over the covered residues with non-zero curvature. Other
/// residues, and whole states with a singular block, are NaN.
pub fn standard_errors(
    model: &ForwardModel,
    inputs: &AlignedInputs,
    params: &[f64],
    penalties: &Penalties,
) -> Result<Vec<f64>, HdxError> {
    let (ns, nr) = (inputs.n_states(), inputs.n_residues);
    let data_only = Penalties {
        r1: 0.0,
        r2: 0.0,
        ..*penalties
    };
    let mut out = vec![f64::NAN; ns * nr];
    let mut shifted = params.to_vec();
    for s in 0..ns {
        let mut hessian = penalty_curvature(inputs, penalties, s);
        for j in 0..nr {
            let i = s * nr + j;
            let centre = shifted[i];
            shifted[i] = centre + STEP;
            let plus = model.evaluate(&shifted, &data_only)?.gradient;
            shifted[i] = centre - STEP;
            let minus = model.evaluate(&shifted, &data_only)?.gradient;
            shifted[i] = centre;
            for r in 0..nr {
                hessian[(r, j)] += (plus[s * nr + r] - minus[s * nr + r]) / (2.0 * STEP);
            }
        }
        let hessian = (&hessian + hessian.transpose()) * 0.5;

        let active: Vec<usize> = (0..nr)
            .filter(|&r| inputs.covered[s * nr + r] && hessian[(r, r)].abs() > f64::EPSILON)
            .collect();
        if active.is_empty() {
            continue;
        }
        let block = DMatrix::from_fn(active.len(), active.len(), |a, b| {
            hessian[(active[a], active[b])]
        });
        match block.try_inverse() {
            Some(inverse) => {
                for (a, &r) in active.iter().enumerate() {
                    out[s * nr + r] = inverse[(a, a)].abs().sqrt() * KJ;
                }
            }
            None => warn!(
                "singular Hessian for state {}, standard errors unavailable",
                inputs.names[s]
            ),
        }
    }
    Ok(out)
}
