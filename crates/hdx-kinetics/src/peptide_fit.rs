//! Bi-exponential fit of a single uptake curve.

use serde::{Deserialize, Serialize};

use hdx_core::RngHandle;

use crate::escalation::EscalationPolicy;
use crate::evolution::{differential_evolution, EvolutionOptions};
use crate::inverse::initial_guess;
use crate::model::{KineticModel, TauBounds};
use crate::powell::{self, PowellOptions};

/// Long lifetimes from the bootstrap are capped here before clamping.
const TAU2_START_CAP: f64 = 200.0;

/// Default master seed of the stochastic fallback.
pub const DEFAULT_SEED: u64 = 43;

/// How a curve's parameters were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStrategy {
    /// Accepted local fit.
    Local,
    /// Local fit escalated to differential evolution.
    Global,
    /// Curve could not be fitted (missing data).
    Skipped,
}

impl FitStrategy {
    /// Lower-case label used in exports.
    pub fn as_str(self) -> &'static str {
        match self {
            FitStrategy::Local => "local",
            FitStrategy::Global => "global",
            FitStrategy::Skipped => "skipped",
        }
    }
}

/// Fitted parameters of one uptake curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeptideFit {
    /// Weighted exchange rate `1 / (r tau1 + (1-r) tau2)`.
    pub rate: f64,
    /// Short lifetime.
    pub tau1: f64,
    /// Long lifetime.
    pub tau2: f64,
    /// Amplitude fraction of the short component.
    pub r: f64,
    /// Residual sum of squares.
    pub chi_squared: f64,
    /// Route that produced the parameters.
    pub strategy: FitStrategy,
}

impl PeptideFit {
    /// All-NaN result for curves that cannot be fitted.
    pub fn sentinel() -> Self {
        Self {
            rate: f64::NAN,
            tau1: f64::NAN,
            tau2: f64::NAN,
            r: f64::NAN,
            chi_squared: f64::NAN,
            strategy: FitStrategy::Skipped,
        }
    }

    /// Whether this is the missing-data sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.strategy == FitStrategy::Skipped
    }

    pub(crate) fn from_biexponential(
        params: &[f64],
        times: &[f64],
        uptake: &[f64],
        strategy: FitStrategy,
    ) -> Self {
        let model = KineticModel::BiExponential {
            r: params[0],
            tau1: params[1],
            tau2: params[2],
        };
        Self {
            rate: model.weighted_rate(),
            tau1: params[1],
            tau2: params[2],
            r: params[0],
            chi_squared: model.chi_squared(times, uptake),
            strategy,
        }
    }

    /// The fitted curve as a model.
    pub fn model(&self) -> KineticModel {
        KineticModel::BiExponential {
            r: self.r,
            tau1: self.tau1,
            tau2: self.tau2,
        }
    }
}

pub(crate) fn curve_is_fittable(times: &[f64], uptake: &[f64]) -> bool {
    !times.is_empty()
        && times.len() == uptake.len()
        && times.iter().all(|t| t.is_finite())
        && uptake.iter().all(|d| !d.is_nan())
}

fn start_value(value: f64, (lo, hi): (f64, f64)) -> f64 {
    if value.is_nan() {
        0.5 * (lo + hi)
    } else {
        value.clamp(lo, hi)
    }
}

/// Bounded bi-exponential fitter with a seeded global fallback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiExponentialFitter {
    /// Acceptance rules of the local fit.
    pub policy: EscalationPolicy,
    /// Lifetime bounds.
    pub bounds: TauBounds,
    /// Local optimizer settings.
    pub powell: PowellOptions,
    /// Global fallback settings.
    pub evolution: EvolutionOptions,
    /// Master seed; each curve draws from its own substream.
    pub seed: u64,
}

impl Default for BiExponentialFitter {
    fn default() -> Self {
        Self::new(EscalationPolicy::default())
    }
}

impl BiExponentialFitter {
    /// Fitter with default bounds, optimizer settings and seed.
    pub fn new(policy: EscalationPolicy) -> Self {
        Self {
            policy,
            bounds: TauBounds::default(),
            powell: PowellOptions::default(),
            evolution: EvolutionOptions::default(),
            seed: DEFAULT_SEED,
        }
    }

    /// Starting point `[r, tau1, tau2]` derived from the inverse bootstrap.
    pub fn start(&self, times: &[f64], uptake: &[f64]) -> [f64; 3] {
        let (tau1, tau2) = initial_guess(times, uptake);
        [
            0.5,
            start_value(tau1, self.bounds.tau1),
            start_value(tau2.min(TAU2_START_CAP), self.bounds.tau2),
        ]
    }

    /// Fits one curve in percent uptake. Curves with NaN give the sentinel.
    ///
    /// `substream` selects the random stream of the global fallback so that
    /// independent curves can be fitted in any order.
    pub fn fit(&self, times: &[f64], uptake: &[f64], substream: u64) -> PeptideFit {
        if !curve_is_fittable(times, uptake) {
            return PeptideFit::sentinel();
        }
        let bounds = self.bounds.parameter_bounds();
        let chi_squared = |p: &[f64]| {
            KineticModel::BiExponential {
                r: p[0],
                tau1: p[1],
                tau2: p[2],
            }
            .chi_squared(times, uptake)
        };

        let start = self.start(times, uptake);
        let local = powell::minimize(chi_squared, &start, &bounds, &self.powell);
        let fit = PeptideFit::from_biexponential(&local.x, times, uptake, FitStrategy::Local);
        let Some(reason) = self.policy.should_escalate(&fit) else {
            return fit;
        };

        let mut rng = RngHandle::for_substream(self.seed, substream);
        log::debug!(
            "escalating curve {substream} to differential evolution ({reason:?}, chi2 {:.3}, seed {})",
            fit.chi_squared,
            rng.seed()
        );
        let global = differential_evolution(chi_squared, &bounds, &self.evolution, &mut rng);
        PeptideFit::from_biexponential(&global.x, times, uptake, FitStrategy::Global)
    }
}

/// Fits one curve with default bounds and seed under `policy`.
pub fn fit_peptide_uptake(times: &[f64], uptake: &[f64], policy: &EscalationPolicy) -> PeptideFit {
    BiExponentialFitter::new(*policy).fit(times, uptake, 0)
}
