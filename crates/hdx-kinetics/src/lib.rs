#![deny(missing_docs)]
#![doc = "Kinetic uptake models, the deltaG exchange relation and the per-residue initial rate estimators of the first fitting stage."]

/// Escalation of local fits to the global optimizer.
pub mod escalation;
/// Per-residue estimators and the weighted-average guess.
pub mod estimator;
pub mod evolution;
pub mod exchange;
pub mod inverse;
/// Single- and bi-exponential uptake models.
pub mod model;
/// Bi-exponential fit of one curve.
pub mod peptide_fit;
pub mod powell;

pub use escalation::{AmplitudeBound, EscalationPolicy, EscalationReason};
pub use estimator::{
    fit_rates_cancellable, fit_rates_half_time_interpolate, fit_rates_weighted_average, fit_rates_with,
    half_time, residue_uptake_curves, GuessMethod, GuessRow, HalfTimeEstimator,
    InitialGuessConfig, InitialGuessResult, RateEstimator, SingleExponentialEstimator,
};
pub use evolution::{differential_evolution, EvolutionOptions};
pub use exchange::{deltag_from_rate, deltag_guess, fill_missing, k_obs, k_obs_derivative};
pub use inverse::initial_guess;
pub use model::{KineticModel, TauBounds};
pub use peptide_fit::{fit_peptide_uptake, BiExponentialFitter, FitStrategy, PeptideFit};
pub use powell::{Minimum, PowellOptions};
