//! Per-residue initial rate estimation from peptide uptake.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use hdx_core::{ErrorInfo, HdxError, HdxMeasurement, IntrinsicRateTable};

use crate::escalation::EscalationPolicy;
use crate::evolution::EvolutionOptions;
use crate::exchange::{deltag_guess, fill_missing};
use crate::model::{KineticModel, TauBounds};
use crate::peptide_fit::{
    curve_is_fittable, BiExponentialFitter, FitStrategy, PeptideFit, DEFAULT_SEED,
};
use crate::powell::{bounded_scalar, PowellOptions};

/// Capability shared by all rate estimators: one uptake curve in, one fit out.
pub trait RateEstimator: Sync {
    /// Fits `uptake` (percent) sampled at `times`.
    ///
    /// `substream` identifies the curve for estimators drawing random numbers.
    fn estimate(&self, times: &[f64], uptake: &[f64], substream: u64) -> PeptideFit;
}

impl RateEstimator for BiExponentialFitter {
    fn estimate(&self, times: &[f64], uptake: &[f64], substream: u64) -> PeptideFit {
        self.fit(times, uptake, substream)
    }
}

/// Time at which a curve first reaches 50 %, by linear interpolation.
///
/// NaN when the curve contains NaN, never reaches 50 % or starts above it.
pub fn half_time(times: &[f64], uptake: &[f64]) -> f64 {
    if !curve_is_fittable(times, uptake) {
        return f64::NAN;
    }
    let Some(i) = uptake.iter().position(|&d| d >= 50.0) else {
        return f64::NAN;
    };
    if i == 0 {
        return if uptake[0] == 50.0 { times[0] } else { f64::NAN };
    }
    let (t0, t1) = (times[i - 1], times[i]);
    let (d0, d1) = (uptake[i - 1], uptake[i]);
    t0 + (50.0 - d0) * (t1 - t0) / (d1 - d0)
}

fn single_exponential_fit(rate: f64, times: &[f64], uptake: &[f64]) -> PeptideFit {
    if !(rate.is_finite() && rate > 0.0) {
        return PeptideFit::sentinel();
    }
    PeptideFit {
        rate,
        tau1: 1.0 / rate,
        tau2: 1.0 / rate,
        r: 1.0,
        chi_squared: KineticModel::SingleExponential { rate }.chi_squared(times, uptake),
        strategy: FitStrategy::Local,
    }
}

/// `rate = ln 2 / t50` from the interpolated half-uptake time.
#[derive(Debug, Clone, Copy, Default)]
pub struct HalfTimeEstimator;

impl RateEstimator for HalfTimeEstimator {
    fn estimate(&self, times: &[f64], uptake: &[f64], _substream: u64) -> PeptideFit {
        let t50 = half_time(times, uptake);
        if !(t50 > 0.0) {
            return PeptideFit::sentinel();
        }
        single_exponential_fit(std::f64::consts::LN_2 / t50, times, uptake)
    }
}

/// Least-squares single exponential, searched over `log k`.
#[derive(Debug, Clone, Copy)]
pub struct SingleExponentialEstimator {
    /// Grid samples of the log-rate search.
    pub samples: usize,
}

impl Default for SingleExponentialEstimator {
    fn default() -> Self {
        Self { samples: 64 }
    }
}

impl RateEstimator for SingleExponentialEstimator {
    fn estimate(&self, times: &[f64], uptake: &[f64], _substream: u64) -> PeptideFit {
        if !curve_is_fittable(times, uptake) {
            return PeptideFit::sentinel();
        }
        let positive = times.iter().copied().filter(|&t| t > 0.0);
        let t_min = positive.clone().fold(f64::INFINITY, f64::min);
        let t_max = positive.fold(0.0, f64::max);
        if !(t_max > 0.0) {
            return PeptideFit::sentinel();
        }
        let (lo, hi) = ((1e-3 / t_max).ln(), (1e3 / t_min).ln());
        let (log_k, _) = bounded_scalar(
            |log_k| KineticModel::SingleExponential { rate: log_k.exp() }.chi_squared(times, uptake),
            lo,
            hi,
            self.samples,
            1e-10,
        );
        single_exponential_fit(log_k.exp(), times, uptake)
    }
}

/// Estimator selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GuessMethod {
    /// Half-uptake time interpolation.
    HalfTime,
    /// Single exponential least squares.
    SingleExponential,
    /// Bi-exponential fit with escalation.
    #[default]
    BiExponential,
}

fn default_parallel() -> bool {
    true
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

/// Configuration of the initial-guess stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialGuessConfig {
    /// Estimator applied to each residue curve.
    #[serde(default)]
    pub method: GuessMethod,
    /// Escalation rules of the bi-exponential fit.
    #[serde(flatten)]
    pub escalation: EscalationPolicy,
    /// Lifetime bounds of the bi-exponential fit.
    #[serde(default)]
    pub tau_bounds: TauBounds,
    /// Local optimizer settings.
    #[serde(default)]
    pub powell: PowellOptions,
    /// Global fallback settings.
    #[serde(default)]
    pub evolution: EvolutionOptions,
    /// Fit residues on a worker pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// Worker count; rayon's default when absent.
    #[serde(default)]
    pub threads: Option<usize>,
    /// Master seed of the stochastic fallback.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for InitialGuessConfig {
    fn default() -> Self {
        Self {
            method: GuessMethod::default(),
            escalation: EscalationPolicy::default(),
            tau_bounds: TauBounds::default(),
            powell: PowellOptions::default(),
            evolution: EvolutionOptions::default(),
            parallel: default_parallel(),
            threads: None,
            seed: default_seed(),
        }
    }
}

impl GuessMethod {
    /// Builds a fresh estimator for this method.
    pub fn estimator(self, config: &InitialGuessConfig) -> Box<dyn RateEstimator> {
        match self {
            GuessMethod::HalfTime => Box::new(HalfTimeEstimator),
            GuessMethod::SingleExponential => Box::new(SingleExponentialEstimator::default()),
            GuessMethod::BiExponential => Box::new(BiExponentialFitter {
                policy: config.escalation,
                bounds: config.tau_bounds,
                powell: config.powell,
                evolution: config.evolution,
                seed: config.seed,
            }),
        }
    }
}

/// Initial estimate of one residue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuessRow {
    /// Residue number.
    pub r_number: i64,
    /// Fitted curve parameters.
    #[serde(flatten)]
    pub fit: PeptideFit,
}

/// Per-residue estimates of one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialGuessResult {
    /// State name.
    pub state: String,
    /// One row per residue of the state axis.
    pub rows: Vec<GuessRow>,
    /// Set when the batch was cancelled; rows never started hold sentinels.
    #[serde(default)]
    pub cancelled: bool,
}

impl InitialGuessResult {
    /// Residue numbers in row order.
    pub fn r_numbers(&self) -> Vec<i64> {
        self.rows.iter().map(|row| row.r_number).collect()
    }

    /// Rates in row order, NaN for skipped residues.
    pub fn rates(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.fit.rate).collect()
    }

    /// Row of a residue.
    pub fn get(&self, r_number: i64) -> Option<&GuessRow> {
        self.rows.iter().find(|row| row.r_number == r_number)
    }

    /// DeltaG guess in J/mol per row, gaps filled by interpolation.
    pub fn deltag(&self, k_int: &IntrinsicRateTable, temperature: f64) -> Vec<f64> {
        let k: Vec<f64> = self.rows.iter().map(|row| k_int.k_int(row.r_number)).collect();
        fill_missing(&deltag_guess(&self.rates(), &k, temperature))
    }

    /// Comma separated table `r_number,rate,tau1,tau2,r,chi_squared,strategy`
    /// preceded by a `# state:` header line.
    pub fn to_delimited(&self) -> Result<String, HdxError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let export_err = |err: csv::Error| HdxError::Serde(ErrorInfo::new("guess_export", err.to_string()));
        writer
            .write_record(["r_number", "rate", "tau1", "tau2", "r", "chi_squared", "strategy"])
            .map_err(export_err)?;
        for row in &self.rows {
            let fit = &row.fit;
            writer
                .write_record([
                    row.r_number.to_string(),
                    fit.rate.to_string(),
                    fit.tau1.to_string(),
                    fit.tau2.to_string(),
                    fit.r.to_string(),
                    fit.chi_squared.to_string(),
                    fit.strategy.as_str().to_string(),
                ])
                .map_err(export_err)?;
        }
        let body = writer
            .into_inner()
            .map_err(|err| HdxError::Serde(ErrorInfo::new("guess_export", err.to_string())))?;
        let body = String::from_utf8(body)
            .map_err(|err| HdxError::Serde(ErrorInfo::new("guess_export", err.to_string())))?;
        Ok(format!("# state: {}\n{body}", self.state))
    }
}

/// Percent uptake curve of every residue on the state axis (`Nr x Nt`).
///
/// Each covering peptide contributes its percentage uptake with weight
/// `w[p][r] / n_exchangeable[p]`, normalised by the summed weights of the
/// peptides valid at that timepoint. Residues without a valid contribution
/// are NaN.
pub fn residue_uptake_curves(measurement: &HdxMeasurement) -> Vec<Vec<f64>> {
    let coverage = measurement.coverage();
    let nt = measurement.n_timepoints();
    let percent = measurement.percent_uptake();
    let counts = coverage.exchangeable_counts();
    let mut numerator = vec![vec![0.0; nt]; coverage.n_residues()];
    let mut denominator = vec![vec![0.0; nt]; coverage.n_residues()];
    for (p, &count) in counts.iter().enumerate() {
        if count <= 0.0 {
            continue;
        }
        for (r, &w) in coverage.row(p).iter().enumerate() {
            if w <= 0.0 {
                continue;
            }
            let weight = w / count;
            for t in 0..nt {
                let value = percent[p * nt + t];
                if value.is_finite() {
                    numerator[r][t] += weight * value;
                    denominator[r][t] += weight;
                }
            }
        }
    }
    numerator
        .into_iter()
        .zip(denominator)
        .map(|(num, den)| {
            num.into_iter()
                .zip(den)
                .map(|(n, d)| if d > 0.0 { n / d } else { f64::NAN })
                .collect()
        })
        .collect()
}

fn build_pool(threads: Option<usize>) -> Result<rayon::ThreadPool, HdxError> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = threads {
        if threads == 0 {
            return Err(HdxError::config("threads", "worker count must be positive"));
        }
        builder = builder.num_threads(threads);
    }
    builder.build().map_err(|err| {
        HdxError::Config(ErrorInfo::new("thread_pool", err.to_string()))
    })
}

/// Weighted-average initial guess with a cancellation flag.
///
/// Residues are independent; each fit draws from the substream of its
/// residue index, so parallel and sequential runs agree exactly. Once
/// `cancel` is raised no new residue is started: finished rows are kept,
/// the remaining rows hold [`PeptideFit::sentinel`] and the result is
/// flagged `cancelled`.
pub fn fit_rates_cancellable(
    measurement: &HdxMeasurement,
    config: &InitialGuessConfig,
    cancel: &AtomicBool,
) -> Result<InitialGuessResult, HdxError> {
    let estimator = config.method.estimator(config);
    fit_rates_with(measurement, estimator.as_ref(), config, cancel)
}

/// Runs `estimator` over every residue curve of `measurement`.
///
/// Worker settings come from `config`; its method is ignored.
pub fn fit_rates_with(
    measurement: &HdxMeasurement,
    estimator: &dyn RateEstimator,
    config: &InitialGuessConfig,
    cancel: &AtomicBool,
) -> Result<InitialGuessResult, HdxError> {
    let curves = residue_uptake_curves(measurement);
    let times = measurement.timepoints();
    let r_numbers = measurement.r_numbers();
    log::info!(
        "initial guess for state {} ({} residues, {:?})",
        measurement.name(),
        curves.len(),
        config.method
    );

    let fit_one = |index: usize, curve: &[f64]| -> (usize, Option<PeptideFit>) {
        if cancel.load(Ordering::Relaxed) {
            return (index, None);
        }
        (index, Some(estimator.estimate(times, curve, index as u64)))
    };

    let mut fits: Vec<(usize, Option<PeptideFit>)> = if config.parallel {
        let pool = build_pool(config.threads)?;
        pool.install(|| {
            curves
                .par_iter()
                .enumerate()
                .map(|(index, curve)| fit_one(index, curve))
                .collect()
        })
    } else {
        curves
            .iter()
            .enumerate()
            .map(|(index, curve)| fit_one(index, curve))
            .collect()
    };
    fits.sort_by_key(|(index, _)| *index);

    let skipped = fits.iter().filter(|(_, fit)| fit.is_none()).count();
    let rows: Vec<GuessRow> = fits
        .into_iter()
        .map(|(index, fit)| GuessRow {
            r_number: r_numbers[index],
            fit: fit.unwrap_or_else(PeptideFit::sentinel),
        })
        .collect();
    if skipped > 0 {
        log::warn!(
            "initial guess for state {} cancelled, {} of {} residues not fitted",
            measurement.name(),
            skipped,
            rows.len()
        );
    } else {
        let escalated = rows
            .iter()
            .filter(|row| row.fit.strategy == FitStrategy::Global)
            .count();
        log::info!(
            "initial guess for state {} finished, {} escalated",
            measurement.name(),
            escalated
        );
    }
    Ok(InitialGuessResult {
        state: measurement.name().to_string(),
        rows,
        cancelled: skipped > 0,
    })
}

/// Weighted-average initial guess of every residue of `measurement`.
pub fn fit_rates_weighted_average(
    measurement: &HdxMeasurement,
    config: &InitialGuessConfig,
) -> Result<InitialGuessResult, HdxError> {
    fit_rates_cancellable(measurement, config, &AtomicBool::new(false))
}

/// Half-time interpolation guess of every residue of `measurement`.
pub fn fit_rates_half_time_interpolate(measurement: &HdxMeasurement) -> InitialGuessResult {
    let times = measurement.timepoints();
    let rows = residue_uptake_curves(measurement)
        .iter()
        .zip(measurement.r_numbers())
        .map(|(curve, r_number)| GuessRow {
            r_number,
            fit: HalfTimeEstimator.estimate(times, curve, 0),
        })
        .collect();
    InitialGuessResult {
        state: measurement.name().to_string(),
        rows,
        cancelled: false,
    }
}
