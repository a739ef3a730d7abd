//! Bounded derivative-free minimisation (Powell's conjugate direction method).

use serde::{Deserialize, Serialize};

const GOLDEN: f64 = 0.381_966_011_250_105_1;

fn default_xtol() -> f64 {
    1e-6
}

fn default_ftol() -> f64 {
    1e-10
}

fn default_max_iterations() -> usize {
    500
}

fn default_max_evaluations() -> usize {
    40_000
}

fn default_line_samples() -> usize {
    24
}

/// Stopping rules of [`minimize`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowellOptions {
    /// Absolute tolerance of each line search, relative to the feasible step range.
    #[serde(default = "default_xtol")]
    pub xtol: f64,
    /// Relative decrease of the objective per sweep below which the search stops.
    #[serde(default = "default_ftol")]
    pub ftol: f64,
    /// Maximum number of direction sweeps.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Maximum number of objective evaluations.
    #[serde(default = "default_max_evaluations")]
    pub max_evaluations: usize,
    /// Grid samples scanned before refining each line search.
    #[serde(default = "default_line_samples")]
    pub line_samples: usize,
}

impl Default for PowellOptions {
    fn default() -> Self {
        Self {
            xtol: default_xtol(),
            ftol: default_ftol(),
            max_iterations: default_max_iterations(),
            max_evaluations: default_max_evaluations(),
            line_samples: default_line_samples(),
        }
    }
}

/// Outcome of a local or global minimisation.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    /// Best parameters found.
    pub x: Vec<f64>,
    /// Objective at `x`.
    pub value: f64,
    /// Sweeps (Powell) or generations (differential evolution).
    pub iterations: usize,
    /// Objective evaluations spent.
    pub evaluations: usize,
}

/// Objective wrapper counting calls and mapping non-finite values to infinity.
pub(crate) struct Counted<F> {
    f: F,
    pub(crate) evaluations: usize,
}

impl<F: FnMut(&[f64]) -> f64> Counted<F> {
    pub(crate) fn new(f: F) -> Self {
        Self { f, evaluations: 0 }
    }

    pub(crate) fn call(&mut self, x: &[f64]) -> f64 {
        self.evaluations += 1;
        let value = (self.f)(x);
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    }
}

/// Minimises a scalar function on `[lo, hi]`.
///
/// The interval is scanned on a uniform grid of `samples` points and the
/// best bracket is refined by golden-section search down to `tol`. Returns
/// the best `(x, f(x))` seen.
pub fn bounded_scalar<F: FnMut(f64) -> f64>(
    mut f: F,
    lo: f64,
    hi: f64,
    samples: usize,
    tol: f64,
) -> (f64, f64) {
    let mut eval = |x: f64| {
        let value = f(x);
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    };
    if !(hi > lo) {
        return (lo, eval(lo));
    }
    let samples = samples.max(3);
    let step = (hi - lo) / (samples - 1) as f64;
    let mut best = (lo, eval(lo));
    let mut best_index = 0;
    for i in 1..samples {
        let x = if i == samples - 1 { hi } else { lo + step * i as f64 };
        let fx = eval(x);
        if fx < best.1 {
            best = (x, fx);
            best_index = i;
        }
    }

    let mut a = if best_index == 0 { lo } else { lo + step * (best_index - 1) as f64 };
    let mut b = (lo + step * (best_index + 1) as f64).min(hi);
    let mut x1 = a + GOLDEN * (b - a);
    let mut x2 = b - GOLDEN * (b - a);
    let mut f1 = eval(x1);
    let mut f2 = eval(x2);
    let mut refinements = 0;
    while (b - a) > tol.max(f64::EPSILON * best.0.abs()) && refinements < 200 {
        refinements += 1;
        if f1 <= f2 {
            b = x2;
            x2 = x1;
            f2 = f1;
            x1 = a + GOLDEN * (b - a);
            f1 = eval(x1);
        } else {
            a = x1;
            x1 = x2;
            f1 = f2;
            x2 = b - GOLDEN * (b - a);
            f2 = eval(x2);
        }
    }
    for (x, fx) in [(x1, f1), (x2, f2)] {
        if fx < best.1 {
            best = (x, fx);
        }
    }
    best
}

fn clamp_into(x: &mut [f64], bounds: &[(f64, f64)]) {
    for (value, &(lo, hi)) in x.iter_mut().zip(bounds) {
        *value = value.clamp(lo, hi);
    }
}

/// Step range `[a_lo, a_hi]` keeping `x + a d` inside the box.
fn feasible_steps(x: &[f64], direction: &[f64], bounds: &[(f64, f64)]) -> (f64, f64) {
    let mut a_lo = f64::NEG_INFINITY;
    let mut a_hi = f64::INFINITY;
    for ((&xi, &di), &(lo, hi)) in x.iter().zip(direction).zip(bounds) {
        if di.abs() <= f64::EPSILON {
            continue;
        }
        let (s1, s2) = ((lo - xi) / di, (hi - xi) / di);
        a_lo = a_lo.max(s1.min(s2));
        a_hi = a_hi.min(s1.max(s2));
    }
    (a_lo.max(-1e6), a_hi.min(1e6))
}

fn line_minimize<F: FnMut(&[f64]) -> f64>(
    objective: &mut Counted<F>,
    x: &mut Vec<f64>,
    fx: &mut f64,
    direction: &[f64],
    bounds: &[(f64, f64)],
    options: &PowellOptions,
) {
    let (a_lo, a_hi) = feasible_steps(x, direction, bounds);
    if !(a_hi > a_lo) {
        return;
    }
    let origin = x.clone();
    let mut trial = origin.clone();
    let tol = options.xtol * (a_hi - a_lo).max(1.0);
    let (alpha, value) = bounded_scalar(
        |a| {
            for ((t, &o), &d) in trial.iter_mut().zip(&origin).zip(direction) {
                *t = o + a * d;
            }
            clamp_into(&mut trial, bounds);
            objective.call(&trial)
        },
        a_lo,
        a_hi,
        options.line_samples,
        tol,
    );
    if value < *fx {
        for ((xi, &o), &d) in x.iter_mut().zip(&origin).zip(direction) {
            *xi = o + alpha * d;
        }
        clamp_into(x, bounds);
        *fx = value;
    }
}

/// Minimises `f` inside the box `bounds` starting from `x0`.
///
/// Uses unit starting directions, bounded line searches and the classic
/// Powell rule for replacing the direction of largest decrease.
pub fn minimize<F: FnMut(&[f64]) -> f64>(
    f: F,
    x0: &[f64],
    bounds: &[(f64, f64)],
    options: &PowellOptions,
) -> Minimum {
    let n = x0.len();
    let mut objective = Counted::new(f);
    let mut x = x0.to_vec();
    clamp_into(&mut x, bounds);
    let mut fx = objective.call(&x);
    if n == 0 {
        return Minimum {
            x,
            value: fx,
            iterations: 0,
            evaluations: objective.evaluations,
        };
    }
    let mut directions: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let mut d = vec![0.0; n];
            d[i] = 1.0;
            d
        })
        .collect();

    let mut iterations = 0;
    while iterations < options.max_iterations && objective.evaluations < options.max_evaluations {
        iterations += 1;
        let start = x.clone();
        let f_start = fx;
        let mut largest_drop = 0.0;
        let mut largest_index = 0;
        for (i, direction) in directions.iter().enumerate() {
            let before = fx;
            line_minimize(&mut objective, &mut x, &mut fx, direction, bounds, options);
            if before - fx > largest_drop {
                largest_drop = before - fx;
                largest_index = i;
            }
        }

        if 2.0 * (f_start - fx) <= options.ftol * (f_start.abs() + fx.abs()) + 1e-30 {
            break;
        }

        let new_direction: Vec<f64> = x.iter().zip(&start).map(|(a, b)| a - b).collect();
        if new_direction.iter().all(|d| d.abs() <= f64::EPSILON) {
            continue;
        }
        let mut extrapolated: Vec<f64> = x.iter().zip(&start).map(|(a, b)| 2.0 * a - b).collect();
        clamp_into(&mut extrapolated, bounds);
        let f_extrapolated = objective.call(&extrapolated);
        if f_extrapolated < f_start {
            let t = 2.0 * (f_start - 2.0 * fx + f_extrapolated)
                * (f_start - fx - largest_drop).powi(2)
                - largest_drop * (f_start - f_extrapolated).powi(2);
            if t < 0.0 {
                line_minimize(&mut objective, &mut x, &mut fx, &new_direction, bounds, options);
                directions[largest_index] = directions[n - 1].clone();
                directions[n - 1] = new_direction;
            }
        }
    }

    Minimum {
        x,
        value: fx,
        iterations,
        evaluations: objective.evaluations,
    }
}
