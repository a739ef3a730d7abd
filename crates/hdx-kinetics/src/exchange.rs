//! Linderstrøm-Lang exchange relation between deltaG and observed rates.
//!
//! `k_obs = k_int / (1 + exp(dG / RT))` with dG in J/mol and temperature in
//! Kelvin. The intrinsic rate `k_int` comes from an external table.

use hdx_core::GAS_CONSTANT;

/// Logistic function evaluated without overflow for large `|x|`.
pub fn stable_sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Observed exchange rate of a residue with free energy `deltag` (J/mol).
pub fn k_obs(deltag: f64, k_int: f64, temperature: f64) -> f64 {
    k_int * stable_sigmoid(-deltag / (GAS_CONSTANT * temperature))
}

/// Derivative of [`k_obs`] with respect to deltaG (per J/mol).
pub fn k_obs_derivative(deltag: f64, k_int: f64, temperature: f64) -> f64 {
    let rt = GAS_CONSTANT * temperature;
    let x = deltag / rt;
    -k_int * stable_sigmoid(-x) * stable_sigmoid(x) / rt
}

/// Inverse relation `dG = RT ln(k_int / k_obs - 1)`.
///
/// NaN when the rate is not strictly between zero and `k_int`.
pub fn deltag_from_rate(rate: f64, k_int: f64, temperature: f64) -> f64 {
    if !(rate.is_finite() && k_int.is_finite() && temperature > 0.0) {
        return f64::NAN;
    }
    if rate <= 0.0 || rate >= k_int {
        return f64::NAN;
    }
    GAS_CONSTANT * temperature * (k_int / rate - 1.0).ln()
}

/// Converts per-residue rates into deltaG guesses, NaN where undefined.
pub fn deltag_guess(rates: &[f64], k_int: &[f64], temperature: f64) -> Vec<f64> {
    rates
        .iter()
        .zip(k_int)
        .map(|(&rate, &k)| deltag_from_rate(rate, k, temperature))
        .collect()
}

/// Replaces NaN entries by linear interpolation between finite neighbours.
///
/// Leading and trailing gaps take the nearest finite value. An all-NaN input
/// is returned unchanged.
pub fn fill_missing(values: &[f64]) -> Vec<f64> {
    let known: Vec<usize> = (0..values.len())
        .filter(|&i| values[i].is_finite())
        .collect();
    let (Some(&first), Some(&last)) = (known.first(), known.last()) else {
        return values.to_vec();
    };
    let mut out = values.to_vec();
    for slot in out.iter_mut().take(first) {
        *slot = values[first];
    }
    for slot in out.iter_mut().skip(last + 1) {
        *slot = values[last];
    }
    for pair in known.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let span = (b - a) as f64;
        for (i, slot) in out.iter_mut().enumerate().take(b).skip(a + 1) {
            let frac = (i - a) as f64 / span;
            *slot = values[a] + frac * (values[b] - values[a]);
        }
    }
    out
}
