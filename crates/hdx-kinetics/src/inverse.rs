//! Deterministic bootstrap of bi-exponential lifetimes from two anchor points.

const TARGET_EPS: f64 = 1e-6;
const LOG_SPAN: f64 = 20.0;
const ROOT_TOL: f64 = 1e-12;
const ROOT_MAX_ITER: usize = 200;

/// Brent-Dekker root finding on `[a, b]`.
///
/// Returns `None` when the endpoints do not bracket a root or the function
/// becomes non-finite.
pub fn brent_root<F: Fn(f64) -> f64>(
    f: F,
    mut a: f64,
    mut b: f64,
    tol: f64,
    max_iter: usize,
) -> Option<f64> {
    let mut fa = f(a);
    let mut fb = f(b);
    if !(fa.is_finite() && fb.is_finite()) || fa * fb > 0.0 {
        return None;
    }
    if fa == 0.0 {
        return Some(a);
    }
    if fb == 0.0 {
        return Some(b);
    }
    let mut c = b;
    let mut fc = fb;
    let mut d = b - a;
    let mut e = d;
    for _ in 0..max_iter {
        if (fb > 0.0 && fc > 0.0) || (fb < 0.0 && fc < 0.0) {
            c = a;
            fc = fa;
            d = b - a;
            e = d;
        }
        if fc.abs() < fb.abs() {
            a = b;
            b = c;
            c = a;
            fa = fb;
            fb = fc;
            fc = fa;
        }
        let tol1 = 2.0 * f64::EPSILON * b.abs() + 0.5 * tol;
        let xm = 0.5 * (c - b);
        if xm.abs() <= tol1 || fb == 0.0 {
            return Some(b);
        }
        if e.abs() >= tol1 && fa.abs() > fb.abs() {
            let s = fb / fa;
            let (mut p, mut q) = if a == c {
                (2.0 * xm * s, 1.0 - s)
            } else {
                let qa = fa / fc;
                let r = fb / fc;
                (
                    s * (2.0 * xm * qa * (qa - r) - (b - a) * (r - 1.0)),
                    (qa - 1.0) * (r - 1.0) * (s - 1.0),
                )
            };
            if p > 0.0 {
                q = -q;
            }
            p = p.abs();
            let min1 = 3.0 * xm * q - (tol1 * q).abs();
            let min2 = (e * q).abs();
            if 2.0 * p < min1.min(min2) {
                e = d;
                d = p / q;
            } else {
                d = xm;
                e = d;
            }
        } else {
            d = xm;
            e = d;
        }
        a = b;
        fa = fb;
        if d.abs() > tol1 {
            b += d;
        } else {
            b += tol1.copysign(xm);
        }
        fb = f(b);
        if !fb.is_finite() {
            return None;
        }
    }
    Some(b)
}

/// Solves `f(tau) = 0` for a residual decreasing in tau, searching
/// `log(tau)` within `LOG_SPAN` of `log(anchor)`.
///
/// When the bracket holds no sign change the nearer end is returned, so the
/// bootstrap always lands on a finite lifetime.
fn solve_lifetime<F: Fn(f64) -> f64>(residual: F, anchor: f64) -> f64 {
    let centre = anchor.ln();
    let (lo, hi) = (centre - LOG_SPAN, centre + LOG_SPAN);
    let in_log = |u: f64| residual(u.exp());
    match brent_root(in_log, lo, hi, ROOT_TOL, ROOT_MAX_ITER) {
        Some(u) => u.exp(),
        None => {
            let (f_lo, f_hi) = (residual(lo.exp()), residual(hi.exp()));
            if !(f_lo.is_finite() && f_hi.is_finite()) {
                f64::NAN
            } else if f_lo <= 0.0 {
                lo.exp()
            } else {
                hi.exp()
            }
        }
    }
}

fn clamp_target(value: f64) -> f64 {
    value.clamp(TARGET_EPS, 100.0 - TARGET_EPS)
}

/// Starting lifetimes `(tau1, tau2)` for the bi-exponential fit.
///
/// tau1 matches a single exponential through the third sample; tau2 then
/// matches an equal-amplitude two-component curve through the second-to-last
/// sample. Returns `(NaN, NaN)` for curves with NaN, fewer than three points
/// or a non-positive anchor time.
pub fn initial_guess(times: &[f64], uptake: &[f64]) -> (f64, f64) {
    let n = times.len().min(uptake.len());
    if n < 3
        || times.iter().any(|t| !t.is_finite())
        || uptake.iter().any(|d| d.is_nan())
    {
        return (f64::NAN, f64::NAN);
    }
    let (t_short, a_short) = (times[2], clamp_target(uptake[2]));
    let (t_long, a_long) = (times[n - 2], clamp_target(uptake[n - 2]));
    if t_short <= 0.0 || t_long <= 0.0 {
        return (f64::NAN, f64::NAN);
    }

    let tau1 = solve_lifetime(
        |tau| 100.0 * (1.0 - (-t_short / tau).exp()) - a_short,
        t_short,
    );
    if !tau1.is_finite() {
        return (f64::NAN, f64::NAN);
    }
    let short_survival = (-t_long / tau1).exp();
    let tau2 = solve_lifetime(
        |tau| 100.0 * (1.0 - (0.5 * short_survival + 0.5 * (-t_long / tau).exp())) - a_long,
        t_long,
    );
    (tau1, tau2)
}
