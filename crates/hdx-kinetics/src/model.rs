use serde::{Deserialize, Serialize};

fn default_tau1_bounds() -> (f64, f64) {
    (0.0, 5.0)
}

fn default_tau2_bounds() -> (f64, f64) {
    (0.0, 100.0)
}

/// Search bounds of the two lifetimes of the bi-exponential model, in the
/// time unit of the exposure axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TauBounds {
    /// Bounds of the short lifetime.
    #[serde(default = "default_tau1_bounds")]
    pub tau1: (f64, f64),
    /// Bounds of the long lifetime.
    #[serde(default = "default_tau2_bounds")]
    pub tau2: (f64, f64),
}

impl Default for TauBounds {
    fn default() -> Self {
        Self {
            tau1: default_tau1_bounds(),
            tau2: default_tau2_bounds(),
        }
    }
}

impl TauBounds {
    /// Parameter bounds in `[r, tau1, tau2]` order.
    pub fn parameter_bounds(&self) -> [(f64, f64); 3] {
        [(0.0, 1.0), self.tau1, self.tau2]
    }
}

/// Fractional deuterium uptake (0-100 %) as a function of exposure time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum KineticModel {
    /// `U(t) = 100 (1 - exp(-k t))`.
    SingleExponential {
        /// Exchange rate `k`.
        rate: f64,
    },
    /// `U(t) = 100 (1 - (r exp(-t/tau1) + (1-r) exp(-t/tau2)))`.
    BiExponential {
        /// Amplitude fraction of the short component.
        r: f64,
        /// Short lifetime.
        tau1: f64,
        /// Long lifetime.
        tau2: f64,
    },
}

/// `exp(-t / tau)`; a non-positive lifetime means the component is fully exchanged.
fn survival(t: f64, tau: f64) -> f64 {
    if tau <= 0.0 {
        0.0
    } else {
        (-t / tau).exp()
    }
}

impl KineticModel {
    /// Predicted uptake in percent at time `t`; zero for `t <= 0`.
    pub fn uptake(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        match *self {
            KineticModel::SingleExponential { rate } => 100.0 * (1.0 - (-rate * t).exp()),
            KineticModel::BiExponential { r, tau1, tau2 } => {
                100.0 * (1.0 - (r * survival(t, tau1) + (1.0 - r) * survival(t, tau2)))
            }
        }
    }

    /// Predicted uptake at every time in `times`.
    pub fn uptake_curve(&self, times: &[f64]) -> Vec<f64> {
        times.iter().map(|&t| self.uptake(t)).collect()
    }

    /// Amplitude-weighted characteristic time `r tau1 + (1-r) tau2` (or `1/k`).
    pub fn characteristic_time(&self) -> f64 {
        match *self {
            KineticModel::SingleExponential { rate } => 1.0 / rate,
            KineticModel::BiExponential { r, tau1, tau2 } => r * tau1 + (1.0 - r) * tau2,
        }
    }

    /// Weighted exchange rate, the inverse of the characteristic time.
    pub fn weighted_rate(&self) -> f64 {
        match *self {
            KineticModel::SingleExponential { rate } => rate,
            KineticModel::BiExponential { .. } => 1.0 / self.characteristic_time(),
        }
    }

    /// Sum of squared residuals against observed uptake.
    pub fn chi_squared(&self, times: &[f64], uptake: &[f64]) -> f64 {
        times
            .iter()
            .zip(uptake)
            .map(|(&t, &y)| {
                let diff = y - self.uptake(t);
                diff * diff
            })
            .sum()
    }
}
