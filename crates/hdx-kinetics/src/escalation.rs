//! Decides when a local bi-exponential fit is re-run globally.

use serde::{Deserialize, Serialize};

use crate::peptide_fit::PeptideFit;

fn default_chi_squared_threshold() -> f64 {
    20.0
}

/// Whether the amplitude fraction may sit exactly on 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AmplitudeBound {
    /// `0 <= r <= 1` is accepted.
    #[default]
    Inclusive,
    /// Only `0 < r < 1` is accepted.
    Exclusive,
}

impl AmplitudeBound {
    /// Whether `r` is an acceptable amplitude fraction.
    pub fn accepts(self, r: f64) -> bool {
        match self {
            AmplitudeBound::Inclusive => (0.0..=1.0).contains(&r),
            AmplitudeBound::Exclusive => r > 0.0 && r < 1.0,
        }
    }
}

/// Why a local fit was escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// The amplitude fraction left its accepted range.
    AmplitudeOutOfBounds,
    /// The characteristic time is not a finite positive number.
    NonFiniteTime,
    /// The residual sum of squares exceeds the threshold.
    ChiSquaredAboveThreshold,
}

/// Acceptance rules for local fits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Largest accepted chi-squared of a local fit.
    #[serde(default = "default_chi_squared_threshold")]
    pub chi_squared_threshold: f64,
    /// Amplitude acceptance mode.
    #[serde(default)]
    pub amplitude_bound: AmplitudeBound,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            chi_squared_threshold: default_chi_squared_threshold(),
            amplitude_bound: AmplitudeBound::default(),
        }
    }
}

impl EscalationPolicy {
    /// Policy with the given threshold and the default amplitude bound.
    pub fn with_threshold(chi_squared_threshold: f64) -> Self {
        Self {
            chi_squared_threshold,
            ..Self::default()
        }
    }

    /// Returns the first failed acceptance rule of `fit`, if any.
    ///
    /// A non-finite chi-squared counts as above the threshold.
    pub fn should_escalate(&self, fit: &PeptideFit) -> Option<EscalationReason> {
        if !self.amplitude_bound.accepts(fit.r) {
            return Some(EscalationReason::AmplitudeOutOfBounds);
        }
        let tau = fit.r * fit.tau1 + (1.0 - fit.r) * fit.tau2;
        if !(tau.is_finite() && tau > 0.0) {
            return Some(EscalationReason::NonFiniteTime);
        }
        if !(fit.chi_squared <= self.chi_squared_threshold) {
            return Some(EscalationReason::ChiSquaredAboveThreshold);
        }
        None
    }
}
