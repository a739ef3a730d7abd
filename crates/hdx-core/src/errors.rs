//! The error type returned by every fallible operation of the workspace.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code, message and context carried by each [`HdxError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Short snake_case identifier, stable across releases.
    pub code: String,
    /// What went wrong.
    pub message: String,
    /// Offending values keyed by name, e.g. `state` or `r_number`.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// How to fix it, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Payload without context or hint.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Attaches `key=value`; a repeated key keeps the last value.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attaches a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        let mut entries = self.context.iter();
        if let Some((key, value)) = entries.next() {
            write!(f, " | context: [{key}={value}")?;
            for (key, value) in entries {
                write!(f, ", {key}={value}")?;
            }
            f.write_str("]")?;
        }
        match &self.hint {
            Some(hint) => write!(f, " | hint: {hint}"),
            None => Ok(()),
        }
    }
}

/// Failure families of the fitting workspace.
///
/// NaN uptake and failed bootstrap roots are sentinels in the fit results and
/// never become an `HdxError`; divergence is a stop reason of the global fit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum HdxError {
    /// Peptide tables and measurement construction.
    #[error("input error: {0}")]
    Input(ErrorInfo),
    /// Residue axis and coverage weights.
    #[error("coverage error: {0}")]
    Coverage(ErrorInfo),
    /// Shapes, guesses and optimizer state.
    #[error("fit error: {0}")]
    Fit(ErrorInfo),
    /// Unavailable compute device.
    #[error("device error: {0}")]
    Device(ErrorInfo),
    /// Out-of-range settings.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Import and export.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl HdxError {
    /// Payload of any family.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            HdxError::Input(info)
            | HdxError::Coverage(info)
            | HdxError::Fit(info)
            | HdxError::Device(info)
            | HdxError::Config(info)
            | HdxError::Serde(info) => info,
        }
    }

    /// [`HdxError::Input`] without context.
    pub fn input(code: &str, message: impl Into<String>) -> Self {
        HdxError::Input(ErrorInfo::new(code, message))
    }

    /// [`HdxError::Fit`] without context.
    pub fn fit(code: &str, message: impl Into<String>) -> Self {
        HdxError::Fit(ErrorInfo::new(code, message))
    }

    /// [`HdxError::Config`] without context.
    pub fn config(code: &str, message: impl Into<String>) -> Self {
        HdxError::Config(ErrorInfo::new(code, message))
    }
}
