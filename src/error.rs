//! Error and warning values returned by the model.
//!
//! Hard failures are [`FloodRiskError`]. Numerical degeneracies that the
//! model recovers from locally are [`ModelWarning`] values carried on the
//! result they affected; nothing here is printed.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::types::{GaugeId, PropertyId};

#[derive(Debug, Error)]
pub enum FloodRiskError {
    /// A required property, gauge or flood-event field is missing or malformed.
    #[error("invalid input for {record}: field `{field}` {detail}")]
    Input {
        record: String,
        field: &'static str,
        detail: String,
    },

    /// A model parameter is outside its valid domain.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The cancel flag was raised between trial batches.
    #[error("simulation cancelled after {completed_trials} trials")]
    Cancelled { completed_trials: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document is not well-formed JSON or has the wrong overall shape.
    /// Bad values inside a record are reported as `Input`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FloodRiskError {
    pub(crate) fn input(record: impl Into<String>, field: &'static str, detail: impl Into<String>) -> Self {
        FloodRiskError::Input { record: record.into(), field, detail: detail.into() }
    }

    pub(crate) fn config(detail: impl Into<String>) -> Self {
        FloodRiskError::Configuration(detail.into())
    }
}

pub type Result<T> = std::result::Result<T, FloodRiskError>;

/// A recovered numerical degeneracy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ModelWarning {
    /// Cholesky factorisation of the correlation matrix failed; shocks were
    /// drawn independently.
    CholeskyFallback { dimension: usize },
    /// The property sits on a gauge; that gauge's reading was used verbatim.
    ExactGaugeMatch { property: PropertyId, gauge: GaugeId },
    /// No gauge lay within the search distance; radial decay was used.
    GaugeFallbackToRadial { property: PropertyId },
}

impl fmt::Display for ModelWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelWarning::CholeskyFallback { dimension } => write!(
                f,
                "correlation matrix ({dimension}x{dimension}) not positive definite; using independent shocks"
            ),
            ModelWarning::ExactGaugeMatch { property, gauge } => {
                write!(f, "property {property} coincides with gauge {gauge}; using its reading")
            }
            ModelWarning::GaugeFallbackToRadial { property } => {
                write!(f, "no gauge in range of property {property}; using radial decay")
            }
        }
    }
}
