use thiserror::Error;

use crate::filter_data::FilterIdentity;

/// Failures raised by the filter protocol core.
///
/// Every variant is terminal for the operation that produced it. Decoding a
/// filter data buffer never fails and therefore has no variant here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("parameter grammar error ({reason}): {fragment}")]
    Grammar { fragment: String, reason: String },
    #[error("no catalog entry matches filter '{}' (command '{}', preview '{}')", identity.name, identity.command, identity.preview_command)]
    NotFound { identity: FilterIdentity },
    #[error("parameter values do not match the filter definition: {reason}")]
    Mismatch { reason: String },
    #[error("{field} contains an embedded NUL byte and cannot be framed")]
    EmbeddedNul { field: String },
    #[error("engine fault: {0}")]
    Engine(String),
}

impl FilterError {
    pub(crate) fn grammar(fragment: &str, reason: impl Into<String>) -> Self {
        Self::Grammar {
            fragment: fragment.trim().to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(reason: impl Into<String>) -> Self {
        Self::Mismatch {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code used in CLI error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Grammar { .. } => "GRAMMAR_ERROR",
            Self::NotFound { .. } => "FILTER_NOT_FOUND",
            Self::Mismatch { .. } => "VALUE_MISMATCH",
            Self::EmbeddedNul { .. } => "EMBEDDED_NUL",
            Self::Engine(_) => "ENGINE_FAULT",
        }
    }
}
