use std::fmt;

use anyhow::Error;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::FilterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedErrorKind {
    Usage,
    Filter,
    Internal,
}

#[derive(Debug, Clone)]
pub struct CodedError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
    pub kind: CodedErrorKind,
}

impl CodedError {
    pub fn usage(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            kind: CodedErrorKind::Usage,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: "INTERNAL_ERROR",
            message: message.into(),
            details: None,
            kind: CodedErrorKind::Internal,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self.kind {
            CodedErrorKind::Usage => 2,
            CodedErrorKind::Filter => 3,
            CodedErrorKind::Internal => 1,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: self.code.to_owned(),
                message: self.message.clone(),
                details: self.details.clone(),
            },
        }
    }
}

impl From<&FilterError> for CodedError {
    fn from(error: &FilterError) -> Self {
        let details = match error {
            FilterError::Grammar { fragment, reason } => {
                json!({ "fragment": fragment, "reason": reason })
            }
            FilterError::NotFound { identity } => json!({
                "name": identity.name,
                "command": identity.command,
                "preview_command": identity.preview_command,
            }),
            FilterError::Mismatch { reason } => json!({ "reason": reason }),
            FilterError::EmbeddedNul { field } => json!({ "field": field }),
            FilterError::Engine(message) => json!({ "engine_message": message }),
        };
        Self {
            code: error.code(),
            message: error.to_string(),
            details: Some(details),
            kind: CodedErrorKind::Filter,
        }
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CodedError {}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn find_coded_error(error: &Error) -> Option<&CodedError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CodedError>())
}

/// Coded form of any CLI failure: an explicit [`CodedError`] first, then a
/// [`FilterError`] anywhere in the chain, otherwise `INTERNAL_ERROR`.
pub fn coded_error_for(error: &Error) -> CodedError {
    if let Some(coded) = find_coded_error(error) {
        return coded.clone();
    }
    if let Some(filter) = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<FilterError>())
    {
        return CodedError::from(filter);
    }
    CodedError::internal(format!("{error:#}"))
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Context};

    use super::*;
    use crate::filter_data::FilterIdentity;

    #[test]
    fn filter_errors_keep_their_code_through_context() {
        let error = Err::<(), _>(FilterError::NotFound {
            identity: FilterIdentity::new("Blur", "fx_blur", "fx_blur"),
        })
        .context("lookup failed")
        .expect_err("error should propagate");
        let coded = coded_error_for(&error);
        assert_eq!(coded.code, "FILTER_NOT_FOUND");
        assert_eq!(coded.kind, CodedErrorKind::Filter);
        assert_eq!(coded.exit_code(), 3);
        let envelope = serde_json::to_value(coded.envelope()).expect("envelope should serialize");
        assert_eq!(envelope["ok"], false);
        assert_eq!(envelope["error"]["details"]["name"], "Blur");
    }

    #[test]
    fn explicit_coded_error_wins() {
        let error = anyhow!(CodedError::usage("INVALID_ARGUMENT", "bad length"));
        let coded = coded_error_for(&error);
        assert_eq!(coded.code, "INVALID_ARGUMENT");
        assert_eq!(coded.exit_code(), 2);
    }

    #[test]
    fn unknown_errors_are_internal_without_details() {
        let coded = coded_error_for(&anyhow!("disk on fire"));
        assert_eq!(coded.code, "INTERNAL_ERROR");
        assert_eq!(coded.exit_code(), 1);
        let envelope = serde_json::to_value(coded.envelope()).expect("envelope should serialize");
        assert!(envelope["error"].get("details").is_none());
    }
}
