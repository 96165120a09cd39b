//! Error values carried as rejection reasons.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ErrorKind {
    #[default]
    Error,
    TypeError,
    RangeError,
    AggregateError,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::TypeError => "TypeError",
            Self::RangeError => "RangeError",
            Self::AggregateError => "AggregateError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error object used as a rejection reason.
///
/// `errors` is only populated for [`ErrorKind::AggregateError`], where it holds
/// the individual rejection reasons in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorValue {
    kind: ErrorKind,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<Value>,
}

impl ErrorValue {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Error, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::TypeError, message)
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::RangeError, message)
    }

    pub fn aggregate(message: impl Into<String>, errors: Vec<Value>) -> Self {
        Self {
            kind: ErrorKind::AggregateError,
            message: message.into(),
            errors,
        }
    }

    pub fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn errors(&self) -> &[Value] {
        &self.errors
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.kind.as_str())
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}
