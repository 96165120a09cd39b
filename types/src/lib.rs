//! Core value types for Pledge.
//!
//! This crate contains the dynamic value model shared by deferred values:
//! fulfillment values, rejection reasons, duck-typed thenables and settlement
//! records. Pure domain types with no IO and no scheduling.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod error;
mod object;
mod settlement;
mod thenable;
mod value;

pub use error::{ErrorKind, ErrorValue};
pub use object::{Function, Object, Property};
pub use settlement::{Settlement, SettlementShapeError};
pub use thenable::Thenable;
pub use value::Value;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of running user code: `Ok` carries a returned value, `Err` a thrown one.
pub type Completion = Result<Value, Value>;

// ============================================================================
// Status
// ============================================================================

/// Lifecycle status of a deferred value.
///
/// Monotonic: once a value leaves `Pending` it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Fulfilled,
    Rejected,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fulfilled => "fulfilled",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
