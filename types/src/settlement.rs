//! Settlement records produced by `all_settled`.

use serde::Serialize;
use thiserror::Error;

use crate::{Object, Status, Value};

/// The settled outcome of one input, tagged by status.
///
/// Serializes as `{"status":"fulfilled","value":..}` or
/// `{"status":"rejected","reason":..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Settlement {
    Fulfilled { value: Value },
    Rejected { reason: Value },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementShapeError {
    #[error("settlement record must be an object (got {0})")]
    NotAnObject(&'static str),
    #[error("settlement list must be a list (got {0})")]
    NotAList(&'static str),
    #[error("settlement record has unknown status {0:?}")]
    UnknownStatus(String),
    #[error("settlement record property {0:?} could not be read")]
    Unreadable(&'static str),
}

impl Settlement {
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Fulfilled { .. } => Status::Fulfilled,
            Self::Rejected { .. } => Status::Rejected,
        }
    }

    /// The fulfillment value or rejection reason.
    #[must_use]
    pub fn payload(&self) -> &Value {
        match self {
            Self::Fulfilled { value } => value,
            Self::Rejected { reason } => reason,
        }
    }

    /// The record shape handed to user code.
    #[must_use]
    pub fn into_value(self) -> Value {
        let record = Object::new().with("status", self.status().as_str());
        match self {
            Self::Fulfilled { value } => record.set("value", value),
            Self::Rejected { reason } => record.set("reason", reason),
        }
        Value::Object(record)
    }

    pub fn from_value(value: &Value) -> Result<Self, SettlementShapeError> {
        let Value::Object(record) = value else {
            return Err(SettlementShapeError::NotAnObject(value.type_name()));
        };
        let status = record
            .get("status")
            .map_err(|_| SettlementShapeError::Unreadable("status"))?;
        match status.as_str() {
            Some("fulfilled") => Ok(Self::Fulfilled {
                value: record
                    .get("value")
                    .map_err(|_| SettlementShapeError::Unreadable("value"))?,
            }),
            Some("rejected") => Ok(Self::Rejected {
                reason: record
                    .get("reason")
                    .map_err(|_| SettlementShapeError::Unreadable("reason"))?,
            }),
            _ => Err(SettlementShapeError::UnknownStatus(status.to_string())),
        }
    }

    /// Decode the list `all_settled` fulfills with.
    pub fn list_from_value(value: &Value) -> Result<Vec<Self>, SettlementShapeError> {
        let Value::List(items) = value else {
            return Err(SettlementShapeError::NotAList(value.type_name()));
        };
        items.iter().map(Self::from_value).collect()
    }
}

impl From<Settlement> for Value {
    fn from(value: Settlement) -> Self {
        value.into_value()
    }
}

impl TryFrom<&Value> for Settlement {
    type Error = SettlementShapeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}
