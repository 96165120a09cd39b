use thiserror::Error;

/// Failures raised synchronously to the caller instead of becoming a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PledgeError {
    #[error("executor must be a function (got {found})")]
    ExecutorNotCallable { found: &'static str },
}
