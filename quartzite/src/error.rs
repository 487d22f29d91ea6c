use thiserror::Error;

pub type OptResult<T> = anyhow::Result<T>;

/// Fatal optimization failures.
///
/// A rule whose preconditions do not hold is not an error, it just reports no change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptError {
    /// An operator invariant is violated, e.g. a hash group-by key is not a variable reference.
    #[error("malformed plan at {operator}: {reason}")]
    MalformedPlan { operator: String, reason: String },
    /// A shape that a rule or property does not handle yet.
    #[error("unsupported construct at {operator}: {reason}")]
    Unsupported { operator: String, reason: String },
    #[error("internal optimizer error: {0}")]
    Internal(String),
}

impl OptError {
    pub fn malformed<O: Into<String>, R: Into<String>>(operator: O, reason: R) -> Self {
        Self::MalformedPlan {
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported<O: Into<String>, R: Into<String>>(operator: O, reason: R) -> Self {
        Self::Unsupported {
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    pub fn internal<R: Into<String>>(reason: R) -> Self {
        Self::Internal(reason.into())
    }
}
