//! Error taxonomy for path and course operations.
//!
//! Every kind is surfaced to the immediate caller. Nothing here retries, and a
//! failed mutation leaves the document it was applied to unchanged.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
  /// Malformed input to a mutation.
  #[error("validation failed: {0}")]
  Validation(String),

  /// The operation would break a structural invariant.
  #[error("invariant violated: {0}")]
  InvariantViolation(String),

  #[error("{what} not found: {id}")]
  NotFound { what: &'static str, id: String },

  /// Storage collaborator failure, propagated unchanged.
  #[error("storage error: {0}")]
  Storage(String),
}

impl CoreError {
  pub fn validation(msg: impl Into<String>) -> Self {
    CoreError::Validation(msg.into())
  }

  pub fn path_not_found(id: &str) -> Self {
    CoreError::NotFound { what: "path", id: id.to_string() }
  }

  pub fn node_not_found(id: &str) -> Self {
    CoreError::NotFound { what: "node", id: id.to_string() }
  }

  pub fn course_not_found(id: &str) -> Self {
    CoreError::NotFound { what: "course", id: id.to_string() }
  }

  /// Short machine-readable kind, used in wire error bodies.
  pub fn kind(&self) -> &'static str {
    match self {
      CoreError::Validation(_) => "validation_error",
      CoreError::InvariantViolation(_) => "invariant_violation",
      CoreError::NotFound { .. } => "not_found",
      CoreError::Storage(_) => "storage_error",
    }
  }
}

pub type CoreResult<T> = Result<T, CoreError>;
