//! Error taxonomy for the reconciliation core.
//!
//! Every rejection the core can produce maps to one variant so callers can
//! tell bad input from a scope violation from an illegal state change
//! without parsing message text. Display strings describe the violated rule
//! in plain terms; authorization failures never reveal whether the target
//! record exists.

use thiserror::Error;

/// Core error type. Validation and transition checks run before any write,
/// so every variant except [`InconsistentWrite`] leaves the store untouched.
///
/// [`InconsistentWrite`]: PosError::InconsistentWrite
#[derive(Error, Debug)]
pub enum PosError {
    /// Bad input shape or range (closing < opening, amount <= 0, ...).
    #[error("{0}")]
    Validation(String),

    /// The caller's scope does not cover the requested records.
    #[error("Not authorized for the requested scope")]
    Forbidden,

    /// Illegal deposit state change. Status is left untouched.
    #[error("Cannot move deposit from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    /// Referenced pump/product/station/record absent within the caller's scope.
    #[error("{0}")]
    NotFound(String),

    /// A partial failure across two dependent writes (sale recorded but pump
    /// meter not advanced, or vice versa). Must be surfaced to the caller for
    /// manual reconciliation, never retried as if it were a clean failure.
    #[error("Inconsistent write, manual reconciliation required: {0}")]
    InconsistentWrite(String),

    /// Document fingerprint mismatch on verification.
    #[error("Document hash mismatch - the report does not match its fingerprint")]
    Tampered,

    #[error("database: {0}")]
    Database(#[from] rusqlite::Error),
}

/// A poisoned connection lock means a writer panicked mid-operation; the
/// store may hold a partial write, which is exactly what
/// [`PosError::InconsistentWrite`] signals.
impl<T> From<std::sync::PoisonError<T>> for PosError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        PosError::InconsistentWrite(format!("connection lock poisoned: {e}"))
    }
}

impl PosError {
    /// Stable machine-readable kind for JSON envelopes and tests.
    pub fn kind(&self) -> &'static str {
        match self {
            PosError::Validation(_) => "validation",
            PosError::Forbidden => "forbidden",
            PosError::InvalidTransition { .. } => "invalid_transition",
            PosError::NotFound(_) => "not_found",
            PosError::InconsistentWrite(_) => "inconsistent_write",
            PosError::Tampered => "tampered",
            PosError::Database(_) => "database",
        }
    }

    /// Shorthand for a validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        PosError::Validation(msg.into())
    }

    /// Shorthand for a missing-record failure.
    pub fn not_found(msg: impl Into<String>) -> Self {
        PosError::NotFound(msg.into())
    }
}
