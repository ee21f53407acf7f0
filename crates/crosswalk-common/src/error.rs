//! Error types for the crosswalk core

use thiserror::Error;

/// Crosswalk error type
///
/// Every public operation in the workspace reports failures through this
/// enum. Curation and ingestion errors are returned synchronously; internal
/// pass failures abort a finalize attempt as a whole.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrosswalkError {
    /// Malformed or unknown ids in curation or evidence input
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation not valid for the current assessment state
    #[error("state error: {0}")]
    State(String),

    /// Reference to an unknown framework, control, assessment or escalation
    #[error("not found: {0}")]
    NotFound(String),

    /// Policy thresholds violate a safety invariant
    #[error("config error: {0}")]
    Config(String),

    /// A conflict rule could not be evaluated because its data is malformed
    #[error("conflict engine error: {0}")]
    ConflictEngine(String),

    /// A finalize pass was cancelled before it completed
    #[error("finalize cancelled: {0}")]
    Cancelled(String),
}

impl CrosswalkError {
    /// Shorthand for a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Shorthand for a not-found error
    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{} {}", what, id))
    }

    /// Shorthand for a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Shorthand for a conflict engine error
    pub fn conflict_engine(msg: impl Into<String>) -> Self {
        Self::ConflictEngine(msg.into())
    }

    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::State(_) => "state",
            Self::NotFound(_) => "not_found",
            Self::Config(_) => "config",
            Self::ConflictEngine(_) => "conflict_engine",
            Self::Cancelled(_) => "cancelled",
        }
    }
}

/// Result type for the crosswalk core
pub type CrosswalkResult<T> = Result<T, CrosswalkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CrosswalkError::not_found("control", "iso27001-2022/A.5.1");
        assert_eq!(err.to_string(), "not found: control iso27001-2022/A.5.1");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_error_codes_distinct() {
        let errors = [
            CrosswalkError::validation("x"),
            CrosswalkError::state("x"),
            CrosswalkError::not_found("x", "y"),
            CrosswalkError::config("x"),
            CrosswalkError::conflict_engine("x"),
            CrosswalkError::Cancelled("x".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
