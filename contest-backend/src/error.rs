//! Error types shared by the contest engine and its adapters

use thiserror::Error;

/// Failure taxonomy for the engine.
///
/// Only `InvariantViolation` is meant to reach an operator as a hard error;
/// everything else is contained to the item or module it happened in.
#[derive(Debug, Error)]
pub enum ContestError {
    /// A store or remote call failed; skip the affected unit of work
    #[error("collaborator call failed: {0}")]
    Transient(String),

    /// The referenced item, channel or group is gone
    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid schedule '{expression}' ({timezone}): {reason}")]
    InvalidSchedule {
        expression: String,
        timezone: String,
        reason: String,
    },

    /// A record that must exist is missing
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl ContestError {
    pub fn transient(e: impl std::fmt::Display) -> Self {
        ContestError::Transient(e.to_string())
    }

    /// Whether retrying the unit of work later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ContestError::Transient(_) | ContestError::Database(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ContestError::InvariantViolation(_))
    }
}

pub type ContestResult<T> = Result<T, ContestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ContestError::transient("timeout").is_transient());
        assert!(ContestError::Database(rusqlite::Error::InvalidQuery).is_transient());
        assert!(!ContestError::NotFound("item 1".to_string()).is_transient());
        assert!(ContestError::InvariantViolation("missing".to_string()).is_fatal());
        assert!(!ContestError::Configuration("bad".to_string()).is_fatal());
    }

    #[test]
    fn test_schedule_error_message() {
        let err = ContestError::InvalidSchedule {
            expression: "0 0 31 2 *".to_string(),
            timezone: "UTC".to_string(),
            reason: "fewer than two future occurrences".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid schedule '0 0 31 2 *' (UTC): fewer than two future occurrences"
        );
    }
}
