use std::fmt;

use thiserror::Error;

/// Convenient result alias for the dispatch library.
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of entity referenced by a [`Error::NotFound`] error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Vehicle,
    Incident,
    PointOfInterest,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            EntityKind::Vehicle => "vehicle",
            EntityKind::Incident => "incident",
            EntityKind::PointOfInterest => "point of interest",
        };
        f.write_str(value)
    }
}

/// Coarse classification of [`Error`] values.
///
/// Callers (an HTTP layer, the CLI) map these onto their own status codes
/// without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InvalidState,
    NoCapacity,
    DependencyUnavailable,
    Internal,
}

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input such as out-of-range coordinates or an unknown enum value.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Raised when an identifier does not resolve to a known entity.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Raised when registering an identifier that is already taken.
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: EntityKind, id: String },

    /// Raised for an illegal status transition.
    #[error("{kind} {id} cannot move from {from} to {to}")]
    InvalidState {
        kind: EntityKind,
        id: String,
        from: String,
        to: String,
    },

    /// No vehicle satisfying the request could be claimed.
    #[error("no available vehicle for incident {incident_id}")]
    NoCapacity { incident_id: String },

    /// An external collaborator could not be reached.
    #[error("{dependency} unavailable: {message}")]
    DependencyUnavailable {
        dependency: &'static str,
        message: String,
    },

    /// A persisted row could not be decoded.
    #[error("corrupt {table} record {id}: {message}")]
    CorruptRecord {
        table: &'static str,
        id: String,
        message: String,
    },

    /// Wrapper for SQLite errors.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Wrapper for IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wrapper for HTTP client errors.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Wrapper for JSON encoding errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn already_exists(kind: EntityKind, id: impl Into<String>) -> Self {
        Error::AlreadyExists {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn invalid_state(
        kind: EntityKind,
        id: impl Into<String>,
        from: impl fmt::Display,
        to: impl fmt::Display,
    ) -> Self {
        Error::InvalidState {
            kind,
            id: id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::InvalidState { .. } | Error::AlreadyExists { .. } => ErrorKind::InvalidState,
            Error::NoCapacity { .. } => ErrorKind::NoCapacity,
            Error::DependencyUnavailable { .. } | Error::Http(_) => {
                ErrorKind::DependencyUnavailable
            }
            Error::CorruptRecord { .. } | Error::Sqlite(_) | Error::Io(_) | Error::Json(_) => {
                ErrorKind::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_message_names_both_states() {
        let err = Error::invalid_state(EntityKind::Incident, "i-1", "resolved", "in_progress");
        assert_eq!(
            err.to_string(),
            "incident i-1 cannot move from resolved to in_progress"
        );
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn not_found_message() {
        let err = Error::not_found(EntityKind::PointOfInterest, "h-9");
        assert_eq!(err.to_string(), "point of interest not found: h-9");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn dependency_errors_classify_together() {
        let err = Error::DependencyUnavailable {
            dependency: "routing provider",
            message: "timed out".into(),
        };
        assert_eq!(err.kind(), ErrorKind::DependencyUnavailable);
        assert_eq!(err.to_string(), "routing provider unavailable: timed out");
    }
}
