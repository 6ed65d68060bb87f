use crate::model::ParseEnumError;
use crate::model::defect::InvalidTransition;
use std::fmt;

/// Machine-readable error codes surfaced by the core and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    MissingActor,
    InvalidInput,
    AlreadyInitialized,
    NotFound,
    InvalidTransition,
    PermissionDenied,
    InvariantViolation,
    InvalidEnumValue,
    StorageFailure,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::MissingActor => "E1003",
            Self::InvalidInput => "E1004",
            Self::AlreadyInitialized => "E1005",
            Self::NotFound => "E2001",
            Self::InvalidTransition => "E2002",
            Self::PermissionDenied => "E2003",
            Self::InvariantViolation => "E2004",
            Self::InvalidEnumValue => "E2005",
            Self::StorageFailure => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Tracker not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::MissingActor => "Acting user required",
            Self::InvalidInput => "Invalid command input",
            Self::AlreadyInitialized => "Tracker already initialized",
            Self::NotFound => "Record not found",
            Self::InvalidTransition => "Invalid status transition",
            Self::PermissionDenied => "Permission denied",
            Self::InvariantViolation => "Defect invariant violated",
            Self::InvalidEnumValue => "Invalid role/status/priority value",
            Self::StorageFailure => "Database operation failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `snag init --admin <name>` in this directory."),
            Self::ConfigParseError => Some("Fix syntax in .snag/config.toml and retry."),
            Self::MissingActor => Some("Pass --as <username> or set SNAG_USER."),
            Self::InvalidInput => None,
            Self::AlreadyInitialized => Some("Use `snag init --force` to start over."),
            Self::NotFound => None,
            Self::InvalidTransition => Some(
                "Follow valid transitions: new -> in_progress -> review -> closed; \
                 new or in_progress -> cancelled.",
            ),
            Self::PermissionDenied => {
                Some("Ask a manager, or the defect's performer, to make this change.")
            }
            Self::InvariantViolation => Some(
                "Observers cannot perform defects and stages must belong to the defect's project.",
            ),
            Self::InvalidEnumValue => {
                Some("Use one of the documented role/status/priority values.")
            }
            Self::StorageFailure => Some("Retry once; check that .snag/snag.db is writable."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Kinds of record that a lookup can miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Project,
    Stage,
    Defect,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Project => "project",
            Self::Stage => "stage",
            Self::Defect => "defect",
        })
    }
}

/// Errors returned by every core operation. None are retried internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },

    /// A lookup by a non-numeric key (for example a username) missed.
    #[error("{entity} '{key}' not found")]
    NotFoundByKey { entity: Entity, key: String },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    InvalidEnumValue(#[from] ParseEnumError),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl Error {
    pub(crate) fn denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    pub(crate) const fn not_found(entity: Entity, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidTransition(_) => ErrorCode::InvalidTransition,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::NotFound { .. } | Self::NotFoundByKey { .. } => ErrorCode::NotFound,
            Self::InvariantViolation(_) => ErrorCode::InvariantViolation,
            Self::InvalidEnumValue(_) => ErrorCode::InvalidEnumValue,
            Self::Storage(_) => ErrorCode::StorageFailure,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
