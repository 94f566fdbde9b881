//! # Engine Error Type
//!
//! Unified error type for engine operations.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Pantry                                 │
//! │                                                                         │
//! │  Caller (request handler)                                              │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Engine operation: Result<T, EngineError>                        │  │
//! │  │         │                                                        │  │
//! │  │  Rule broken? ─── CoreError::InsufficientStock ─┐                │  │
//! │  │         │                                       │                │  │
//! │  │  Store failed? ── DbError::Busy ────────────────┼─► EngineError  │  │
//! │  │         │                                       │                │  │
//! │  │  Bad config? ──── ConfigError ──────────────────┘                │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  error.report() → { "code": "INSUFFICIENT_STOCK", "message": "…" }     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `DbError::Domain` raised inside a unit of work is unwrapped back into
//! `EngineError::Core`, so callers see one code per business rule no matter
//! which layer caught it.

use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::config::ConfigError;
use pantry_core::{CoreError, ValidationError};
use pantry_db::DbError;

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A business rule rejected the request.
    #[error(transparent)]
    Core(CoreError),

    /// The store failed.
    #[error(transparent)]
    Db(DbError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An event payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Checks if retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Db(db) if db.is_busy())
    }

    /// Machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Core(core) => match core {
                CoreError::ProductNotFound(_) => ErrorCode::ProductNotFound,
                CoreError::NotSellable { .. } => ErrorCode::NotSellable,
                CoreError::InvalidPrice { .. } => ErrorCode::InvalidPrice,
                CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
                CoreError::InvariantViolation(_) => ErrorCode::InvariantViolation,
                CoreError::InvalidAllocation { .. } => ErrorCode::InvalidAllocation,
                CoreError::EmptySale | CoreError::Validation(_) => ErrorCode::ValidationError,
            },
            EngineError::Db(db) => match db {
                DbError::Busy(_) => ErrorCode::StoreBusy,
                DbError::UniqueViolation { .. } => ErrorCode::ValidationError,
                _ => ErrorCode::DatabaseError,
            },
            EngineError::Config(_) => ErrorCode::ConfigError,
            EngineError::Serialization(_) => ErrorCode::Internal,
        }
    }

    /// What a caller shows or returns: code plus message.
    ///
    /// Store internals are not leaked; their detail stays in the logs.
    pub fn report(&self) -> ErrorReport {
        let message = match self {
            EngineError::Db(DbError::UniqueViolation { field, .. }) => {
                format!("{} already exists", field)
            }
            EngineError::Db(DbError::Busy(_)) => {
                "The store is busy, please retry".to_string()
            }
            EngineError::Db(other) => {
                error!(error = %other, "Database operation failed");
                "Database operation failed".to_string()
            }
            other => other.to_string(),
        };

        ErrorReport {
            code: self.code(),
            message,
        }
    }
}

/// Converts core errors, logging broken invariants.
impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        if let CoreError::InvariantViolation(detail) = &err {
            error!(detail = %detail, "Invariant violation, operation aborted");
        }
        EngineError::Core(err)
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

/// Converts database errors. Business rejections raised inside a unit of
/// work surface as `Core`.
impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Domain(core) => EngineError::from(core),
            other => EngineError::Db(other),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

// =============================================================================
// Error Report
// =============================================================================

/// Error codes handed to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ProductNotFound,
    NotSellable,
    InvalidPrice,
    InsufficientStock,
    InvariantViolation,
    InvalidAllocation,
    ValidationError,
    StoreBusy,
    DatabaseError,
    ConfigError,
    Internal,
}

/// Serialized failure.
///
/// ```json
/// {
///   "code": "INSUFFICIENT_STOCK",
///   "message": "Insufficient stock for burger: 25 available, 100 requested"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}
