//! # Error Types
//!
//! Domain-specific error types for pantry-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  pantry-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  pantry-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  pantry-engine errors                                                  │
//! │  └── EngineError      - What callers see (kind + message)              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → EngineError → Caller    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::ProductType;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// Every variant carries enough context to explain the rejection to the
/// person at the till: which product, what was asked for, what exists.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Product cannot be found.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Product type cannot be sold (raw `stock` ingredients).
    #[error("Product {product_id} is of type {product_type} and cannot be sold")]
    NotSellable {
        product_id: String,
        product_type: ProductType,
    },

    /// Product has no selling price, or a zero one.
    #[error("Product {product_id} has no valid selling price")]
    InvalidPrice { product_id: String },

    /// Insufficient stock to complete the operation.
    ///
    /// ## User Workflow
    /// ```text
    /// Sell 100 × Burger
    ///      │
    ///      ▼
    /// Check stock: available=25
    ///      │
    ///      ▼
    /// InsufficientStock { available: 25, requested: 100 }
    ///      │
    ///      ▼
    /// UI shows: "Only 25 left"
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Ledger arithmetic mismatch. Indicates a defect in the write path.
    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),

    /// Allocation percentages do not sum to 100.
    #[error("Cost allocation must sum to 100%, got {total}%")]
    InvalidAllocation { total: Decimal },

    /// Sale request has no lines.
    #[error("Sale must contain at least one item")]
    EmptySale,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InvariantViolation with a formatted message.
    pub fn invariant(message: impl Into<String>) -> Self {
        CoreError::InvariantViolation(message.into())
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
