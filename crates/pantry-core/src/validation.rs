//! # Validation Module
//!
//! Input validation utilities for Pantry.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request handler (out of scope)                               │
//! │  └── Deserialization, auth, permissions                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── Business rule validation, before any write                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (current_quantity >= 0)                                     │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use pantry_core::validation::{validate_line_quantity, validate_product_name};
//!
//! validate_product_name("Cheeseburger").unwrap();
//! validate_line_quantity(5).unwrap();
//! assert!(validate_line_quantity(0).is_err());
//! ```

use rust_decimal::Decimal;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{ALLOCATION_TOLERANCE, HUNDRED};
use crate::types::{CostAllocation, NewProduct, ProductType};
use crate::{MAX_AMOUNT, MAX_LINE_QUANTITY, MAX_SALE_LINES, MAX_STOCK_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product name.
///
/// ## Rules
/// - Must not be empty
/// - Must be between 1 and 200 characters
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates an optional SKU.
///
/// ## Rules
/// - At most 50 characters
/// - Only alphanumeric characters, hyphens, underscores
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Quantity Validators
// =============================================================================

/// Validates a sale line or stock movement quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY (999)
pub fn validate_line_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a stored quantity (stock on hand, reorder level).
///
/// ## Rules
/// - Must not be negative
/// - Must not exceed MAX_STOCK_QUANTITY
pub fn validate_stored_quantity(field: &str, qty: i64) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    if qty > MAX_STOCK_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_STOCK_QUANTITY,
        });
    }

    Ok(())
}

/// Validates the quantity of a restock or usage (positive, bounded).
pub fn validate_movement_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_STOCK_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_STOCK_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a signed adjustment delta.
///
/// ## Rules
/// - Must not be zero
/// - Magnitude must not exceed MAX_STOCK_QUANTITY
pub fn validate_adjustment_delta(delta: i64) -> ValidationResult<()> {
    if delta == 0 {
        return Err(ValidationError::InvalidFormat {
            field: "delta".to_string(),
            reason: "must not be zero".to_string(),
        });
    }

    if delta.unsigned_abs() > MAX_STOCK_QUANTITY.unsigned_abs() {
        return Err(ValidationError::OutOfRange {
            field: "delta".to_string(),
            min: -MAX_STOCK_QUANTITY,
            max: MAX_STOCK_QUANTITY,
        });
    }

    Ok(())
}

// =============================================================================
// Monetary Validators
// =============================================================================

/// Validates a price (zero allowed, at most MAX_AMOUNT).
pub fn validate_price(field: &str, price: Decimal) -> ValidationResult<()> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    if price > MAX_AMOUNT {
        return Err(amount_too_large(field));
    }

    Ok(())
}

/// Validates a cost operation amount (strictly positive, at most MAX_AMOUNT).
pub fn validate_cost_amount(amount: Decimal) -> ValidationResult<()> {
    if amount <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    if amount > MAX_AMOUNT {
        return Err(amount_too_large("amount"));
    }

    Ok(())
}

fn amount_too_large(field: &str) -> ValidationError {
    ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: format!("must not exceed {}", MAX_AMOUNT),
    }
}

/// Validates that a product carries the prices its type requires.
///
/// ```text
///  stock        cost_price required
///  sellable     selling_price required
///  combination  both required
/// ```
pub fn validate_product_prices(
    product_type: ProductType,
    cost_price: Option<Decimal>,
    selling_price: Option<Decimal>,
) -> ValidationResult<()> {
    if let Some(cost) = cost_price {
        validate_price("cost_price", cost)?;
    }
    if let Some(price) = selling_price {
        validate_price("selling_price", price)?;
    }

    if product_type.requires_cost_price() && cost_price.is_none() {
        return Err(ValidationError::Required {
            field: "cost_price".to_string(),
        });
    }

    if product_type.requires_selling_price() && selling_price.is_none() {
        return Err(ValidationError::Required {
            field: "selling_price".to_string(),
        });
    }

    Ok(())
}

/// Validates allocation percentages.
///
/// ## Rules
/// - Each percentage must lie in 0..=100
/// - The sum must be 100 ± 0.01
///
/// ## Example
/// ```rust
/// use pantry_core::types::CostAllocation;
/// use pantry_core::validation::validate_allocation;
/// use rust_decimal::Decimal;
///
/// let ok = CostAllocation::new(Decimal::from(60), Decimal::from(30), Decimal::from(10));
/// assert!(validate_allocation(&ok).is_ok());
///
/// let over = CostAllocation::new(Decimal::from(60), Decimal::from(30), Decimal::from(20));
/// assert!(validate_allocation(&over).is_err());
/// ```
pub fn validate_allocation(allocation: &CostAllocation) -> CoreResult<()> {
    let parts = [
        allocation.inventory,
        allocation.operational,
        allocation.overhead,
    ];

    let out_of_range = parts
        .iter()
        .any(|pct| *pct < Decimal::ZERO || *pct > HUNDRED);
    let total = parts
        .iter()
        .try_fold(Decimal::ZERO, |sum, pct| sum.checked_add(*pct))
        .unwrap_or(Decimal::MAX);

    if out_of_range || (total - HUNDRED).abs() > ALLOCATION_TOLERANCE {
        return Err(CoreError::InvalidAllocation { total });
    }

    Ok(())
}

/// Validates everything supplied when registering a product.
pub fn validate_new_product(product: &NewProduct) -> CoreResult<()> {
    validate_product_name(&product.name)?;
    if let Some(sku) = &product.sku {
        validate_sku(sku)?;
    }
    validate_stored_quantity("min_stock_level", product.min_stock_level)?;
    validate_product_prices(
        product.product_type,
        product.cost_price,
        product.selling_price,
    )?;
    validate_allocation(&product.cost_allocation)
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines in a sale.
pub fn validate_sale_size(lines: usize) -> CoreResult<()> {
    if lines == 0 {
        return Err(CoreError::EmptySale);
    }

    if lines > MAX_SALE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "sale items".to_string(),
            min: 1,
            max: MAX_SALE_LINES as i64,
        }
        .into());
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_product_name() {
        assert!(validate_product_name("Margherita Pizza").is_ok());
        assert!(validate_product_name("  ").is_err());
        assert!(validate_product_name(&"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("BURGER-01").is_ok());
        assert!(validate_sku("has space").is_err());
    }

    #[test]
    fn test_validate_line_quantity() {
        assert!(validate_line_quantity(1).is_ok());
        assert!(validate_line_quantity(999).is_ok());
        assert!(validate_line_quantity(0).is_err());
        assert!(validate_line_quantity(-1).is_err());
        assert!(validate_line_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_adjustment_delta() {
        assert!(validate_adjustment_delta(-3).is_ok());
        assert!(validate_adjustment_delta(4).is_ok());
        assert!(validate_adjustment_delta(-MAX_STOCK_QUANTITY).is_ok());
        assert!(validate_adjustment_delta(0).is_err());
        assert!(validate_adjustment_delta(i64::MIN).is_err());
        assert!(validate_adjustment_delta(i64::MAX).is_err());
    }

    #[test]
    fn test_validate_quantities_are_bounded() {
        assert!(validate_stored_quantity("opening_stock", MAX_STOCK_QUANTITY).is_ok());
        assert!(validate_stored_quantity("opening_stock", MAX_STOCK_QUANTITY + 1).is_err());
        assert!(validate_movement_quantity(5).is_ok());
        assert!(validate_movement_quantity(0).is_err());
        assert!(validate_movement_quantity(i64::MAX).is_err());
    }

    #[test]
    fn test_amounts_are_bounded() {
        assert!(validate_price("selling_price", MAX_AMOUNT).is_ok());
        assert!(validate_price("selling_price", Decimal::MAX).is_err());
        assert!(validate_cost_amount(dec!(1000000000.01)).is_err());
        assert!(validate_cost_amount(dec!(2500.00)).is_ok());
    }

    #[test]
    fn test_validate_product_prices() {
        assert!(validate_product_prices(ProductType::Stock, Some(dec!(2.5)), None).is_ok());
        assert!(validate_product_prices(ProductType::Stock, None, None).is_err());
        assert!(validate_product_prices(ProductType::Sellable, None, Some(dec!(3))).is_ok());
        assert!(validate_product_prices(ProductType::Sellable, None, None).is_err());
        assert!(
            validate_product_prices(ProductType::Combination, Some(dec!(4)), None).is_err()
        );
        assert!(
            validate_product_prices(ProductType::Sellable, None, Some(dec!(-1))).is_err()
        );
    }

    #[test]
    fn test_allocation_over_hundred_rejected() {
        let allocation = CostAllocation::new(dec!(60), dec!(30), dec!(20));
        let err = validate_allocation(&allocation).unwrap_err();
        assert_eq!(err, CoreError::InvalidAllocation { total: dec!(110) });
    }

    #[test]
    fn test_allocation_tolerance() {
        let within = CostAllocation::new(dec!(33.33), dec!(33.33), dec!(33.33));
        assert!(validate_allocation(&within).is_ok());

        let outside = CostAllocation::new(dec!(33.33), dec!(33.33), dec!(33.32));
        assert!(validate_allocation(&outside).is_err());

        let negative = CostAllocation::new(dec!(120), dec!(-20), dec!(0));
        assert!(validate_allocation(&negative).is_err());

        let huge = CostAllocation::new(Decimal::MAX, Decimal::MAX, dec!(0));
        assert!(validate_allocation(&huge).is_err());
    }

    #[test]
    fn test_validate_new_product() {
        let burger = NewProduct::new("Burger", ProductType::Combination)
            .cost_price(dec!(4.20))
            .selling_price(dec!(12.00));
        assert!(validate_new_product(&burger).is_ok());

        let no_price = NewProduct::new("Burger", ProductType::Combination).cost_price(dec!(4.20));
        assert!(validate_new_product(&no_price).is_err());

        let bad_split = burger
            .clone()
            .allocation(CostAllocation::new(dec!(60), dec!(30), dec!(20)));
        assert!(matches!(
            validate_new_product(&bad_split),
            Err(CoreError::InvalidAllocation { .. })
        ));
    }

    #[test]
    fn test_validate_sale_size() {
        assert_eq!(validate_sale_size(0).unwrap_err(), CoreError::EmptySale);
        assert!(validate_sale_size(1).is_ok());
        assert!(validate_sale_size(MAX_SALE_LINES + 1).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("not-a-uuid").is_err());
    }
}
