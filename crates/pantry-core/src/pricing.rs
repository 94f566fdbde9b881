//! # Sale Pricing
//!
//! Pure pre-check and pricing of a multi-item sale.
//!
//! ## Check Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  0. Request shape      1..=100 lines, each quantity 1..=999            │
//! │                                                                         │
//! │  Then, line by line:                                                    │
//! │  1. Product exists     → ProductNotFound                               │
//! │  2. Type can be sold   → NotSellable (stock items)                     │
//! │  3. Selling price > 0  → InvalidPrice                                  │
//! │  4. Enough on hand     → InsufficientStock                             │
//! │     (repeated lines for one product are summed)                        │
//! │                                                                         │
//! │  First failure wins; nothing is written by this module.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The stock check here reads a snapshot and can go stale before commit.
//! The conditional update in the Stock Guard is the authoritative check.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::{checked_add, line_total};
use crate::types::{Product, SaleItem, SaleLineRequest};
use crate::validation::{validate_line_quantity, validate_sale_size};

/// A sale that passed every pre-check, priced from current product data.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedSale {
    /// One item per requested line, in request order.
    pub items: Vec<SaleItem>,
    /// Σ item totals.
    pub total_amount: Decimal,
}

/// Prices a sale against a snapshot of the referenced products.
///
/// The unit price is always the product's current selling price. A
/// caller-supplied price is ignored.
///
/// ## Example
/// ```rust,ignore
/// let priced = price_sale(&lines, &products)?;
/// assert_eq!(priced.total_amount, dec!(60.00));
/// ```
pub fn price_sale(
    lines: &[SaleLineRequest],
    products: &HashMap<String, Product>,
) -> CoreResult<PricedSale> {
    validate_sale_size(lines.len())?;
    for line in lines {
        validate_line_quantity(line.quantity)?;
    }

    let mut requested: HashMap<&str, i64> = HashMap::new();
    let mut items = Vec::with_capacity(lines.len());
    let mut total_amount = Decimal::ZERO;

    for line in lines {
        let product = products
            .get(&line.product_id)
            .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;

        if !product.product_type.is_sellable() {
            return Err(CoreError::NotSellable {
                product_id: product.id.clone(),
                product_type: product.product_type,
            });
        }

        let unit_price = product
            .effective_selling_price()
            .ok_or_else(|| CoreError::InvalidPrice {
                product_id: product.id.clone(),
            })?;

        let wanted = requested.entry(line.product_id.as_str()).or_insert(0);
        *wanted += line.quantity;
        if !product.has_stock_for(*wanted) {
            return Err(CoreError::InsufficientStock {
                product_id: product.id.clone(),
                available: product.current_quantity,
                requested: *wanted,
            });
        }

        let total_price = line_total(unit_price, line.quantity)?;
        total_amount = checked_add(total_amount, total_price)?;

        items.push(SaleItem {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            quantity: line.quantity,
            unit_price,
            total_price,
        });
    }

    Ok(PricedSale {
        items,
        total_amount,
    })
}

/// Lines whose caller-supplied price differs from the effective price.
pub fn price_mismatches<'a>(
    lines: &'a [SaleLineRequest],
    priced: &'a PricedSale,
) -> impl Iterator<Item = (&'a SaleLineRequest, Decimal)> + 'a {
    lines
        .iter()
        .zip(priced.items.iter())
        .filter_map(|(line, item)| match line.unit_price {
            Some(supplied) if supplied != item.unit_price => Some((line, item.unit_price)),
            _ => None,
        })
}

/// Generates a receipt number: `YYYYMMDD-XXXXXXXX`.
///
/// The suffix is the first 8 hex digits of the sale ID, uppercased.
pub fn generate_receipt_number(now: DateTime<Utc>, sale_id: &Uuid) -> String {
    let simple = sale_id.simple().to_string().to_uppercase();
    format!("{}-{}", now.format("%Y%m%d"), &simple[..8])
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CostAllocation, ProductType};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn product(id: &str, product_type: ProductType, qty: i64, price: Option<Decimal>) -> Product {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            sku: None,
            product_type,
            current_quantity: qty,
            min_stock_level: 0,
            cost_price: Some(dec!(5)),
            selling_price: price,
            cost_allocation: CostAllocation::default(),
            created_at: now,
            updated_at: now,
        }
    }

    fn catalog(products: Vec<Product>) -> HashMap<String, Product> {
        products.into_iter().map(|p| (p.id.clone(), p)).collect()
    }

    #[test]
    fn test_prices_single_line() {
        let products = catalog(vec![product(
            "burger",
            ProductType::Sellable,
            25,
            Some(dec!(12.00)),
        )]);
        let priced = price_sale(&[SaleLineRequest::new("burger", 5)], &products).unwrap();

        assert_eq!(priced.items.len(), 1);
        assert_eq!(priced.items[0].unit_price, dec!(12.00));
        assert_eq!(priced.items[0].total_price, dec!(60.00));
        assert_eq!(priced.total_amount, dec!(60.00));
    }

    #[test]
    fn test_insufficient_stock_reports_counts() {
        let products = catalog(vec![product(
            "burger",
            ProductType::Sellable,
            25,
            Some(dec!(12.00)),
        )]);
        let err = price_sale(&[SaleLineRequest::new("burger", 100)], &products).unwrap_err();

        assert_eq!(
            err,
            CoreError::InsufficientStock {
                product_id: "burger".to_string(),
                available: 25,
                requested: 100,
            }
        );
    }

    #[test]
    fn test_repeated_lines_are_summed() {
        let products = catalog(vec![product(
            "burger",
            ProductType::Sellable,
            10,
            Some(dec!(12.00)),
        )]);
        let lines = vec![
            SaleLineRequest::new("burger", 6),
            SaleLineRequest::new("burger", 6),
        ];
        let err = price_sale(&lines, &products).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { requested: 12, available: 10, .. }
        ));
    }

    #[test]
    fn test_missing_product_rejects_whole_sale() {
        let products = catalog(vec![product(
            "burger",
            ProductType::Sellable,
            25,
            Some(dec!(12.00)),
        )]);
        let lines = vec![
            SaleLineRequest::new("burger", 1),
            SaleLineRequest::new("ghost", 1),
        ];
        assert_eq!(
            price_sale(&lines, &products).unwrap_err(),
            CoreError::ProductNotFound("ghost".to_string())
        );
    }

    #[test]
    fn test_stock_item_not_sellable() {
        let products = catalog(vec![product("flour", ProductType::Stock, 50, None)]);
        let err = price_sale(&[SaleLineRequest::new("flour", 1)], &products).unwrap_err();
        assert!(matches!(err, CoreError::NotSellable { .. }));
    }

    #[test]
    fn test_line_overflow_is_rejected() {
        let products = catalog(vec![product(
            "caviar",
            ProductType::Sellable,
            10,
            Some(Decimal::MAX),
        )]);
        let err = price_sale(&[SaleLineRequest::new("caviar", 2)], &products).unwrap_err();
        assert!(matches!(err, CoreError::InvariantViolation(_)));
    }

    #[test]
    fn test_zero_price_is_invalid() {
        let products = catalog(vec![product(
            "water",
            ProductType::Sellable,
            50,
            Some(Decimal::ZERO),
        )]);
        let err = price_sale(&[SaleLineRequest::new("water", 1)], &products).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPrice { .. }));
    }

    #[test]
    fn test_supplied_price_is_overridden() {
        let products = catalog(vec![product(
            "combo",
            ProductType::Combination,
            5,
            Some(dec!(15.50)),
        )]);
        let mut line = SaleLineRequest::new("combo", 2);
        line.unit_price = Some(dec!(1.00));
        let lines = vec![line];

        let priced = price_sale(&lines, &products).unwrap();
        assert_eq!(priced.total_amount, dec!(31.00));
        assert_eq!(price_mismatches(&lines, &priced).count(), 1);
    }

    #[test]
    fn test_request_shape() {
        let products = HashMap::new();
        assert_eq!(price_sale(&[], &products).unwrap_err(), CoreError::EmptySale);
        assert!(matches!(
            price_sale(&[SaleLineRequest::new("x", 0)], &products).unwrap_err(),
            CoreError::Validation(_)
        ));
        assert!(matches!(
            price_sale(&[SaleLineRequest::new("x", 1000)], &products).unwrap_err(),
            CoreError::Validation(_)
        ));
    }

    #[test]
    fn test_receipt_number_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 18, 30, 0).unwrap();
        let id = Uuid::parse_str("a1b2c3d4-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(generate_receipt_number(now, &id), "20240309-A1B2C3D4");
    }
}
