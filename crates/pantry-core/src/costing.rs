//! # Cost Allocation
//!
//! Direct and proportionally allocated indirect costs per product.
//!
//! ## Allocation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  inventory_cost      = cost_price × current_quantity                    │
//! │                                                                         │
//! │  share               = inventory_cost / Σ inventory_cost (all products) │
//! │                                                                         │
//! │  operational_cost    = direct operational                               │
//! │                      + general operational × share                      │
//! │  overhead_cost       = direct overhead                                  │
//! │                      + general overhead × share                         │
//! │                                                                         │
//! │  total_cost          = inventory + operational + overhead               │
//! │  cost_per_unit       = total_cost / current_quantity                    │
//! │  profit_margin       = (selling − cost_per_unit) / selling × 100       │
//! │                                                                         │
//! │  "direct"  = cost operation related to this product                    │
//! │  "general" = cost operation related to no product                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every division goes through [`safe_div`], so an empty denominator gives
//! zero. Nothing here rounds; use [`ProductCost::rounded`] for display.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::{checked_add, checked_sum, percentage, round_money, safe_div, HUNDRED};
use crate::types::{CostCategory, CostOperation, DateRange, Product};

// =============================================================================
// Results
// =============================================================================

/// Cost breakdown of one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductCost {
    pub product_id: String,
    pub product_name: String,
    #[ts(type = "string")]
    pub inventory_cost: Decimal,
    #[ts(type = "string")]
    pub operational_cost: Decimal,
    #[ts(type = "string")]
    pub overhead_cost: Decimal,
    #[ts(type = "string")]
    pub total_cost: Decimal,
    #[ts(type = "string")]
    pub cost_per_unit: Decimal,
    /// Percent; `None` without a positive selling price.
    #[ts(type = "string | null")]
    pub profit_margin: Option<Decimal>,
    /// Fraction (0..=1) of general costs assigned to this product.
    #[ts(type = "string")]
    pub allocation_share: Decimal,
}

impl ProductCost {
    /// Copy with every figure rounded half-to-even to `dp` places.
    pub fn rounded(&self, dp: u32) -> ProductCost {
        ProductCost {
            product_id: self.product_id.clone(),
            product_name: self.product_name.clone(),
            inventory_cost: round_money(self.inventory_cost, dp),
            operational_cost: round_money(self.operational_cost, dp),
            overhead_cost: round_money(self.overhead_cost, dp),
            total_cost: round_money(self.total_cost, dp),
            cost_per_unit: round_money(self.cost_per_unit, dp),
            profit_margin: self.profit_margin.map(|m| round_money(m, dp)),
            allocation_share: round_money(self.allocation_share, dp),
        }
    }
}

/// Per-category amounts for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MonthlyCost {
    /// `YYYY-MM`
    pub month: String,
    #[ts(type = "string")]
    pub inventory: Decimal,
    #[ts(type = "string")]
    pub operational: Decimal,
    #[ts(type = "string")]
    pub overhead: Decimal,
    #[ts(type = "string")]
    pub total: Decimal,
}

impl MonthlyCost {
    fn empty(month: String) -> Self {
        MonthlyCost {
            month,
            inventory: Decimal::ZERO,
            operational: Decimal::ZERO,
            overhead: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }

    fn add(&mut self, category: CostCategory, amount: Decimal) {
        match category {
            CostCategory::Inventory => self.inventory += amount,
            CostCategory::Operational => self.operational += amount,
            CostCategory::Overhead => self.overhead += amount,
        }
        self.total += amount;
    }
}

/// One category's slice of the grand total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CategoryShare {
    pub category: CostCategory,
    #[ts(type = "string")]
    pub amount: Decimal,
    /// Percent of the grand total (0 when the grand total is 0).
    #[ts(type = "string")]
    pub percentage: Decimal,
}

/// Aggregate cost report over a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CostSummary {
    #[ts(type = "string")]
    pub inventory: Decimal,
    #[ts(type = "string")]
    pub operational: Decimal,
    #[ts(type = "string")]
    pub overhead: Decimal,
    #[ts(type = "string")]
    pub grand_total: Decimal,
    /// Ascending by month.
    pub monthly: Vec<MonthlyCost>,
    /// One entry per category, in [`CostCategory::ALL`] order.
    pub breakdown: Vec<CategoryShare>,
}

// =============================================================================
// Snapshot
// =============================================================================

/// Products and cost records read at one point in time.
///
/// Computations on the same snapshot are deterministic and side-effect free.
#[derive(Debug, Clone, Default)]
pub struct CostSnapshot {
    pub products: Vec<Product>,
    pub operations: Vec<CostOperation>,
}

#[derive(Debug, Default)]
struct Indirect {
    direct_operational: Decimal,
    direct_overhead: Decimal,
}

impl CostSnapshot {
    pub fn new(products: Vec<Product>, operations: Vec<CostOperation>) -> Self {
        CostSnapshot {
            products,
            operations,
        }
    }

    /// Σ cost_price × current_quantity over every product.
    pub fn total_inventory_value(&self) -> CoreResult<Decimal> {
        self.products
            .iter()
            .try_fold(Decimal::ZERO, |total, p| checked_add(total, p.inventory_value()?))
    }

    /// Sum of unattributed amounts in one category.
    pub fn general_amount(&self, category: CostCategory) -> CoreResult<Decimal> {
        checked_sum(
            self.operations
                .iter()
                .filter(|op| op.category == category && op.related_entity.is_none())
                .map(|op| op.amount),
        )
    }

    fn direct_amounts(&self, product_id: &str) -> CoreResult<Indirect> {
        let mut direct = Indirect::default();
        for op in &self.operations {
            let related = op
                .related_entity
                .as_ref()
                .is_some_and(|entity| entity.is_product(product_id));
            if !related {
                continue;
            }
            match op.category {
                CostCategory::Operational => {
                    direct.direct_operational = checked_add(direct.direct_operational, op.amount)?
                }
                CostCategory::Overhead => {
                    direct.direct_overhead = checked_add(direct.direct_overhead, op.amount)?
                }
                // Purchases are already in cost_price × quantity.
                CostCategory::Inventory => {}
            }
        }
        Ok(direct)
    }

    /// Computes the cost breakdown of `product` against this snapshot.
    ///
    /// ## Errors
    /// `CoreError::InvariantViolation` if a figure leaves the decimal range.
    pub fn product_cost(&self, product: &Product) -> CoreResult<ProductCost> {
        let inventory_cost = product.inventory_value()?;
        let allocation_share = safe_div(inventory_cost, self.total_inventory_value()?);

        let direct = self.direct_amounts(&product.id)?;
        let operational_cost = checked_add(
            direct.direct_operational,
            share_of(self.general_amount(CostCategory::Operational)?, allocation_share)?,
        )?;
        let overhead_cost = checked_add(
            direct.direct_overhead,
            share_of(self.general_amount(CostCategory::Overhead)?, allocation_share)?,
        )?;

        let total_cost = checked_sum([inventory_cost, operational_cost, overhead_cost])?;
        let cost_per_unit = safe_div(total_cost, Decimal::from(product.current_quantity));

        let profit_margin = product
            .effective_selling_price()
            .map(|selling| share_of(safe_div(selling - cost_per_unit, selling), HUNDRED))
            .transpose()?;

        Ok(ProductCost {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            inventory_cost,
            operational_cost,
            overhead_cost,
            total_cost,
            cost_per_unit,
            profit_margin,
            allocation_share,
        })
    }

    /// Costs for every product with a selling price, sorted by name.
    pub fn profit_margins(&self) -> CoreResult<Vec<ProductCost>> {
        let mut priced: Vec<&Product> = self
            .products
            .iter()
            .filter(|p| p.selling_price.is_some())
            .collect();
        priced.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        priced.into_iter().map(|p| self.product_cost(p)).collect()
    }
}

fn share_of(amount: Decimal, factor: Decimal) -> CoreResult<Decimal> {
    amount
        .checked_mul(factor)
        .ok_or_else(|| CoreError::invariant(format!("{} x {} overflows", amount, factor)))
}

// =============================================================================
// Period Totals
// =============================================================================

/// Totals cost operations in `range` by category and by month.
///
/// The grand total is checked first; every partial sum of positive amounts
/// is bounded by it.
pub fn total_costs(operations: &[CostOperation], range: &DateRange) -> CoreResult<CostSummary> {
    let in_range: Vec<&CostOperation> = operations
        .iter()
        .filter(|op| range.contains(op.occurred_at))
        .collect();
    let grand_total = checked_sum(in_range.iter().map(|op| op.amount))?;

    let mut totals: BTreeMap<CostCategory, Decimal> = CostCategory::ALL
        .iter()
        .map(|category| (*category, Decimal::ZERO))
        .collect();
    let mut months: BTreeMap<String, MonthlyCost> = BTreeMap::new();

    for op in in_range {
        *totals.entry(op.category).or_insert(Decimal::ZERO) += op.amount;

        let month = op.occurred_at.format("%Y-%m").to_string();
        months
            .entry(month.clone())
            .or_insert_with(|| MonthlyCost::empty(month))
            .add(op.category, op.amount);
    }

    let amount = |category: CostCategory| totals.get(&category).copied().unwrap_or_default();

    let breakdown = CostCategory::ALL
        .iter()
        .map(|category| CategoryShare {
            category: *category,
            amount: amount(*category),
            percentage: percentage(amount(*category), grand_total),
        })
        .collect();

    Ok(CostSummary {
        inventory: amount(CostCategory::Inventory),
        operational: amount(CostCategory::Operational),
        overhead: amount(CostCategory::Overhead),
        grand_total,
        monthly: months.into_values().collect(),
        breakdown,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
