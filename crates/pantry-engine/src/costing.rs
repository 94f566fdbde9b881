//! # Costing Service
//!
//! Read-only cost reports. Each call loads a fresh snapshot of products and
//! cost operations and computes on it; nothing is written or cached.
//!
//! Snapshots are not transactional with concurrent sales, so two reports
//! taken while the till is busy may differ. Two reports with no writes in
//! between are identical.

use pantry_core::costing::total_costs;
use pantry_core::{CoreError, CostSnapshot, CostSummary, DateRange, ProductCost};
use pantry_db::Database;
use tracing::debug;

use crate::error::EngineResult;

#[derive(Debug, Clone)]
pub struct CostingService {
    db: Database,
}

impl CostingService {
    pub fn new(db: Database) -> Self {
        CostingService { db }
    }

    /// Loads every product and every cost operation.
    pub async fn snapshot(&self) -> EngineResult<CostSnapshot> {
        let products = self.db.products().list().await?;
        let operations = self.db.costs().list(&DateRange::all()).await?;

        debug!(
            products = products.len(),
            operations = operations.len(),
            "Loaded cost snapshot"
        );
        Ok(CostSnapshot::new(products, operations))
    }

    /// Cost breakdown of one product.
    pub async fn product_cost(&self, product_id: &str) -> EngineResult<ProductCost> {
        let snapshot = self.snapshot().await?;
        let product = snapshot
            .products
            .iter()
            .find(|p| p.id == product_id)
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        Ok(snapshot.product_cost(product)?)
    }

    /// Grand, monthly and per-category totals of costs incurred in `range`.
    pub async fn total_costs(&self, range: &DateRange) -> EngineResult<CostSummary> {
        let operations = self.db.costs().list(range).await?;
        Ok(total_costs(&operations, range)?)
    }

    /// Cost breakdown of every priced product, sorted by name.
    pub async fn profit_margins(&self) -> EngineResult<Vec<ProductCost>> {
        Ok(self.snapshot().await?.profit_margins()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::ErrorCode;
    use crate::inventory::CostRecord;
    use crate::Engine;
    use chrono::{TimeZone, Utc};
    use pantry_core::{Actor, CostCategory, FixedClock, NewProduct, ProductType};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn engine() -> Engine {
        let db = Database::new(pantry_db::DbConfig::in_memory())
            .await
            .unwrap();
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
        Engine::new(db, EngineConfig::default(), clock)
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let engine = engine().await;
        let err = engine.costing().product_cost("missing").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProductNotFound);
    }

    #[tokio::test]
    async fn test_total_costs_window() {
        let engine = engine().await;
        let inventory = engine.inventory();
        let may = Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap();
        let june = Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap();

        for (category, amount, at) in [
            (CostCategory::Operational, dec!(100.00), may),
            (CostCategory::Overhead, dec!(50.00), june),
            (CostCategory::Operational, dec!(30.00), june),
        ] {
            inventory
                .record_cost(CostRecord::new(category, amount).occurred_at(at), &Actor::system())
                .await
                .unwrap();
        }

        let june_only = DateRange::new(Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()), None);
        let summary = engine.costing().total_costs(&june_only).await.unwrap();
        assert_eq!(summary.grand_total, dec!(80.00));

        let all = engine.costing().total_costs(&DateRange::all()).await.unwrap();
        assert_eq!(all.grand_total, dec!(180.00));
        assert_eq!(all.monthly.len(), 2);
    }

    #[tokio::test]
    async fn test_profit_margins_sorted_by_name() {
        let engine = engine().await;
        let inventory = engine.inventory();
        for name in ["Wrap", "Burger"] {
            inventory
                .create_product(
                    NewProduct::new(name, ProductType::Combination)
                        .cost_price(dec!(4.00))
                        .selling_price(dec!(10.00)),
                    10,
                    &Actor::system(),
                )
                .await
                .unwrap();
        }
        inventory
            .create_product(
                NewProduct::new("Salt", ProductType::Stock).cost_price(dec!(0.50)),
                10,
                &Actor::system(),
            )
            .await
            .unwrap();

        let margins = engine.costing().profit_margins().await.unwrap();
        let names: Vec<&str> = margins.iter().map(|c| c.product_name.as_str()).collect();
        assert_eq!(names, vec!["Burger", "Wrap"]);
        assert_eq!(margins[0].profit_margin, Some(dec!(60)));
    }
}
