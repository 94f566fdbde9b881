//! # Seed Data Generator
//!
//! Populates the database with a demo restaurant for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./pantry_dev.db
//! cargo run -p pantry-db --bin seed
//!
//! # Specify database path
//! cargo run -p pantry-db --bin seed -- --db ./data/pantry.db
//!
//! # Also record a month of general costs
//! cargo run -p pantry-db --bin seed -- --with-costs
//! ```
//!
//! ## Generated Data
//! - Raw ingredients (`stock`): cost price only
//! - Bought-in drinks (`sellable`): selling price only
//! - Kitchen dishes (`combination`): both prices
//!
//! Opening stock goes through the stock guard as `addition` ledger
//! entries, so the ledger replays to the seeded quantities.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use uuid::Uuid;

use pantry_core::{
    CostAllocation, CostCategory, CostOperation, LedgerKind, NewProduct, ProductType,
};
use pantry_db::repository::product::{generate_product_id, ProductRepository};
use pantry_db::{Database, DbConfig, StockChange, StockGuard};

/// (name, sku, type, cost price, selling price, opening stock, reorder level)
const CATALOG: &[(&str, &str, ProductType, Option<&str>, Option<&str>, i64, i64)] = &[
    ("Beef Patty", "ING-BEEF", ProductType::Stock, Some("2.10"), None, 120, 30),
    ("Burger Bun", "ING-BUN", ProductType::Stock, Some("0.35"), None, 150, 40),
    ("Cheddar Slice", "ING-CHED", ProductType::Stock, Some("0.22"), None, 200, 50),
    ("Pizza Dough", "ING-DOUGH", ProductType::Stock, Some("0.90"), None, 60, 15),
    ("Mozzarella", "ING-MOZZ", ProductType::Stock, Some("1.40"), None, 40, 10),
    ("Tomato Sauce", "ING-SAUCE", ProductType::Stock, Some("0.60"), None, 35, 10),
    ("Cola 330ml", "BEV-COLA", ProductType::Sellable, None, Some("2.50"), 96, 24),
    ("Sparkling Water", "BEV-WATER", ProductType::Sellable, None, Some("2.00"), 72, 24),
    ("Lemonade", "BEV-LEMON", ProductType::Sellable, None, Some("3.50"), 48, 12),
    ("Cheeseburger", "DISH-BURGER", ProductType::Combination, Some("8.00"), Some("12.00"), 25, 5),
    ("Margherita Pizza", "DISH-MARG", ProductType::Combination, Some("6.50"), Some("14.00"), 20, 5),
    ("Fries", "DISH-FRIES", ProductType::Combination, Some("1.10"), Some("4.50"), 40, 10),
];

/// (category, amount, description)
const MONTHLY_COSTS: &[(CostCategory, &str, &str)] = &[
    (CostCategory::Overhead, "2400.00", "Rent"),
    (CostCategory::Overhead, "380.00", "Utilities"),
    (CostCategory::Operational, "5200.00", "Kitchen wages"),
    (CostCategory::Operational, "650.00", "Cleaning and supplies"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./pantry_dev.db");
    let mut with_costs = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--with-costs" => with_costs = true,
            "--help" | "-h" => {
                println!("Pantry Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./pantry_dev.db)");
                println!("      --with-costs   Record a month of general cost operations");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Pantry Seed Data Generator");
    println!("==========================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Creating catalog...");

    let now = Utc::now();
    let mut created = 0;

    for (name, sku, product_type, cost, price, opening, reorder) in CATALOG {
        let mut new_product = NewProduct::new(*name, *product_type)
            .sku(*sku)
            .min_stock_level(*reorder);
        if let Some(cost) = cost {
            new_product = new_product.cost_price(Decimal::from_str(cost)?);
        }
        if let Some(price) = price {
            new_product = new_product.selling_price(Decimal::from_str(price)?);
        }
        if *product_type == ProductType::Combination {
            new_product = new_product.allocation(CostAllocation::new(
                Decimal::from(70),
                Decimal::from(20),
                Decimal::from(10),
            ));
        }
        pantry_core::validation::validate_new_product(&new_product)?;

        let product = new_product.into_product(generate_product_id(), now);

        let mut tx = db.begin().await?;
        ProductRepository::insert_on(&mut *tx, &product).await?;
        StockGuard::apply_delta(
            &mut *tx,
            StockChange::new(&product.id, LedgerKind::Addition, *opening, "seed", now)
                .reason(Some("opening stock".to_string())),
        )
        .await?;
        tx.commit().await?;

        println!("  {:<18} {:>4} on hand", product.name, opening);
        created += 1;
    }

    println!("✓ Created {} products", created);

    if with_costs {
        println!();
        println!("Recording monthly costs...");
        for (offset, (category, amount, description)) in MONTHLY_COSTS.iter().enumerate() {
            let op = CostOperation {
                id: Uuid::new_v4().to_string(),
                category: *category,
                amount: Decimal::from_str(amount)?,
                description: Some(description.to_string()),
                related_entity: None,
                actor: "seed".to_string(),
                occurred_at: now - Duration::days(offset as i64 * 7),
                created_at: now,
            };
            db.costs().insert(&op).await?;
            println!("  {:<22} {:>9}", description, op.amount);
        }
    }

    println!();
    println!("Ledger entries: {}", db.ledger().count().await?);
    println!("Low stock:      {}", db.products().low_stock().await?.len());
    println!();
    println!("✓ Seed complete!");

    Ok(())
}
