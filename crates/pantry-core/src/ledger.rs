//! # Quantity Ledger
//!
//! Append-only record of every stock-quantity change.
//!
//! ## Entry Invariants
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every entry satisfies, at construction time:                           │
//! │                                                                         │
//! │    previous_quantity >= 0                                               │
//! │    new_quantity      >= 0                                               │
//! │    new_quantity      == previous_quantity + quantity_delta              │
//! │                                                                         │
//! │  And the delta sign matches the kind:                                   │
//! │                                                                         │
//! │    addition     delta > 0      (deliveries, restocks)                   │
//! │    usage        delta < 0      (kitchen consumption, waste)             │
//! │    sale         delta < 0      (sold over the counter)                  │
//! │    adjustment   delta != 0     (stock count corrections)                │
//! │                                                                         │
//! │  Per product, replaying entries in commit order forms a chain:         │
//! │                                                                         │
//! │    e[n].previous_quantity == e[n-1].new_quantity                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A violation is never corrected silently. It means the write path is
//! broken, so construction fails with [`CoreError::InvariantViolation`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Ledger Kind
// =============================================================================

/// Why a quantity changed.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Addition,
    Usage,
    Sale,
    Adjustment,
}

impl LedgerKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Addition => "addition",
            LedgerKind::Usage => "usage",
            LedgerKind::Sale => "sale",
            LedgerKind::Adjustment => "adjustment",
        }
    }

    /// Checks the delta sign against the kind.
    pub const fn accepts_delta(&self, delta: i64) -> bool {
        match self {
            LedgerKind::Addition => delta > 0,
            LedgerKind::Usage | LedgerKind::Sale => delta < 0,
            LedgerKind::Adjustment => delta != 0,
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Ledger Entry
// =============================================================================

/// One committed quantity change. Never updated, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LedgerEntry {
    pub id: String,
    /// Store-assigned, increasing in commit order.
    pub sequence: i64,
    pub product_id: String,
    pub kind: LedgerKind,
    pub quantity_delta: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub reason: Option<String>,
    /// What caused the change, e.g. the sale ID.
    pub reference_id: Option<String>,
    pub actor: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Re-checks the entry invariants (used when replaying stored rows).
    pub fn verify(&self) -> CoreResult<()> {
        check_entry(
            &self.product_id,
            self.kind,
            self.quantity_delta,
            self.previous_quantity,
            self.new_quantity,
        )
    }
}

/// A validated entry waiting for the store to assign `id` and `sequence`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerDraft {
    pub product_id: String,
    pub kind: LedgerKind,
    pub quantity_delta: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub reason: Option<String>,
    pub reference_id: Option<String>,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerDraft {
    /// Builds a draft, failing with `InvariantViolation` on inconsistent
    /// arithmetic or a delta that does not match the kind.
    pub fn new(
        product_id: impl Into<String>,
        kind: LedgerKind,
        quantity_delta: i64,
        previous_quantity: i64,
        new_quantity: i64,
        actor: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let product_id = product_id.into();
        check_entry(&product_id, kind, quantity_delta, previous_quantity, new_quantity)?;

        Ok(LedgerDraft {
            product_id,
            kind,
            quantity_delta,
            previous_quantity,
            new_quantity,
            reason: None,
            reference_id: None,
            actor: actor.into(),
            created_at,
        })
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn with_reference(mut self, reference_id: Option<String>) -> Self {
        self.reference_id = reference_id;
        self
    }

    /// Finalizes the draft with store-assigned identity.
    pub fn into_entry(self, id: String, sequence: i64) -> LedgerEntry {
        LedgerEntry {
            id,
            sequence,
            product_id: self.product_id,
            kind: self.kind,
            quantity_delta: self.quantity_delta,
            previous_quantity: self.previous_quantity,
            new_quantity: self.new_quantity,
            reason: self.reason,
            reference_id: self.reference_id,
            actor: self.actor,
            created_at: self.created_at,
        }
    }
}

fn check_entry(
    product_id: &str,
    kind: LedgerKind,
    delta: i64,
    previous: i64,
    new: i64,
) -> CoreResult<()> {
    if previous < 0 || new < 0 {
        return Err(CoreError::invariant(format!(
            "negative quantity for {}: previous {}, new {}",
            product_id, previous, new
        )));
    }

    if previous.checked_add(delta) != Some(new) {
        return Err(CoreError::invariant(format!(
            "{} ledger entry for {}: {} + {} != {}",
            kind, product_id, previous, delta, new
        )));
    }

    if !kind.accepts_delta(delta) {
        return Err(CoreError::invariant(format!(
            "{} ledger entry for {} cannot carry delta {}",
            kind, product_id, delta
        )));
    }

    Ok(())
}

// =============================================================================
// Replay
// =============================================================================

/// Quantity of a product right after a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityPoint {
    pub sequence: i64,
    pub at: DateTime<Utc>,
    pub quantity: i64,
}

/// Replays entries (any product mix, commit order) and checks every
/// per-product chain link.
pub fn verify_chain(entries: &[LedgerEntry]) -> CoreResult<()> {
    let mut last_seen: HashMap<&str, (i64, i64)> = HashMap::new();

    for entry in entries {
        entry.verify()?;

        if let Some((last_sequence, last_quantity)) = last_seen.get(entry.product_id.as_str()) {
            if entry.sequence <= *last_sequence {
                return Err(CoreError::invariant(format!(
                    "ledger for {} out of order: sequence {} after {}",
                    entry.product_id, entry.sequence, last_sequence
                )));
            }
            if entry.previous_quantity != *last_quantity {
                return Err(CoreError::invariant(format!(
                    "ledger chain broken for {} at sequence {}: previous {} but last recorded {}",
                    entry.product_id, entry.sequence, entry.previous_quantity, last_quantity
                )));
            }
        }

        last_seen.insert(entry.product_id.as_str(), (entry.sequence, entry.new_quantity));
    }

    Ok(())
}

/// Reconstructs one product's quantity history from its entries.
pub fn quantity_timeline(entries: &[LedgerEntry]) -> Vec<QuantityPoint> {
    entries
        .iter()
        .map(|entry| QuantityPoint {
            sequence: entry.sequence,
            at: entry.created_at,
            quantity: entry.new_quantity,
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn entry(sequence: i64, kind: LedgerKind, delta: i64, previous: i64) -> LedgerEntry {
        LedgerDraft::new("p1", kind, delta, previous, previous + delta, "tester", at())
            .unwrap()
            .into_entry(format!("e{}", sequence), sequence)
    }

    #[test]
    fn test_valid_sale_entry() {
        let draft = LedgerDraft::new("p1", LedgerKind::Sale, -5, 25, 20, "cashier", at()).unwrap();
        assert_eq!(draft.new_quantity, 20);
    }

    #[test]
    fn test_arithmetic_mismatch_is_invariant_violation() {
        let err = LedgerDraft::new("p1", LedgerKind::Sale, -5, 25, 21, "cashier", at()).unwrap_err();
        assert!(matches!(err, CoreError::InvariantViolation(_)));
    }

    #[test]
    fn test_negative_quantity_rejected() {
        let err = LedgerDraft::new("p1", LedgerKind::Usage, -30, 25, -5, "chef", at()).unwrap_err();
        assert!(matches!(err, CoreError::InvariantViolation(_)));
    }

    #[test]
    fn test_kind_sign_rules() {
        assert!(LedgerKind::Addition.accepts_delta(3));
        assert!(!LedgerKind::Addition.accepts_delta(-3));
        assert!(!LedgerKind::Sale.accepts_delta(2));
        assert!(LedgerKind::Adjustment.accepts_delta(-2));
        assert!(!LedgerKind::Adjustment.accepts_delta(0));

        let err = LedgerDraft::new("p1", LedgerKind::Sale, 5, 25, 30, "cashier", at()).unwrap_err();
        assert!(matches!(err, CoreError::InvariantViolation(_)));
    }

    #[test]
    fn test_chain_replays() {
        let entries = vec![
            entry(1, LedgerKind::Addition, 25, 0),
            entry(2, LedgerKind::Sale, -5, 25),
            entry(4, LedgerKind::Adjustment, 2, 20),
        ];
        assert!(verify_chain(&entries).is_ok());

        let timeline = quantity_timeline(&entries);
        let quantities: Vec<i64> = timeline.iter().map(|p| p.quantity).collect();
        assert_eq!(quantities, vec![25, 20, 22]);
    }

    #[test]
    fn test_broken_chain_detected() {
        let entries = vec![
            entry(1, LedgerKind::Addition, 25, 0),
            entry(2, LedgerKind::Sale, -5, 24),
        ];
        let err = verify_chain(&entries).unwrap_err();
        assert!(err.to_string().contains("chain broken"));
    }
}
