use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ─── Plan ────────────────────────────────────────────────────────────

/// Subscription tiers. The tier decides the link quota, the wallet
/// discount shown in notifications and whether stock alerts are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Plan {
    Free,
    Basic,
    Pro,
}

impl Plan {
    /// Canonical string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "plan_free",
            Plan::Basic => "plan_basic",
            Plan::Pro => "plan_pro",
        }
    }

    /// Stock counts in restock alerts are a Pro perk.
    pub fn shows_stock_counts(&self) -> bool {
        matches!(self, Plan::Pro)
    }
}

impl FromStr for Plan {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan_free" => Ok(Plan::Free),
            "plan_basic" => Ok(Plan::Basic),
            "plan_pro" => Ok(Plan::Pro),
            other => Err(AppError::InvalidInput(format!("Unknown plan: {}", other))),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── NotifyRule ──────────────────────────────────────────────────────

/// Per-product notification rule. Stored as a nullable (mode, value)
/// column pair; absent mode means "notify on any change".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyRule {
    /// Any price or availability change notifies.
    AllChanges,
    /// Notify only when the price dropped by at least this percent.
    PercentDrop(i64),
    /// Notify only when the price is at or below this absolute value.
    Threshold(i64),
}

impl NotifyRule {
    /// Decode the stored column pair. A recognisable mode with a missing
    /// or nonsensical value degrades to `AllChanges` with a warning, so a
    /// malformed rule can never take down a cycle.
    pub fn from_columns(mode: Option<&str>, value: Option<i64>) -> NotifyRule {
        match (mode, value) {
            (None, _) => NotifyRule::AllChanges,
            (Some("percent"), Some(v)) if (1..=100).contains(&v) => NotifyRule::PercentDrop(v),
            (Some("threshold"), Some(v)) if v > 0 => NotifyRule::Threshold(v),
            (Some(other), v) => {
                tracing::warn!("Malformed notify rule (mode={}, value={:?}), treating as all-changes", other, v);
                NotifyRule::AllChanges
            }
        }
    }

    /// Encode back into the column pair.
    pub fn to_columns(&self) -> (Option<&'static str>, Option<i64>) {
        match self {
            NotifyRule::AllChanges => (None, None),
            NotifyRule::PercentDrop(v) => (Some("percent"), Some(*v)),
            NotifyRule::Threshold(v) => (Some("threshold"), Some(*v)),
        }
    }
}

// ─── SortMode ────────────────────────────────────────────────────────

/// Preferred ordering of a user's product listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortMode {
    Updated,
    Savings,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Updated => "updated",
            SortMode::Savings => "savings",
        }
    }
}

impl FromStr for SortMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "updated" => Ok(SortMode::Updated),
            "savings" => Ok(SortMode::Savings),
            other => Err(AppError::InvalidInput(format!("Unknown sort mode: {}", other))),
        }
    }
}

// ─── NotificationKind ────────────────────────────────────────────────

/// What a reconciliation decided to tell the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    /// Price moved and the product's rule matched.
    PriceChange {
        old_price: i64,
        new_price: i64,
    },
    /// Stock went from zero to positive. Always eligible.
    Restock {
        qty: i64,
        price: i64,
    },
    /// Stock went from positive to zero.
    OutOfStock,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::PriceChange { .. } => f.write_str("price_change"),
            NotificationKind::Restock { .. } => f.write_str("restock"),
            NotificationKind::OutOfStock => f.write_str("out_of_stock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_roundtrip() {
        for plan in [Plan::Free, Plan::Basic, Plan::Pro] {
            assert_eq!(plan.as_str().parse::<Plan>().unwrap(), plan);
        }
        assert!("plan_gold".parse::<Plan>().is_err());
    }

    #[test]
    fn notify_rule_from_columns() {
        assert_eq!(NotifyRule::from_columns(None, None), NotifyRule::AllChanges);
        assert_eq!(NotifyRule::from_columns(None, Some(10)), NotifyRule::AllChanges);
        assert_eq!(NotifyRule::from_columns(Some("percent"), Some(15)), NotifyRule::PercentDrop(15));
        assert_eq!(NotifyRule::from_columns(Some("threshold"), Some(900)), NotifyRule::Threshold(900));
    }

    #[test]
    fn malformed_rule_degrades_to_all_changes() {
        assert_eq!(NotifyRule::from_columns(Some("percent"), None), NotifyRule::AllChanges);
        assert_eq!(NotifyRule::from_columns(Some("percent"), Some(0)), NotifyRule::AllChanges);
        assert_eq!(NotifyRule::from_columns(Some("percent"), Some(101)), NotifyRule::AllChanges);
        assert_eq!(NotifyRule::from_columns(Some("threshold"), Some(-5)), NotifyRule::AllChanges);
        assert_eq!(NotifyRule::from_columns(Some("bogus"), Some(3)), NotifyRule::AllChanges);
    }
}
