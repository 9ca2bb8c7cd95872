//! Expense record types.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Maximum number of decimal places accepted for an amount.
pub const MAX_AMOUNT_SCALE: u32 = 2;

/// Unique identifier for an expense record.
///
/// Generated once at construction so the cache replica and the export
/// replica carry the same identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpenseId(String);

impl ExpenseId {
    /// Creates an expense ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh, time-ordered ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ExpenseId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ExpenseId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A confirmed expense.
///
/// Both stores hold an independent copy once persisted. Neither replica is
/// authoritative: divergence after a partial write is reported, never
/// repaired automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    /// Unique identifier.
    pub id: ExpenseId,
    /// Amount spent, strictly positive, at most two decimal places.
    pub amount: Decimal,
    /// Normalized (trimmed, lowercase) category.
    pub category: String,
    /// Free-form description, usually the originating message text.
    pub description: Option<String>,
    /// When the expense happened.
    pub date: DateTime<Utc>,
}

impl ExpenseRecord {
    /// Creates a validated expense record with a freshly generated ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the amount is not positive, has more
    /// than two decimal places, or the category is blank.
    pub fn new(
        amount: Decimal,
        category: &str,
        description: Option<String>,
        date: DateTime<Utc>,
    ) -> Result<Self> {
        Self::with_id(ExpenseId::generate(), amount, category, description, date)
    }

    /// Creates a validated expense record with an explicit ID.
    ///
    /// Used when rehydrating rows from a store.
    ///
    /// # Errors
    ///
    /// Same validation as [`ExpenseRecord::new`].
    pub fn with_id(
        id: ExpenseId,
        amount: Decimal,
        category: &str,
        description: Option<String>,
        date: DateTime<Utc>,
    ) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidInput(format!(
                "amount must be positive, got {amount}"
            )));
        }
        if amount.scale() > MAX_AMOUNT_SCALE {
            return Err(Error::InvalidInput(format!(
                "amount {amount} has more than {MAX_AMOUNT_SCALE} decimal places"
            )));
        }
        let category = normalize_category(category);
        if category.is_empty() {
            return Err(Error::InvalidInput("category is required".to_string()));
        }
        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(Self {
            id,
            amount,
            category,
            description,
            date,
        })
    }

    /// Returns true if the expense belongs to `category` (case-insensitive).
    #[must_use]
    pub fn is_category(&self, category: &str) -> bool {
        self.category == normalize_category(category)
    }

    /// Duplicate-detection key.
    ///
    /// Two expenses with the same amount, category, description and calendar
    /// day (UTC) share a key. The amount is normalized so `250` and `250.00`
    /// match. The ID is not part of the key.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let key = format!(
            "{}|{}|{}|{}",
            self.amount.normalize(),
            self.category,
            self.description.as_deref().unwrap_or_default(),
            self.date.date_naive()
        );
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    /// Returns true if `other` describes the same expense, whatever its ID.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.content_hash() == other.content_hash()
    }
}

impl fmt::Display for ExpenseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${} {} ({})",
            self.amount,
            self.category,
            self.date.format("%Y-%m-%d %H:%M")
        )
    }
}

/// Normalizes a category name: trimmed and lowercased.
#[must_use]
pub fn normalize_category(category: &str) -> String {
    category.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 18, 12, 0).unwrap()
    }

    #[test]
    fn test_new_normalizes_category() {
        let record =
            ExpenseRecord::new(Decimal::from(500), "  Pizza ", None, at()).unwrap();
        assert_eq!(record.category, "pizza");
        assert!(record.is_category("PIZZA"));
        assert!(!record.id.as_str().is_empty());
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let err = ExpenseRecord::new(Decimal::ZERO, "food", None, at()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = ExpenseRecord::new(Decimal::from(-3), "food", None, at()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_rejects_more_than_two_decimals() {
        let amount = Decimal::from_str("12.345").unwrap();
        assert!(ExpenseRecord::new(amount, "food", None, at()).is_err());

        let amount = Decimal::from_str("12.34").unwrap();
        assert!(ExpenseRecord::new(amount, "food", None, at()).is_ok());
    }

    #[test]
    fn test_rejects_blank_category() {
        let err = ExpenseRecord::new(Decimal::from(10), "   ", None, at()).unwrap_err();
        assert!(err.to_string().contains("category"));
    }

    #[test]
    fn test_blank_description_becomes_none() {
        let record =
            ExpenseRecord::new(Decimal::from(10), "food", Some("  ".to_string()), at())
                .unwrap();
        assert!(record.description.is_none());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = ExpenseRecord::new(Decimal::from(10), "food", None, at()).unwrap();
        let b = ExpenseRecord::new(Decimal::from(10), "food", None, at()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_content_hash_ignores_time_of_day_scale_and_id() {
        let morning = Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2025, 3, 14, 21, 0, 0).unwrap();
        let a = ExpenseRecord::new(Decimal::from(250), "super", None, morning).unwrap();
        let b = ExpenseRecord::new(Decimal::from_str("250.00").unwrap(), "super", None, evening)
            .unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.content_hash(), b.content_hash());
        assert!(a.same_content(&b));
        assert_eq!(a.content_hash().len(), 64);
    }

    #[test]
    fn test_content_hash_differs_on_description_and_day() {
        let leche = ExpenseRecord::new(Decimal::from(250), "super", Some("leche".into()), at())
            .unwrap();
        let pan =
            ExpenseRecord::new(Decimal::from(250), "super", Some("pan".into()), at()).unwrap();
        let next_day = ExpenseRecord::new(
            Decimal::from(250),
            "super",
            Some("leche".into()),
            at() + chrono::Duration::days(1),
        )
        .unwrap();

        assert!(!leche.same_content(&pan));
        assert!(!leche.same_content(&next_day));
    }

    #[test]
    fn test_display() {
        let record = ExpenseRecord::new(Decimal::from(250), "carniceria", None, at()).unwrap();
        assert_eq!(record.to_string(), "$250 carniceria (2025-03-14 18:12)");
    }
}
