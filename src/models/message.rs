//! Message cache types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ExpenseRecord;

/// Dedup key for a chat message.
///
/// Derived from normalized message text plus the timestamp truncated to the
/// minute; see [`crate::services::MessageHasher`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageFingerprint(String);

impl MessageFingerprint {
    /// Wraps an already computed fingerprint hash.
    #[must_use]
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Returns the fingerprint as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short prefix suitable for log fields.
    #[must_use]
    pub fn short(&self) -> &str {
        let len = self.0.len().min(12);
        &self.0[..len]
    }
}

impl fmt::Display for MessageFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cached verdict for a single message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Dedup key.
    pub fingerprint: MessageFingerprint,
    /// Message text as received.
    pub raw_text: String,
    /// Message timestamp as supplied by the messaging source.
    pub timestamp: DateTime<Utc>,
    /// Whether the message is an administrative/system notice.
    pub is_system_message: bool,
    /// Whether evaluating the message produced an expense.
    pub is_expense: bool,
    /// Amount of the produced expense, if any.
    pub expense_amount: Option<Decimal>,
    /// Category of the produced expense, if any.
    pub expense_category: Option<String>,
    /// When this verdict was written.
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Entry for a message recognized as a system notice.
    #[must_use]
    pub fn system(
        fingerprint: MessageFingerprint,
        raw_text: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            fingerprint,
            raw_text: raw_text.to_string(),
            timestamp,
            is_system_message: true,
            is_expense: false,
            expense_amount: None,
            expense_category: None,
            cached_at: Utc::now(),
        }
    }

    /// Entry for an evaluated message, with the expense it produced if any.
    #[must_use]
    pub fn evaluated(
        fingerprint: MessageFingerprint,
        raw_text: &str,
        timestamp: DateTime<Utc>,
        expense: Option<&ExpenseRecord>,
    ) -> Self {
        Self {
            fingerprint,
            raw_text: raw_text.to_string(),
            timestamp,
            is_system_message: false,
            is_expense: expense.is_some(),
            expense_amount: expense.map(|e| e.amount),
            expense_category: expense.map(|e| e.category.clone()),
            cached_at: Utc::now(),
        }
    }

    /// Sets `cached_at`, mainly for backfills and tests.
    #[must_use]
    pub const fn with_cached_at(mut self, cached_at: DateTime<Utc>) -> Self {
        self.cached_at = cached_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_evaluated_entry_copies_expense_fields() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 14, 14, 44, 0).unwrap();
        let expense =
            ExpenseRecord::new(Decimal::from(250), "carniceria", None, ts).unwrap();
        let entry = CacheEntry::evaluated(
            MessageFingerprint::from_hash("abc"),
            "250 carnicería",
            ts,
            Some(&expense),
        );

        assert!(entry.is_expense);
        assert!(!entry.is_system_message);
        assert_eq!(entry.expense_amount, Some(Decimal::from(250)));
        assert_eq!(entry.expense_category.as_deref(), Some("carniceria"));
    }

    #[test]
    fn test_system_entry() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 14, 14, 44, 0).unwrap();
        let entry = CacheEntry::system(MessageFingerprint::from_hash("abc"), "notice", ts);
        assert!(entry.is_system_message);
        assert!(!entry.is_expense);
        assert!(entry.expense_amount.is_none());
    }

    #[test]
    fn test_fingerprint_short() {
        let fp = MessageFingerprint::from_hash("0123456789abcdef");
        assert_eq!(fp.short(), "0123456789ab");
        assert_eq!(MessageFingerprint::from_hash("abc").short(), "abc");
    }
}
