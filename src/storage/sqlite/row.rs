//! Row conversions for the cache database.

use crate::models::{CacheEntry, MessageFingerprint};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rusqlite::Row;
use std::str::FromStr;

/// Converts a timestamp to unix seconds for storage.
#[must_use]
pub const fn to_unix_seconds(ts: DateTime<Utc>) -> i64 {
    ts.timestamp()
}

/// Converts stored unix seconds back to a timestamp.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the value is out of chrono's range.
pub fn from_unix_seconds(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::InvalidInput(format!("timestamp out of range: {secs}")))
}

/// Parses a decimal amount stored as TEXT.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the text is not a decimal.
pub fn decimal_from_sql(text: &str) -> Result<Decimal> {
    Decimal::from_str(text).map_err(|e| Error::InvalidInput(format!("amount '{text}': {e}")))
}

/// Raw `processed_messages` row as read from `SQLite`.
#[derive(Debug)]
pub struct CacheEntryRow {
    fingerprint: String,
    raw_text: String,
    message_timestamp: i64,
    is_system_message: bool,
    is_expense: bool,
    expense_amount: Option<String>,
    expense_category: Option<String>,
    cached_at: i64,
}

impl CacheEntryRow {
    /// Column list matching [`CacheEntryRow::from_row`].
    pub const COLUMNS: &'static str = "fingerprint, raw_text, message_timestamp, \
        is_system_message, is_expense, expense_amount, expense_category, cached_at";

    /// Reads a row selected with [`CacheEntryRow::COLUMNS`].
    ///
    /// # Errors
    ///
    /// Returns the underlying `rusqlite` error on a type mismatch.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            fingerprint: row.get(0)?,
            raw_text: row.get(1)?,
            message_timestamp: row.get(2)?,
            is_system_message: row.get(3)?,
            is_expense: row.get(4)?,
            expense_amount: row.get(5)?,
            expense_category: row.get(6)?,
            cached_at: row.get(7)?,
        })
    }

    /// Converts the row into a [`CacheEntry`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a stored amount or timestamp is
    /// malformed.
    pub fn into_entry(self) -> Result<CacheEntry> {
        let expense_amount = self
            .expense_amount
            .as_deref()
            .map(decimal_from_sql)
            .transpose()?;

        Ok(CacheEntry {
            fingerprint: MessageFingerprint::from_hash(self.fingerprint),
            raw_text: self.raw_text,
            timestamp: from_unix_seconds(self.message_timestamp)?,
            is_system_message: self.is_system_message,
            is_expense: self.is_expense,
            expense_amount,
            expense_category: self.expense_category,
            cached_at: from_unix_seconds(self.cached_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unix_seconds_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 14, 18, 12, 5).unwrap();
        assert_eq!(from_unix_seconds(to_unix_seconds(ts)).unwrap(), ts);
        assert!(from_unix_seconds(i64::MAX).is_err());
    }

    #[test]
    fn test_decimal_from_sql() {
        assert_eq!(decimal_from_sql("12.50").unwrap(), Decimal::new(1250, 2));
        assert!(decimal_from_sql("twelve").is_err());
    }
}
