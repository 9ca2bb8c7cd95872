//! Message fingerprinting for deduplication.
//!
//! A fingerprint is the SHA256 of the normalized message text joined with
//! the message timestamp truncated to the minute. Messaging clients often
//! re-deliver the same message with a different second or a re-rendered
//! whitespace layout; both collapse to one fingerprint.

use crate::models::MessageFingerprint;
use chrono::{DateTime, DurationRound, SecondsFormat, TimeDelta, Utc};
use sha2::{Digest, Sha256};

/// Message hasher for deduplication.
///
/// # Normalization
///
/// Before hashing, text is normalized:
/// - Trimmed of leading/trailing whitespace
/// - Converted to lowercase
/// - Multiple whitespace characters collapsed to single spaces
///
/// The timestamp is converted to UTC and truncated to the minute.
///
/// # Example
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use tallybook::services::MessageHasher;
///
/// let at = Utc.with_ymd_and_hms(2025, 3, 14, 14, 44, 10).unwrap();
/// let later = Utc.with_ymd_and_hms(2025, 3, 14, 14, 44, 55).unwrap();
///
/// let a = MessageHasher::fingerprint("250 Carnicería", at);
/// let b = MessageHasher::fingerprint("  250   carnicería ", later);
/// assert_eq!(a, b);
/// assert_eq!(a.as_str().len(), 64);
/// ```
pub struct MessageHasher;

impl MessageHasher {
    /// Computes the fingerprint of a message.
    #[must_use]
    pub fn fingerprint(text: &str, timestamp: DateTime<Utc>) -> MessageFingerprint {
        let key = format!("{}|{}", Self::normalize(text), Self::minute_key(timestamp));
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        MessageFingerprint::from_hash(hex::encode(hasher.finalize()))
    }

    /// Normalizes message text for consistent hashing.
    ///
    /// ```rust
    /// use tallybook::services::MessageHasher;
    ///
    /// assert_eq!(MessageHasher::normalize("  Hola   MUNDO  "), "hola mundo");
    /// ```
    #[must_use]
    pub fn normalize(text: &str) -> String {
        text.trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Renders the timestamp truncated to the minute as RFC 3339.
    #[must_use]
    pub fn minute_key(timestamp: DateTime<Utc>) -> String {
        timestamp
            .duration_trunc(TimeDelta::minutes(1))
            .unwrap_or(timestamp)
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, h, m, s).unwrap()
    }

    #[test]
    fn test_fingerprint_is_64_char_hex() {
        let fp = MessageHasher::fingerprint("250 carniceria", at(14, 44, 0));
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_minute_same_fingerprint() {
        assert_eq!(
            MessageHasher::fingerprint("500 pizza", at(18, 12, 1)),
            MessageHasher::fingerprint("500 pizza", at(18, 12, 59))
        );
    }

    #[test]
    fn test_different_minute_different_fingerprint() {
        assert_ne!(
            MessageHasher::fingerprint("500 pizza", at(18, 12, 59)),
            MessageHasher::fingerprint("500 pizza", at(18, 13, 0))
        );
    }

    #[test]
    fn test_normalization_case_and_whitespace() {
        assert_eq!(
            MessageHasher::fingerprint("500 Pizza", at(18, 12, 0)),
            MessageHasher::fingerprint("  500\t pizza\n", at(18, 12, 0))
        );
    }

    #[test]
    fn test_different_text_different_fingerprint() {
        assert_ne!(
            MessageHasher::fingerprint("500 pizza", at(18, 12, 0)),
            MessageHasher::fingerprint("600 pizza", at(18, 12, 0))
        );
    }

    #[test]
    fn test_offset_timestamps_hash_as_utc() {
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2025, 3, 14, 11, 12, 30).unwrap();
        assert_eq!(
            MessageHasher::fingerprint("500 pizza", local.with_timezone(&Utc)),
            MessageHasher::fingerprint("500 pizza", at(14, 12, 0))
        );
    }

    #[test]
    fn test_minute_key_format() {
        assert_eq!(MessageHasher::minute_key(at(9, 5, 42)), "2025-03-14T09:05:00Z");
    }

    #[test]
    fn test_unicode_is_lowercased() {
        assert_eq!(MessageHasher::normalize("CARNICERÍA"), "carnicería");
    }
}
