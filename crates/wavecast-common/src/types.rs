//! Common types for Wavecast

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for recipients
pub type RecipientId = Uuid;

/// Unique identifier for contact groups
pub type ContactGroupId = Uuid;

/// An E.164-normalized mobile number.
///
/// Stored as the canonical `+<country code><subscriber number>` form with
/// 8 to 15 digits total. Construction only succeeds through [`parse`],
/// which normalizes common formatting (spaces, dashes, dots, parentheses,
/// `00` international prefix).
///
/// [`parse`]: PhoneNumber::parse
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parse and normalize a mobile number into E.164 form
    pub fn parse(s: &str) -> Option<Self> {
        let stripped: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
            .collect();

        let digits = if let Some(rest) = stripped.strip_prefix('+') {
            rest.to_string()
        } else if let Some(rest) = stripped.strip_prefix("00") {
            rest.to_string()
        } else {
            return None;
        };

        if digits.len() < 8 || digits.len() > 15 {
            return None;
        }
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        // E.164 country codes never start with zero
        if digits.starts_with('0') {
            return None;
        }

        Some(Self(format!("+{}", digits)))
    }

    /// Get the normalized number as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
            .ok_or_else(|| crate::Error::Validation(format!("Invalid mobile number: {}", s)))
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_phone_number_parse() {
        let number = PhoneNumber::parse("+1 (555) 010-2345").unwrap();
        assert_eq!(number.as_str(), "+15550102345");
    }

    #[test]
    fn test_phone_number_double_zero_prefix() {
        let number = PhoneNumber::parse("0044 7700 900123").unwrap();
        assert_eq!(number.as_str(), "+447700900123");
    }

    #[test]
    fn test_phone_number_invalid() {
        // No international prefix
        assert!(PhoneNumber::parse("5550102345").is_none());
        // Too short / too long
        assert!(PhoneNumber::parse("+1555").is_none());
        assert!(PhoneNumber::parse("+1234567890123456").is_none());
        // Letters
        assert!(PhoneNumber::parse("+1555CALLNOW").is_none());
        // Country code starting with zero
        assert!(PhoneNumber::parse("+0155501023").is_none());
    }

    #[test]
    fn test_phone_number_canonical_equality() {
        let a = PhoneNumber::parse("+15550102345").unwrap();
        let b = PhoneNumber::parse("001 555 010 2345").unwrap();
        assert_eq!(a, b);
    }
}
