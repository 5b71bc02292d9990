//! Per-user preference values.
//!
//! The server stores preferences as plain strings and treats `"0"` as "clear
//! this preference", so values are framed before sending: a set value gets a
//! leading `_`, a cleared one is sent as `"0"`. That keeps `None`, `Some("")`
//! and `Some("0")` distinct.

use crate::error::{ApiError, Result};

pub const MAX_PREF_ID: u32 = 200;
pub const MAX_VALUE_LEN: usize = 127;

const CLEARED: &str = "0";
const VALUE_PREFIX: char = '_';

pub fn validate_id(pref_id: u32) -> Result<()> {
    if pref_id > MAX_PREF_ID {
        return Err(ApiError::invalid_parameter(format!(
            "preference id must be between 0 and {MAX_PREF_ID}, got {pref_id}"
        )));
    }
    Ok(())
}

pub fn validate_value(value: Option<&str>) -> Result<()> {
    if let Some(value) = value {
        let len = value.chars().count();
        if len > MAX_VALUE_LEN {
            return Err(ApiError::invalid_parameter(format!(
                "preference value may be at most {MAX_VALUE_LEN} characters, got {len}"
            )));
        }
    }
    Ok(())
}

pub fn encode(value: Option<&str>) -> String {
    match value {
        Some(value) => format!("{VALUE_PREFIX}{value}"),
        None => CLEARED.to_string(),
    }
}

/// Inverse of `encode`. An empty value reads back as `None`; values written
/// by other clients without the prefix, a bare `"0"` included, are returned
/// verbatim. The server never stores `"0"` itself since it means "clear".
pub fn decode(stored: &str) -> Option<String> {
    if stored.is_empty() {
        return None;
    }
    Some(stored.strip_prefix(VALUE_PREFIX).unwrap_or(stored).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_and_empty_are_distinct() {
        assert_ne!(encode(None), encode(Some("")));
        assert_eq!(decode(""), None);
        assert_eq!(decode(&encode(Some(""))), Some(String::new()));
    }

    #[test]
    fn values_survive_round_trip() {
        for value in ["0", "_", "_x", "hello world", "\u{1f600}"] {
            assert_eq!(decode(&encode(Some(value))).as_deref(), Some(value), "{value:?}");
        }
    }

    #[test]
    fn unprefixed_values_are_verbatim() {
        assert_eq!(decode("legacy").as_deref(), Some("legacy"));
        assert_eq!(decode("0").as_deref(), Some("0"));
        assert_eq!(decode(""), None);
    }

    #[test]
    fn id_bounds() {
        assert!(validate_id(0).is_ok());
        assert!(validate_id(200).is_ok());
        assert!(matches!(
            validate_id(201),
            Err(ApiError::InvalidParameter { code: 100, .. })
        ));
    }

    #[test]
    fn value_length_counts_characters() {
        assert!(validate_value(None).is_ok());
        assert!(validate_value(Some(&"é".repeat(127))).is_ok());
        assert!(validate_value(Some(&"a".repeat(128))).is_err());
    }
}
