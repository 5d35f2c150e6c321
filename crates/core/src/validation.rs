//! Field limits, sanitization and constraint checks
//!
//! Every write goes through here before a transaction opens. Sanitization is
//! lossy: over-long strings are silently truncated. Validation collects every
//! violated constraint instead of stopping at the first one.

use std::fmt;

use crate::errors::{Result, SidebarError};

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_CONVERSATION_CONTENT_LENGTH: usize = 100_000;
pub const MAX_PROMPT_CONTENT_LENGTH: usize = 50_000;
pub const MAX_NOTES_LENGTH: usize = 5_000;
pub const MAX_PROVIDER_LENGTH: usize = 20;
pub const MAX_CATEGORY_LENGTH: usize = 50;
pub const MAX_CONVERSATION_ID_LENGTH: usize = 200;
pub const MAX_URL_LENGTH: usize = 500;
pub const MAX_TAG_LENGTH: usize = 30;
pub const MAX_TAGS_COUNT: usize = 20;

/// A single violated constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Field missing or blank after trimming
    Required(&'static str),
    /// Field longer than its limit
    TooLong { field: &'static str, max: usize },
    /// Sequence with more entries than allowed
    TooMany { what: &'static str, max: usize },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Required(field) => write!(f, "{} is required", field),
            Violation::TooLong { field, max } => {
                write!(f, "{} must be less than {} characters", field, max)
            },
            Violation::TooMany { what, max } => write!(f, "Maximum {} {} allowed", max, what),
        }
    }
}

/// Turn collected violations into a result
pub fn check(violations: Vec<Violation>) -> Result<()> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(SidebarError::ValidationError(violations))
    }
}

/// Trim, then truncate to `max_length` characters
///
/// Missing input becomes the empty string. Whitespace exposed at the end by
/// the cut is trimmed as well, which keeps the function idempotent.
pub fn sanitize_string(value: Option<&str>, max_length: usize) -> String {
    let Some(value) = value else {
        return String::new();
    };

    let trimmed = value.trim();
    match trimmed.char_indices().nth(max_length) {
        Some((cut, _)) => trimmed[..cut].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

/// Keep the first `MAX_TAGS_COUNT` tags, each sanitized, dropping empties
pub fn sanitize_tags(tags: Option<&[String]>) -> Vec<String> {
    tags.unwrap_or_default()
        .iter()
        .take(MAX_TAGS_COUNT)
        .map(|tag| sanitize_string(Some(tag), MAX_TAG_LENGTH))
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// True when the value is missing or whitespace only
pub fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Length in characters, which is what every limit is expressed in
pub fn char_len(value: &str) -> usize {
    value.chars().count()
}

/// Lenient decoders for JSON payloads coming from the side panel
///
/// Payloads are loosely typed: a number where a string is expected is treated
/// as if the field were missing, flags follow truthiness.
pub mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    /// Arrays keep their length; non-string entries become empty strings
    pub fn string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Array(items) => Some(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => s,
                        _ => String::new(),
                    })
                    .collect(),
            ),
            _ => None,
        })
    }

    pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(truthy(&Value::deserialize(deserializer)?))
    }

    /// Positive integers only; anything else counts as missing
    pub fn integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .filter(|n| *n > 0),
            _ => None,
        })
    }

    fn truthy(value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_sanitize_trims_and_truncates() {
        assert_eq!(sanitize_string(Some("  Test String  "), 200), "Test String");
        assert_eq!(sanitize_string(Some(&"a".repeat(300)), 200).len(), 200);
    }

    #[test]
    fn test_sanitize_missing_is_empty() {
        assert_eq!(sanitize_string(None, 10), "");
    }

    #[test]
    fn test_sanitize_counts_characters_not_bytes() {
        let result = sanitize_string(Some("你好世界🌍"), 3);
        assert_eq!(result, "你好世");
    }

    #[test]
    fn test_sanitize_trims_whitespace_exposed_by_cut() {
        assert_eq!(sanitize_string(Some("ab cd"), 3), "ab");
    }

    #[test]
    fn test_sanitize_tags() {
        let tags = vec![
            "  rust ".to_string(),
            "".to_string(),
            "x".repeat(40),
            "   ".to_string(),
        ];
        let result = sanitize_tags(Some(tags.as_slice()));
        assert_eq!(result, vec!["rust".to_string(), "x".repeat(MAX_TAG_LENGTH)]);
    }

    #[test]
    fn test_sanitize_tags_caps_count() {
        let tags: Vec<String> = (0..25).map(|i| format!("tag{}", i)).collect();
        assert_eq!(sanitize_tags(Some(tags.as_slice())).len(), MAX_TAGS_COUNT);
        assert!(sanitize_tags(None).is_empty());
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(None));
        assert!(is_blank(Some("   \n\t")));
        assert!(!is_blank(Some(" a ")));
    }

    #[test]
    fn test_violation_messages() {
        assert_eq!(
            Violation::Required("Conversation content").to_string(),
            "Conversation content is required"
        );
        assert_eq!(
            Violation::TooLong {
                field: "Title",
                max:   200,
            }
            .to_string(),
            "Title must be less than 200 characters"
        );
        assert_eq!(
            Violation::TooMany {
                what: "tags",
                max:  20,
            }
            .to_string(),
            "Maximum 20 tags allowed"
        );
    }

    #[test]
    fn test_check() {
        assert!(check(vec![]).is_ok());
        let err = check(vec![Violation::Required("Prompt content")]).unwrap_err();
        assert_eq!(err.to_string(), "Prompt content is required");
    }

    #[derive(Debug, Deserialize)]
    struct Payload {
        #[serde(default, deserialize_with = "lenient::string")]
        text: Option<String>,
        #[serde(default, deserialize_with = "lenient::string_list")]
        tags: Option<Vec<String>>,
        #[serde(default, deserialize_with = "lenient::flag")]
        flag: bool,
        #[serde(default, deserialize_with = "lenient::integer")]
        number: Option<i64>,
    }

    #[test]
    fn test_lenient_decoding() {
        let payload: Payload = serde_json::from_value(json!({
            "text": 12345,
            "tags": ["a", 1, "b"],
            "flag": "yes",
            "number": 1700000000000u64
        }))
        .unwrap();

        assert_eq!(payload.text, None);
        assert_eq!(
            payload.tags,
            Some(vec!["a".to_string(), String::new(), "b".to_string()])
        );
        assert!(payload.flag);
        assert_eq!(payload.number, Some(1_700_000_000_000));
    }

    #[test]
    fn test_lenient_defaults() {
        let payload: Payload =
            serde_json::from_value(json!({"tags": "not-array", "flag": 0, "number": "x"}))
                .unwrap();
        assert_eq!(payload.text, None);
        assert_eq!(payload.tags, None);
        assert!(!payload.flag);
        assert_eq!(payload.number, None);
    }

    proptest! {
        #[test]
        fn prop_sanitize_is_idempotent(s in "\\PC*", n in 0usize..64) {
            let once = sanitize_string(Some(&s), n);
            let twice = sanitize_string(Some(&once), n);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_sanitize_respects_limit(s in "\\PC*", n in 0usize..64) {
            prop_assert!(char_len(&sanitize_string(Some(&s), n)) <= n);
        }
    }
}
