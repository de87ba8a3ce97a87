//! Field extraction from semi-structured `key: value` model output.
//!
//! Extraction is total: every expected key is present in the result, mapped
//! to an empty string when the text did not supply it.

use std::collections::HashMap;

/// Parsed fields, keyed by the expected key names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(HashMap<String, String>);

impl Fields {
    /// Value for `key`, if it was one of the expected keys.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Parse `text` into a mapping covering exactly `expected_keys`.
///
/// Each line is split on its first `:`; key and value are trimmed and a
/// single surrounding `[` / `]` is stripped from the value.  Lines without a
/// separator and keys outside `expected_keys` are ignored.  When a key
/// appears on several lines the last one wins.
pub fn extract(text: &str, expected_keys: &[&str]) -> Fields {
    let mut fields: HashMap<String, String> = expected_keys
        .iter()
        .map(|k| (k.to_string(), String::new()))
        .collect();

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if let Some(slot) = fields.get_mut(key.trim()) {
            *slot = strip_placeholder_brackets(value.trim()).to_string();
        }
    }
    Fields(fields)
}

fn strip_placeholder_brackets(value: &str) -> &str {
    let value = value.strip_prefix('[').unwrap_or(value);
    value.strip_suffix(']').unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_expected_keys_and_fills_missing() {
        let fields = extract(
            "action: [calm]\nposture: sitting\ninvalid line\n",
            &["action", "posture", "emotion"],
        );
        assert_eq!(fields.0.len(), 3);
        assert_eq!(fields.get("action"), Some("calm"));
        assert_eq!(fields.get("posture"), Some("sitting"));
        assert_eq!(fields.get("emotion"), Some(""));
    }

    #[test]
    fn empty_text_yields_all_empty() {
        let fields = extract("", &["appearance", "behavior"]);
        assert_eq!(fields.get("appearance"), Some(""));
        assert_eq!(fields.get("behavior"), Some(""));
    }

    #[test]
    fn splits_on_first_colon_only() {
        let fields = extract("activity: watching TV: channel 4 at 10:30", &["activity"]);
        assert_eq!(fields.get("activity"), Some("watching TV: channel 4 at 10:30"));
    }

    #[test]
    fn strips_one_bracket_pair_only() {
        let fields = extract("a: [[nested]]\nb: [open\nc: close]", &["a", "b", "c"]);
        assert_eq!(fields.get("a"), Some("[nested]"));
        assert_eq!(fields.get("b"), Some("open"));
        assert_eq!(fields.get("c"), Some("close"));
    }

    #[test]
    fn tolerates_whitespace_and_crlf() {
        let fields = extract("  emotion :   content  \r\nposture:standing\r\n", &["emotion", "posture"]);
        assert_eq!(fields.get("emotion"), Some("content"));
        assert_eq!(fields.get("posture"), Some("standing"));
    }

    #[test]
    fn unexpected_keys_are_dropped() {
        let fields = extract("mood: fine\naction: waving", &["action"]);
        assert_eq!(fields.get("mood"), None);
        assert_eq!(fields.0.len(), 1);
    }
}
