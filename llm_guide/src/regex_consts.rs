//! Byte-exact regex fragments for JSON scalar types and common string
//! formats (spec §4.A). These are the leaves [`crate::json_schema`] splices
//! together; nothing here inspects a schema.

/// Deliberately narrow: permissive whitespace lets small models wander
/// between tokens that are individually valid but jointly nonsensical.
pub const WHITESPACE: &str = "[ ]?";

pub const STRING_INNER: &str = r#"([^"\\\x00-\x1F\x7F-\x9F]|\\["\\])"#;
pub const STRING: &str = r#""([^"\\\x00-\x1F\x7F-\x9F]|\\["\\])*""#;
pub const INTEGER: &str = r"(-)?(0|[1-9][0-9]*)";
pub const NUMBER: &str = r"((-)?(0|[1-9][0-9]*))(\.[0-9]+)?([eE][+-][0-9]+)?";
pub const BOOLEAN: &str = r"(true|false)";
pub const NULL: &str = r"null";

pub const DATE: &str = r"(\d{4})-(0[1-9]|1[0-2])-(0[1-9]|[1-2][0-9]|3[0-1])";
pub const TIME: &str =
    r"(0[0-9]|1[0-9]|2[0-3]):([0-5][0-9]):([0-5][0-9])(\.[0-9]+)?(Z|[+-](0[0-9]|1[0-9]|2[0-3]):([0-5][0-9]))";
pub const DATE_TIME: &str = r"(\d{4})-(0[1-9]|1[0-2])-(0[1-9]|[1-2][0-9]|3[0-1])T(0[0-9]|1[0-9]|2[0-3]):([0-5][0-9]):([0-5][0-9])(\.[0-9]+)?(Z|[+-](0[0-9]|1[0-9]|2[0-3]):([0-5][0-9]))";
pub const UUID: &str =
    r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";
pub const URI: &str = r"[a-zA-Z][a-zA-Z0-9+.-]*://[^\s\x00-\x1F\x7F]*";
pub const EMAIL: &str = r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,63}";

/// Looks up a known `format` keyword value, returning `None` for an
/// unrecognised name so the caller can raise `UnsupportedSchema`.
pub fn format_pattern(name: &str) -> Option<&'static str> {
    match name {
        "date" => Some(DATE),
        "time" => Some(TIME),
        "date-time" => Some(DATE_TIME),
        "uuid" => Some(UUID),
        "uri" => Some(URI),
        "email" => Some(EMAIL),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn anchored(pattern: &str) -> Regex {
        Regex::new(&format!("^{pattern}$")).unwrap()
    }

    #[test]
    fn string_matches_escaped_quote() {
        assert!(anchored(STRING).is_match(r#""a\"b""#));
    }

    #[test]
    fn integer_rejects_leading_zero() {
        let re = anchored(INTEGER);
        assert!(re.is_match("0"));
        assert!(!re.is_match("01"));
        assert!(re.is_match("-12"));
    }

    #[test]
    fn number_allows_fraction_and_exponent() {
        assert!(anchored(NUMBER).is_match("-1.5e+10"));
    }

    #[test]
    fn uuid_format_matches_canonical_form() {
        assert!(anchored(UUID).is_match("123e4567-e89b-12d3-a456-426614174000"));
    }

    #[test]
    fn unknown_format_name_returns_none() {
        assert!(format_pattern("ipv4").is_none());
    }
}
