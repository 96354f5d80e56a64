//! Compiles a JSON Schema value into the canonical regex language (spec
//! §4.B). The compiler is a recursive descent keyed on which schema
//! keywords are present; nothing here builds a DFA or touches a vocabulary
//! — that is [`crate::index`]'s job once it has this module's regex string.

use std::collections::HashSet;

use serde_json::Value;
use thiserror::Error;

use crate::regex_consts::{self, BOOLEAN, INTEGER, NULL, NUMBER, STRING, STRING_INNER};

/// How deep an unconstrained `additionalProperties: true`/`{}` schema is
/// allowed to recurse before it bottoms out at a scalar-only pattern.
/// The schema in the teacher's grammar module never revisits this value at
/// runtime, so it is a crate constant rather than a `SchemaOptions` field.
const ANY_VALUE_DEPTH: u32 = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("invalid schema: {message}")]
    InvalidInput { message: String },
    #[error("unsupported schema: {message}")]
    UnsupportedSchema { message: String },
    #[error("$ref recursion exceeded max_recursion_depth")]
    RefRecursionLimit,
    #[error("$ref targets a document other than the root: {reference}")]
    ExternalRef { reference: String },
}

/// Construction-time overrides for [`regex_from_schema`] (spec §4.B, §4.K).
#[derive(Clone, Debug)]
pub struct SchemaOptions {
    pub whitespace_pattern: String,
    pub max_recursion_depth: u32,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            whitespace_pattern: regex_consts::WHITESPACE.to_string(),
            max_recursion_depth: 3,
        }
    }
}

/// Converts a JSON Schema value into a single regex string (spec §4.B,
/// public API `regex_from_schema`).
pub fn regex_from_schema(schema: &Value, options: &SchemaOptions) -> Result<String, SchemaError> {
    let compiler = Compiler {
        root: schema,
        ws: &options.whitespace_pattern,
        max_recursion_depth: options.max_recursion_depth,
    };
    compiler.compile(schema, 0, 0)
}

struct Compiler<'a> {
    root: &'a Value,
    ws: &'a str,
    max_recursion_depth: u32,
}

impl<'a> Compiler<'a> {
    /// `depth` bounds `additionalProperties`/empty-schema expansion.
    /// `ref_depth` bounds `$ref` traversal and is independent of `depth`.
    fn compile(&self, schema: &Value, depth: u32, ref_depth: u32) -> Result<String, SchemaError> {
        match schema {
            Value::Bool(true) => self.any_value(depth),
            Value::Bool(false) => Err(SchemaError::UnsupportedSchema {
                message: "schema `false` admits no value".to_string(),
            }),
            Value::Object(map) => {
                if map.contains_key("properties") {
                    self.object_properties(schema, depth, ref_depth)
                } else if let Some(Value::Array(subs)) = map.get("allOf") {
                    self.all_of(subs, depth, ref_depth)
                } else if let Some(Value::Array(subs)) = map.get("anyOf") {
                    self.any_of(subs, depth, ref_depth)
                } else if let Some(Value::Array(subs)) = map.get("oneOf") {
                    self.one_of(subs, depth, ref_depth)
                } else if map.contains_key("prefixItems") && !map.contains_key("items") {
                    self.prefix_items_tuple(schema, depth, ref_depth)
                } else if let Some(Value::Array(variants)) = map.get("enum") {
                    self.enum_regex(variants)
                } else if let Some(value) = map.get("const") {
                    self.const_pattern(value)
                } else if let Some(Value::String(reference)) = map.get("$ref") {
                    self.ref_regex(reference, depth, ref_depth)
                } else if map.contains_key("type") {
                    self.type_regex(schema, depth, ref_depth)
                } else if map.is_empty() {
                    self.any_value(depth)
                } else {
                    Err(SchemaError::UnsupportedSchema {
                        message: "no recognised schema keyword present".to_string(),
                    })
                }
            }
            other => Err(SchemaError::InvalidInput {
                message: format!("schema must be an object or boolean, got {other}"),
            }),
        }
    }

    /// An empty object / `additionalProperties: true`: the union of every
    /// scalar and container type, bottoming out at `ANY_VALUE_DEPTH`.
    fn any_value(&self, depth: u32) -> Result<String, SchemaError> {
        let mut alternatives = vec![
            STRING.to_string(),
            INTEGER.to_string(),
            NUMBER.to_string(),
            BOOLEAN.to_string(),
            NULL.to_string(),
        ];
        if depth < ANY_VALUE_DEPTH {
            let object_schema = serde_json::json!({"additionalProperties": true});
            let array_schema = serde_json::json!({"items": true});
            alternatives.push(self.object_additional_properties(&object_schema, depth + 1)?);
            alternatives.push(self.array_regex(&array_schema, depth + 1, 0)?);
        } else {
            alternatives.push(r"\{[ ]?\}".to_string());
            alternatives.push(r"\[[ ]?\]".to_string());
        }
        Ok(format!("(?:{})", alternatives.join("|")))
    }

    fn type_regex(&self, schema: &Value, depth: u32, ref_depth: u32) -> Result<String, SchemaError> {
        let ty = schema.get("type").expect("caller checked type is present");
        match ty {
            Value::String(name) => self.type_for_name(name, schema, depth, ref_depth),
            Value::Array(names) => {
                let alts: Result<Vec<String>, SchemaError> = names
                    .iter()
                    .map(|n| match n {
                        Value::String(name) => self.type_for_name(name, schema, depth, ref_depth),
                        _ => Err(SchemaError::UnsupportedSchema {
                            message: "type array must contain only strings".to_string(),
                        }),
                    })
                    .collect();
                Ok(format!("(?:{})", alts?.join("|")))
            }
            _ => Err(SchemaError::UnsupportedSchema {
                message: "type must be a string or array of strings".to_string(),
            }),
        }
    }

    fn type_for_name(
        &self,
        name: &str,
        schema: &Value,
        depth: u32,
        ref_depth: u32,
    ) -> Result<String, SchemaError> {
        match name {
            "string" => self.string_regex(schema),
            "integer" => self.number_like_regex(schema, INTEGER),
            "number" => self.number_like_regex(schema, NUMBER),
            "boolean" => Ok(BOOLEAN.to_string()),
            "null" => Ok(NULL.to_string()),
            "object" => self.object_additional_properties(schema, depth + 1),
            "array" => self.array_regex(schema, depth + 1, ref_depth),
            other => Err(SchemaError::UnsupportedSchema {
                message: format!("unknown type {other:?}"),
            }),
        }
    }

    fn string_regex(&self, schema: &Value) -> Result<String, SchemaError> {
        if let (Some(min), Some(max)) = (
            schema.get("minLength").and_then(Value::as_u64),
            schema.get("maxLength").and_then(Value::as_u64),
        ) {
            if min > max {
                return Err(SchemaError::InvalidInput {
                    message: format!("minLength {min} > maxLength {max}"),
                });
            }
            return Ok(format!("\"{STRING_INNER}{{{min},{max}}}\""));
        }
        if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
            return Ok(format!("\"{STRING_INNER}{{{min},}}\""));
        }
        if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
            return Ok(format!("\"{STRING_INNER}{{0,{max}}}\""));
        }
        if let Some(Value::String(pattern)) = schema.get("pattern") {
            let body = pattern.trim_start_matches('^').trim_end_matches('$');
            return Ok(format!("\"{body}\""));
        }
        if let Some(Value::String(format)) = schema.get("format") {
            return match regex_consts::format_pattern(format) {
                Some(pattern) => Ok(format!("\"{pattern}\"")),
                None => Err(SchemaError::UnsupportedSchema {
                    message: format!("unknown string format {format:?}"),
                }),
            };
        }
        Ok(STRING.to_string())
    }

    fn number_like_regex(&self, schema: &Value, base: &str) -> Result<String, SchemaError> {
        let min_digits = schema
            .get("minDigitsInteger")
            .or_else(|| schema.get("minDigits"))
            .and_then(Value::as_u64);
        let max_digits = schema
            .get("maxDigitsInteger")
            .or_else(|| schema.get("maxDigits"))
            .and_then(Value::as_u64);
        match (min_digits, max_digits) {
            (None, None) => Ok(base.to_string()),
            (min, max) => {
                let min = min.unwrap_or(1);
                if let Some(max) = max {
                    if max < min {
                        return Err(SchemaError::InvalidInput {
                            message: format!("maxDigits {max} < minDigits {min}"),
                        });
                    }
                    Ok(format!("(-)?[0-9]{{{min},{max}}}"))
                } else {
                    Ok(format!("(-)?[0-9]{{{min},}}"))
                }
            }
        }
    }

    fn object_properties(
        &self,
        schema: &Value,
        depth: u32,
        ref_depth: u32,
    ) -> Result<String, SchemaError> {
        let ws = self.ws;
        let properties = match schema.get("properties") {
            Some(Value::Object(map)) => map,
            _ => {
                return Err(SchemaError::InvalidInput {
                    message: "properties must be an object".to_string(),
                })
            }
        };
        let required: HashSet<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut entries = Vec::new();
        for (key, value_schema) in properties.iter() {
            match self.compile(value_schema, depth + 1, ref_depth) {
                Ok(pattern) => entries.push((key.as_str(), pattern, required.contains(key.as_str()))),
                Err(SchemaError::RefRecursionLimit) if !required.contains(key.as_str()) => continue,
                Err(err) => return Err(err),
            }
        }

        if entries.iter().all(|(_, _, req)| !req) {
            // No required property: the permitted set is the empty object
            // plus every non-empty prefix of the declared properties, in
            // declaration order (spec §9 pins declaration order, not
            // arbitrary permutation).
            let mut alternatives = vec![format!("\\{{{ws}\\}}")];
            for take in 1..=entries.len() {
                let mut body = String::new();
                for (i, (key, pattern, _)) in entries[..take].iter().enumerate() {
                    if i > 0 {
                        body.push_str(&format!("{ws},{ws}"));
                    }
                    body.push_str(&format!("\"{key}\"{ws}:{ws}{pattern}"));
                }
                alternatives.push(format!("\\{{{ws}{body}{ws}\\}}"));
            }
            return Ok(format!("(?:{})", alternatives.join("|")));
        }

        let last_required = entries
            .iter()
            .rposition(|(_, _, required)| *required)
            .expect("checked at least one required entry exists");

        let mut body = String::new();
        for (i, (key, pattern, required)) in entries.iter().enumerate() {
            let mut part = format!("{ws}\"{key}\"{ws}:{ws}{pattern}");
            use std::cmp::Ordering;
            match i.cmp(&last_required) {
                Ordering::Less => part.push(','),
                Ordering::Greater => part = format!(",{part}"),
                Ordering::Equal => {}
            }
            if !*required {
                part = format!("({part})?");
            }
            body.push_str(&part);
        }
        Ok(format!("\\{{{body}{ws}\\}}"))
    }

    fn object_additional_properties(&self, schema: &Value, depth: u32) -> Result<String, SchemaError> {
        let ws = self.ws;
        let min_properties = schema.get("minProperties").and_then(Value::as_u64).unwrap_or(0);
        let max_properties = schema.get("maxProperties").and_then(Value::as_u64);

        let value_pattern = match schema.get("additionalProperties") {
            None | Some(Value::Bool(true)) => self.any_value(depth)?,
            Some(Value::Bool(false)) => {
                return if min_properties == 0 {
                    Ok(format!("\\{{{ws}\\}}"))
                } else {
                    Err(SchemaError::InvalidInput {
                        message: "additionalProperties: false cannot satisfy minProperties >= 1"
                            .to_string(),
                    })
                }
            }
            Some(value) => self.compile(value, depth + 1, 0)?,
        };

        let entry = format!("{STRING}{ws}:{ws}{value_pattern}");
        let min_repeat = min_properties.saturating_sub(1);
        let repeat = match max_properties {
            Some(max) => format!("{{{min_repeat},{}}}", max.saturating_sub(1)),
            None if min_repeat == 0 => "*".to_string(),
            None => format!("{{{min_repeat},}}"),
        };
        let full = format!("\\{{{ws}{entry}({ws},{ws}{entry}){repeat}{ws}\\}}");
        if min_properties == 0 {
            Ok(format!("(?:{full}|\\{{{ws}\\}})"))
        } else {
            Ok(full)
        }
    }

    fn array_regex(&self, schema: &Value, depth: u32, ref_depth: u32) -> Result<String, SchemaError> {
        let ws = self.ws;
        if let Some(items) = schema.get("items") {
            let item_pattern = match items {
                Value::Bool(true) => self.any_value(depth)?,
                other => self.compile(other, depth, ref_depth)?,
            };
            let min_items = schema.get("minItems").and_then(Value::as_u64).unwrap_or(0);
            let max_items = schema.get("maxItems").and_then(Value::as_u64);
            let min_repeat = min_items.saturating_sub(1);
            let repeat = match max_items {
                Some(max) => format!("{{{min_repeat},{}}}", max.saturating_sub(1)),
                None if min_repeat == 0 => "*".to_string(),
                None => format!("{{{min_repeat},}}"),
            };
            let body = format!("({item_pattern}({ws},{ws}{item_pattern}){repeat})");
            let body = if min_items == 0 { format!("{body}?") } else { body };
            return Ok(format!("\\[{ws}{body}{ws}\\]"));
        }
        if let Some(Value::Array(prefix_items)) = schema.get("prefixItems") {
            let parts: Result<Vec<String>, SchemaError> = prefix_items
                .iter()
                .map(|item| self.compile(item, depth, ref_depth))
                .collect();
            let body = parts?.join(&format!("{ws},{ws}"));
            return Ok(format!("\\[{ws}{body}{ws}\\]"));
        }
        Ok(format!("\\[{ws}\\]"))
    }

    fn prefix_items_tuple(
        &self,
        schema: &Value,
        depth: u32,
        ref_depth: u32,
    ) -> Result<String, SchemaError> {
        self.array_regex(schema, depth, ref_depth)
    }

    fn enum_regex(&self, variants: &[Value]) -> Result<String, SchemaError> {
        let parts: Result<Vec<String>, SchemaError> =
            variants.iter().map(|v| self.const_pattern(v)).collect();
        Ok(format!("(?:{})", parts?.join("|")))
    }

    fn const_pattern(&self, value: &Value) -> Result<String, SchemaError> {
        Ok(self.literal_pattern(value))
    }

    fn literal_pattern(&self, value: &Value) -> String {
        let ws = self.ws;
        match value {
            Value::Null => NULL.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => regex::escape(&n.to_string()),
            Value::String(s) => regex::escape(&serde_json::to_string(s).unwrap_or_default()),
            Value::Array(items) => {
                let inner = items
                    .iter()
                    .map(|v| self.literal_pattern(v))
                    .collect::<Vec<_>>()
                    .join(&format!("{ws},{ws}"));
                format!("\\[{ws}{inner}{ws}\\]")
            }
            Value::Object(map) => {
                let inner = map
                    .iter()
                    .map(|(k, v)| {
                        format!(
                            "{}{ws}:{ws}{}",
                            regex::escape(&serde_json::to_string(k).unwrap_or_default()),
                            self.literal_pattern(v)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(&format!("{ws},{ws}"));
                format!("\\{{{ws}{inner}{ws}\\}}")
            }
        }
    }

    fn all_of(&self, subs: &[Value], depth: u32, ref_depth: u32) -> Result<String, SchemaError> {
        if subs.is_empty() {
            return Err(SchemaError::InvalidInput {
                message: "allOf must be a non-empty array".to_string(),
            });
        }
        let parts: Result<Vec<String>, SchemaError> =
            subs.iter().map(|s| self.compile(s, depth, ref_depth)).collect();
        Ok(parts?.into_iter().map(|p| format!("(?:{p})")).collect::<Vec<_>>().concat())
    }

    fn any_of(&self, subs: &[Value], depth: u32, ref_depth: u32) -> Result<String, SchemaError> {
        if subs.is_empty() {
            return Err(SchemaError::InvalidInput {
                message: "anyOf must be a non-empty array".to_string(),
            });
        }
        let mut parts = Vec::new();
        for sub in subs {
            match self.compile(sub, depth, ref_depth) {
                Ok(pattern) => parts.push(pattern),
                Err(SchemaError::RefRecursionLimit) => continue,
                Err(err) => return Err(err),
            }
        }
        if parts.is_empty() {
            return Err(SchemaError::RefRecursionLimit);
        }
        Ok(format!("(?:{})", parts.join("|")))
    }

    fn one_of(&self, subs: &[Value], depth: u32, ref_depth: u32) -> Result<String, SchemaError> {
        // Conformance surface treats `oneOf` as `anyOf`-shaped alternation;
        // the regex language has no exclusivity operator to enforce "exactly
        // one" at the DFA level.
        self.any_of(subs, depth, ref_depth)
    }

    fn ref_regex(&self, reference: &str, depth: u32, ref_depth: u32) -> Result<String, SchemaError> {
        if !reference.starts_with('#') {
            return Err(SchemaError::ExternalRef {
                reference: reference.to_string(),
            });
        }
        if ref_depth >= self.max_recursion_depth {
            return Err(SchemaError::RefRecursionLimit);
        }
        let pointer = reference.trim_start_matches('#');
        let target = self.root.pointer(pointer).ok_or_else(|| SchemaError::InvalidInput {
            message: format!("$ref pointer not found: {reference}"),
        })?;
        self.compile(target, depth, ref_depth + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn compile(schema: Value) -> String {
        regex_from_schema(&schema, &SchemaOptions::default()).expect("schema should compile")
    }

    fn anchored(pattern: &str) -> Regex {
        Regex::new(&format!("^{pattern}$")).unwrap()
    }

    #[test]
    fn object_with_required_properties_matches_declaration_order_only() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {"name": {"type": "string"}, "age": {"type": "integer"}},
            "required": ["name", "age"]
        });
        let pattern = compile(schema);
        let re = anchored(&pattern);
        assert!(re.is_match(r#"{"name":"Alice","age":30}"#));
        assert!(re.is_match(r#"{ "name":"x","age":0 }"#));
        assert!(!re.is_match(r#"{"age":30,"name":"Alice"}"#));
        assert!(!re.is_match(r#"{"name":"Alice"}"#));
        assert!(!re.is_match(r#"{"name":"Alice","age":"30"}"#));
    }

    #[test]
    fn empty_properties_object_allows_only_empty_object() {
        let schema = serde_json::json!({"type": "object", "properties": {}});
        let re = anchored(&compile(schema));
        assert!(re.is_match("{}"));
        assert!(re.is_match("{ }"));
    }

    #[test]
    fn no_required_properties_allows_only_declared_prefixes() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {"a": {"type": "boolean"}, "b": {"type": "boolean"}}
        });
        let re = anchored(&compile(schema));
        assert!(re.is_match("{}"));
        assert!(re.is_match(r#"{"a":true}"#));
        assert!(re.is_match(r#"{"a":true,"b":false}"#));
        assert!(!re.is_match(r#"{"b":false}"#));
    }

    #[test]
    fn min_items_max_items_zero_allows_only_empty_array() {
        let schema = serde_json::json!({"type": "array", "items": {"type": "boolean"}, "minItems": 0, "maxItems": 0});
        let re = anchored(&compile(schema));
        assert!(re.is_match("[]"));
        assert!(!re.is_match("[true]"));
    }

    #[test]
    fn single_alternative_any_of() {
        let schema = serde_json::json!({"anyOf": [{"type": "boolean"}]});
        let re = anchored(&compile(schema));
        assert!(re.is_match("true"));
        assert!(!re.is_match("1"));
    }

    #[test]
    fn ref_cycle_expands_to_max_recursion_depth_then_terminates() {
        let schema = serde_json::json!({
            "$defs": {
                "node": {
                    "type": "object",
                    "properties": {
                        "child": {"anyOf": [{"$ref": "#/$defs/node"}, {"type": "null"}]}
                    },
                    "required": ["child"]
                }
            },
            "$ref": "#/$defs/node"
        });
        let pattern = regex_from_schema(
            &schema,
            &SchemaOptions {
                whitespace_pattern: regex_consts::WHITESPACE.to_string(),
                max_recursion_depth: 3,
            },
        )
        .expect("cyclic ref should compile by dropping the branch past the depth limit");
        let re = anchored(&pattern);
        assert!(re.is_match(r#"{"child":{"child":{"child":null}}}"#));
        assert!(!re.is_match(
            r#"{"child":{"child":{"child":{"child":null}}}}"#
        ));
    }

    #[test]
    fn external_ref_is_rejected() {
        let schema = serde_json::json!({"$ref": "other.json#/defs/x"});
        let err = regex_from_schema(&schema, &SchemaOptions::default()).unwrap_err();
        assert!(matches!(err, SchemaError::ExternalRef { .. }));
    }

    #[test]
    fn unknown_format_is_unsupported() {
        let schema = serde_json::json!({"type": "string", "format": "ipv4"});
        let err = regex_from_schema(&schema, &SchemaOptions::default()).unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedSchema { .. }));
    }

    #[test]
    fn const_and_enum_round_trip() {
        let schema = serde_json::json!({"enum": ["red", "green", "blue"]});
        let re = anchored(&compile(schema));
        assert!(re.is_match(r#""red""#));
        assert!(!re.is_match(r#""purple""#));
    }
}
