//! Algebraic regex-combinator terms (spec §4.C): literals, raw regex
//! fragments, alternation/sequence/quantifiers, and a JSON-Schema wrapper,
//! with a total lowering to the canonical regex string and a tree
//! pretty-printer. Every operation here is an exhaustive match over
//! [`Term`]'s variants rather than virtual dispatch across subtypes, per the
//! capability-interface direction this workspace already takes for its
//! tensor backends.

use std::fmt;

use llm_guide_devices::i_nln;
use regex::Regex;
use thiserror::Error;

use crate::json_schema::{self, SchemaError, SchemaOptions};

const MAX_TYPE_DESCRIPTOR_DEPTH: u32 = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DslError {
    #[error("invalid term: {message}")]
    InvalidInput { message: String },
    #[error("type descriptor recursion exceeded the depth cap ({MAX_TYPE_DESCRIPTOR_DEPTH})")]
    RecursionLimit,
    #[error("content did not match pattern {pattern}: {content}")]
    PatternMismatch { pattern: String, content: String },
}

impl From<SchemaError> for DslError {
    fn from(err: SchemaError) -> Self {
        DslError::InvalidInput {
            message: err.to_string(),
        }
    }
}

/// A node in the regex-combinator algebra. Terms are values: freely cloned
/// and shared, compared by tree shape, never by identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Literal(String),
    Regex(String),
    JsonSchema(serde_json::Value, Option<String>),
    KleeneStar(Box<Term>),
    KleenePlus(Box<Term>),
    Optional(Box<Term>),
    Alternatives(Vec<Term>),
    Sequence(Vec<Term>),
    QuantifyExact(Box<Term>, u32),
    QuantifyMin(Box<Term>, u32),
    QuantifyMax(Box<Term>, u32),
    QuantifyBetween(Box<Term>, u32, u32),
    Fsm(String),
    /// An opaque grammar body for [`crate::cfg::CfgLogitsProcessor`]. Not
    /// regex-lowerable — CFG parsing is a scaffolded extension point, not
    /// part of the regex conformance surface.
    Cfg(String),
}

/// True when `pattern` is already a single non-capturing group spanning its
/// full extent (optionally followed by one quantifier suffix), so `to_regex`
/// re-lowering it via [`Term::regex`] would otherwise re-wrap a group that's
/// already there and fail idempotence.
fn is_already_grouped(pattern: &str) -> bool {
    let core = strip_trailing_quantifier(pattern);
    if !core.starts_with("(?:") || !core.ends_with(')') {
        return false;
    }
    let mut depth = 0i32;
    let mut escaped = false;
    let chars: Vec<char> = core.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return i == chars.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

fn strip_trailing_quantifier(pattern: &str) -> &str {
    if let Some(stripped) = pattern
        .strip_suffix('?')
        .or_else(|| pattern.strip_suffix('*'))
        .or_else(|| pattern.strip_suffix('+'))
    {
        return stripped;
    }
    if pattern.ends_with('}') {
        if let Some(start) = pattern.rfind('{') {
            let body = &pattern[start + 1..pattern.len() - 1];
            if !body.is_empty() && body.chars().all(|c| c.is_ascii_digit() || c == ',') {
                return &pattern[..start];
            }
        }
    }
    pattern
}

impl Term {
    pub fn literal(s: impl Into<String>) -> Term {
        Term::Literal(s.into())
    }

    pub fn regex(pattern: impl Into<String>) -> Term {
        Term::Regex(pattern.into())
    }

    pub fn json_schema(schema: serde_json::Value, whitespace_pattern: Option<String>) -> Term {
        Term::JsonSchema(schema, whitespace_pattern)
    }

    /// Opaque pre-built FSM injection point: the DSL treats its regex body
    /// as already-lowered and splices it in verbatim.
    pub fn fsm(regex_body: impl Into<String>) -> Term {
        Term::Fsm(regex_body.into())
    }

    /// Wraps a grammar body for a caller-supplied CFG parser; `to_regex`
    /// rejects it, since the body is not regex-expressible by definition.
    pub fn cfg(grammar: impl Into<String>) -> Term {
        Term::Cfg(grammar.into())
    }

    /// The raw grammar body, for terms built with [`Term::cfg`].
    pub fn as_cfg_grammar(&self) -> Option<&str> {
        match self {
            Term::Cfg(grammar) => Some(grammar),
            _ => None,
        }
    }

    pub fn concat(terms: Vec<Term>) -> Result<Term, DslError> {
        if terms.is_empty() {
            return Err(DslError::InvalidInput {
                message: "Sequence requires at least one term".to_string(),
            });
        }
        Ok(Term::Sequence(terms))
    }

    pub fn alternate(terms: Vec<Term>) -> Result<Term, DslError> {
        if terms.is_empty() {
            return Err(DslError::InvalidInput {
                message: "Alternatives requires at least one term".to_string(),
            });
        }
        Ok(Term::Alternatives(terms))
    }

    /// `either(a, b, c)` sugar over [`Term::alternate`] for literal strings.
    pub fn either(options: impl IntoIterator<Item = impl Into<String>>) -> Result<Term, DslError> {
        Term::alternate(options.into_iter().map(|s| Term::Literal(s.into())).collect())
    }

    pub fn optional(self) -> Term {
        Term::Optional(Box::new(self))
    }

    pub fn star(self) -> Term {
        Term::KleeneStar(Box::new(self))
    }

    pub fn zero_or_more(self) -> Term {
        self.star()
    }

    pub fn plus(self) -> Term {
        Term::KleenePlus(Box::new(self))
    }

    pub fn one_or_more(self) -> Term {
        self.plus()
    }

    pub fn exactly(self, n: u32) -> Term {
        Term::QuantifyExact(Box::new(self), n)
    }

    pub fn at_least(self, m: u32) -> Term {
        Term::QuantifyMin(Box::new(self), m)
    }

    pub fn at_most(self, n: u32) -> Term {
        Term::QuantifyMax(Box::new(self), n)
    }

    pub fn between(self, m: u32, n: u32) -> Result<Term, DslError> {
        if m > n {
            return Err(DslError::InvalidInput {
                message: format!("between requires m <= n, got m={m} n={n}"),
            });
        }
        Ok(Term::QuantifyBetween(Box::new(self), m, n))
    }

    /// Lowers this term to its canonical regex string. Total over literals,
    /// regex bodies, and combinators; fallible only through a `JsonSchema`
    /// child whose schema fails to compile (§4.B).
    pub fn to_regex(&self) -> Result<String, DslError> {
        match self {
            Term::Literal(s) => Ok(regex::escape(s)),
            Term::Regex(pattern) => {
                if is_already_grouped(pattern) {
                    Ok(pattern.clone())
                } else {
                    Ok(format!("(?:{pattern})"))
                }
            }
            Term::Fsm(body) => Ok(format!("(?:{body})")),
            Term::JsonSchema(schema, whitespace_pattern) => {
                let mut options = SchemaOptions::default();
                if let Some(ws) = whitespace_pattern {
                    options.whitespace_pattern = ws.clone();
                }
                Ok(json_schema::regex_from_schema(schema, &options)?)
            }
            Term::KleeneStar(inner) => Ok(format!("(?:{})*", inner.to_regex()?)),
            Term::KleenePlus(inner) => Ok(format!("({})+", inner.to_regex()?)),
            Term::Optional(inner) => Ok(format!("(?:{})?", inner.to_regex()?)),
            Term::Alternatives(terms) => {
                let parts: Result<Vec<String>, DslError> = terms.iter().map(Term::to_regex).collect();
                Ok(format!("({})", parts?.join("|")))
            }
            Term::Sequence(terms) => {
                let parts: Result<Vec<String>, DslError> = terms.iter().map(Term::to_regex).collect();
                Ok(parts?.concat())
            }
            Term::QuantifyExact(inner, n) => Ok(format!("(?:{}){{{n}}}", inner.to_regex()?)),
            Term::QuantifyMin(inner, m) => Ok(format!("(?:{}){{{m},}}", inner.to_regex()?)),
            Term::QuantifyMax(inner, n) => Ok(format!("(?:{}){{0,{n}}}", inner.to_regex()?)),
            Term::QuantifyBetween(inner, m, n) => Ok(format!("(?:{}){{{m},{n}}}", inner.to_regex()?)),
            Term::Cfg(_) => Err(DslError::InvalidInput {
                message: "cfg terms have no regex lowering; drive them with CfgLogitsProcessor instead".to_string(),
            }),
        }
    }

    /// Full-anchored test: does `s` lie in the language this term lowers to.
    pub fn matches(&self, s: &str) -> Result<bool, DslError> {
        let pattern = self.to_regex()?;
        let anchored = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| DslError::InvalidInput {
            message: e.to_string(),
        })?;
        Ok(anchored.is_match(s))
    }

    pub fn validate(&self, s: &str) -> Result<(), DslError> {
        if self.matches(s)? {
            Ok(())
        } else {
            Err(DslError::PatternMismatch {
                pattern: self.to_regex()?,
                content: s.to_string(),
            })
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_tree(f, self, "", true)
    }
}

fn label(term: &Term) -> String {
    match term {
        Term::Literal(s) => format!("Literal({s:?})"),
        Term::Regex(p) => format!("Regex({p:?})"),
        Term::Fsm(p) => format!("Fsm({p:?})"),
        Term::Cfg(g) => format!("Cfg({g:?})"),
        Term::JsonSchema(_, _) => "JsonSchema".to_string(),
        Term::KleeneStar(_) => "KleeneStar".to_string(),
        Term::KleenePlus(_) => "KleenePlus".to_string(),
        Term::Optional(_) => "Optional".to_string(),
        Term::Alternatives(_) => "Alternatives".to_string(),
        Term::Sequence(_) => "Sequence".to_string(),
        Term::QuantifyExact(_, n) => format!("QuantifyExact({n})"),
        Term::QuantifyMin(_, m) => format!("QuantifyMin({m})"),
        Term::QuantifyMax(_, n) => format!("QuantifyMax({n})"),
        Term::QuantifyBetween(_, m, n) => format!("QuantifyBetween({m},{n})"),
    }
}

fn children(term: &Term) -> Vec<&Term> {
    match term {
        Term::Literal(_) | Term::Regex(_) | Term::Fsm(_) | Term::Cfg(_) | Term::JsonSchema(_, _) => Vec::new(),
        Term::KleeneStar(inner)
        | Term::KleenePlus(inner)
        | Term::Optional(inner)
        | Term::QuantifyExact(inner, _)
        | Term::QuantifyMin(inner, _)
        | Term::QuantifyMax(inner, _)
        | Term::QuantifyBetween(inner, _, _) => vec![inner.as_ref()],
        Term::Alternatives(terms) | Term::Sequence(terms) => terms.iter().collect(),
    }
}

/// ASCII tree with `├──`/`└──`/`│` glyphs and 4-space indent, matching this
/// workspace's existing `Display`-based pretty-printers.
fn write_tree(f: &mut fmt::Formatter<'_>, term: &Term, prefix: &str, is_last: bool) -> fmt::Result {
    let connector = if prefix.is_empty() {
        ""
    } else if is_last {
        "└── "
    } else {
        "├── "
    };
    i_nln(f, format_args!("{prefix}{connector}{}", label(term)))?;
    let child_prefix = if prefix.is_empty() {
        String::new()
    } else if is_last {
        format!("{prefix}    ")
    } else {
        format!("{prefix}│   ")
    };
    let kids = children(term);
    for (i, child) in kids.iter().enumerate() {
        let nested_prefix = if prefix.is_empty() {
            "    ".to_string()
        } else {
            child_prefix.clone()
        };
        write_tree(f, child, &nested_prefix, i + 1 == kids.len())?;
    }
    Ok(())
}

/// Native-type descriptors the DSL can lower into [`Term`]s without the
/// caller hand-writing regex (spec §4.C). Depth is capped so a
/// self-referential `Dict`/`Array` description cannot recurse unbounded.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    StringType,
    IntegerType,
    NumberType,
    BooleanType,
    NullType,
    ArrayOf(Box<TypeDescriptor>),
    DictOf(Box<TypeDescriptor>, Box<TypeDescriptor>),
    Union(Vec<TypeDescriptor>),
    Literal(serde_json::Value),
}

pub fn from_type_descriptor(descriptor: &TypeDescriptor) -> Result<Term, DslError> {
    from_type_descriptor_at_depth(descriptor, 0)
}

fn from_type_descriptor_at_depth(descriptor: &TypeDescriptor, depth: u32) -> Result<Term, DslError> {
    if depth > MAX_TYPE_DESCRIPTOR_DEPTH {
        return Err(DslError::RecursionLimit);
    }
    let schema = match descriptor {
        TypeDescriptor::StringType => serde_json::json!({"type": "string"}),
        TypeDescriptor::IntegerType => serde_json::json!({"type": "integer"}),
        TypeDescriptor::NumberType => serde_json::json!({"type": "number"}),
        TypeDescriptor::BooleanType => serde_json::json!({"type": "boolean"}),
        TypeDescriptor::NullType => serde_json::json!({"type": "null"}),
        TypeDescriptor::Literal(value) => serde_json::json!({"const": value}),
        TypeDescriptor::ArrayOf(item) => {
            let _ = from_type_descriptor_at_depth(item, depth + 1)?;
            serde_json::json!({"type": "array", "items": type_descriptor_schema(item, depth + 1)?})
        }
        TypeDescriptor::DictOf(_key, value) => {
            serde_json::json!({
                "type": "object",
                "additionalProperties": type_descriptor_schema(value, depth + 1)?
            })
        }
        TypeDescriptor::Union(variants) => {
            let schemas: Result<Vec<serde_json::Value>, DslError> = variants
                .iter()
                .map(|v| type_descriptor_schema(v, depth + 1))
                .collect();
            serde_json::json!({"anyOf": schemas?})
        }
    };
    Ok(Term::JsonSchema(schema, None))
}

fn type_descriptor_schema(descriptor: &TypeDescriptor, depth: u32) -> Result<serde_json::Value, DslError> {
    if depth > MAX_TYPE_DESCRIPTOR_DEPTH {
        return Err(DslError::RecursionLimit);
    }
    Ok(match from_type_descriptor_at_depth(descriptor, depth)? {
        Term::JsonSchema(schema, _) => schema,
        _ => unreachable!("from_type_descriptor_at_depth always returns a JsonSchema term"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn either_one_or_more_matches_repeated_alternatives() {
        let term = Term::either(["yes", "no", "maybe"]).unwrap().one_or_more();
        assert_eq!(term.to_regex().unwrap(), "((yes|no|maybe))+");
        assert!(term.matches("yesyesmaybe").unwrap());
        assert!(!term.matches("").unwrap());
    }

    #[test]
    fn between_rejects_inverted_bounds() {
        let err = Term::literal("a").between(5, 1).unwrap_err();
        assert!(matches!(err, DslError::InvalidInput { .. }));
    }

    #[test]
    fn alternate_requires_nonempty() {
        let err = Term::alternate(vec![]).unwrap_err();
        assert!(matches!(err, DslError::InvalidInput { .. }));
    }

    #[test]
    fn lowering_is_idempotent() {
        let term = Term::regex("[a-z]+").optional();
        let once = term.to_regex().unwrap();
        let twice = Term::regex(once.clone()).to_regex().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn validate_fails_with_pattern_mismatch() {
        let term = Term::literal("ok");
        let err = term.validate("not-ok").unwrap_err();
        assert!(matches!(err, DslError::PatternMismatch { .. }));
    }

    #[test]
    fn pretty_print_uses_tree_glyphs() {
        let term = Term::alternate(vec![Term::literal("a"), Term::literal("b")]).unwrap();
        let rendered = term.to_string();
        assert!(rendered.contains("Alternatives"));
        assert!(rendered.contains("├── Literal"));
        assert!(rendered.contains("└── Literal"));
    }

    #[test]
    fn type_descriptor_array_lowers_to_json_schema_term() {
        let descriptor = TypeDescriptor::ArrayOf(Box::new(TypeDescriptor::IntegerType));
        let term = from_type_descriptor(&descriptor).unwrap();
        assert!(term.matches("[1,2,3]").unwrap());
    }

    #[test]
    fn cfg_term_carries_its_grammar_but_has_no_regex_lowering() {
        let term = Term::cfg("start: expr");
        assert_eq!(term.as_cfg_grammar(), Some("start: expr"));
        assert!(term.to_regex().is_err());
    }

    #[test]
    fn type_descriptor_recursion_cap_is_enforced() {
        let mut descriptor = TypeDescriptor::IntegerType;
        for _ in 0..=MAX_TYPE_DESCRIPTOR_DEPTH {
            descriptor = TypeDescriptor::ArrayOf(Box::new(descriptor));
        }
        let err = from_type_descriptor(&descriptor).unwrap_err();
        assert_eq!(err, DslError::RecursionLimit);
    }
}
