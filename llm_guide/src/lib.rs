//! # llm_guide
//!
//! A constrained-decoding engine: a regex-combinator DSL, a JSON-Schema-to-
//! regex compiler, a vocabulary-indexed token-level DFA, and a logits
//! processor that drives either a single sequence or an arbitrary batch
//! across it. The public surface is re-exported from [`prelude`]; most
//! callers only need `use llm_guide::prelude::*;`.

pub mod cfg;
pub mod dsl;
pub mod guide;
pub mod index;
pub mod json_schema;
pub mod prelude;
pub mod processor;
pub mod regex_consts;
pub mod tensor;

pub use prelude::*;
