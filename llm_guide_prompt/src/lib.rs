//! # llm_guide_prompt: Vocabulary for the llm_guide constrained-decoding engine
//!
//! A `Vocabulary` is the tokenizer's token-bytes <-> id map plus its EOS
//! marker (spec §3, §4.D, §6). It is built once per model from whatever
//! tokenizer the host uses (`tokenizers`, `tiktoken-rs`, a custom BPE, ...)
//! and is immutable once `llm_guide::index::Index::build` has consumed it —
//! the crate itself has no tokenizer implementation, it only describes the
//! shape a tokenizer's output must take to drive the Index.

#[allow(unused_imports)]
pub(crate) use tracing::{debug, trace};

mod display;
mod vocabulary;

pub use display::normalize_display_token;
pub use vocabulary::{Token, TokenId, Vocabulary, VocabularyError};
