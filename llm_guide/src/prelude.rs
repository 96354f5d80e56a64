//! Flat re-export of the crate's public API (spec §6), so that
//! `use llm_guide::prelude::*;` is the only import most callers need.

pub use llm_guide_interface::{LogitBias, LogitBiasError, ModelContract, TokenizerContract};
pub use llm_guide_prompt::{TokenId, Token, Vocabulary, VocabularyError};

pub use crate::cfg::{CfgLogitsProcessor, ParserState};
pub use crate::dsl::{DslError, Term, TypeDescriptor};
pub use crate::guide::{Guide, GuideConfig, GuideError, Instruction};
pub use crate::index::{Index, IndexError, StateId};
pub use crate::json_schema::{regex_from_schema, SchemaError, SchemaOptions};
pub use crate::processor::{logit_bias_from_instruction, GuideLogitsProcessor, LogitsProcessor, ProcessorError};
pub use crate::tensor::{TensorBackend, TensorError, VecBackend};
