//! # llm_guide_interface
//!
//! The host collaborators this engine is consumed by (spec §6): the
//! tokenizer contract and model contract traits the caller's own
//! tokenizer/model loading code must satisfy, plus a secondary realization
//! of the masking contract — [`logit_bias`] — for hosts that only accept a
//! sparse token id -> bias map rather than a full logits tensor.

#[allow(unused_imports)]
pub(crate) use tracing::{debug, trace};

pub mod contracts;
pub mod logit_bias;
pub mod mock;

pub use contracts::{ModelContract, TokenizerContract};
pub use logit_bias::{LogitBias, LogitBiasError};
