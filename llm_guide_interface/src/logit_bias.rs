use std::collections::HashMap;

use thiserror::Error;

/// OpenAI's `logit_bias` accepts values in [-100, 100]; hosts that forward a
/// `LogitBias` into that field inherit the same bound, so it's enforced here
/// rather than left for the host to discover at request time.
const MAX_BIAS_MAGNITUDE: f32 = 100.0;

/// The bias magnitude applied to every allowed token when a `Guide` only
/// exposes a set of admissible ids rather than a full logits tensor — enough
/// to dominate ordinary logit spread without special-casing a sampler that
/// clips to a fixed range.
pub const DEFAULT_ALLOW_BIAS: f32 = 100.0;

#[derive(Error, Debug, PartialEq)]
pub enum LogitBiasError {
    #[error("logit bias {value} for token {token_id} exceeds +/-{MAX_BIAS_MAGNITUDE}")]
    OutOfRange { token_id: u32, value: f32 },
}

/// A sparse token id -> bias map: the masking contract's secondary
/// realization (spec §6) for hosts that accept a bias map rather than a
/// logits tensor to mutate directly, e.g. the OpenAI chat-completions
/// `logit_bias` field or the llama.cpp server's `logit_bias` array.
///
/// Built from whatever ids a `Guide` currently allows, not from arbitrary
/// char/word/text sources — unlike the broader bias builders hosts
/// sometimes expose for prompt-engineering use cases, this type exists
/// solely to carry the DFA's allowed-transition set across a non-tensor
/// API boundary.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogitBias {
    bias: HashMap<u32, f32>,
}

impl LogitBias {
    /// Builds a bias map giving every id in `allowed_token_ids` the same
    /// `bias` value, rejecting any id given more than once with conflicting
    /// values would be surprising, so later entries simply overwrite
    /// earlier ones for a repeated id.
    pub fn from_allowed_ids(
        allowed_token_ids: impl IntoIterator<Item = u32>,
        bias: f32,
    ) -> Result<Self, LogitBiasError> {
        validate_logit_bias_value(bias)?;
        Ok(Self {
            bias: allowed_token_ids.into_iter().map(|id| (id, bias)).collect(),
        })
    }

    /// Convenience constructor using [`DEFAULT_ALLOW_BIAS`].
    pub fn allow(allowed_token_ids: impl IntoIterator<Item = u32>) -> Self {
        Self::from_allowed_ids(allowed_token_ids, DEFAULT_ALLOW_BIAS)
            .expect("DEFAULT_ALLOW_BIAS is within range")
    }

    pub fn get(&self, token_id: u32) -> Option<f32> {
        self.bias.get(&token_id).copied()
    }

    pub fn len(&self) -> usize {
        self.bias.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bias.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.bias.iter().map(|(id, bias)| (*id, *bias))
    }

    /// llama.cpp server's `logit_bias` request field: an array of
    /// `[token_id, bias]` pairs.
    pub fn to_llama_format(&self) -> Vec<Vec<serde_json::Value>> {
        self.bias
            .iter()
            .map(|(id, bias)| vec![serde_json::json!(id), serde_json::json!(bias)])
            .collect()
    }

    /// OpenAI chat-completions `logit_bias` request field: an object keyed
    /// by the token id as a decimal string.
    pub fn to_openai_format(&self) -> HashMap<String, serde_json::Value> {
        self.bias
            .iter()
            .map(|(id, bias)| (id.to_string(), serde_json::json!(bias)))
            .collect()
    }
}

fn validate_logit_bias_value(value: f32) -> Result<(), LogitBiasError> {
    if value.abs() > MAX_BIAS_MAGNITUDE {
        return Err(LogitBiasError::OutOfRange {
            token_id: 0,
            value,
        });
    }
    Ok(())
}
