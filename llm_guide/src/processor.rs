//! Drives an [`Index`] across an arbitrary batch shape, masking every token
//! that cannot legally follow the current state (spec §4.G). The batched
//! processor tracks one DFA state per sequence fingerprint; it never stores
//! a whole [`Guide`](crate::guide::Guide), since the forward-only batch walk
//! needs none of `Guide`'s rollback bookkeeping — only the single-sequence
//! [`GuideLogitsProcessor`] wraps a caller-owned `Guide` directly.

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

use llm_guide_interface::LogitBias;
use llm_guide_prompt::TokenId;

use crate::guide::{Guide, GuideError, Instruction};
use crate::index::{Index, IndexError, StateId};
use crate::json_schema::{self, SchemaError, SchemaOptions};
use crate::tensor::TensorBackend;

/// Bridges `Guide::next_instruction()` into the sparse bias-map masking
/// contract (spec §6), so the non-tensor integration path shares the exact
/// same "what can come next" source of truth as [`LogitsProcessor`]. `bias`
/// is applied uniformly to every allowed id (and to EOS, via `Write`).
pub fn logit_bias_from_instruction(instruction: Instruction, bias: f32) -> LogitBias {
    let ids: Vec<TokenId> = match instruction {
        Instruction::Write(ids) => ids,
        Instruction::Generate(ids) => ids.into_iter().collect(),
    };
    LogitBias::from_allowed_ids(ids, bias).unwrap_or_default()
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    #[error("generated_ids has {generated_ids_batch} rows but logits has {logits_batch}")]
    ShapeMismatch {
        generated_ids_batch: usize,
        logits_batch: usize,
    },
    #[error("no tensor backend registered for {backend}")]
    BackendUnavailable { backend: String },
    #[error(transparent)]
    InvalidTransition(#[from] GuideError),
    #[error(transparent)]
    IndexBuild(#[from] IndexError),
    #[error(transparent)]
    SchemaCompile(#[from] SchemaError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SequenceState {
    Active(StateId),
    Completed,
}

/// Batched logits masking over a regex-derived [`Index`] (spec §4.G's
/// `__call__(generated_ids, logits)`).
pub struct LogitsProcessor<B: TensorBackend> {
    index: Index,
    backend: B,
    seq_start: Option<usize>,
    states: FxHashMap<Vec<TokenId>, SequenceState>,
}

impl<B: TensorBackend> LogitsProcessor<B> {
    pub fn new(index: Index, backend: B) -> Self {
        Self {
            index,
            backend,
            seq_start: None,
            states: FxHashMap::default(),
        }
    }

    /// `RegexLogitsProcessor(pattern, tokenizer, backend)` (spec §6).
    pub fn for_regex(
        pattern: &str,
        tokenizer: &dyn llm_guide_interface::TokenizerContract,
        backend: B,
    ) -> Result<Self, ProcessorError> {
        let index = Index::build(pattern, tokenizer.vocabulary())?;
        Ok(Self::new(index, backend))
    }

    /// `JSONLogitsProcessor(schema, tokenizer, backend, {whitespace?})`
    /// (spec §6).
    pub fn for_json_schema(
        schema: &serde_json::Value,
        tokenizer: &dyn llm_guide_interface::TokenizerContract,
        backend: B,
        whitespace_pattern: Option<String>,
    ) -> Result<Self, ProcessorError> {
        let mut options = SchemaOptions::default();
        if let Some(ws) = whitespace_pattern {
            options.whitespace_pattern = ws;
        }
        let pattern = json_schema::regex_from_schema(schema, &options)?;
        Self::for_regex(&pattern, tokenizer, backend)
    }

    /// Runs one decoding step: masks every forbidden position in `logits`
    /// to the backend's negative infinity and returns the same tensor.
    pub fn process(
        &mut self,
        generated_ids: &[Vec<TokenId>],
        logits: B::Tensor,
    ) -> Result<B::Tensor, ProcessorError> {
        let was_unbatched = self.backend.shape(&logits).len() == 1;
        let mut logits = if was_unbatched {
            self.backend.unsqueeze_batch(logits)
        } else {
            logits
        };

        let shape = self.backend.shape(&logits);
        let batch = shape[0];
        let vocab = shape.get(1).copied().unwrap_or(0);

        if generated_ids.len() != batch {
            return Err(ProcessorError::ShapeMismatch {
                generated_ids_batch: generated_ids.len(),
                logits_batch: batch,
            });
        }

        let seq_start = *self
            .seq_start
            .get_or_insert_with(|| generated_ids.iter().map(Vec::len).min().unwrap_or(0));

        let mut mask = vec![true; batch * vocab];
        for (row, ids) in generated_ids.iter().enumerate() {
            let start = seq_start.min(ids.len());
            let fingerprint = &ids[start..];
            let state = self.state_for_fingerprint(fingerprint)?;
            if let SequenceState::Active(state_id) = state {
                for id in self.index.allowed_tokens(state_id) {
                    let flat = row * vocab + id as usize;
                    if flat < mask.len() {
                        mask[flat] = false;
                    }
                }
                if self.index.is_final(state_id) {
                    let flat = row * vocab + self.index.eos_token_id() as usize;
                    if flat < mask.len() {
                        mask[flat] = false;
                    }
                }
            }
        }

        self.backend.apply_mask(&mut logits, &mask, self.backend.negative_infinity());
        if was_unbatched {
            logits = self.backend.squeeze_batch(logits);
        }
        let masked = mask.iter().filter(|&&m| m).count();
        debug!(batch, vocab, masked, allowed = mask.len() - masked, "LogitsProcessor::process");
        Ok(logits)
    }

    /// Purges cached state for a fingerprint whose batch row was dropped
    /// (spec §5: "garbage-collected when the batch row is dropped").
    pub fn drop_fingerprint(&mut self, fingerprint: &[TokenId]) {
        self.states.remove(fingerprint);
    }

    fn state_for_fingerprint(&mut self, fingerprint: &[TokenId]) -> Result<SequenceState, ProcessorError> {
        if let Some(state) = self.states.get(fingerprint) {
            return Ok(*state);
        }
        let state = if fingerprint.is_empty() {
            SequenceState::Active(self.index.initial_state())
        } else {
            let parent = &fingerprint[..fingerprint.len() - 1];
            let parent_state = self.state_for_fingerprint(parent)?;
            let last = fingerprint[fingerprint.len() - 1];
            self.step(parent_state, last)?
        };
        self.states.insert(fingerprint.to_vec(), state);
        Ok(state)
    }

    fn step(&self, state: SequenceState, token_id: TokenId) -> Result<SequenceState, ProcessorError> {
        let SequenceState::Active(current) = state else {
            return Ok(state);
        };
        if token_id == self.index.eos_token_id() {
            return if self.index.is_final(current) {
                Ok(SequenceState::Completed)
            } else {
                Err(ProcessorError::InvalidTransition(GuideError::InvalidTransition {
                    state: current,
                    token_id,
                }))
            };
        }
        match self.index.next_state(current, token_id) {
            Some(next) => Ok(SequenceState::Active(next)),
            None => Err(ProcessorError::InvalidTransition(GuideError::InvalidTransition {
                state: current,
                token_id,
            })),
        }
    }
}

/// Wraps a single caller-owned [`Guide`] rather than a fingerprint map —
/// for hosts driving exactly one sequence at a time (spec §6:
/// `GuideLogitsProcessor(tokenizer, guide, backend)`).
pub struct GuideLogitsProcessor<'a, B: TensorBackend> {
    guide: Guide<'a>,
    backend: B,
}

impl<'a, B: TensorBackend> GuideLogitsProcessor<'a, B> {
    pub fn new(guide: Guide<'a>, backend: B) -> Self {
        Self { guide, backend }
    }

    pub fn guide(&self) -> &Guide<'a> {
        &self.guide
    }

    pub fn guide_mut(&mut self) -> &mut Guide<'a> {
        &mut self.guide
    }

    /// Masks a single-row `logits` tensor using the wrapped guide's current
    /// instruction, without touching any fingerprint map.
    pub fn process(&self, logits: B::Tensor) -> B::Tensor {
        let mut logits = logits;
        let vocab = self.backend.to_list(&logits).len();
        let mut mask = vec![true; vocab];
        let allowed: Vec<TokenId> = match self.guide.next_instruction() {
            Instruction::Write(ids) => ids,
            Instruction::Generate(ids) => ids.into_iter().collect(),
        };
        for id in allowed {
            let idx = id as usize;
            if idx < vocab {
                mask[idx] = false;
            }
        }
        self.backend
            .apply_mask(&mut logits, &mask, self.backend.negative_infinity());
        logits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::VecBackend;
    use llm_guide_interface::mock::MockTokenizer;
    use llm_guide_interface::TokenizerContract;

    #[test]
    fn batch_masks_exactly_the_union_of_allowed_ids_per_row() {
        let tokenizer = MockTokenizer::byte_level();
        let mut processor =
            LogitsProcessor::for_regex(r"[ab]", &tokenizer, VecBackend).unwrap();

        let a = b'a' as usize;
        let b = b'b' as usize;
        let vocab = 257;
        let mut logits_row = vec![1.0f32; vocab];
        logits_row[a] = 5.0;
        let logits = vec![logits_row];

        let generated_ids: Vec<Vec<TokenId>> = vec![vec![]];
        let masked = processor.process(&generated_ids, logits).unwrap();
        assert_eq!(masked[0][a], 5.0);
        assert!(masked[0][b].is_finite());
        assert_eq!(masked[0][b'c' as usize], f32::NEG_INFINITY);
    }

    #[test]
    fn logit_bias_from_instruction_carries_every_allowed_id() {
        let tokenizer = MockTokenizer::byte_level();
        let index = Index::build(r"[ab]", tokenizer.vocabulary()).unwrap();
        let guide = Guide::new(&index);
        let bias = logit_bias_from_instruction(guide.next_instruction(), 50.0);
        assert_eq!(bias.get(b'a' as u32), Some(50.0));
        assert_eq!(bias.get(b'b' as u32), Some(50.0));
        assert_eq!(bias.get(b'c' as u32), None);
    }

    #[test]
    fn shape_mismatch_between_batch_and_generated_ids_errors() {
        let tokenizer = MockTokenizer::byte_level();
        let mut processor = LogitsProcessor::for_regex("a", &tokenizer, VecBackend).unwrap();
        let logits = vec![vec![0.0; 257], vec![0.0; 257]];
        let err = processor.process(&[vec![]], logits).unwrap_err();
        assert!(matches!(err, ProcessorError::ShapeMismatch { .. }));
    }
}
