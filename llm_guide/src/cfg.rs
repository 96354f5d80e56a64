//! A scaffolded, best-effort extension point for grammars beyond regex
//! (spec §4.G, §9): `CFGLogitsProcessor` walks the argsorted logits and
//! accepts the first candidate whose parser-state transition succeeds,
//! masking every other position to −∞. Parser-state implementations are
//! deliberately out of scope here — only the walk and the trait callers
//! plug a real CFG parser into are defined.

use llm_guide_prompt::TokenId;

use crate::tensor::TensorBackend;

/// What a real CFG parser needs to expose to drive the rejection walk.
/// This crate ships no implementation of it; callers bring their own
/// parser (e.g. an Earley or GLR engine) and adapt it to this trait.
pub trait ParserState: Clone {
    /// Attempts to consume `token_id`, returning the successor state on
    /// acceptance. `prev_token` is carried because context-free parsing
    /// generally needs more than the current state to decide validity.
    fn try_accept(&self, prev_token: Option<TokenId>, token_id: TokenId) -> Option<Self>;

    fn is_accepting(&self) -> bool;
}

/// Rejection-sampling logits processor over a caller-supplied
/// [`ParserState`] (spec §4.G, §6: `CFGLogitsProcessor(grammar, tokenizer,
/// backend)`). Walks candidates highest-logit-first and commits to the
/// first the parser accepts; everything else is masked.
pub struct CfgLogitsProcessor<P: ParserState, B: TensorBackend> {
    state: P,
    prev_token: Option<TokenId>,
    eos_token_id: TokenId,
    backend: B,
}

impl<P: ParserState, B: TensorBackend> CfgLogitsProcessor<P, B> {
    pub fn new(initial_state: P, eos_token_id: TokenId, backend: B) -> Self {
        Self {
            state: initial_state,
            prev_token: None,
            eos_token_id,
            backend,
        }
    }

    pub fn state(&self) -> &P {
        &self.state
    }

    /// Masks every position except the highest-ranked token the parser
    /// accepts from the current state; advances internal state to match.
    /// `logits` must be a single row.
    pub fn process(&mut self, logits: B::Tensor) -> B::Tensor {
        let row = self.backend.to_list(&logits);
        let order = self.backend.argsort_desc(&row);

        let mut chosen = None;
        for candidate in order {
            let token_id = candidate as TokenId;
            if self.state.is_accepting() && token_id == self.eos_token_id {
                chosen = Some((token_id, None));
                break;
            }
            if let Some(next) = self.state.try_accept(self.prev_token, token_id) {
                chosen = Some((token_id, Some(next)));
                break;
            }
        }

        let mut mask = vec![true; row.len()];
        if let Some((token_id, next_state)) = chosen {
            mask[token_id as usize] = false;
            if let Some(next) = next_state {
                self.state = next;
            }
            self.prev_token = Some(token_id);
        }

        let mut logits = logits;
        self.backend
            .apply_mask(&mut logits, &mask, self.backend.negative_infinity());
        logits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::VecBackend;

    #[derive(Clone)]
    struct OnlyEvenDigits {
        accepted: u32,
    }

    impl ParserState for OnlyEvenDigits {
        fn try_accept(&self, _prev_token: Option<TokenId>, token_id: TokenId) -> Option<Self> {
            (token_id % 2 == 0).then_some(OnlyEvenDigits {
                accepted: self.accepted + 1,
            })
        }

        fn is_accepting(&self) -> bool {
            self.accepted > 0
        }
    }

    #[test]
    fn walk_skips_rejected_candidates_in_rank_order() {
        // Token 1 ranks highest but is odd (rejected by `try_accept`); the
        // walk falls through to token 2, the next-highest-ranked candidate.
        let mut processor =
            CfgLogitsProcessor::new(OnlyEvenDigits { accepted: 0 }, 99, VecBackend);
        let logits = vec![vec![3.0, 5.0, 4.0, 2.0]];
        let masked = processor.process(logits);
        assert_eq!(masked[0][2], 4.0);
        assert_eq!(masked[0][0], f32::NEG_INFINITY);
        assert_eq!(masked[0][1], f32::NEG_INFINITY);
        assert_eq!(masked[0][3], f32::NEG_INFINITY);
        assert_eq!(processor.state().accepted, 1);
    }

    #[test]
    fn accepting_state_lets_eos_short_circuit_the_parser_check() {
        // Token 1 is EOS and ranks highest; it is odd and would fail
        // `try_accept`, but the parser state is already accepting, so the
        // short-circuit picks it directly instead of falling through.
        let mut processor =
            CfgLogitsProcessor::new(OnlyEvenDigits { accepted: 1 }, 1, VecBackend);
        let logits = vec![vec![3.0, 5.0, 2.0]];
        let masked = processor.process(logits);
        assert_eq!(masked[0][1], 5.0);
        assert_eq!(masked[0][0], f32::NEG_INFINITY);
        assert_eq!(masked[0][2], f32::NEG_INFINITY);
    }
}
