//! A stateful cursor over an [`Index`] with bounded rollback (spec §4.F).
//! The only mutable fields are the current state and a ring buffer of prior
//! states — the CFG extension point (§4.G's `CFGLogitsProcessor`) is kept
//! entirely out of this struct so the common regex/JSON path never carries
//! its `prev_token`/`parser_state` bookkeeping.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::trace;

use llm_guide_prompt::TokenId;

use crate::index::{Index, StateId};

pub const DEFAULT_MAX_ROLLBACK: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuideError {
    #[error("no transition for token {token_id} from state {state}")]
    InvalidTransition { state: StateId, token_id: TokenId },
    #[error("cannot roll back {requested} steps, only {available} cached")]
    InvalidRollback { requested: usize, available: usize },
}

/// The per-step output of [`Guide::next_instruction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// The caller must emit exactly these ids, without sampling. A single
    /// id whose value is the EOS token is the terminal case.
    Write(Vec<TokenId>),
    /// The caller may sample among these ids.
    Generate(FxHashSet<TokenId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active(StateId),
    Completed,
    Error,
}

/// Construction-time configuration (spec §4.K).
#[derive(Clone, Copy, Debug)]
pub struct GuideConfig {
    pub max_rollback: usize,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            max_rollback: DEFAULT_MAX_ROLLBACK,
        }
    }
}

/// One per decoding sequence; reset on a new prompt. Holds a back-reference
/// to its [`Index`], which MUST outlive every `Guide` built from it.
#[derive(Clone, Debug)]
pub struct Guide<'a> {
    index: &'a Index,
    phase: Phase,
    cache: VecDeque<StateId>,
    tokens: VecDeque<TokenId>,
    max_rollback: usize,
}

impl<'a> Guide<'a> {
    pub fn new(index: &'a Index) -> Self {
        Self::with_config(index, GuideConfig::default())
    }

    pub fn with_config(index: &'a Index, config: GuideConfig) -> Self {
        Self {
            index,
            phase: Phase::Active(index.initial_state()),
            cache: VecDeque::with_capacity(config.max_rollback),
            tokens: VecDeque::with_capacity(config.max_rollback),
            max_rollback: config.max_rollback,
        }
    }

    /// The ids accepted by `advance` since the last `reset`, bounded by the
    /// same rollback window as the state cache (spec §6: `Guide.tokens`).
    pub fn tokens(&self) -> impl Iterator<Item = TokenId> + '_ {
        self.tokens.iter().copied()
    }

    pub fn state(&self) -> Option<StateId> {
        match self.phase {
            Phase::Active(state) => Some(state),
            Phase::Completed | Phase::Error => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Completed)
    }

    pub fn is_errored(&self) -> bool {
        matches!(self.phase, Phase::Error)
    }

    /// Advances the cursor over `token_id`. EOS is accepted from any final
    /// state and moves the guide to `COMPLETED`; any other id follows
    /// `Index::next_state`, or raises `InvalidTransition`.
    pub fn advance(&mut self, token_id: TokenId) -> Result<(), GuideError> {
        trace!(token_id, phase = ?self.phase, "Guide::advance");
        let Phase::Active(state) = self.phase else {
            return Err(GuideError::InvalidTransition {
                state: 0,
                token_id,
            });
        };

        if token_id == self.index.eos_token_id() {
            if self.index.is_final(state) {
                self.push_cache(state, token_id);
                self.phase = Phase::Completed;
                return Ok(());
            }
            self.phase = Phase::Error;
            return Err(GuideError::InvalidTransition { state, token_id });
        }

        match self.index.next_state(state, token_id) {
            Some(next) => {
                self.push_cache(state, token_id);
                self.phase = Phase::Active(next);
                Ok(())
            }
            None => {
                self.phase = Phase::Error;
                Err(GuideError::InvalidTransition { state, token_id })
            }
        }
    }

    fn push_cache(&mut self, state: StateId, token_id: TokenId) {
        if self.cache.len() == self.max_rollback {
            self.cache.pop_front();
            self.tokens.pop_front();
        }
        self.cache.push_back(state);
        self.tokens.push_back(token_id);
    }

    /// Restores the state `k` advances back, popping `k` cache entries.
    /// Only valid from `ACTIVE`; `ERROR` is recoverable only via `reset`.
    pub fn rollback(&mut self, k: usize) -> Result<(), GuideError> {
        trace!(k, cached = self.cache.len(), "Guide::rollback");
        if !matches!(self.phase, Phase::Active(_)) {
            return Err(GuideError::InvalidRollback {
                requested: k,
                available: 0,
            });
        }
        if k > self.cache.len() {
            return Err(GuideError::InvalidRollback {
                requested: k,
                available: self.cache.len(),
            });
        }
        let mut restored = self.index.initial_state();
        for _ in 0..k {
            restored = self.cache.pop_back().expect("length checked above");
            self.tokens.pop_back();
        }
        self.phase = Phase::Active(restored);
        Ok(())
    }

    /// `Write([id])` when exactly one id is legal — EOS included, so a final
    /// state with no further outgoing transitions writes `[eos]`. `Generate`
    /// otherwise, which at a final state with further transitions still
    /// carries EOS alongside them (`Index::allowed_tokens` puts it there),
    /// so the caller can legally stop instead of being forced to continue.
    /// An active state with zero allowed ids that is not final is a
    /// contradiction the Index's build-time invariants should prevent; the
    /// guide reports it as `Generate` over the empty set rather than
    /// silently completing, so the host sees the failure immediately.
    pub fn next_instruction(&self) -> Instruction {
        let Some(state) = self.state() else {
            return Instruction::Generate(FxHashSet::default());
        };
        let allowed = self.index.allowed_tokens(state);
        if allowed.len() == 1 {
            let only = *allowed.iter().next().expect("checked len == 1");
            return Instruction::Write(vec![only]);
        }
        Instruction::Generate(allowed)
    }

    /// Simulates `advance` over a clone of the cursor, returning whether the
    /// whole sequence is acceptable without mutating `self`.
    pub fn accepts_tokens(&self, tokens: &[TokenId]) -> bool {
        let mut probe = self.clone();
        for &token_id in tokens {
            if probe.advance(token_id).is_err() {
                return false;
            }
        }
        true
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Active(self.index.initial_state());
        self.cache.clear();
        self.tokens.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_guide_prompt::Vocabulary;

    fn email_like_index() -> Index {
        let vocabulary = Vocabulary::new(
            100,
            [
                (b"er".to_vec(), vec![1]),
                (b"enyusuf170".to_vec(), vec![2]),
                (b"@".to_vec(), vec![3]),
                (b"gmail".to_vec(), vec![4]),
                (b".".to_vec(), vec![5]),
                (b"com".to_vec(), vec![6]),
            ],
        )
        .unwrap();
        Index::build(r"[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{3}", &vocabulary).unwrap()
    }

    #[test]
    fn rollback_restores_exact_prior_state() {
        let index = email_like_index();
        let mut guide = Guide::new(&index);
        guide.advance(1).unwrap();
        let after_first = guide.state();
        guide.advance(2).unwrap();
        guide.advance(3).unwrap();
        guide.rollback(2).unwrap();
        assert_eq!(guide.state(), after_first);
    }

    #[test]
    fn rollback_then_advance_matches_a_fresh_replay() {
        let index = email_like_index();
        let mut guide = Guide::new(&index);
        guide.advance(1).unwrap();
        guide.advance(2).unwrap();
        guide.advance(3).unwrap();
        guide.rollback(2).unwrap();
        guide.advance(3).unwrap();

        let mut replay = Guide::new(&index);
        replay.advance(1).unwrap();
        replay.advance(3).unwrap();
        assert_eq!(guide.state(), replay.state());
    }

    #[test]
    fn rollback_beyond_cache_fails() {
        let index = email_like_index();
        let mut guide = Guide::new(&index);
        guide.advance(1).unwrap();
        let err = guide.rollback(5).unwrap_err();
        assert!(matches!(err, GuideError::InvalidRollback { .. }));
    }

    #[test]
    fn full_email_sequence_reaches_completion_on_eos() {
        let index = email_like_index();
        let mut guide = Guide::new(&index);
        for id in [1, 2, 3, 4, 5, 6] {
            guide.advance(id).unwrap();
        }
        assert_eq!(guide.next_instruction(), Instruction::Write(vec![100]));
        guide.advance(100).unwrap();
        assert!(guide.is_finished());
    }

    #[test]
    fn invalid_transition_enters_error_phase() {
        let index = email_like_index();
        let mut guide = Guide::new(&index);
        let err = guide.advance(3).unwrap_err();
        assert!(matches!(err, GuideError::InvalidTransition { .. }));
        assert!(guide.is_errored());
    }

    #[test]
    fn tokens_reflects_accepted_history_and_rollback() {
        let index = email_like_index();
        let mut guide = Guide::new(&index);
        guide.advance(1).unwrap();
        guide.advance(2).unwrap();
        assert_eq!(guide.tokens().collect::<Vec<_>>(), vec![1, 2]);
        guide.rollback(1).unwrap();
        assert_eq!(guide.tokens().collect::<Vec<_>>(), vec![1]);
        guide.reset();
        assert!(guide.tokens().next().is_none());
    }

    #[test]
    fn final_state_with_further_transitions_still_offers_eos() {
        let vocabulary =
            Vocabulary::new(50, [(b"a".to_vec(), vec![1]), (b"b".to_vec(), vec![2])]).unwrap();
        let index = Index::build("ab?", &vocabulary).unwrap();
        let mut guide = Guide::new(&index);
        guide.advance(1).unwrap();

        let state = guide.state().unwrap();
        assert!(index.is_final(state));
        match guide.next_instruction() {
            Instruction::Generate(allowed) => {
                assert!(allowed.contains(&2));
                assert!(allowed.contains(&50));
            }
            other => panic!("expected Generate offering both 'b' and eos, got {other:?}"),
        }
        assert!(guide.accepts_tokens(&[50]));
    }

    #[test]
    fn accepts_tokens_does_not_mutate_cursor() {
        let index = email_like_index();
        let guide = Guide::new(&index);
        assert!(guide.accepts_tokens(&[1, 2]));
        assert!(!guide.accepts_tokens(&[3]));
        assert_eq!(guide.state(), Some(index.initial_state()));
    }
}
