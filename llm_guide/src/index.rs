//! Compiles a regex string and a [`Vocabulary`] into a token-level DFA (spec
//! §4.E): for every reachable byte-DFA state and every vocabulary token,
//! walk the token's bytes through the byte-DFA and, if the walk never dies,
//! record that token id as a legal transition out of that state. Grounded
//! directly on `outlines-core`'s `Index::new` (the closest real-world
//! implementation of this exact algorithm in the retrieval pack).

use std::time::Instant;

use regex_automata::dfa::dense::DFA;
use regex_automata::dfa::Automaton;
use regex_automata::util::primitives::StateID as AutomatonStateId;
use regex_automata::Anchored;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::debug;

use llm_guide_prompt::{TokenId, Vocabulary};

pub type StateId = u32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("regex uses a DFA feature this compiler cannot handle: {message}")]
    IndexBuildError { message: String },
    #[error("regex and vocabulary share no valid transition out of state {state}; bytes accepted there: {accepted_bytes:?}")]
    IncompatibleVocabulary {
        state: StateId,
        accepted_bytes: Vec<String>,
    },
}

/// A DFA whose alphabet is token ids (spec §3, §4.E). Immutable once built;
/// shared read-only across every [`crate::guide::Guide`] derived from it.
#[derive(Clone, Debug, PartialEq)]
pub struct Index {
    initial_state: StateId,
    final_states: FxHashSet<StateId>,
    transitions: FxHashMap<StateId, FxHashMap<TokenId, StateId>>,
    eos_token_id: TokenId,
}

impl Index {
    /// Builds the token-level DFA (spec §4.E's `build`). `O(|DFA| *
    /// |vocab|)` worst case: one walk per (state, token) pair.
    pub fn build(regex: &str, vocabulary: &Vocabulary) -> Result<Self, IndexError> {
        let started = Instant::now();
        let dfa = DFA::new(regex).map_err(|e| IndexError::IndexBuildError {
            message: e.to_string(),
        })?;
        let start_state = dfa
            .universal_start_state(Anchored::Yes)
            .ok_or_else(|| IndexError::IndexBuildError {
                message: "regex has no anchored universal start state".to_string(),
            })?;

        let eos_token_id = vocabulary.eos_token_id();
        let mut transitions: FxHashMap<StateId, FxHashMap<TokenId, StateId>> = FxHashMap::default();
        let mut final_states: FxHashSet<StateId> = FxHashSet::default();

        let mut seen: FxHashSet<AutomatonStateId> = FxHashSet::from_iter([start_state]);
        let mut frontier: Vec<AutomatonStateId> = vec![start_state];

        while let Some(current) = frontier.pop() {
            let mut has_valid_transition = false;

            if dfa.is_match_state(dfa.next_eoi_state(current)) {
                final_states.insert(current.as_u32());
                has_valid_transition = true;
            }

            'token: for (token_bytes, ids) in vocabulary.tokens() {
                if ids.contains(&eos_token_id) {
                    continue;
                }

                let mut next = current;
                for byte in token_bytes {
                    next = dfa.next_state(next, *byte);
                    if dfa.is_dead_state(next) || dfa.is_quit_state(next) {
                        continue 'token;
                    }
                }

                let is_intermediate = !dfa.is_match_state(next);
                let is_full_match = dfa.is_match_state(dfa.next_eoi_state(next));
                if is_intermediate || is_full_match {
                    has_valid_transition = true;
                    for id in ids {
                        transitions
                            .entry(current.as_u32())
                            .or_default()
                            .insert(*id, next.as_u32());
                    }
                }
                if seen.insert(next) {
                    frontier.push(next);
                }
            }

            if !has_valid_transition && !dfa.is_match_state(current) {
                let mut accepted_bytes = Vec::new();
                for byte in 0u16..=255 {
                    let byte = byte as u8;
                    let candidate = dfa.next_state(current, byte);
                    if !dfa.is_dead_state(candidate) && !dfa.is_quit_state(candidate) {
                        accepted_bytes.push(if byte.is_ascii_graphic() {
                            (byte as char).to_string()
                        } else {
                            format!("\\x{byte:02x}")
                        });
                    }
                }
                return Err(IndexError::IncompatibleVocabulary {
                    state: current.as_u32(),
                    accepted_bytes,
                });
            }
        }

        for &state in &final_states {
            transitions.entry(state).or_default().insert(eos_token_id, state);
        }

        debug!(
            states = transitions.len(),
            final_states = final_states.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Index::build finished"
        );

        Ok(Self {
            initial_state: start_state.as_u32(),
            final_states,
            transitions,
            eos_token_id,
        })
    }

    /// Restores an `Index` from a previously-serialised transition table
    /// (spec §6: "memoised indexes may be serialised via `transitions()` and
    /// restored via a constructor taking that table plus the vocabulary").
    pub fn from_transitions(
        initial_state: StateId,
        final_states: FxHashSet<StateId>,
        transitions: FxHashMap<StateId, FxHashMap<TokenId, StateId>>,
        vocabulary: &Vocabulary,
    ) -> Self {
        Self {
            initial_state,
            final_states,
            transitions,
            eos_token_id: vocabulary.eos_token_id(),
        }
    }

    pub fn initial_state(&self) -> StateId {
        self.initial_state
    }

    pub fn is_final(&self, state: StateId) -> bool {
        self.final_states.contains(&state)
    }

    pub fn final_states(&self) -> &FxHashSet<StateId> {
        &self.final_states
    }

    /// `next_state(state, id) -> state | none`. At a final state, EOS is
    /// stored as a self-loop by `build`, so this returns `Some(state)` for
    /// EOS there rather than advancing anywhere new.
    pub fn next_state(&self, state: StateId, token_id: TokenId) -> Option<StateId> {
        self.transitions.get(&state)?.get(&token_id).copied()
    }

    /// Every legal next token out of `state`, EOS included whenever `state`
    /// is final — even if it also has further non-EOS transitions (spec
    /// §4.E, §4.F). The empty set signals a Guide error: `state` is neither
    /// final nor has any outgoing transition.
    pub fn allowed_tokens(&self, state: StateId) -> FxHashSet<TokenId> {
        self.transitions
            .get(&state)
            .map(|row| row.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn transitions(&self) -> &FxHashMap<StateId, FxHashMap<TokenId, StateId>> {
        &self.transitions
    }

    pub fn eos_token_id(&self) -> TokenId {
        self.eos_token_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digit_vocabulary() -> Vocabulary {
        Vocabulary::new(
            4,
            [
                (b"blah".to_vec(), vec![0]),
                (b"1a".to_vec(), vec![1]),
                (b"2".to_vec(), vec![2]),
                (b"0".to_vec(), vec![3]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn build_produces_reachable_final_states_with_eos_allowed() {
        let vocabulary = digit_vocabulary();
        let index = Index::build("0|[1-9][0-9]*", &vocabulary).unwrap();
        assert!(!index.is_final(index.initial_state()));

        let allowed = index.allowed_tokens(index.initial_state());
        assert!(!allowed.is_empty());
        let next = index.next_state(index.initial_state(), 2).unwrap();
        assert!(index.is_final(next));
        assert!(index.allowed_tokens(next).contains(&index.eos_token_id()));
        assert_eq!(index.next_state(next, index.eos_token_id()), Some(next));
    }

    #[test]
    fn every_allowed_token_has_a_defined_next_state() {
        let vocabulary = digit_vocabulary();
        let index = Index::build("0|[1-9][0-9]*", &vocabulary).unwrap();
        for &state in index.transitions().keys() {
            for &id in &index.allowed_tokens(state) {
                assert!(index.next_state(state, id).is_some());
            }
        }
    }

    #[test]
    fn incompatible_vocabulary_reports_missing_bytes() {
        let vocabulary = Vocabulary::new(
            3,
            [(b"0".to_vec(), vec![0]), (b"0 ".to_vec(), vec![1]), (b"1".to_vec(), vec![2])],
        )
        .unwrap();
        let err = Index::build("0 1", &vocabulary).unwrap_err();
        match err {
            IndexError::IncompatibleVocabulary { accepted_bytes, .. } => {
                assert!(accepted_bytes.contains(&" ".to_string()));
            }
            other => panic!("expected IncompatibleVocabulary, got {other:?}"),
        }
    }

    #[test]
    fn from_transitions_round_trips_a_built_index() {
        let vocabulary = digit_vocabulary();
        let built = Index::build("0|[1-9][0-9]*", &vocabulary).unwrap();
        let restored = Index::from_transitions(
            built.initial_state(),
            built.final_states().clone(),
            built.transitions().clone(),
            &vocabulary,
        );
        assert_eq!(built, restored);
    }
}
