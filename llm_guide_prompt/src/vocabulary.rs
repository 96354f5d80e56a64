use rustc_hash::FxHashMap;
use thiserror::Error;

/// An opaque token surface form: the raw bytes the tokenizer assigns an id to.
pub type Token = Vec<u8>;

/// A 32-bit vocabulary id. One value is reserved as the EOS marker.
pub type TokenId = u32;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VocabularyError {
    #[error("cannot insert EOS token bytes as an ordinary vocabulary entry (id {eos_token_id})")]
    EOSDisallowed { eos_token_id: TokenId },
}

/// Bidirectional token<->id map plus the distinguished end-of-sequence id.
///
/// Some tokenizers assign more than one id to an identical surface form
/// (e.g. a byte-fallback id and a merged-BPE id that decode to the same
/// bytes), so `token_ids` is one-to-many; `id_to_token` stays one-to-one
/// since every id decodes to exactly one byte string. Immutable after
/// construction except for `insert`/`remove`, which `llm_guide::index::Index`
/// never calls — the Index borrows a `Vocabulary` for the lifetime of the
/// build and does not mutate it.
#[derive(Clone, Debug, Default)]
pub struct Vocabulary {
    eos_token_id: TokenId,
    token_ids: FxHashMap<Token, Vec<TokenId>>,
    id_to_token: FxHashMap<TokenId, Token>,
}

impl Vocabulary {
    /// Builds a vocabulary from an EOS id and a token -> ids map. Fails if
    /// any entry's id list contains the EOS id — EOS has no byte form and
    /// must never be reachable as an ordinary transition.
    pub fn new(
        eos_token_id: TokenId,
        tokens: impl IntoIterator<Item = (Token, Vec<TokenId>)>,
    ) -> Result<Self, VocabularyError> {
        let mut vocabulary = Self {
            eos_token_id,
            token_ids: FxHashMap::default(),
            id_to_token: FxHashMap::default(),
        };
        for (token, ids) in tokens {
            for id in &ids {
                if *id == eos_token_id {
                    return Err(VocabularyError::EOSDisallowed { eos_token_id });
                }
                vocabulary.id_to_token.insert(*id, token.clone());
            }
            vocabulary.token_ids.insert(token, ids);
        }
        Ok(vocabulary)
    }

    pub fn eos_token_id(&self) -> TokenId {
        self.eos_token_id
    }

    /// Number of distinct ids in the vocabulary (EOS not included).
    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }

    /// Adds `id` under `token`'s entry, extending the id list if the token
    /// already exists (some tokenizers alias surface forms to several ids).
    pub fn insert(&mut self, token: Token, id: TokenId) -> Result<(), VocabularyError> {
        if id == self.eos_token_id {
            return Err(VocabularyError::EOSDisallowed {
                eos_token_id: self.eos_token_id,
            });
        }
        self.id_to_token.insert(id, token.clone());
        self.token_ids.entry(token).or_default().push(id);
        Ok(())
    }

    /// Removes a token and every id it maps to.
    pub fn remove(&mut self, token: &[u8]) {
        if let Some(ids) = self.token_ids.remove(token) {
            for id in ids {
                self.id_to_token.remove(&id);
            }
        }
    }

    pub fn token_ids(&self, token: &[u8]) -> Option<&[TokenId]> {
        self.token_ids.get(token).map(Vec::as_slice)
    }

    pub fn token_by_id(&self, id: TokenId) -> Option<&[u8]> {
        self.id_to_token.get(&id).map(Vec::as_slice)
    }

    /// Iterates every (token bytes, ids) entry. `llm_guide::index::Index::build`
    /// walks this once per DFA state reached during construction.
    pub fn tokens(&self) -> impl Iterator<Item = (&Token, &Vec<TokenId>)> {
        self.token_ids.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vocabulary {
        Vocabulary::new(
            0,
            [
                (b"a".to_vec(), vec![1]),
                (b"b".to_vec(), vec![2, 3]),
                (b"ab".to_vec(), vec![4]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn construct_and_lookup() {
        let vocab = sample();
        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab.token_ids(b"b"), Some(&[2, 3][..]));
        assert_eq!(vocab.token_by_id(4), Some(&b"ab"[..]));
        assert_eq!(vocab.eos_token_id(), 0);
    }

    #[test]
    fn construction_rejects_eos_alias() {
        let err = Vocabulary::new(5, [(b"eos".to_vec(), vec![5])]).unwrap_err();
        assert_eq!(err, VocabularyError::EOSDisallowed { eos_token_id: 5 });
    }

    #[test]
    fn insert_rejects_eos_id() {
        let mut vocab = sample();
        let err = vocab.insert(b"oops".to_vec(), 0).unwrap_err();
        assert_eq!(err, VocabularyError::EOSDisallowed { eos_token_id: 0 });
    }

    #[test]
    fn remove_drops_every_alias() {
        let mut vocab = sample();
        vocab.remove(b"b");
        assert_eq!(vocab.token_ids(b"b"), None);
        assert_eq!(vocab.token_by_id(2), None);
        assert_eq!(vocab.token_by_id(3), None);
        assert_eq!(vocab.len(), 2);
    }
}
