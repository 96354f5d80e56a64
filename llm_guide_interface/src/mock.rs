//! A fixed in-memory [`TokenizerContract`] for tests elsewhere in the
//! workspace (spec §4.L) so crates that only need "some tokenizer" don't
//! each hand-roll a fixture.

use llm_guide_prompt::Vocabulary;

use crate::contracts::TokenizerContract;

/// Byte-level toy vocabulary: ids 0..=255 map to the single byte with that
/// value, id 256 is EOS. Enough to drive any ASCII regex/JSON-Schema test
/// without pulling in a real tokenizer crate.
pub struct MockTokenizer {
    vocabulary: Vocabulary,
}

impl MockTokenizer {
    pub fn byte_level() -> Self {
        let eos_token_id = 256;
        let tokens = (0u32..256).map(|byte| (vec![byte as u8], vec![byte]));
        let vocabulary = Vocabulary::new(eos_token_id, tokens).expect("byte ids exclude EOS id");
        Self { vocabulary }
    }
}

impl TokenizerContract for MockTokenizer {
    fn eos_token_id(&self) -> u32 {
        self.vocabulary.eos_token_id()
    }

    fn pad_token_id(&self) -> Option<u32> {
        None
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    fn decode(&self, ids: &[u32]) -> String {
        let bytes: Vec<u8> = ids
            .iter()
            .filter_map(|id| self.vocabulary.token_by_id(*id))
            .flatten()
            .copied()
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_level_round_trips_ascii() {
        let tokenizer = MockTokenizer::byte_level();
        let ids: Vec<u32> = "hi".bytes().map(u32::from).collect();
        assert_eq!(tokenizer.decode(&ids), "hi");
        assert_eq!(tokenizer.eos_token_id(), 256);
    }
}
