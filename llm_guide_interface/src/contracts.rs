use llm_guide_prompt::{normalize_display_token, Vocabulary};

/// What the engine needs from the host's tokenizer (spec §6). Implemented
/// once per model by the caller's own tokenizer glue (`tokenizers`,
/// `tiktoken-rs`, a custom BPE...); the engine never loads a tokenizer
/// itself.
pub trait TokenizerContract: Send + Sync {
    /// The end-of-sequence id `Guide` treats as the completion signal.
    fn eos_token_id(&self) -> u32;

    /// The padding id, if the model's batching scheme uses one.
    fn pad_token_id(&self) -> Option<u32>;

    /// The token<->id map `Index::build` walks.
    fn vocabulary(&self) -> &Vocabulary;

    /// Decodes a full id sequence into text, applying whatever merge rules
    /// the underlying tokenizer uses (byte-fallback, SentencePiece joins...).
    fn decode(&self, ids: &[u32]) -> String;

    /// Renders a single id the way a human reading partial output should see
    /// it. Defaults to the Llama-family leading-space convention; override
    /// for tokenizers with other surface conventions.
    fn convert_token_to_string(&self, id: u32) -> Option<String> {
        self.vocabulary()
            .token_by_id(id)
            .map(normalize_display_token)
    }
}

/// What the engine needs from the host's model (spec §6): a way to run one
/// generation step and have each step's logits passed through a masking
/// callback before sampling. The engine supplies the callback
/// (`llm_guide::processor::LogitsProcessor`); the host supplies everything
/// tensor-shaped.
///
/// `Ids` and `Logits` are associated types rather than fixed to one tensor
/// library, so a host on `candle`, `burn`, or a raw `Vec<f32>` slice can all
/// implement this without the engine depending on any of them.
pub trait ModelContract {
    type Ids;
    type Logits;

    /// Runs the model forward over `input_ids`, invoking `apply_mask` with
    /// the unnormalized logits for the next token before sampling, and
    /// returns the sampled id. Called once per decoding step.
    fn generate_step(
        &mut self,
        input_ids: &Self::Ids,
        apply_mask: &mut dyn FnMut(&mut Self::Logits),
    ) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubTokenizer {
        vocabulary: Vocabulary,
    }

    impl TokenizerContract for StubTokenizer {
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
            ids.iter()
                .filter_map(|id| self.vocabulary.token_by_id(*id))
                .map(String::from_utf8_lossy)
                .collect()
        }
    }

    #[test]
    fn default_convert_token_to_string_normalizes_leading_space() {
        let vocabulary =
            Vocabulary::new(0, [(b"\xe2\x96\x81hi".to_vec(), vec![1])]).unwrap();
        let tokenizer = StubTokenizer { vocabulary };
        assert_eq!(tokenizer.convert_token_to_string(1), Some(" hi".to_string()));
    }

    #[test]
    fn convert_token_to_string_is_none_for_unknown_id() {
        let vocabulary = Vocabulary::new(0, [(b"hi".to_vec(), vec![1])]).unwrap();
        let tokenizer = StubTokenizer { vocabulary };
        assert_eq!(tokenizer.convert_token_to_string(99), None);
    }
}
