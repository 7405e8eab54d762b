use crate::error::{EvalError, EvalResult};
use std::collections::HashMap;

/// End-of-turn marker used by Llama 3 chat templates
pub const DEFAULT_END_OF_TURN_TOKEN: &str = "<|eot_id|>";

/// Special-token lookup against a model's vocabulary.
pub trait Vocabulary: Send + Sync {
    /// The model's end-of-sequence token, if it has one
    fn eos_token(&self) -> Option<&str>;

    fn token_to_id(&self, token: &str) -> Option<u32>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialToken {
    pub text: String,
    pub id: u32,
}

/// The stop-condition set handed to the backend with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopTokens {
    pub eos: SpecialToken,
    pub end_of_turn: SpecialToken,
}

impl StopTokens {
    /// Look up the end-of-sequence token and `end_of_turn` in `vocabulary`.
    /// A token the vocabulary does not know is a configuration error.
    pub fn resolve(vocabulary: &dyn Vocabulary, end_of_turn: &str) -> EvalResult<Self> {
        let eos_text = vocabulary
            .eos_token()
            .ok_or_else(|| EvalError::Config("vocabulary has no end-of-sequence token".into()))?;

        let lookup = |text: &str| {
            vocabulary
                .token_to_id(text)
                .map(|id| SpecialToken {
                    text: text.to_string(),
                    id,
                })
                .ok_or_else(|| EvalError::Config(format!("token {text} not found in vocabulary")))
        };

        Ok(Self {
            eos: lookup(eos_text)?,
            end_of_turn: lookup(end_of_turn)?,
        })
    }

    pub fn ids(&self) -> [u32; 2] {
        [self.eos.id, self.end_of_turn.id]
    }

    /// Stop strings, for backends that match on text rather than ids
    pub fn texts(&self) -> Vec<String> {
        vec![self.eos.text.clone(), self.end_of_turn.text.clone()]
    }
}

/// A fixed table of special tokens, for backends that do not expose a tokenizer.
#[derive(Debug, Clone)]
pub struct SpecialTokens {
    eos: String,
    ids: HashMap<String, u32>,
}

impl SpecialTokens {
    pub fn new<S: Into<String>>(
        eos: impl Into<String>,
        tokens: impl IntoIterator<Item = (S, u32)>,
    ) -> Self {
        Self {
            eos: eos.into(),
            ids: tokens.into_iter().map(|(t, id)| (t.into(), id)).collect(),
        }
    }

    /// Llama 3 instruct special tokens
    pub fn llama3() -> Self {
        Self::new(
            "<|end_of_text|>",
            [
                ("<|begin_of_text|>", 128000),
                ("<|end_of_text|>", 128001),
                ("<|start_header_id|>", 128006),
                ("<|end_header_id|>", 128007),
                ("<|eot_id|>", 128009),
            ],
        )
    }

    /// Use a different end-of-sequence token from the same table
    pub fn with_eos(mut self, eos: impl Into<String>) -> Self {
        self.eos = eos.into();
        self
    }
}

impl Vocabulary for SpecialTokens {
    fn eos_token(&self) -> Option<&str> {
        Some(&self.eos)
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.ids.get(token).copied()
    }
}

/// Vocabulary backed by a Hugging Face `tokenizer.json`.
#[cfg(feature = "tok")]
pub struct HfVocabulary {
    tokenizer: tokenizers::Tokenizer,
    eos_token: String,
}

#[cfg(feature = "tok")]
impl HfVocabulary {
    /// Load from a local `tokenizer.json`, or from the Hub when `source` is
    /// not an existing path.
    pub fn load(source: &str, eos_token: impl Into<String>) -> EvalResult<Self> {
        let tokenizer = if std::path::Path::new(source).exists() {
            tokenizers::Tokenizer::from_file(source)
        } else {
            tokenizers::Tokenizer::from_pretrained(source, None)
        }
        .map_err(|e| EvalError::Config(format!("Failed to load tokenizer {source}: {e}")))?;

        Ok(Self {
            tokenizer,
            eos_token: eos_token.into(),
        })
    }
}

#[cfg(feature = "tok")]
impl Vocabulary for HfVocabulary {
    fn eos_token(&self) -> Option<&str> {
        Some(&self.eos_token)
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoEos;

    impl Vocabulary for NoEos {
        fn eos_token(&self) -> Option<&str> {
            None
        }

        fn token_to_id(&self, _token: &str) -> Option<u32> {
            Some(0)
        }
    }

    #[test]
    fn resolves_llama3_stop_tokens() {
        let stop = StopTokens::resolve(&SpecialTokens::llama3(), DEFAULT_END_OF_TURN_TOKEN).unwrap();
        assert_eq!(stop.ids(), [128001, 128009]);
        assert_eq!(stop.texts(), vec!["<|end_of_text|>", "<|eot_id|>"]);
    }

    #[test]
    fn unknown_end_of_turn_is_config_error() {
        let err = StopTokens::resolve(&SpecialTokens::llama3(), "<|im_end|>").unwrap_err();
        assert!(matches!(err, EvalError::Config(m) if m.contains("<|im_end|>")));
    }

    #[test]
    fn unknown_eos_is_config_error() {
        let vocab = SpecialTokens::llama3().with_eos("</s>");
        assert!(matches!(
            StopTokens::resolve(&vocab, DEFAULT_END_OF_TURN_TOKEN),
            Err(EvalError::Config(_))
        ));
        assert!(matches!(
            StopTokens::resolve(&NoEos, DEFAULT_END_OF_TURN_TOKEN),
            Err(EvalError::Config(_))
        ));
    }
}
