//! Generation backends, selected by the `provider/` prefix of the model name.

#[cfg(feature = "openai")]
pub(crate) mod openai;

use super::{Generator, Vocabulary};
use crate::error::{EvalError, EvalResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Ollama,
    Vllm,
}

/// Split `provider/model` into its provider and the provider-side model name
pub fn parse_model(provider_slash_model: &str) -> EvalResult<(Provider, &str)> {
    let unsupported = || {
        EvalError::Config(format!(
            "Unsupported model {provider_slash_model}; expected an openai/, ollama/ or vllm/ prefix"
        ))
    };

    let (provider, model) = provider_slash_model
        .split_once('/')
        .ok_or_else(unsupported)?;
    if model.is_empty() {
        return Err(unsupported());
    }

    let provider = match provider {
        "openai" => Provider::OpenAI,
        "ollama" | "ollama_chat" => Provider::Ollama,
        "vllm" => Provider::Vllm,
        _ => return Err(unsupported()),
    };
    Ok((provider, model))
}

/// Create the backend for `provider_slash_model`. The client is built once
/// and reused for every record.
pub fn connect(
    provider_slash_model: &str,
    vocabulary: Box<dyn Vocabulary>,
) -> EvalResult<Box<dyn Generator>> {
    let (provider, model) = parse_model(provider_slash_model)?;
    tracing::debug!(?provider, model, "Connecting to generation backend");

    #[cfg(feature = "openai")]
    {
        Ok(Box::new(openai::ChatBackend::new(provider, model, vocabulary)))
    }

    #[cfg(not(feature = "openai"))]
    {
        let _ = (provider, vocabulary);
        Err(EvalError::Config(format!(
            "No backend compiled in for {model}; enable the `openai` feature"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_prefixes() {
        assert_eq!(
            parse_model("ollama/llama3.1:8b").unwrap(),
            (Provider::Ollama, "llama3.1:8b")
        );
        assert_eq!(
            parse_model("vllm/meta-llama/Meta-Llama-3-8B-Instruct").unwrap(),
            (Provider::Vllm, "meta-llama/Meta-Llama-3-8B-Instruct")
        );
        assert_eq!(
            parse_model("openai/gpt-4o-mini").unwrap(),
            (Provider::OpenAI, "gpt-4o-mini")
        );
    }

    #[test]
    fn rejects_unknown_prefix() {
        assert!(matches!(
            parse_model("gemini/flash"),
            Err(EvalError::Config(_))
        ));
        assert!(matches!(parse_model("llama3"), Err(EvalError::Config(_))));
        assert!(matches!(parse_model("ollama/"), Err(EvalError::Config(_))));
    }
}
