//! Chat completions over the OpenAI-compatible API, which OpenAI, Ollama and
//! vLLM all serve.

use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, Stop,
    },
};

use super::Provider;
use crate::{
    generate::{Generator, SamplingConfig, StopTokens, Vocabulary},
    ir::{Conversation, Message},
};

const OLLAMA_DEFAULT_HOST: &str = "http://localhost:11434";
const VLLM_DEFAULT_BASE_URL: &str = "http://localhost:8000/v1";

fn api_config(provider: Provider) -> OpenAIConfig {
    match provider {
        Provider::OpenAI => match std::env::var("OPENAI_BASE_URL") {
            Ok(base) => OpenAIConfig::default().with_api_base(base),
            Err(_) => OpenAIConfig::default(),
        },
        Provider::Ollama => {
            let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| OLLAMA_DEFAULT_HOST.into());
            let host = if host.contains("://") {
                host
            } else {
                format!("http://{host}")
            };
            OpenAIConfig::new()
                .with_api_base(format!("{}/v1", host.trim_end_matches('/')))
                .with_api_key("ollama")
        }
        Provider::Vllm => OpenAIConfig::new()
            .with_api_base(
                std::env::var("VLLM_BASE_URL").unwrap_or_else(|_| VLLM_DEFAULT_BASE_URL.into()),
            )
            .with_api_key(std::env::var("VLLM_API_KEY").unwrap_or_else(|_| "EMPTY".into())),
    }
}

fn to_request_message(message: &Message) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    Ok(match message {
        Message::System(s) => ChatCompletionRequestSystemMessageArgs::default()
            .content(s.as_str())
            .build()?
            .into(),
        Message::User(s) => ChatCompletionRequestUserMessageArgs::default()
            .content(s.as_str())
            .build()?
            .into(),
        Message::Assistant(s) => ChatCompletionRequestAssistantMessageArgs::default()
            .content(s.as_str())
            .build()?
            .into(),
    })
}

pub struct ChatBackend {
    client: Client<OpenAIConfig>,
    model: String,
    vocabulary: Box<dyn Vocabulary>,
}

impl ChatBackend {
    pub fn new(provider: Provider, model: &str, vocabulary: Box<dyn Vocabulary>) -> Self {
        Self {
            client: Client::with_config(api_config(provider)),
            model: model.to_string(),
            vocabulary,
        }
    }
}

#[async_trait::async_trait]
impl Generator for ChatBackend {
    fn vocabulary(&self) -> &dyn Vocabulary {
        self.vocabulary.as_ref()
    }

    #[allow(deprecated)]
    async fn generate(
        &self,
        conversation: Conversation,
        stop: &StopTokens,
        sampling: &SamplingConfig,
    ) -> anyhow::Result<Conversation> {
        let messages = conversation
            .messages()
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()?;

        // The chat API has no greedy switch; zero temperature is the closest
        let temperature = if sampling.do_sample() {
            sampling.temperature
        } else {
            0.0
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(messages)
            .temperature(temperature)
            .top_p(sampling.top_p)
            .max_tokens(sampling.max_new_tokens)
            .stop(Stop::StringArray(stop.texts()))
            .build()?;

        let response = self.client.chat().create(request).await?;
        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("{} returned no message content", self.model))?;

        Ok(conversation.with_reply(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_each_role() {
        let messages = [
            Message::System("s".into()),
            Message::User("u".into()),
            Message::Assistant("a".into()),
        ];
        let converted: Vec<_> = messages
            .iter()
            .map(|m| to_request_message(m).unwrap())
            .collect();

        assert!(matches!(converted[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(converted[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(converted[2], ChatCompletionRequestMessage::Assistant(_)));
    }

    #[test]
    fn vllm_uses_local_endpoint_by_default() {
        if std::env::var("VLLM_BASE_URL").is_err() {
            use async_openai::config::Config;
            assert_eq!(api_config(Provider::Vllm).api_base(), VLLM_DEFAULT_BASE_URL);
        }
    }
}
