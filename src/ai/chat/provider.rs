//! Sources of streamed completions.
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Error;
use futures::Stream;
use futures::stream;

use crate::core::{AppConfig, ProviderKind};
use crate::openai::{Message, Role, completion_stream};

/// Lazily produced text fragments. An `Err` item ends the generation.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, Error>> + Send>>;

/// Anything that can turn a transcript into a stream of text.
///
/// Implementations must not do any work until the stream is polled and
/// must stop when it is dropped, which is how cancellation reaches the
/// upstream request.
pub trait CompletionProvider: Send + Sync {
    fn stream_completion(&self, messages: Vec<Message>) -> FragmentStream;
}

pub type BoxedCompletionProvider = Arc<dyn CompletionProvider>;

/// Streams from an OpenAI compatible chat completions API.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_hostname: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_hostname: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_hostname: api_hostname.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

impl CompletionProvider for OpenAiProvider {
    fn stream_completion(&self, messages: Vec<Message>) -> FragmentStream {
        Box::pin(completion_stream(
            self.client.clone(),
            messages,
            self.api_hostname.clone(),
            self.api_key.clone(),
            self.model.clone(),
        ))
    }
}

/// Echoes the latest user message back one word at a time.
#[derive(Default)]
pub struct EchoProvider;

impl CompletionProvider for EchoProvider {
    fn stream_completion(&self, messages: Vec<Message>) -> FragmentStream {
        let input = messages
            .into_iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content)
            .unwrap_or_default();
        let words: Vec<Result<String, Error>> = input
            .split_whitespace()
            .map(|word| Ok(format!("{} ", word)))
            .collect();
        Box::pin(stream::iter(words))
    }
}

pub fn provider_from_config(config: &AppConfig) -> BoxedCompletionProvider {
    match config.provider {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
            &config.openai_api_hostname,
            &config.openai_api_key,
            &config.openai_model,
        )),
        ProviderKind::Echo => Arc::new(EchoProvider),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn echo_provider_streams_words_of_the_last_user_message() {
        let messages = vec![
            Message::new(Role::System, "system"),
            Message::new(Role::User, "earlier"),
            Message::new(Role::Assistant, "reply"),
            Message::new(Role::User, "  hello   there world "),
        ];
        let fragments: Vec<String> = EchoProvider
            .stream_completion(messages)
            .map(|i| i.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["hello ", "there ", "world "]);
    }

    #[tokio::test]
    async fn echo_provider_handles_blank_input() {
        let fragments: Vec<_> = EchoProvider
            .stream_completion(vec![Message::new(Role::User, "   ")])
            .collect()
            .await;
        assert!(fragments.is_empty());
    }
}
