use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_stream::stream;
use async_trait::async_trait;
use common::{error::AppError, types::MessageRole};
use futures::StreamExt;
use tracing::{debug, warn};

use crate::{
    diagnostic_fragment, diagnostic_stream, prompt::Prompt, registry::GenerationSettings,
    FragmentStream, GenerationProvider, GenerationRequest,
};

/// Streams chat completions from any OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiProvider {
    name: &'static str,
    client: Client<OpenAIConfig>,
    model: String,
    settings: GenerationSettings,
}

impl OpenAiProvider {
    pub fn new(
        api_key: &str,
        api_base: &str,
        model: impl Into<String>,
        settings: GenerationSettings,
    ) -> Result<Self, AppError> {
        Self::compatible("openai", api_key, api_base, model, settings)
    }

    pub(crate) fn compatible(
        name: &'static str,
        api_key: &str,
        api_base: &str,
        model: impl Into<String>,
        settings: GenerationSettings,
    ) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        let client = Client::with_config(
            OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(api_base),
        )
        .with_http_client(http_client);

        Ok(Self {
            name,
            client,
            model: model.into(),
            settings,
        })
    }

    #[allow(deprecated)]
    fn build_request(
        &self,
        request: &GenerationRequest,
    ) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let prompt = Prompt::from_request(request);

        let mut messages: Vec<ChatCompletionRequestMessage> =
            Vec::with_capacity(prompt.history.len() + 2);
        messages.push(ChatCompletionRequestSystemMessage::from(prompt.system).into());
        for message in prompt.history {
            let content = message.content.clone();
            let converted: ChatCompletionRequestMessage = match message.role {
                MessageRole::System => ChatCompletionRequestSystemMessage::from(content).into(),
                MessageRole::User => ChatCompletionRequestUserMessage::from(content).into(),
                MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(content)
                    .build()?
                    .into(),
            };
            messages.push(converted);
        }
        messages.push(ChatCompletionRequestUserMessage::from(prompt.user).into());

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.settings.temperature)
            .max_tokens(self.settings.max_tokens)
            .stream(true)
            .build()
    }
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        self.name
    }

    async fn stream_generate(&self, request: GenerationRequest) -> FragmentStream {
        let name = self.name;
        let chat_request = match self.build_request(&request) {
            Ok(chat_request) => chat_request,
            Err(err) => {
                warn!(provider = name, error = %err, "Failed to build chat request");
                return diagnostic_stream(name, err);
            }
        };
        let client = self.client.clone();
        let model = self.model.clone();

        Box::pin(stream! {
            let mut upstream = match client.chat().create_stream(chat_request).await {
                Ok(upstream) => upstream,
                Err(err) => {
                    warn!(provider = name, error = %err, "Failed to open completion stream");
                    yield diagnostic_fragment(name, err);
                    return;
                }
            };

            let mut fragments = 0usize;
            while let Some(item) = upstream.next().await {
                match item {
                    Ok(response) => {
                        let content = response
                            .choices
                            .first()
                            .and_then(|choice| choice.delta.content.clone())
                            .unwrap_or_default();

                        if !content.is_empty() {
                            fragments = fragments.saturating_add(1);
                            yield content;
                        }
                    }
                    Err(err) => {
                        warn!(provider = name, error = %err, fragments, "Completion stream failed");
                        yield diagnostic_fragment(name, err);
                        return;
                    }
                }
            }

            debug!(provider = name, model = %model, fragments, "Completion stream finished");
        })
    }
}
