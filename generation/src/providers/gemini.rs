use async_stream::stream;
use async_trait::async_trait;
use common::{error::AppError, types::MessageRole};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    diagnostic_fragment, prompt::Prompt, registry::GenerationSettings, FragmentStream,
    GenerationProvider, GenerationRequest,
};

const PROVIDER_NAME: &str = "gemini";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn text(role: Option<&'static str>, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![GeminiPart { text: text.into() }],
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: GeminiError,
}

/// Google Gemini via the `streamGenerateContent` REST endpoint in SSE mode.
#[derive(Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    settings: GenerationSettings,
}

impl GeminiProvider {
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        model: &str,
        settings: GenerationSettings,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        let endpoint = format!(
            "{}/models/{model}:streamGenerateContent?alt=sse",
            base_url.trim_end_matches('/')
        );

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint,
            settings,
        })
    }

    fn build_body(&self, request: &GenerationRequest) -> GeminiRequest {
        let prompt = Prompt::from_request(request);

        let mut contents: Vec<GeminiContent> = prompt
            .history
            .iter()
            .map(|message| GeminiContent::text(Some(gemini_role(message.role)), &message.content))
            .collect();
        contents.push(GeminiContent::text(Some("user"), prompt.user));

        GeminiRequest {
            system_instruction: GeminiContent::text(None, prompt.system),
            contents,
            generation_config: GeminiGenerationConfig {
                temperature: self.settings.temperature,
                max_output_tokens: self.settings.max_tokens,
            },
        }
    }
}

/// Gemini only knows `user` and `model`; system turns in history are sent as user turns.
fn gemini_role(role: MessageRole) -> &'static str {
    match role {
        MessageRole::Assistant => "model",
        MessageRole::User | MessageRole::System => "user",
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn stream_generate(&self, request: GenerationRequest) -> FragmentStream {
        let body = self.build_body(&request);
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let endpoint = self.endpoint.clone();

        Box::pin(stream! {
            let response = match client
                .post(&endpoint)
                .header("x-goog-api-key", api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    warn!(provider = PROVIDER_NAME, error = %err, "Gemini request failed");
                    yield diagnostic_fragment(PROVIDER_NAME, err);
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                let cause = format!("{status}: {}", error_detail(&detail));
                warn!(provider = PROVIDER_NAME, %status, "Gemini rejected the request");
                yield diagnostic_fragment(PROVIDER_NAME, cause);
                return;
            }

            let mut events = response.bytes_stream().eventsource();
            let mut fragments = 0usize;
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        warn!(provider = PROVIDER_NAME, error = %err, fragments, "Gemini stream failed");
                        yield diagnostic_fragment(PROVIDER_NAME, err);
                        return;
                    }
                };
                if event.data.trim().is_empty() {
                    continue;
                }

                match parse_payload(&event.data) {
                    Ok(texts) => {
                        for text in texts {
                            fragments = fragments.saturating_add(1);
                            yield text;
                        }
                    }
                    Err(cause) => {
                        warn!(provider = PROVIDER_NAME, %cause, fragments, "Gemini stream reported an error");
                        yield diagnostic_fragment(PROVIDER_NAME, cause);
                        return;
                    }
                }
            }

            debug!(provider = PROVIDER_NAME, fragments, "Gemini stream finished");
        })
    }
}

/// Extracts the non-empty text parts of one streamed `GenerateContentResponse`.
fn parse_payload(payload: &str) -> Result<Vec<String>, String> {
    let chunk: StreamChunk =
        serde_json::from_str(payload).map_err(|err| format!("malformed stream event: {err}"))?;

    if let Some(error) = chunk.error {
        return Err(error.message);
    }

    Ok(chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .filter(|text| !text.is_empty())
                .collect()
        })
        .unwrap_or_default())
}

fn error_detail(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}
