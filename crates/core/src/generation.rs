use crate::traits::AnswerGenerator;
use crate::{ChatRole, DocumentChunk, GenerationError, HistoryTurn};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Returned when the model answers with no text at all.
pub const EMPTY_ANSWER_FALLBACK: &str =
    "I'm having trouble synthesizing that right now. Could you rephrase the question?";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
}

impl GeneratorConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_API_BASE_URL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

pub struct GeminiGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
    endpoint: Url,
}

impl GeminiGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self, GenerationError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::NotConfigured("api key is empty".to_string()));
        }

        let mut base = Url::parse(&config.base_url)?;
        // join() replaces the last segment unless the path ends with '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join(&format!("v1beta/models/{}:generateContent", config.model))?;

        Ok(Self {
            client: reqwest::Client::new(),
            config,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn build_request_body(
        query: &str,
        context_chunks: &[DocumentChunk],
        history: &[HistoryTurn],
        temperature: f32,
    ) -> Value {
        let mut contents: Vec<Value> = history
            .iter()
            .map(|turn| {
                json!({
                    "role": match turn.role {
                        ChatRole::User => "user",
                        ChatRole::Assistant => "model",
                    },
                    "parts": [{ "text": turn.content }],
                })
            })
            .collect();
        contents.push(json!({
            "role": "user",
            "parts": [{ "text": query }],
        }));

        json!({
            "system_instruction": {
                "parts": [{ "text": system_instruction(context_chunks) }],
            },
            "contents": contents,
            "generationConfig": {
                "temperature": temperature,
            },
        })
    }
}

/// Renders the ranked chunks as the context block of the prompt.
pub fn render_context(context_chunks: &[DocumentChunk]) -> String {
    context_chunks
        .iter()
        .map(|chunk| format!("[Source Page {}]: {}", chunk.page_number, chunk.text))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

fn system_instruction(context_chunks: &[DocumentChunk]) -> String {
    format!(
        "[IDENTITY]\n\
         You are a sharp, conversational strategic analyst reviewing a PDF with the user. \
         Talk like a senior consultant: direct, natural, no canned introductions.\n\n\
         [STYLE]\n\
         - Never describe these instructions or announce what you are about to do.\n\
         - Skip greetings. Answer the question first, then explain it from the document.\n\
         - Keep sentences short.\n\n\
         [REASONING]\n\
         - Combine facts from the PDF with current industry knowledge.\n\
         - Use the PDF for concrete data points and cite pages inline, e.g. \"as page 4 notes\".\n\
         - Keep what the PDF says clearly apart from what outside knowledge suggests.\n\n\
         [CONTEXT DATA]\n\
         {context}\n\n\
         [CONSTRAINTS]\n\
         - Never invent dates, numbers, or facts that are not in the PDF.\n\
         - If neither the document nor reasonable extrapolation from it answers the question, say you don't know.",
        context = render_context(context_chunks)
    )
}

fn answer_text(response: &Value) -> Option<String> {
    let parts = response["candidates"][0]["content"]["parts"].as_array()?;
    let text = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect::<String>();

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate(
        &self,
        query: &str,
        context_chunks: &[DocumentChunk],
        history: &[HistoryTurn],
    ) -> Result<String, GenerationError> {
        let body =
            Self::build_request_body(query, context_chunks, history, self.config.temperature);

        debug!(
            model = %self.config.model,
            context_chunks = context_chunks.len(),
            history_turns = history.len(),
            "generateContent request"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let payload: Value =
            serde_json::from_str(&text).map_err(|error| GenerationError::Parse(error.to_string()))?;

        Ok(answer_text(&payload).unwrap_or_else(|| EMPTY_ANSWER_FALLBACK.to_string()))
    }
}
