//! OpenAI-compatible provider.
//!
//! One client implements both capabilities against any endpoint speaking the
//! OpenAI chat/embeddings wire format. Response parsing is kept in pure
//! functions so it is testable without a network.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{EmbeddingProvider, ExtractionOutput, ExtractionProvider, ProviderError};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

const EXTRACTION_PROMPT: &str = r#"You extract a knowledge graph from text.

Return ONLY a JSON object with this shape, no explanation:
{
  "entities": [{"name": "...", "entity_type": "..."}],
  "facts": [{"source": "...", "target": "...", "name": "...", "assertion": "...", "valid_at": null}]
}

Rules:
- entity_type is a short lowercase label such as "person", "organization", "product", "location".
- "name" on a fact is a short snake_case relationship type such as "works_at" or "purchased".
- "assertion" is one full sentence stating the relationship.
- "valid_at" is an RFC 3339 timestamp when the text states when the relationship began, otherwise null.
- Endpoints of every fact must appear in "entities".
- Extract only what the text supports."#;

const ENHANCEMENT_PROMPT: &str = r#"You are a query enhancement assistant for a knowledge graph search system.

Your task: Convert a natural language question into a keyword-rich query that contains:
1. Entity names (people, companies, products, locations)
2. Key concepts and relationships
3. Action verbs and important context words

Rules:
- Extract all proper nouns (names, companies, products)
- Include relevant action words (left, joined, purchased, managed, etc.)
- Remove question words (what, when, where, who, how, why)
- Keep it concise (5-15 words)
- Return ONLY the enhanced query, no explanation

Examples:
Input: "What happened to David Chen?"
Output: David Chen departure left manager Engineering

Input: "What car did John Anderson buy?"
Output: John Anderson purchase buy car vehicle

Input: "Who reports to Sarah Martinez?"
Output: Sarah Martinez reports direct reports team members"#;

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible API.
pub struct OpenAiProvider {
    api_key: String,
    api_base_url: String,
    chat_model: String,
    embedding_model: String,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        api_base_url: Option<String>,
        chat_model: String,
        embedding_model: String,
    ) -> Self {
        Self {
            api_key,
            api_base_url: api_base_url.unwrap_or_else(|| OPENAI_API_BASE.to_string()),
            chat_model,
            embedding_model,
            client: Client::new(),
        }
    }

    async fn chat(&self, system: &str, user: String) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: self.chat_model.clone(),
            messages: vec![
                ChatMessage { role: "system", content: system.to_string() },
                ChatMessage { role: "user", content: user },
            ],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.api_base_url);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("chat response: {e}")))?;
        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed("no completion choices".to_string()))
    }
}

#[async_trait]
impl ExtractionProvider for OpenAiProvider {
    async fn extract(
        &self,
        text: &str,
        context: &str,
    ) -> Result<ExtractionOutput, ProviderError> {
        let user = if context.is_empty() {
            format!("Text:\n{text}")
        } else {
            format!("Context:\n{context}\n\nText:\n{text}")
        };
        let content = self.chat(EXTRACTION_PROMPT, user).await?;
        parse_extraction(&content)
    }

    async fn confirm_equivalence(&self, left: &str, right: &str) -> Result<bool, ProviderError> {
        let user = format!(
            "Do \"{left}\" and \"{right}\" refer to the same real-world entity? \
             Answer with exactly one word: yes or no."
        );
        let content = self
            .chat("You decide entity identity for a knowledge graph.", user)
            .await?;
        parse_yes_no(&content)
    }

    async fn enhance_query(&self, query: &str) -> Result<String, ProviderError> {
        let content = self
            .chat(
                ENHANCEMENT_PROMPT,
                format!("Now enhance this query:\nInput: {query}\nOutput:"),
            )
            .await?;
        Ok(normalize_enhanced(query, &content))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input: text.to_string(),
        };
        let url = format!("{}/embeddings", self.api_base_url);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("embedding response: {e}")))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::Malformed("no embedding returned".to_string()))
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(err.to_string())
    }
}

fn classify_status(status: u16, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited,
        401 | 403 => ProviderError::Auth(body),
        408 => ProviderError::Timeout,
        _ => ProviderError::Api { status, message: body },
    }
}

/// Strip a Markdown code fence if the model wrapped its JSON in one.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Parse model output into an [`ExtractionOutput`]. Facts whose endpoints
/// are blank are dropped rather than failing the whole batch.
pub fn parse_extraction(content: &str) -> Result<ExtractionOutput, ProviderError> {
    let mut output: ExtractionOutput = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| ProviderError::Malformed(format!("extraction json: {e}")))?;
    output.entities.retain(|e| !e.name.trim().is_empty());
    output
        .facts
        .retain(|f| !f.source.trim().is_empty() && !f.target.trim().is_empty());
    Ok(output)
}

/// Parse a yes/no answer. Anything that does not start with yes or no is
/// malformed; identity decisions must not be guessed from mush.
pub fn parse_yes_no(content: &str) -> Result<bool, ProviderError> {
    let lower = content.trim().to_lowercase();
    if lower.starts_with("yes") {
        Ok(true)
    } else if lower.starts_with("no") {
        Ok(false)
    } else {
        Err(ProviderError::Malformed(format!("expected yes/no, got: {content}")))
    }
}

/// Keep the enhanced query only when it is usable; a blank or trivially
/// short rewrite falls back to the original.
pub fn normalize_enhanced(original: &str, enhanced: &str) -> String {
    let trimmed = enhanced.trim();
    if trimmed.len() < 3 {
        original.to_string()
    } else {
        trimmed.to_string()
    }
}
