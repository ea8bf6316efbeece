//! Gemini-backed copier
//!
//! One `generateContent` call per copy, with a JSON response schema pinning
//! the output to `{"new_passage": ...}` at temperature 0. A key is acquired
//! from the pool per call and the HTTP request runs outside any pool lock,
//! so dispatch is never serialized behind network latency.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use gemini_pool::KeyPool;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{Copier, Error, Result};

/// Instruction prepended to every candidate chunk.
const COPY_PROMPT: &str = "Copy the following text until you reach a natural breaking point, \
    such as the end of a section or topic:\n\n";

/// Expected JSON payload inside the model's text part.
#[derive(Debug, Deserialize)]
struct CopiedPassage {
    new_passage: String,
}

/// `Copier` implementation over the Gemini REST API.
pub struct GeminiCopier {
    pool: Arc<KeyPool>,
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiCopier {
    pub fn new(pool: Arc<KeyPool>, http: reqwest::Client, base_url: String, model: String) -> Self {
        Self {
            pool,
            http,
            base_url,
            model,
        }
    }

    async fn copy(&self, text: &str) -> Result<String> {
        let selected = self.pool.acquire().await?;
        debug!(key_id = %selected.id, chars = text.len(), "dispatching copy request");
        metrics::counter!("copy_requests_total").increment(1);

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": format!("{COPY_PROMPT}{text}") }] }],
            "generationConfig": {
                "temperature": 0.0,
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": { "new_passage": { "type": "STRING" } },
                    "required": ["new_passage"]
                }
            }
        });

        // The API key travels in a header, not the URL, so it can't leak
        // through request logging.
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", selected.key.expose())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let payload: serde_json::Value = response.json().await?;
        parse_copy_response(&payload)
    }
}

impl Copier for GeminiCopier {
    fn copy_to_boundary<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.copy(text))
    }
}

/// Extract the copied passage from a `generateContent` response body.
///
/// The model's structured output arrives as a JSON string inside
/// `candidates[0].content.parts[0].text`; a missing part or a payload that
/// doesn't match the schema is a hard failure for this attempt.
fn parse_copy_response(payload: &serde_json::Value) -> Result<String> {
    let text = payload
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            Error::InvalidResponse("missing candidates[0].content.parts[0].text".into())
        })?;

    let copied: CopiedPassage = serde_json::from_str(text)
        .map_err(|e| Error::InvalidResponse(format!("expected new_passage JSON: {e}")))?;

    Ok(copied.new_passage.trim().to_owned())
}
