/// LLM Client: the single point of entry for all Claude API calls.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// Agents depend on the `TextGenerator` trait; `LlmClient` is the production
/// implementation.
///
/// Model: claude-sonnet-4-5 (hardcoded, do not make configurable to prevent drift)
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;
#[cfg(test)]
pub mod scripted;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all LLM calls.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Shape the caller expects back. Rendered into the system prompt because the
/// Messages API has no native JSON mode.
#[derive(Debug, Clone, Copy)]
pub enum ResponseFormat {
    Text,
    /// A single JSON object matching `schema` (an example document).
    Json { schema: &'static str },
}

impl ResponseFormat {
    fn instruction(&self) -> Option<String> {
        match self {
            ResponseFormat::Text => None,
            ResponseFormat::Json { schema } => Some(format!(
                "{}\n\nRespond with a single JSON object shaped like:\n{schema}",
                prompts::JSON_ONLY_SYSTEM
            )),
        }
    }

    /// System prompt with the format instruction appended.
    pub fn apply(&self, system: &str) -> String {
        match self.instruction() {
            Some(instruction) => format!("{system}\n\n{instruction}"),
            None => system.to_string(),
        }
    }
}

/// Cumulative snapshots of a generation in progress: each item is the whole
/// text generated so far, not a delta.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// The text-generation capability every agent depends on.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        format: ResponseFormat,
    ) -> Result<String, LlmError>;

    /// Streaming completion. The default yields the finished text once.
    async fn complete_stream(
        &self,
        system: &str,
        prompt: &str,
        format: ResponseFormat,
    ) -> Result<SnapshotStream, LlmError> {
        let text = self.complete(system, prompt, format).await?;
        Ok(Box::pin(stream::iter(vec![Ok(text)])))
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Server-sent event payloads of a streaming Messages call. Only text deltas,
/// the stop marker and errors matter here.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: StreamDelta },
    MessageStop,
    Error { error: AnthropicErrorBody },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
}

/// The single LLM client used by the service.
/// Wraps the Anthropic Messages API with retry logic and structured output helpers.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
            api_key,
        })
    }

    /// Sends a request, retrying on 429 (rate limit) and 5xx errors with exponential backoff.
    async fn send_with_retry(
        &self,
        request_body: &AnthropicRequest<'_>,
    ) -> Result<reqwest::Response, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                // Try to parse error message
                let message = serde_json::from_str::<AnthropicError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    /// Makes a raw call to the Claude API, returning the full response object.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<LlmResponse, LlmError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        let llm_response: LlmResponse = self.send_with_retry(&request_body).await?.json().await?;

        debug!(
            "LLM call succeeded: input_tokens={}, output_tokens={}",
            llm_response.usage.input_tokens, llm_response.usage.output_tokens
        );

        Ok(llm_response)
    }

    /// Streaming call: yields the cumulative text after every text delta.
    pub async fn call_stream(&self, prompt: &str, system: &str) -> Result<SnapshotStream, LlmError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
            stream: true,
        };

        let response = self.send_with_retry(&request_body).await?;
        Ok(snapshots(response.bytes_stream()))
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        format: ResponseFormat,
    ) -> Result<String, LlmError> {
        let response = self.call(prompt, &format.apply(system)).await?;
        response
            .text()
            .map(str::to_string)
            .ok_or(LlmError::EmptyContent)
    }

    async fn complete_stream(
        &self,
        system: &str,
        prompt: &str,
        format: ResponseFormat,
    ) -> Result<SnapshotStream, LlmError> {
        self.call_stream(prompt, &format.apply(system)).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Server-sent events → cumulative snapshots
// ────────────────────────────────────────────────────────────────────────────

struct SseState<S> {
    bytes: Pin<Box<S>>,
    pending: Vec<u8>,
    text: String,
    done: bool,
}

/// What one SSE line means for the accumulated text.
#[derive(Debug, PartialEq)]
enum SseLine {
    Delta(String),
    Stop,
    Failed(String),
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    match serde_json::from_str::<StreamEvent>(data.trim()) {
        Ok(StreamEvent::ContentBlockDelta { delta }) => match delta.text {
            Some(text) if !text.is_empty() => SseLine::Delta(text),
            _ => SseLine::Skip,
        },
        Ok(StreamEvent::MessageStop) => SseLine::Stop,
        Ok(StreamEvent::Error { error }) => SseLine::Failed(error.message),
        Ok(StreamEvent::Other) => SseLine::Skip,
        Err(e) => {
            debug!("Ignoring unparseable SSE data line: {e}");
            SseLine::Skip
        }
    }
}

fn snapshots<S, B>(bytes: S) -> SnapshotStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        pending: Vec::new(),
        text: String::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }

            if let Some(pos) = state.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = state.pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                match parse_sse_line(line.trim_end()) {
                    SseLine::Delta(delta) => {
                        state.text.push_str(&delta);
                        let snapshot = state.text.clone();
                        return Some((Ok(snapshot), state));
                    }
                    SseLine::Stop => return None,
                    SseLine::Failed(message) => {
                        state.done = true;
                        return Some((Err(LlmError::Api { status: 0, message }), state));
                    }
                    SseLine::Skip => continue,
                }
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.pending.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(LlmError::Http(e)), state));
                }
                None => return None,
            }
        }
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// JSON helpers
// ────────────────────────────────────────────────────────────────────────────

/// Parses model output as JSON after stripping code fences.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let text = strip_json_fences(text);
    if text.is_empty() {
        return Err(LlmError::EmptyContent);
    }
    serde_json::from_str(text).map_err(LlmError::Parse)
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_parse_json_rejects_blank_output() {
        let result: Result<serde_json::Value, _> = parse_json("  ");
        assert!(matches!(result, Err(LlmError::EmptyContent)));
    }

    #[test]
    fn test_response_format_json_appends_schema() {
        let system = ResponseFormat::Json { schema: "{\"a\": 1}" }.apply("Base");
        assert!(system.starts_with("Base"));
        assert!(system.contains("{\"a\": 1}"));
        assert_eq!(ResponseFormat::Text.apply("Base"), "Base");
    }

    #[test]
    fn test_parse_sse_lines() {
        assert_eq!(
            parse_sse_line(
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#
            ),
            SseLine::Delta("Hi".to_string())
        );
        assert_eq!(parse_sse_line(r#"data: {"type":"message_stop"}"#), SseLine::Stop);
        assert_eq!(parse_sse_line("event: ping"), SseLine::Skip);
        assert_eq!(parse_sse_line(r#"data: {"type":"ping"}"#), SseLine::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#),
            SseLine::Failed("Overloaded".to_string())
        );
    }

    #[tokio::test]
    async fn test_snapshots_accumulate_across_split_chunks() {
        let body = concat!(
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let (a, b) = body.split_at(40);
        let chunks: Vec<Result<Vec<u8>, reqwest::Error>> =
            vec![Ok(a.as_bytes().to_vec()), Ok(b.as_bytes().to_vec())];

        let collected: Vec<String> = snapshots(stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(collected, vec!["Hel".to_string(), "Hello".to_string()]);
    }
}
