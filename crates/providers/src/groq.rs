//! Client for the Groq chat-completion endpoint.
//!
//! All public operations return renderable values instead of errors: the
//! presentation layer has no generic error boundary, so transport failures
//! are converted to descriptive strings at this boundary and never
//! propagate further.

use std::collections::HashMap;
use std::env;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::chat::ExecutedTool;
use shared::context::ApiMessage;

use crate::sse::SseParser;

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai";

/// Single-shot responses are memoized by exact request for this long.
/// An optimization only; callers must not depend on freshness inside it.
const CACHE_TTL: Duration = Duration::from_secs(3600);

/// Upstream ceiling for base64-encoded inline images.
pub const MAX_INLINE_IMAGE_BYTES: usize = 4 * 1024 * 1024;

const NOT_CONFIGURED: &str = "Error: API not configured. Please provide an API key.";

// ── Request / response types ─────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Value],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    /// Tool invocations reported by the agentic compound models.
    #[serde(default)]
    executed_tools: Option<Vec<ExecutedTool>>,
}

// ── Outcomes ─────────────────────────────────────────────────────────

/// Result of a streaming call. `content` is either the full completion or a
/// renderable error message.
#[derive(Debug, Default)]
pub struct StreamOutcome {
    pub content: String,
    pub executed_tools: Vec<ExecutedTool>,
}

impl StreamOutcome {
    fn error(message: String) -> Self {
        Self {
            content: message,
            executed_tools: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct ImageOutcome {
    pub content: String,
    pub executed_tools: Vec<ExecutedTool>,
    pub image_processed: bool,
}

/// An image to splice into the most recent user turn.
#[derive(Debug, Clone)]
pub enum ImageAttachment {
    Url(String),
    Inline {
        media_type: String,
        base64_data: String,
    },
}

impl ImageAttachment {
    /// Encoded size of an inline payload; `None` for URL attachments.
    pub fn inline_len(&self) -> Option<usize> {
        match self {
            ImageAttachment::Url(_) => None,
            ImageAttachment::Inline { base64_data, .. } => Some(base64_data.len()),
        }
    }

    fn to_content_part(&self) -> Value {
        let url = match self {
            ImageAttachment::Url(url) => url.clone(),
            ImageAttachment::Inline {
                media_type,
                base64_data,
            } => format!("data:{media_type};base64,{base64_data}"),
        };
        json!({"type": "image_url", "image_url": {"url": url}})
    }
}

struct CacheEntry {
    content: String,
    stored_at: Instant,
}

// ── Client ───────────────────────────────────────────────────────────

pub struct GroqClient {
    http: Client,
    api_key: Option<String>,
    base_url: String,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl Default for GroqClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GroqClient {
    /// Builds a client keyed from `GROQ_API_KEY` when present; otherwise
    /// unconfigured until [`set_api_key`](Self::set_api_key) is called.
    pub fn new() -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            api_key: env::var("GROQ_API_KEY").ok().filter(|k| !k.is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_api_key(key: impl Into<String>) -> Self {
        let mut client = Self::new();
        client.set_api_key(key);
        client
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Reconfigures the bearer token. In-flight calls keep the old key.
    pub fn set_api_key(&mut self, key: impl Into<String>) {
        self.api_key = Some(key.into());
        tracing::info!("API key configured");
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Connection-pool handle for sibling endpoint clients.
    pub(crate) fn http_handle(&self) -> Client {
        self.http.clone()
    }

    fn bearer(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| anyhow!("no API key"))
    }

    // ── Single-shot (memoized) ───────────────────────────────────────

    /// Single completion, memoized by the exact request tuple for
    /// [`CACHE_TTL`]. Failures come back as a descriptive string.
    pub async fn get_cached_response(
        &self,
        model: &str,
        messages: &[ApiMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> String {
        if !self.is_configured() {
            return NOT_CONFIGURED.to_string();
        }

        let wire = to_wire(messages);
        let key = cache_key(model, &wire, temperature, max_tokens);
        if let Some(hit) = self.cache_lookup(&key) {
            tracing::info!(model, "cache hit for single-shot call");
            return hit;
        }

        match self.complete(model, &wire, temperature, max_tokens).await {
            Ok(content) => {
                self.cache.lock().insert(
                    key,
                    CacheEntry {
                        content: content.clone(),
                        stored_at: Instant::now(),
                    },
                );
                content
            }
            Err(e) => {
                tracing::error!(model, error = %e, "single-shot API call failed");
                format!("API call error: {e}")
            }
        }
    }

    fn cache_lookup(&self, key: &str) -> Option<String> {
        let mut cache = self.cache.lock();
        match cache.get(key) {
            Some(entry) if entry.stored_at.elapsed() < CACHE_TTL => Some(entry.content.clone()),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    async fn complete(
        &self,
        model: &str,
        wire: &[Value],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let started = Instant::now();
        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.bearer()?)
            .json(&ChatRequest {
                model,
                messages: wire,
                temperature,
                max_tokens,
                stream: None,
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        let body: ChatResponse = resp.json().await?;
        tracing::info!(model, elapsed = ?started.elapsed(), "completion received");
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    // ── Streaming ────────────────────────────────────────────────────

    /// Streams a completion, invoking `on_partial` with the accumulated
    /// text after every content delta. The callback runs synchronously on
    /// the calling task; there is no background work.
    pub async fn generate_streaming_response(
        &self,
        model: &str,
        messages: &[ApiMessage],
        temperature: f32,
        max_tokens: u32,
        mut on_partial: impl FnMut(&str),
    ) -> StreamOutcome {
        if !self.is_configured() {
            return StreamOutcome::error(NOT_CONFIGURED.to_string());
        }
        let wire = to_wire(messages);
        match self
            .stream_inner(model, &wire, temperature, max_tokens, &mut on_partial)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(model, error = %e, "streaming API call failed");
                StreamOutcome::error(format!("API call error: {e}"))
            }
        }
    }

    /// As [`generate_streaming_response`](Self::generate_streaming_response),
    /// with an image attachment spliced into the most recent user turn.
    /// Oversized inline payloads are rejected before any network call.
    pub async fn generate_response_with_image(
        &self,
        model: &str,
        messages: &[ApiMessage],
        image: &ImageAttachment,
        temperature: f32,
        max_tokens: u32,
        mut on_partial: impl FnMut(&str),
    ) -> ImageOutcome {
        if !self.is_configured() {
            return ImageOutcome {
                content: NOT_CONFIGURED.to_string(),
                executed_tools: Vec::new(),
                image_processed: false,
            };
        }
        if let Some(len) = image.inline_len() {
            if len > MAX_INLINE_IMAGE_BYTES {
                let mib = len as f64 / (1024.0 * 1024.0);
                tracing::warn!(encoded_mib = mib, "rejecting oversized inline image");
                return ImageOutcome {
                    content: format!(
                        "Error: encoded image is {mib:.2} MiB, above the 4 MiB inline limit. \
                         Resize or compress the image and try again."
                    ),
                    executed_tools: Vec::new(),
                    image_processed: false,
                };
            }
        }

        let mut wire = to_wire(messages);
        let spliced = splice_image(&mut wire, image);
        if !spliced {
            tracing::warn!("no user turn found to attach the image to");
        }

        match self
            .stream_inner(model, &wire, temperature, max_tokens, &mut on_partial)
            .await
        {
            Ok(outcome) => ImageOutcome {
                content: outcome.content,
                executed_tools: outcome.executed_tools,
                image_processed: spliced,
            },
            Err(e) => {
                tracing::error!(model, error = %e, "image API call failed");
                ImageOutcome {
                    content: format!("API call error: {e}"),
                    executed_tools: Vec::new(),
                    image_processed: false,
                }
            }
        }
    }

    async fn stream_inner(
        &self,
        model: &str,
        wire: &[Value],
        temperature: f32,
        max_tokens: u32,
        on_partial: &mut dyn FnMut(&str),
    ) -> Result<StreamOutcome> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let started = Instant::now();
        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.bearer()?)
            .json(&ChatRequest {
                model,
                messages: wire,
                temperature,
                max_tokens,
                stream: Some(true),
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        let mut parser = SseParser::new();
        let mut stream = resp.bytes_stream();
        let mut outcome = StreamOutcome::default();
        let mut chunk_count = 0usize;

        'read: while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| anyhow!("stream read error: {e}"))?;
            for event in parser.feed(&bytes) {
                if event.data == "[DONE]" {
                    break 'read;
                }
                let parsed: StreamResponse = match serde_json::from_str(&event.data) {
                    Ok(parsed) => parsed,
                    // Unparseable payloads (comments, pings) are skipped.
                    Err(_) => continue,
                };
                let Some(choice) = parsed.choices.into_iter().next() else {
                    continue;
                };
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        chunk_count += 1;
                        outcome.content.push_str(&content);
                        on_partial(&outcome.content);
                    }
                }
                if let Some(tools) = choice.delta.executed_tools {
                    outcome.executed_tools.extend(tools);
                }
                if choice.finish_reason.is_some() {
                    break 'read;
                }
            }
        }

        tracing::info!(
            model,
            chunks = chunk_count,
            tools = outcome.executed_tools.len(),
            elapsed = ?started.elapsed(),
            "streaming completed"
        );
        Ok(outcome)
    }
}

// ── Wire helpers ─────────────────────────────────────────────────────

fn to_wire(messages: &[ApiMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect()
}

/// Rewrites the last user turn into multi-part content carrying the image.
/// Returns false when the history has no user turn.
fn splice_image(wire: &mut [Value], image: &ImageAttachment) -> bool {
    let Some(turn) = wire
        .iter_mut()
        .rev()
        .find(|m| m.get("role").and_then(Value::as_str) == Some("user"))
    else {
        return false;
    };
    let text = turn
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    turn["content"] = json!([
        {"type": "text", "text": text},
        image.to_content_part(),
    ]);
    true
}

fn cache_key(model: &str, wire: &[Value], temperature: f32, max_tokens: u32) -> String {
    // f32 goes in via its exact bit pattern so close-but-different
    // temperatures never collide.
    json!([model, wire, temperature.to_bits(), max_tokens]).to_string()
}

async fn status_error(resp: reqwest::Response) -> anyhow::Error {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let detail: String = body.chars().take(800).collect();
    if detail.trim().is_empty() {
        anyhow!("groq error: {status}")
    } else {
        anyhow!("groq error: {status}\n{detail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::chat::Role;

    fn history() -> Vec<ApiMessage> {
        vec![
            ApiMessage::new(Role::System, "prompt"),
            ApiMessage::new(Role::User, "first"),
            ApiMessage::new(Role::Assistant, "reply"),
            ApiMessage::new(Role::User, "look at this"),
        ]
    }

    #[test]
    fn splice_image_targets_most_recent_user_turn() {
        let mut wire = to_wire(&history());
        let attached = splice_image(
            &mut wire,
            &ImageAttachment::Url("https://example.com/cat.png".into()),
        );
        assert!(attached);

        // Earlier turns untouched.
        assert_eq!(wire[1]["content"], "first");

        let parts = wire[3]["content"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "look at this");
        assert_eq!(
            parts[1]["image_url"]["url"],
            "https://example.com/cat.png"
        );
    }

    #[test]
    fn splice_image_builds_data_url_for_inline() {
        let mut wire = to_wire(&history());
        splice_image(
            &mut wire,
            &ImageAttachment::Inline {
                media_type: "image/jpeg".into(),
                base64_data: "aGVsbG8=".into(),
            },
        );
        let parts = wire[3]["content"].as_array().unwrap();
        assert_eq!(
            parts[1]["image_url"]["url"],
            "data:image/jpeg;base64,aGVsbG8="
        );
    }

    #[test]
    fn splice_image_without_user_turn_reports_false() {
        let mut wire = to_wire(&[ApiMessage::new(Role::System, "prompt")]);
        assert!(!splice_image(
            &mut wire,
            &ImageAttachment::Url("u".into())
        ));
    }

    #[tokio::test]
    async fn oversized_inline_image_is_rejected_before_any_call() {
        let client = GroqClient::with_api_key("test-key");
        let image = ImageAttachment::Inline {
            media_type: "image/png".into(),
            base64_data: "A".repeat(MAX_INLINE_IMAGE_BYTES + 1),
        };
        let outcome = client
            .generate_response_with_image("meta-llama/llama-4-scout-17b-16e-instruct",
                &history(), &image, 0.7, 1024, |_| {})
            .await;
        assert!(!outcome.image_processed);
        assert!(outcome.content.contains("4 MiB"));
        assert!(outcome.executed_tools.is_empty());
    }

    #[tokio::test]
    async fn unconfigured_client_returns_renderable_error() {
        let mut client = GroqClient::new();
        client.api_key = None;
        assert!(!client.is_configured());
        let outcome = client
            .generate_streaming_response("qwen-qwq-32b", &history(), 0.7, 1024, |_| {})
            .await;
        assert_eq!(outcome.content, NOT_CONFIGURED);

        let text = client
            .get_cached_response("qwen-qwq-32b", &history(), 0.7, 1024)
            .await;
        assert_eq!(text, NOT_CONFIGURED);
    }

    #[test]
    fn set_api_key_configures_client() {
        let mut client = GroqClient::new();
        client.api_key = None;
        client.set_api_key("k");
        assert!(client.is_configured());
        assert_eq!(client.api_key(), Some("k"));
    }

    #[test]
    fn cache_key_is_exact_over_the_request_tuple() {
        let wire = to_wire(&history());
        let a = cache_key("m", &wire, 0.7, 1024);
        let b = cache_key("m", &wire, 0.7, 1024);
        assert_eq!(a, b);
        assert_ne!(a, cache_key("m2", &wire, 0.7, 1024));
        assert_ne!(a, cache_key("m", &wire, 0.8, 1024));
        assert_ne!(a, cache_key("m", &wire, 0.7, 2048));
    }

    #[test]
    fn cache_lookup_expires_stale_entries() {
        let client = GroqClient::with_api_key("k");
        client.cache.lock().insert(
            "fresh".into(),
            CacheEntry {
                content: "hit".into(),
                stored_at: Instant::now(),
            },
        );
        // checked_sub: the monotonic clock may not reach back a full TTL
        // on a freshly booted machine.
        let Some(past) = Instant::now().checked_sub(CACHE_TTL + Duration::from_secs(1)) else {
            return;
        };
        client.cache.lock().insert(
            "stale".into(),
            CacheEntry {
                content: "old".into(),
                stored_at: past,
            },
        );
        assert_eq!(client.cache_lookup("fresh").as_deref(), Some("hit"));
        assert_eq!(client.cache_lookup("stale"), None);
        // Expired entry was dropped.
        assert!(!client.cache.lock().contains_key("stale"));
    }

    #[test]
    fn stream_payload_parses_content_and_tools() {
        let data = r#"{"choices":[{"delta":{"content":"hi","executed_tools":[{"type":"search","input":{"query":"q"},"output":{}}]},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        let choice = &parsed.choices[0];
        assert_eq!(choice.delta.content.as_deref(), Some("hi"));
        assert_eq!(choice.delta.executed_tools.as_ref().unwrap().len(), 1);
        assert!(choice.finish_reason.is_none());
    }
}
