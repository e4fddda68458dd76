//! # Streaming Request Executor
//!
//! Issues a single streaming HTTP request against an OpenAI/vLLM-compatible
//! completion endpoint and reduces the server-sent-event stream into a
//! [`RequestOutcome`] with per-token timing:
//!
//! - **TTFT**: elapsed time from dispatch to the first generated token
//! - **ITL**: delta between each pair of consecutive tokens
//! - **E2EL**: total wall-clock latency for the request
//!
//! All executors share one pooled [`reqwest::Client`] injected at
//! construction, so connection reuse is bounded by the pool rather than by
//! per-request session churn.
//!
//! ## Failure classes
//!
//! A non-2xx response is a definitive application-level failure: the executor
//! returns a cleanly failed outcome carrying the status and body, and the
//! retry policy leaves it alone. Transport problems (connect failure, timeout,
//! mid-stream read error) surface as [`TransportError`] and are retryable.
//! Malformed JSON fragments inside an otherwise healthy stream are skipped
//! without failing the request.

use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use tracing::debug;

/// Literal prefix of a data frame in the event stream.
const DATA_PREFIX: &str = "data: ";

/// Stream terminator payload.
const DONE_SENTINEL: &str = "[DONE]";

/// A single synthetic (or externally supplied) request to benchmark.
///
/// Immutable once created; produced by the generator or handed in by a
/// caller that brings its own prompt set.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Prompt text sent to the completion endpoint.
    pub prompt: String,
    /// Number of shared prefix tokens at the head of the prompt.
    pub prefix_len: usize,
    /// Total prompt length in tokens (prefix included).
    pub prompt_len: usize,
    /// Target number of output tokens (`max_tokens` in the request body).
    pub output_len: usize,
    /// Optional multimodal payload forwarded verbatim in the request body.
    pub multimodal: Option<serde_json::Value>,
    /// Optional model or LoRA identifier overriding the executor default.
    pub model_override: Option<String>,
}

/// The observed result of one request.
///
/// Created exactly once by the executor (or synthesized by the retry policy
/// after exhausting attempts) and never mutated afterwards. All durations are
/// wall-clock seconds.
///
/// Invariant: when `success` is true, `latency >= ttft >= 0` and
/// `itl.len() == output_tokens - 1` (or 0 when fewer than two tokens
/// arrived).
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub success: bool,
    pub generated_text: String,
    pub prompt_len: usize,
    /// Tokens observed on the stream. `None` when the executor could not
    /// count them; the aggregator then estimates via the tokenizer.
    pub output_tokens: Option<usize>,
    /// End-to-end latency in seconds.
    pub latency: f64,
    /// Time to first token in seconds.
    pub ttft: f64,
    /// Inter-token latencies in seconds, in arrival order.
    pub itl: Vec<f64>,
    /// Present iff `success` is false.
    pub error: Option<String>,
}

impl RequestOutcome {
    /// A failed outcome carrying only the prompt length and an error message.
    pub fn failure(prompt_len: usize, error: impl Into<String>) -> Self {
        Self {
            success: false,
            generated_text: String::new(),
            prompt_len,
            output_tokens: None,
            latency: 0.0,
            ttft: 0.0,
            itl: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Capability interface for issuing one benchmark request.
///
/// The backend set is closed: every supported service speaks the
/// OpenAI-compatible completion protocol, so [`OpenAiExecutor`] covers all
/// current variants. New backends are added as new implementations rather
/// than entries in a string-keyed registry.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Perform one streaming request.
    ///
    /// `Ok` carries the per-request outcome, including cleanly failed ones
    /// (non-2xx status). `Err` is reserved for transport-level failures,
    /// which the retry policy may re-attempt.
    async fn execute(&self, descriptor: &RequestDescriptor) -> Result<RequestOutcome, TransportError>;

    /// Ask the remote service to toggle server-side profiling.
    ///
    /// Used by the orchestrator for the `/start_profile` and `/stop_profile`
    /// hooks; callers treat failures as non-fatal. Backends without a profile
    /// endpoint accept the call and do nothing.
    async fn toggle_profile(
        &self,
        _url: &str,
        _descriptor: &RequestDescriptor,
    ) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Streaming executor for OpenAI-compatible completion endpoints (vLLM
/// included, which exposes the same wire protocol).
pub struct OpenAiExecutor {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    logprobs: Option<u32>,
    best_of: u32,
    ignore_eos: bool,
}

impl OpenAiExecutor {
    /// Create an executor bound to one endpoint and one shared client.
    pub fn new(client: reqwest::Client, api_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            api_key: None,
            model: model.into(),
            logprobs: None,
            best_of: 1,
            ignore_eos: false,
        }
    }

    /// Attach a bearer credential to every request.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Request log-probabilities for each generated token.
    pub fn with_logprobs(mut self, logprobs: Option<u32>) -> Self {
        self.logprobs = logprobs;
        self
    }

    /// Generate `best_of` candidates server-side (only serialized when > 1).
    pub fn with_best_of(mut self, best_of: u32) -> Self {
        self.best_of = best_of;
        self
    }

    /// Ask the server to keep generating past end-of-sequence tokens.
    pub fn with_ignore_eos(mut self, ignore_eos: bool) -> Self {
        self.ignore_eos = ignore_eos;
        self
    }

    /// Build the JSON request body for a descriptor.
    fn build_body(&self, descriptor: &RequestDescriptor) -> serde_json::Value {
        let model = descriptor.model_override.as_deref().unwrap_or(&self.model);
        let mut body = json!({
            "model": model,
            "prompt": descriptor.prompt,
            "max_tokens": descriptor.output_len,
            "stream": true,
        });
        if let Some(logprobs) = self.logprobs {
            body["logprobs"] = json!(logprobs);
        }
        if self.best_of > 1 {
            body["best_of"] = json!(self.best_of);
        }
        if self.ignore_eos {
            body["stop"] = json!([]);
        }
        if let Some(multimodal) = &descriptor.multimodal {
            body["multi_modal_data"] = multimodal.clone();
        }
        body
    }
}

#[async_trait]
impl RequestExecutor for OpenAiExecutor {
    async fn execute(&self, descriptor: &RequestDescriptor) -> Result<RequestOutcome, TransportError> {
        let started = Instant::now();

        let mut request = self
            .client
            .post(&self.api_url)
            .json(&self.build_body(descriptor));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(TransportError::from)?;
        let status = response.status();
        if !status.is_success() {
            // Definitive application-level failure; the retry policy must
            // not see this as a transport exception.
            let body = response.text().await.unwrap_or_default();
            return Ok(RequestOutcome::failure(
                descriptor.prompt_len,
                format!("HTTP error: {}, {}", status.as_u16(), body),
            ));
        }

        let mut stream = response.bytes_stream();
        let mut pending = String::new();
        let mut generated_text = String::new();
        let mut output_tokens = 0usize;
        let mut ttft = 0.0f64;
        let mut itl: Vec<f64> = Vec::new();
        let mut prev_token_at = started;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(TransportError::from)?;
            pending.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = pending.find('\n') {
                let line: String = pending.drain(..=newline).collect();
                if let Some(token) = parse_stream_line(line.trim()) {
                    if token.is_empty() {
                        continue;
                    }
                    generated_text.push_str(&token);
                    output_tokens += 1;

                    let now = Instant::now();
                    if output_tokens == 1 {
                        ttft = now.duration_since(started).as_secs_f64();
                    } else {
                        itl.push(now.duration_since(prev_token_at).as_secs_f64());
                    }
                    prev_token_at = now;
                }
            }
        }

        // A final frame may arrive without a trailing newline.
        if let Some(token) = parse_stream_line(pending.trim()) {
            if !token.is_empty() {
                generated_text.push_str(&token);
                output_tokens += 1;
                let now = Instant::now();
                if output_tokens == 1 {
                    ttft = now.duration_since(started).as_secs_f64();
                } else {
                    itl.push(now.duration_since(prev_token_at).as_secs_f64());
                }
            }
        }

        Ok(RequestOutcome {
            success: true,
            generated_text,
            prompt_len: descriptor.prompt_len,
            output_tokens: Some(output_tokens),
            latency: started.elapsed().as_secs_f64(),
            ttft,
            itl,
            error: None,
        })
    }

    async fn toggle_profile(
        &self,
        url: &str,
        descriptor: &RequestDescriptor,
    ) -> Result<(), TransportError> {
        let mut request = self.client.post(url).json(&self.build_body(descriptor));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(TransportError::from)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError(format!(
                "profile hook returned HTTP {}",
                status.as_u16()
            )))
        }
    }
}

/// One frame of the completion stream.
#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    text: String,
}

/// Extract the generated text from one stream line.
///
/// Returns `None` for non-data lines, the `[DONE]` sentinel, and malformed
/// JSON fragments. Malformed fragments are skipped rather than failing the
/// stream.
fn parse_stream_line(line: &str) -> Option<String> {
    let payload = line.strip_prefix(DATA_PREFIX)?;
    if payload == DONE_SENTINEL {
        return None;
    }
    match serde_json::from_str::<CompletionChunk>(payload) {
        Ok(chunk) => chunk.choices.into_iter().next().map(|choice| choice.text),
        Err(err) => {
            debug!("skipping malformed stream fragment: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_line() {
        let line = r#"data: {"choices":[{"text":"hello"}]}"#;
        assert_eq!(parse_stream_line(line), Some("hello".to_string()));
    }

    #[test]
    fn test_parse_done_sentinel() {
        assert_eq!(parse_stream_line("data: [DONE]"), None);
    }

    #[test]
    fn test_parse_non_data_line() {
        assert_eq!(parse_stream_line(": keepalive"), None);
        assert_eq!(parse_stream_line(""), None);
    }

    #[test]
    fn test_parse_malformed_fragment_is_skipped() {
        assert_eq!(parse_stream_line("data: {not json"), None);
    }

    #[test]
    fn test_parse_empty_choices() {
        assert_eq!(parse_stream_line(r#"data: {"choices":[]}"#), None);
    }

    #[test]
    fn test_parse_missing_text_defaults_empty() {
        let line = r#"data: {"choices":[{"index":0}]}"#;
        assert_eq!(parse_stream_line(line), Some(String::new()));
    }

    #[test]
    fn test_build_body_minimal() {
        let executor = OpenAiExecutor::new(reqwest::Client::new(), "http://x/v1/completions", "m");
        let descriptor = RequestDescriptor {
            prompt: "hi".to_string(),
            prefix_len: 0,
            prompt_len: 1,
            output_len: 16,
            multimodal: None,
            model_override: None,
        };
        let body = executor.build_body(&descriptor);
        assert_eq!(body["model"], "m");
        assert_eq!(body["prompt"], "hi");
        assert_eq!(body["max_tokens"], 16);
        assert_eq!(body["stream"], true);
        assert!(body.get("logprobs").is_none());
        assert!(body.get("best_of").is_none());
        assert!(body.get("stop").is_none());
    }

    #[test]
    fn test_build_body_optional_fields() {
        let executor = OpenAiExecutor::new(reqwest::Client::new(), "http://x/v1/completions", "m")
            .with_logprobs(Some(5))
            .with_best_of(3)
            .with_ignore_eos(true);
        let descriptor = RequestDescriptor {
            prompt: "hi".to_string(),
            prefix_len: 0,
            prompt_len: 1,
            output_len: 16,
            multimodal: None,
            model_override: Some("lora-a".to_string()),
        };
        let body = executor.build_body(&descriptor);
        assert_eq!(body["model"], "lora-a");
        assert_eq!(body["logprobs"], 5);
        assert_eq!(body["best_of"], 3);
        assert_eq!(body["stop"], serde_json::json!([]));
    }

    #[test]
    fn test_failure_outcome_shape() {
        let outcome = RequestOutcome::failure(7, "boom");
        assert!(!outcome.success);
        assert_eq!(outcome.prompt_len, 7);
        assert_eq!(outcome.error.as_deref(), Some("boom"));
        assert!(outcome.itl.is_empty());
    }
}
