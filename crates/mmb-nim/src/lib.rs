//! NVIDIA NIM adapter (OpenAI-compatible chat completions).
//!
//! Owns the model catalog, API-key rotation and request pacing. Failures map
//! into `mmb_core::Error` so the bot core handles them uniformly.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use serde::Serialize;
use tokio::{sync::Mutex, time::Instant};

use mmb_core::{errors::Error, Result};

/// One selectable model: the label shown on keyboards and the provider id
/// sent to the API.
#[derive(Clone, Copy, Debug)]
pub struct ModelSpec {
    pub label: &'static str,
    pub id: &'static str,
}

pub const MODELS: &[ModelSpec] = &[
    ModelSpec { label: "LLaMA-8b", id: "meta/llama3-8b-instruct" },
    ModelSpec { label: "LLaMA-70b", id: "meta/llama3-70b-instruct" },
    ModelSpec { label: "LLaMA-405b", id: "meta/llama-3.1-405b-instruct" },
    ModelSpec { label: "Mistral-7b", id: "mistralai/mistral-7b-instruct-v0.2" },
    ModelSpec { label: "Gemma-7b", id: "google/gemma-7b" },
    ModelSpec { label: "Nemotron-340b", id: "nvidia/nemotron-4-340b-instruct" },
    ModelSpec { label: "Arctic", id: "snowflake/arctic" },
    ModelSpec { label: "Phi-3mini", id: "microsoft/phi-3-mini-128k-instruct" },
    ModelSpec { label: "DeepSeek-v3", id: "deepseek/deepseek-v3.2" },
    ModelSpec { label: "Qwen-3coder", id: "qwen/qwen-3-coder" },
    ModelSpec { label: "Kimi-2.5", id: "kimi/kimi-2.5" },
];

/// Maps a keyboard label to the provider model id.
pub fn resolve_model(label: &str) -> Option<&'static str> {
    MODELS.iter().find(|m| m.label == label).map(|m| m.id)
}

#[derive(Clone, Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }
}

#[derive(Clone, Debug)]
pub struct NimConfig {
    pub base_url: String,
    pub api_keys: Vec<String>,
    pub timeout: Duration,
    pub max_completion_tokens: u32,
}

/// Upstream allows 40 req/min per key; space requests slightly wider.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(1600);
const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug)]
pub struct NimClient {
    http: reqwest::Client,
    base_url: String,
    api_keys: Vec<String>,
    max_completion_tokens: u32,
    next_key: AtomicUsize,
    last_request: Mutex<Option<Instant>>,
}

impl NimClient {
    pub fn new(cfg: NimConfig) -> Result<Self> {
        if cfg.api_keys.is_empty() {
            return Err(Error::Config("at least one NIM API key is required".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::External(format!("http client init failed: {e}")))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_keys: cfg.api_keys,
            max_completion_tokens: cfg.max_completion_tokens,
            next_key: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    /// Runs one chat completion and returns the assistant text. Rotates keys
    /// per request; on HTTP 429, cools down and retries a bounded number of
    /// times with the next key.
    pub async fn chat_completion(&self, model_id: &str, messages: &[ChatMessage]) -> Result<String> {
        self.pace().await;

        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": model_id,
            "messages": messages,
            "max_tokens": self.max_completion_tokens,
            "temperature": 0.7,
        });

        for attempt in 1..=MAX_ATTEMPTS {
            let resp = self
                .http
                .post(&url)
                .bearer_auth(self.next_key())
                .json(&body)
                .send()
                .await
                .map_err(|e| Error::External(format!("nim request error: {e}")))?;

            if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                tracing::warn!(model = model_id, attempt, "nim rate limited, cooling down");
                if attempt < MAX_ATTEMPTS {
                    tokio::time::sleep(RATE_LIMIT_COOLDOWN).await;
                }
                continue;
            }

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::External(format!(
                    "nim chat completion failed: {status} {}",
                    body.chars().take(200).collect::<String>()
                )));
            }

            let v: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| Error::External(format!("nim json error: {e}")))?;

            let text = v
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("message"))
                .and_then(|m| m.get("content"))
                .and_then(|t| t.as_str())
                .unwrap_or("")
                .to_string();

            if text.trim().is_empty() {
                return Err(Error::External("nim returned an empty completion".to_string()));
            }
            return Ok(text);
        }

        Err(Error::External(format!(
            "nim rate limited after {MAX_ATTEMPTS} attempts"
        )))
    }

    /// Round-robin over the configured keys.
    fn next_key(&self) -> &str {
        let idx = self.next_key.fetch_add(1, Ordering::Relaxed) % self.api_keys.len();
        &self.api_keys[idx]
    }

    /// Keep successive requests at least `MIN_REQUEST_INTERVAL` apart.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        let now = Instant::now();
        if let Some(prev) = *last {
            let elapsed = now.duration_since(prev);
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
