//! Reasoning service adapters

use crate::ReasoningError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Capability interface over the external classifier.
///
/// Takes a bounded structured payload and returns the raw reply text, which
/// the analyzer validates.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn classify(&self, payload: &str) -> Result<String, ReasoningError>;
}

/// Reasoner that always declines, so every analysis degrades to the
/// conservative default verdict. Used when no service is configured and in
/// tests that need the fail-closed path.
#[derive(Debug, Default, Clone)]
pub struct ConservativeReasoner;

#[async_trait]
impl ReasoningService for ConservativeReasoner {
    async fn classify(&self, _payload: &str) -> Result<String, ReasoningError> {
        Err(ReasoningError::Unavailable("no reasoning service configured".to_string()))
    }
}

/// Gemini connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub temperature: Option<f32>,
    /// HTTP request timeout (milliseconds)
    pub request_timeout_ms: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: String::new(),
            temperature: Some(0.2),
            request_timeout_ms: 60_000,
        }
    }
}

/// Reasoning service backed by the Gemini `generateContent` API in JSON mode
pub struct GeminiReasoner {
    client: Client,
    config: GeminiConfig,
}

impl GeminiReasoner {
    pub fn new(config: GeminiConfig) -> Result<Self, ReasoningError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ReasoningError::Transport(format!("failed to build HTTP client: {}", e)))?;
        info!("Creating Gemini reasoner with model: {}", config.model);
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }

    fn response_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "severity": { "type": "STRING", "enum": ["normal", "suspected", "confirmed"] },
                "confidence": { "type": "NUMBER" },
                "notify": { "type": "BOOLEAN" },
                "summary": { "type": "STRING" }
            },
            "required": ["severity", "confidence", "notify", "summary"]
        })
    }
}

#[async_trait]
impl ReasoningService for GeminiReasoner {
    async fn classify(&self, payload: &str) -> Result<String, ReasoningError> {
        let mut generation_config = json!({
            "responseMimeType": "application/json",
            "responseSchema": Self::response_schema(),
        });
        if let Some(temperature) = self.config.temperature {
            generation_config["temperature"] = json!(temperature);
        }

        let body = json!({
            "contents": [{ "parts": [{ "text": payload }] }],
            "generationConfig": generation_config,
        });

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ReasoningError::Timeout(self.config.request_timeout_ms)
                } else {
                    ReasoningError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!("Gemini returned HTTP {}", status);
            return Err(ReasoningError::Http {
                status,
                body: truncate(&body, 320),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ReasoningError::Malformed(format!("invalid Gemini response: {}", e)))?;

        let output = body["candidates"]
            .as_array()
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate["content"]["parts"].as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if output.trim().is_empty() {
            return Err(ReasoningError::Malformed("Gemini returned no text candidate".to_string()));
        }

        debug!("Gemini reply: {} chars", output.len());
        Ok(output)
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    let mut chars = value.chars();
    let truncated: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}
