//! Discord REST delivery

use crate::message::{mention_line, smart_split};
use crate::{DispatchError, MessageSink};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use storage::{GuildResolver, StorageError};
use tracing::{debug, info, warn};

/// Discord connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub api_base: String,
    #[serde(skip_serializing)]
    pub bot_token: String,
    /// HTTP request timeout (milliseconds)
    pub request_timeout_ms: u64,
    /// Discord's per-message character limit
    pub max_message_chars: usize,
    /// Resends after HTTP 429 before the message is given up
    pub max_rate_limit_retries: u8,
    /// Longest `retry_after` honoured (milliseconds); longer waits fail fast
    pub max_retry_after_ms: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base: "https://discord.com/api/v10".to_string(),
            bot_token: String::new(),
            request_timeout_ms: 10_000,
            max_message_chars: 2000,
            max_rate_limit_retries: 3,
            max_retry_after_ms: 5_000,
        }
    }
}

/// Posts messages to channels through the bot REST API
pub struct DiscordSink {
    client: Client,
    config: DiscordConfig,
}

impl DiscordSink {
    pub fn new(config: DiscordConfig) -> Result<Self, DispatchError> {
        if config.bot_token.trim().is_empty() {
            return Err(DispatchError::Config("bot token is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| DispatchError::Config(format!("failed to build HTTP client: {}", e)))?;
        info!("Creating Discord sink for {}", config.api_base);
        Ok(Self { client, config })
    }

    fn channel_url(&self, channel_id: u64) -> String {
        format!("{}/channels/{}", self.config.api_base.trim_end_matches('/'), channel_id)
    }

    async fn post(&self, channel_id: u64, content: &str, roles: &[u64], users: &[u64]) -> Result<(), DispatchError> {
        let url = format!("{}/messages", self.channel_url(channel_id));
        // Only the ids passed here may ping, regardless of what the text contains
        let body = json!({
            "content": content,
            "allowed_mentions": {
                "parse": [],
                "roles": roles.iter().map(u64::to_string).collect::<Vec<_>>(),
                "users": users.iter().map(u64::to_string).collect::<Vec<_>>(),
            }
        });

        let mut throttled: u8 = 0;
        loop {
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bot {}", self.config.bot_token))
                .json(&body)
                .send()
                .await
                .map_err(|e| DispatchError::Transport {
                    channel_id,
                    message: e.to_string(),
                })?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            if status == StatusCode::TOO_MANY_REQUESTS && throttled < self.config.max_rate_limit_retries {
                let wait = retry_after(response).await;
                if wait <= Duration::from_millis(self.config.max_retry_after_ms) {
                    throttled += 1;
                    warn!("Channel {} rate limited, retrying in {}ms", channel_id, wait.as_millis());
                    tokio::time::sleep(wait).await;
                    continue;
                }
                warn!("Channel {} rate limited for {}ms, giving up", channel_id, wait.as_millis());
            } else {
                warn!("Channel {} rejected message with HTTP {}", channel_id, status);
            }
            return Err(DispatchError::Rejected {
                channel_id,
                status: status.as_u16(),
            });
        }
    }
}

/// Wait requested by a 429: the body's fractional `retry_after`, else the
/// `Retry-After` header, else one second.
async fn retry_after(response: Response) -> Duration {
    let header = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok());
    let body = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| body["retry_after"].as_f64());

    let seconds = body.or(header).unwrap_or(1.0);
    Duration::from_secs_f64(seconds.clamp(0.0, 3600.0))
}

#[async_trait]
impl MessageSink for DiscordSink {
    async fn send(
        &self,
        channel_id: u64,
        body: &str,
        mention_role_ids: &[u64],
        mention_user_ids: &[u64],
    ) -> Result<(), DispatchError> {
        let mentions = mention_line(mention_role_ids, mention_user_ids);
        let content = if mentions.is_empty() {
            body.to_string()
        } else {
            format!("{}\n{}", mentions, body)
        };

        let chunks = smart_split(&content, self.config.max_message_chars);
        debug!("Sending {} chunk(s) to channel {}", chunks.len(), channel_id);

        for (index, chunk) in chunks.iter().enumerate() {
            if index == 0 {
                self.post(channel_id, chunk, mention_role_ids, mention_user_ids).await?;
            } else {
                self.post(channel_id, chunk, &[], &[]).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GuildResolver for DiscordSink {
    async fn guild_of(&self, channel_id: u64) -> Result<Option<u64>, StorageError> {
        let response = self
            .client
            .get(self.channel_url(channel_id))
            .header("Authorization", format!("Bot {}", self.config.bot_token))
            .send()
            .await
            .map_err(|e| StorageError::Lookup(format!("channel {}: {}", channel_id, e)))?;

        if !response.status().is_success() {
            return Err(StorageError::Lookup(format!(
                "channel {}: HTTP {}",
                channel_id,
                response.status()
            )));
        }
        let channel: Value = response
            .json()
            .await
            .map_err(|e| StorageError::Lookup(format!("channel {}: {}", channel_id, e)))?;

        // Snowflakes arrive as strings
        match channel["guild_id"].as_str() {
            Some(id) => id
                .parse()
                .map(Some)
                .map_err(|_| StorageError::Lookup(format!("channel {}: bad guild id {:?}", channel_id, id))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sink(server: &MockServer, max_message_chars: usize) -> DiscordSink {
        DiscordSink::new(DiscordConfig {
            api_base: server.uri(),
            bot_token: "token".to_string(),
            request_timeout_ms: 2000,
            max_message_chars,
            ..Default::default()
        })
        .unwrap()
    }

    async fn sent_bodies(server: &MockServer) -> Vec<Value> {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_mentions_lead_first_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/42/messages"))
            .and(header("Authorization", "Bot token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1" })))
            .expect(1)
            .mount(&server)
            .await;

        sink(&server, 2000).send(42, "outage", &[7], &[9]).await.unwrap();

        let bodies = sent_bodies(&server).await;
        assert_eq!(bodies[0]["content"], "<@&7> <@9>\noutage");
        assert_eq!(bodies[0]["allowed_mentions"]["roles"], json!(["7"]));
        assert_eq!(bodies[0]["allowed_mentions"]["users"], json!(["9"]));
    }

    #[tokio::test]
    async fn test_long_body_is_split_and_only_first_pings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let body = format!("{}\n{}", "a".repeat(30), "b".repeat(30));
        sink(&server, 40).send(42, &body, &[7], &[]).await.unwrap();

        let bodies = sent_bodies(&server).await;
        assert_eq!(bodies.len(), 2);
        assert!(bodies[0]["content"].as_str().unwrap().starts_with("<@&7>"));
        assert_eq!(bodies[1]["allowed_mentions"]["roles"], json!([]));
    }

    #[tokio::test]
    async fn test_rejection_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = sink(&server, 2000).send(42, "outage", &[], &[]).await.unwrap_err();
        assert!(matches!(err, DispatchError::Rejected { channel_id: 42, status: 403 }));
    }

    #[tokio::test]
    async fn test_rate_limited_message_is_resent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/42/messages"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(json!({ "retry_after": 0.01, "global": false })),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels/42/messages"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        sink(&server, 2000).send(42, "outage", &[7], &[]).await.unwrap();

        let bodies = sent_bodies(&server).await;
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0], bodies[1]);
    }

    #[tokio::test]
    async fn test_rate_limit_retries_are_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .expect(4)
            .mount(&server)
            .await;

        let err = sink(&server, 2000).send(42, "outage", &[], &[]).await.unwrap_err();
        assert!(matches!(err, DispatchError::Rejected { channel_id: 42, status: 429 }));
    }

    #[tokio::test]
    async fn test_long_rate_limit_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({ "retry_after": 60.0 })))
            .expect(1)
            .mount(&server)
            .await;

        let err = sink(&server, 2000).send(42, "outage", &[], &[]).await.unwrap_err();
        assert!(matches!(err, DispatchError::Rejected { status: 429, .. }));
    }

    #[tokio::test]
    async fn test_guild_of_channel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/111"))
            .and(header("Authorization", "Bot token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "111", "guild_id": "900" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/channels/222"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "222", "type": 1 })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/channels/333"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let sink = sink(&server, 2000);
        assert_eq!(sink.guild_of(111).await.unwrap(), Some(900));
        assert_eq!(sink.guild_of(222).await.unwrap(), None);
        assert!(matches!(sink.guild_of(333).await, Err(StorageError::Lookup(_))));
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(
            DiscordSink::new(DiscordConfig::default()),
            Err(DispatchError::Config(_))
        ));
    }
}
