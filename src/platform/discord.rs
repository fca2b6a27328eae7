use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::TransportConfig;
use crate::pacing::{self, DelayRange};
use crate::platform::{ChatApi, Channel, Identity, InteractionPayload, Message, Snowflake};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Upper bound on a single rate-limit wait, whatever the server advises
const MAX_RATE_LIMIT_WAIT_SECS: f64 = 3600.0;

/// Kind of request, used for logging and to pick the rate-limit jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallClass {
    Identity,
    Channel,
    Fetch,
    Command,
    Reaction,
    Interaction,
}

impl CallClass {
    /// Wait assumed when a 429 carries no advised interval
    fn default_retry_after(self) -> f64 {
        match self {
            CallClass::Command => 5.0,
            _ => 1.0,
        }
    }
}

impl std::fmt::Display for CallClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CallClass::Identity => "identity lookup",
            CallClass::Channel => "channel lookup",
            CallClass::Fetch => "message fetch",
            CallClass::Command => "command send",
            CallClass::Reaction => "reaction add",
            CallClass::Interaction => "component press",
        };
        f.write_str(name)
    }
}

/// Discord REST client acting as a user account.
///
/// The only state it holds is the header set and pacing settings, so one
/// instance is shared by both loops without locking.
pub struct DiscordClient {
    client: reqwest::Client,
    base_url: String,
    pacing: TransportConfig,
}

impl DiscordClient {
    pub fn new(token: &str, base_url: &str, pacing: TransportConfig) -> Result<Self> {
        let mut auth =
            HeaderValue::from_str(token).context("Token contains invalid header characters")?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(pacing.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            pacing,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn retry_jitter(&self, class: CallClass) -> DelayRange {
        match class {
            CallClass::Command => self.pacing.command_retry_jitter,
            CallClass::Reaction => self.pacing.reaction_retry_jitter,
            _ => self.pacing.default_retry_jitter,
        }
    }

    /// Send the request built by `build`, retrying for as long as the server
    /// answers 429. Any other non-2xx status is logged and returned as an error.
    async fn execute<F>(&self, class: CallClass, build: F) -> Result<Response>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let response = build(&self.client)
                .send()
                .await
                .with_context(|| format!("{} request failed", class))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let advised = advised_wait(response)
                    .await
                    .unwrap_or_else(|| class.default_retry_after());
                let wait = rate_limit_wait(advised, self.retry_jitter(class));
                warn!(
                    "Rate limited on {} (attempt {}), waiting {:.2}s (advised {:.2}s)",
                    class,
                    attempt,
                    wait.as_secs_f64(),
                    advised
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            error!("Failed {}: {} - {}", class, status, body);
            anyhow::bail!("{} failed with status {}", class, status);
        }
    }

    async fn execute_json<T, F>(&self, class: CallClass, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        self.execute(class, build)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", class))
    }
}

/// The server-advised wait in seconds: the `Retry-After` header, or the
/// `retry_after` field of the JSON body.
async fn advised_wait(response: Response) -> Option<f64> {
    let from_header = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok());
    if let Some(secs) = from_header {
        return Some(secs);
    }

    let body = response.text().await.ok()?;
    serde_json::from_str::<Value>(&body)
        .ok()?
        .get("retry_after")?
        .as_f64()
}

/// How long to wait before retrying: never less than the advised interval,
/// capped at `MAX_RATE_LIMIT_WAIT_SECS`.
fn rate_limit_wait(advised_secs: f64, jitter: DelayRange) -> Duration {
    let advised = if advised_secs.is_finite() {
        advised_secs.clamp(0.0, MAX_RATE_LIMIT_WAIT_SECS)
    } else {
        0.0
    };
    let max = Duration::from_secs_f64(MAX_RATE_LIMIT_WAIT_SECS);
    Duration::try_from_secs_f64(advised + jitter.sample_secs())
        .map(|wait| wait.min(max))
        .unwrap_or(max)
}

#[async_trait]
impl ChatApi for DiscordClient {
    async fn current_user(&self) -> Result<Identity> {
        let url = self.url("/users/@me");
        self.execute_json(CallClass::Identity, |c| c.get(&url))
            .await
            .context("Failed to get user info")
    }

    async fn fetch_channel(&self, channel: Snowflake) -> Result<Channel> {
        let url = self.url(&format!("/channels/{}", channel));
        self.execute_json(CallClass::Channel, |c| c.get(&url)).await
    }

    async fn fetch_recent(&self, channel: Snowflake, limit: u8) -> Result<Vec<Message>> {
        let url = self.url(&format!("/channels/{}/messages?limit={}", channel, limit));
        let messages: Vec<Message> = self
            .execute_json(CallClass::Fetch, |c| c.get(&url))
            .await?;
        debug!("Fetched {} messages from {}", messages.len(), channel);
        Ok(messages)
    }

    async fn post_command(&self, channel: Snowflake, text: &str) -> Result<Message> {
        pacing::pause(self.pacing.command_delay).await;

        let url = self.url(&format!("/channels/{}/messages", channel));
        let body = json!({ "content": text });
        let message: Message = self
            .execute_json(CallClass::Command, |c| c.post(&url).json(&body))
            .await?;
        info!("Message sent: {}", text);
        Ok(message)
    }

    async fn add_reaction(
        &self,
        channel: Snowflake,
        message_id: Snowflake,
        emoji: &str,
    ) -> Result<()> {
        let url = self.url(&format!(
            "/channels/{}/messages/{}/reactions/{}/@me",
            channel, message_id, emoji
        ));
        self.execute(CallClass::Reaction, |c| c.put(&url)).await?;
        Ok(())
    }

    async fn invoke_component(&self, payload: &InteractionPayload) -> Result<()> {
        let url = self.url("/interactions");
        self.execute(CallClass::Interaction, |c| c.post(&url).json(payload))
            .await?;
        Ok(())
    }
}
