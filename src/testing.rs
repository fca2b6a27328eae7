//! Scripted in-memory `ChatApi` for loop tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use crate::platform::{ChatApi, Channel, Identity, InteractionPayload, Message, Snowflake};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Fetch(u8),
    Post(String),
    React(Snowflake, String),
    Interact(InteractionPayload),
}

#[derive(Default)]
pub struct MockApi {
    /// Batches returned by successive fetches; the last one repeats.
    /// `None` entries make that fetch fail.
    batches: Mutex<VecDeque<Option<Vec<Message>>>>,
    /// Commands whose send fails
    failing_posts: Mutex<Vec<String>>,
    next_id: Mutex<u64>,
    calls: Mutex<Vec<(Instant, Call)>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(9_000),
            ..Self::default()
        }
    }

    pub fn push_batch(&self, batch: Vec<Message>) {
        self.batches.lock().unwrap().push_back(Some(batch));
    }

    pub fn push_fetch_failure(&self) {
        self.batches.lock().unwrap().push_back(None);
    }

    pub fn fail_post(&self, text: &str) {
        self.failing_posts.lock().unwrap().push(text.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, Call)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Post(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((Instant::now(), call));
    }
}

#[async_trait]
impl ChatApi for MockApi {
    async fn current_user(&self) -> Result<Identity> {
        Ok(me())
    }

    async fn fetch_channel(&self, _channel: Snowflake) -> Result<Channel> {
        Ok(Channel {
            guild_id: Some(GUILD),
        })
    }

    async fn fetch_recent(&self, _channel: Snowflake, limit: u8) -> Result<Vec<Message>> {
        self.record(Call::Fetch(limit));
        let mut batches = self.batches.lock().unwrap();
        let next = if batches.len() > 1 {
            batches.pop_front()
        } else {
            batches.front().cloned()
        };
        match next {
            Some(Some(batch)) => Ok(batch),
            Some(None) => anyhow::bail!("message fetch failed with status 500"),
            None => Ok(Vec::new()),
        }
    }

    async fn post_command(&self, channel: Snowflake, text: &str) -> Result<Message> {
        self.record(Call::Post(text.to_string()));
        if self.failing_posts.lock().unwrap().iter().any(|t| t == text) {
            anyhow::bail!("command send failed with status 500");
        }
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        };
        Ok(message(id, channel, ME, text))
    }

    async fn add_reaction(
        &self,
        _channel: Snowflake,
        message_id: Snowflake,
        emoji: &str,
    ) -> Result<()> {
        self.record(Call::React(message_id, emoji.to_string()));
        Ok(())
    }

    async fn invoke_component(&self, payload: &InteractionPayload) -> Result<()> {
        self.record(Call::Interact(payload.clone()));
        Ok(())
    }
}

pub const ME: Snowflake = Snowflake::new(42);
pub const GUILD: Snowflake = Snowflake::new(77);

pub fn me() -> Identity {
    Identity {
        id: ME,
        username: "rollfan".to_string(),
        global_name: None,
    }
}

pub fn message(id: u64, channel: Snowflake, author: Snowflake, content: &str) -> Message {
    serde_json::from_value(json!({
        "id": id.to_string(),
        "channel_id": channel.to_string(),
        "author": { "id": author.to_string(), "username": "user" },
        "content": content
    }))
    .unwrap()
}

pub fn message_with_button(
    id: u64,
    channel: Snowflake,
    author: Snowflake,
    content: &str,
    custom_id: &str,
) -> Message {
    serde_json::from_value(json!({
        "id": id.to_string(),
        "channel_id": channel.to_string(),
        "author": { "id": author.to_string(), "username": "user" },
        "content": content,
        "components": [{ "type": 1, "components": [{ "type": 2, "custom_id": custom_id }] }]
    }))
    .unwrap()
}
