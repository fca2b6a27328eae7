pub mod discord;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Discord object id. Sent over the wire as a decimal string, ordered as an integer
/// so newer messages in a channel always compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Snowflake(u64);

impl Snowflake {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl TryFrom<String> for Snowflake {
    type Error = std::num::ParseIntError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse().map(Self)
    }
}

impl From<Snowflake> for String {
    fn from(id: Snowflake) -> Self {
        id.0.to_string()
    }
}

impl std::fmt::Display for Snowflake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The account this process acts as
#[derive(Debug, Clone, Deserialize)]
pub struct Identity {
    pub id: Snowflake,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
}

impl Identity {
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }

    /// True if `content` mentions this identity by id or by name.
    pub fn is_mentioned_in(&self, content: &str) -> bool {
        content.contains(&format!("<@{}>", self.id))
            || content.contains(&format!("<@!{}>", self.id))
            || content.contains(self.username.as_str())
            || self
                .global_name
                .as_deref()
                .is_some_and(|name| !name.is_empty() && content.contains(name))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    pub id: Snowflake,
    #[serde(default)]
    pub username: String,
}

/// Custom emojis carry an id as well; only the name matters here.
#[derive(Debug, Clone, Deserialize)]
pub struct Emoji {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reaction {
    pub emoji: Emoji,
    /// Whether this account already reacted
    #[serde(default)]
    pub me: bool,
}

pub const COMPONENT_BUTTON: u8 = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct Component {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

impl Component {
    /// Buttons with a custom id can be pressed; link buttons carry a url instead.
    pub fn is_pressable(&self) -> bool {
        self.kind == COMPONENT_BUTTON && !self.disabled && self.custom_id.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentRow {
    #[serde(default)]
    pub components: Vec<Component>,
}

/// A channel message as returned by the REST API
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    pub author: Author,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub components: Vec<ComponentRow>,
}

impl Message {
    /// First pressable component, scanning rows top to bottom and each row left to right.
    pub fn first_pressable(&self) -> Option<&Component> {
        self.components
            .iter()
            .flat_map(|row| row.components.iter())
            .find(|c| c.is_pressable())
    }

    pub fn is_from(&self, id: Snowflake) -> bool {
        self.author.id == id
    }

    pub fn has_own_reaction(&self, emoji: &str) -> bool {
        self.reactions
            .iter()
            .any(|r| r.me && r.emoji.name.as_deref() == Some(emoji))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionData {
    pub component_type: u8,
    pub custom_id: String,
}

pub const INTERACTION_MESSAGE_COMPONENT: u8 = 3;

/// Body of `POST /interactions` for a button press
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionPayload {
    #[serde(rename = "type")]
    pub kind: u8,
    pub application_id: Snowflake,
    pub guild_id: Snowflake,
    pub channel_id: Snowflake,
    pub message_id: Snowflake,
    pub message_flags: u64,
    pub session_id: String,
    pub data: InteractionData,
}

/// The chat platform operations the agent depends on.
///
/// Implementations handle rate limiting internally; an `Err` means the call
/// failed for a reason other than rate limiting and has already been logged.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn current_user(&self) -> Result<Identity>;

    async fn fetch_channel(&self, channel: Snowflake) -> Result<Channel>;

    /// Most recent messages, newest first.
    async fn fetch_recent(&self, channel: Snowflake, limit: u8) -> Result<Vec<Message>>;

    async fn post_command(&self, channel: Snowflake, text: &str) -> Result<Message>;

    /// `emoji` must already be percent-encoded for use as a path segment.
    async fn add_reaction(&self, channel: Snowflake, message_id: Snowflake, emoji: &str)
        -> Result<()>;

    async fn invoke_component(&self, payload: &InteractionPayload) -> Result<()>;
}
