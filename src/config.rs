use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::pacing::DelayRange;
use crate::platform::Snowflake;

pub const API_BASE: &str = "https://discord.com/api/v10";

/// Channel the game is played in
pub const CHANNEL_ID: Snowflake = Snowflake::new(1119327577291640852);

/// The game bot. Its application id is the same as its user id.
pub const PEER_ID: Snowflake = Snowflake::new(432610292342587392);

/// Environment variable holding the account token
pub const TOKEN_ENV: &str = "token";

pub const MIN_FETCH_LIMIT: u8 = 10;
pub const MAX_FETCH_LIMIT: u8 = 15;

/// Read the account token. Must run before any network activity.
pub fn token_from_env() -> Result<String> {
    match std::env::var(TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => anyhow::bail!(
            "Authentication token not found in environment variable '{}'",
            TOKEN_ENV
        ),
    }
}

/// Pacing for the HTTP layer
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TransportConfig {
    /// Wait before every outgoing command
    pub command_delay: DelayRange,
    /// Added on top of the server's advised wait after a 429 on a command
    pub command_retry_jitter: DelayRange,
    /// Added on top of the advised wait after a 429 on a reaction
    pub reaction_retry_jitter: DelayRange,
    /// Added on top of the advised wait after a 429 on reads and interactions
    pub default_retry_jitter: DelayRange,
    pub request_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            command_delay: DelayRange::new(1.0, 2.0),
            command_retry_jitter: DelayRange::new(1.0, 3.0),
            reaction_retry_jitter: DelayRange::new(0.5, 1.5),
            default_retry_jitter: DelayRange::new(0.5, 1.5),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClaimConfig {
    pub probe_command: String,
    pub ineligible_command: String,
    pub eligible_command: String,
    pub confirm_token: String,
    pub roll_command: String,
    pub reply_fetch_limit: u8,
    pub initial_delay: DelayRange,
    pub reply_grace: DelayRange,
    pub confirm_delay: DelayRange,
    pub roll_delay: DelayRange,
    pub cycle_interval_secs: f64,
    pub cycle_jitter_secs: f64,
    pub failure_cooldown: DelayRange,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            probe_command: "$tu".to_string(),
            ineligible_command: "$ql wl".to_string(),
            eligible_command: "$ql wl2".to_string(),
            confirm_token: "y".to_string(),
            roll_command: "$wa".to_string(),
            reply_fetch_limit: 10,
            initial_delay: DelayRange::new(10.0, 30.0),
            reply_grace: DelayRange::new(1.2, 3.0),
            confirm_delay: DelayRange::new(0.8, 1.5),
            roll_delay: DelayRange::new(1.15, 2.02),
            cycle_interval_secs: 3600.0,
            cycle_jitter_secs: 100.0,
            failure_cooldown: DelayRange::new(300.0, 600.0),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    pub fetch_limit: u8,
    pub scan_interval: DelayRange,
    pub error_backoff: DelayRange,
    /// Pause after handling each message from the game bot
    pub peer_message_delay: DelayRange,
    /// Pause after each reaction
    pub reaction_delay: DelayRange,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            fetch_limit: 15,
            scan_interval: DelayRange::new(8.0, 15.0),
            error_backoff: DelayRange::new(30.0, 60.0),
            peer_message_delay: DelayRange::new(0.5, 1.5),
            reaction_delay: DelayRange::new(0.3, 0.8),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LootEmoji {
    pub emoji: String,
    pub label: String,
}

impl LootEmoji {
    fn new(emoji: &str, label: &str) -> Self {
        Self {
            emoji: emoji.to_string(),
            label: label.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TriggerConfig {
    pub loot_reactions: bool,
    pub claim_buttons: bool,
    pub character_capture: bool,
    pub loot_emojis: Vec<LootEmoji>,
    pub ownership_markers: Vec<String>,
    pub capture_keywords: Vec<String>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            loot_reactions: true,
            claim_buttons: true,
            character_capture: true,
            loot_emojis: vec![
                LootEmoji::new("💎", "gem_blue"),
                LootEmoji::new("💛", "gem_yellow"),
                LootEmoji::new("🤍", "gem_white"),
                LootEmoji::new("🧡", "gem_orange"),
                LootEmoji::new("🟡", "kakera_yellow"),
                LootEmoji::new("⚪", "kakera_white"),
                LootEmoji::new("🟠", "kakera_orange"),
                LootEmoji::new("🔶", "kakera_orange_diamond"),
                LootEmoji::new("💰", "treasure"),
                LootEmoji::new("🏆", "trophy"),
            ],
            ownership_markers: vec!["wished by".to_string(), "belongs to".to_string()],
            capture_keywords: vec![
                "claims".to_string(),
                "rolled".to_string(),
                "appears".to_string(),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CaptureConfig {
    pub path: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("collected_characters.txt"),
        }
    }
}

/// Tuning knobs. Every section is optional; the token and the channel and peer
/// ids are not configurable here.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub transport: TransportConfig,
    pub claim: ClaimConfig,
    pub monitor: MonitorConfig,
    pub triggers: TriggerConfig,
    pub capture: CaptureConfig,
}

impl Config {
    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, limit) in [
            ("claim.reply_fetch_limit", self.claim.reply_fetch_limit),
            ("monitor.fetch_limit", self.monitor.fetch_limit),
        ] {
            if !(MIN_FETCH_LIMIT..=MAX_FETCH_LIMIT).contains(&limit) {
                anyhow::bail!(
                    "{} must be between {} and {}, got {}",
                    name,
                    MIN_FETCH_LIMIT,
                    MAX_FETCH_LIMIT,
                    limit
                );
            }
        }

        let ranges = [
            ("transport.command_delay", self.transport.command_delay),
            ("transport.command_retry_jitter", self.transport.command_retry_jitter),
            ("transport.reaction_retry_jitter", self.transport.reaction_retry_jitter),
            ("transport.default_retry_jitter", self.transport.default_retry_jitter),
            ("claim.initial_delay", self.claim.initial_delay),
            ("claim.reply_grace", self.claim.reply_grace),
            ("claim.confirm_delay", self.claim.confirm_delay),
            ("claim.roll_delay", self.claim.roll_delay),
            ("claim.failure_cooldown", self.claim.failure_cooldown),
            ("monitor.scan_interval", self.monitor.scan_interval),
            ("monitor.error_backoff", self.monitor.error_backoff),
            ("monitor.peer_message_delay", self.monitor.peer_message_delay),
            ("monitor.reaction_delay", self.monitor.reaction_delay),
        ];
        for (name, range) in ranges {
            if !range.is_valid() {
                anyhow::bail!("{} is not a valid delay range: {}", name, range);
            }
        }

        if !self.claim.cycle_interval_secs.is_finite()
            || !self.claim.cycle_jitter_secs.is_finite()
            || self.claim.cycle_interval_secs <= 0.0
            || self.claim.cycle_jitter_secs < 0.0
            || self.claim.cycle_jitter_secs >= self.claim.cycle_interval_secs
        {
            anyhow::bail!(
                "claim.cycle_interval_secs must be positive and larger than claim.cycle_jitter_secs"
            );
        }

        Ok(())
    }
}
