use tracing::info;

use crate::config::{LootEmoji, TriggerConfig};
use crate::parser;
use crate::platform::{Identity, Message};

/// What the monitor should do about a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerAction {
    /// Add this (unencoded) emoji as a reaction
    React(String),
    /// Press the message's first pressable component
    PressFirstComponent,
    /// Record a captured character name
    Capture(String),
}

/// A condition over a game-bot message and the actions it calls for.
///
/// Rules are pure; the monitor executes the actions.
pub trait TriggerRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, message: &Message, me: &Identity) -> Vec<TriggerAction>;
}

/// React with every known loot emoji found in the content
pub struct LootReactionRule {
    emojis: Vec<LootEmoji>,
}

impl LootReactionRule {
    pub fn new(emojis: Vec<LootEmoji>) -> Self {
        Self { emojis }
    }
}

impl TriggerRule for LootReactionRule {
    fn name(&self) -> &'static str {
        "loot_reaction"
    }

    fn evaluate(&self, message: &Message, _me: &Identity) -> Vec<TriggerAction> {
        self.emojis
            .iter()
            .filter(|loot| message.content.contains(loot.emoji.as_str()))
            .filter(|loot| !message.has_own_reaction(&loot.emoji))
            .map(|loot| {
                info!("Found loot: {}", loot.label);
                TriggerAction::React(loot.emoji.clone())
            })
            .collect()
    }
}

/// Press the claim button on rolls that are ours or mention us
pub struct ClaimButtonRule {
    markers: Vec<String>,
}

impl ClaimButtonRule {
    pub fn new(markers: Vec<String>) -> Self {
        Self {
            markers: markers.into_iter().map(|m| m.to_lowercase()).collect(),
        }
    }
}

impl TriggerRule for ClaimButtonRule {
    fn name(&self) -> &'static str {
        "claim_button"
    }

    fn evaluate(&self, message: &Message, me: &Identity) -> Vec<TriggerAction> {
        if message.first_pressable().is_none() {
            return Vec::new();
        }
        let lower = message.content.to_lowercase();
        let marked = self.markers.iter().any(|m| lower.contains(m.as_str()));
        if marked || me.is_mentioned_in(&message.content) {
            vec![TriggerAction::PressFirstComponent]
        } else {
            Vec::new()
        }
    }
}

/// Record the character name from claim announcements that mention us
pub struct CharacterCaptureRule {
    keywords: Vec<String>,
}

impl CharacterCaptureRule {
    pub fn new(keywords: Vec<String>) -> Self {
        Self {
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

impl TriggerRule for CharacterCaptureRule {
    fn name(&self) -> &'static str {
        "character_capture"
    }

    fn evaluate(&self, message: &Message, me: &Identity) -> Vec<TriggerAction> {
        if !me.is_mentioned_in(&message.content) {
            return Vec::new();
        }
        let lower = message.content.to_lowercase();
        if !self.keywords.iter().any(|k| lower.contains(k.as_str())) {
            return Vec::new();
        }
        parser::extract_character_name(&message.content)
            .map(TriggerAction::Capture)
            .into_iter()
            .collect()
    }
}

/// Build the enabled rule set, in evaluation order.
pub fn from_config(config: &TriggerConfig) -> Vec<Box<dyn TriggerRule>> {
    let mut rules: Vec<Box<dyn TriggerRule>> = Vec::new();
    if config.loot_reactions {
        rules.push(Box::new(LootReactionRule::new(config.loot_emojis.clone())));
    }
    if config.claim_buttons {
        rules.push(Box::new(ClaimButtonRule::new(
            config.ownership_markers.clone(),
        )));
    }
    if config.character_capture {
        rules.push(Box::new(CharacterCaptureRule::new(
            config.capture_keywords.clone(),
        )));
    }
    rules
}
