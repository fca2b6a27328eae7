//! Extracts structured signals from the game bot's free-text replies.
//!
//! Nothing here fails: text that does not match a pattern maps to a default.

use std::sync::LazyLock;

use regex::Regex;

static ROLLS_LEFT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"You have \*\*(\d+)\*\* rolls? left").expect("valid rolls-left pattern")
});

/// Delimiters a character name may be wrapped in, most specific first
static NAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\*\*([^*]+)\*\*",
        r"`([^`]+)`",
        r#""([^"]+)""#,
        r"'([^']+)'",
        r"【([^】]+)】",
        r"《([^》]+)》",
        r"〖([^〗]+)〗",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid name pattern"))
    .collect()
});

const INELIGIBLE_PHRASES: &[&str] = &["you can't claim", "you can\u{2019}t claim"];

const COMMAND_PREFIX: char = '$';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStatus {
    Ineligible,
    Eligible,
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimStatus::Ineligible => write!(f, "ineligible"),
            ClaimStatus::Eligible => write!(f, "eligible"),
        }
    }
}

/// Rolls remaining from a status reply; 0 when the count is absent.
pub fn extract_rolls_left(text: &str) -> u32 {
    ROLLS_LEFT
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Anything that does not say the claim is on cooldown counts as eligible.
pub fn classify_claim(text: &str) -> ClaimStatus {
    let lower = text.to_lowercase();
    if INELIGIBLE_PHRASES.iter().any(|p| lower.contains(p)) {
        ClaimStatus::Ineligible
    } else {
        ClaimStatus::Eligible
    }
}

/// First delimited name that is longer than two characters, not a number and
/// not a command. Patterns are tried in order; within a pattern, left to right.
pub fn extract_character_name(text: &str) -> Option<String> {
    NAME_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .find(|candidate| is_plausible_name(candidate))
            .map(str::to_string)
    })
}

fn is_plausible_name(candidate: &str) -> bool {
    candidate.chars().count() > 2
        && !candidate.chars().all(|c| c.is_ascii_digit())
        && !candidate.starts_with(COMMAND_PREFIX)
}
