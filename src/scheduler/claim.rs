use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::ClaimConfig;
use crate::pacing;
use crate::parser::{self, ClaimStatus};
use crate::platform::{ChatApi, Snowflake};

/// Steps of one claim cycle, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimPhase {
    Idle,
    ProbeSent,
    ReplyParsed,
    Branching,
    Confirmed,
    Rolling,
}

/// What the probe reply told us. Rebuilt every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimState {
    pub rolls_left: u32,
    pub claim: ClaimStatus,
}

impl ClaimState {
    pub fn from_reply(text: &str) -> Self {
        Self {
            rolls_left: parser::extract_rolls_left(text),
            claim: parser::classify_claim(text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The probe command could not be sent
    ProbeFailed,
    /// No reply from the game bot among the recent messages
    NoReply,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub state: Option<ClaimState>,
    pub rolls_sent: u32,
}

impl CycleReport {
    fn aborted(outcome: CycleOutcome) -> Self {
        Self {
            outcome,
            state: None,
            rolls_sent: 0,
        }
    }
}

/// One pass of probe, branch, confirm and roll against the game bot.
pub struct ClaimCycle {
    api: Arc<dyn ChatApi>,
    config: ClaimConfig,
    channel: Snowflake,
    peer: Snowflake,
}

impl ClaimCycle {
    pub fn new(
        api: Arc<dyn ChatApi>,
        config: ClaimConfig,
        channel: Snowflake,
        peer: Snowflake,
    ) -> Self {
        Self {
            api,
            config,
            channel,
            peer,
        }
    }

    pub fn config(&self) -> &ClaimConfig {
        &self.config
    }

    fn enter(&self, phase: ClaimPhase) {
        debug!("Claim cycle phase: {:?}", phase);
    }

    pub async fn run(&self) -> Result<CycleReport> {
        self.enter(ClaimPhase::Idle);
        info!("Starting claim check...");

        if let Err(e) = self
            .api
            .post_command(self.channel, &self.config.probe_command)
            .await
        {
            warn!(
                "Failed to send '{}' command: {:#}",
                self.config.probe_command, e
            );
            return Ok(CycleReport::aborted(CycleOutcome::ProbeFailed));
        }
        self.enter(ClaimPhase::ProbeSent);

        pacing::pause(self.config.reply_grace).await;
        let recent = self
            .api
            .fetch_recent(self.channel, self.config.reply_fetch_limit)
            .await
            .context("Failed to fetch the probe reply")?;

        let Some(reply) = recent.iter().find(|m| m.is_from(self.peer)) else {
            warn!(
                "No reply from the game bot after '{}'",
                self.config.probe_command
            );
            return Ok(CycleReport::aborted(CycleOutcome::NoReply));
        };
        let preview: String = reply.content.chars().take(100).collect();
        info!("Game bot reply found: {}...", preview);

        let state = ClaimState::from_reply(&reply.content);
        self.enter(ClaimPhase::ReplyParsed);
        info!("Claim {}, rolls left: {}", state.claim, state.rolls_left);

        self.enter(ClaimPhase::Branching);
        self.branch_and_confirm(state.claim).await;
        self.enter(ClaimPhase::Confirmed);

        self.enter(ClaimPhase::Rolling);
        let rolls_sent = self.roll(state.rolls_left).await;

        self.enter(ClaimPhase::Idle);
        Ok(CycleReport {
            outcome: CycleOutcome::Completed,
            state: Some(state),
            rolls_sent,
        })
    }

    /// Send the branch command, then the confirmation. The confirmation is
    /// skipped if the branch command did not go out.
    async fn branch_and_confirm(&self, claim: ClaimStatus) {
        let command = match claim {
            ClaimStatus::Ineligible => &self.config.ineligible_command,
            ClaimStatus::Eligible => &self.config.eligible_command,
        };
        info!("Claim {} - sending '{}'", claim, command);

        if let Err(e) = self.api.post_command(self.channel, command).await {
            warn!(
                "Failed to send '{}', skipping confirmation: {:#}",
                command, e
            );
            return;
        }

        pacing::pause(self.config.confirm_delay).await;
        if let Err(e) = self
            .api
            .post_command(self.channel, &self.config.confirm_token)
            .await
        {
            warn!("Failed to send confirmation: {:#}", e);
        }
    }

    /// Issue `count` roll commands in order. Returns how many were sent.
    async fn roll(&self, count: u32) -> u32 {
        if count == 0 {
            return 0;
        }
        info!(
            "Sending {} '{}' commands ({} apart)",
            count, self.config.roll_command, self.config.roll_delay
        );

        let mut sent = 0;
        for i in 0..count {
            match self
                .api
                .post_command(self.channel, &self.config.roll_command)
                .await
            {
                Ok(_) => sent += 1,
                Err(e) => warn!("Roll {}/{} failed: {:#}", i + 1, count, e),
            }
            pacing::pause(self.config.roll_delay).await;
        }
        sent
    }
}
