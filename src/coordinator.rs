use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::monitor::EventMonitor;
use crate::pacing::RunFlag;
use crate::platform::{ChatApi, Identity, Snowflake};
use crate::scheduler::{ClaimCycle, ClaimScheduler};

/// Resolves who we are, then runs the claim scheduler and the message
/// monitor side by side until the run flag is cleared.
pub struct Coordinator {
    api: Arc<dyn ChatApi>,
    config: Config,
    channel: Snowflake,
    peer: Snowflake,
    running: RunFlag,
}

impl Coordinator {
    pub fn new(api: Arc<dyn ChatApi>, config: Config, channel: Snowflake, peer: Snowflake) -> Self {
        Self {
            api,
            config,
            channel,
            peer,
            running: RunFlag::new(),
        }
    }

    /// Handle for stopping both loops from outside
    pub fn run_flag(&self) -> RunFlag {
        self.running.clone()
    }

    /// Identity failure is fatal and returned before any loop starts.
    pub async fn run(self) -> Result<()> {
        let me: Identity = self
            .api
            .current_user()
            .await
            .context("Failed to resolve the account identity")?;
        info!("Connected as {} ({})", me.display_name(), me.id);

        let guild = match self.api.fetch_channel(self.channel).await {
            Ok(channel) => channel.guild_id,
            Err(e) => {
                warn!(
                    "Could not resolve the guild of channel {}, button presses will be skipped: {:#}",
                    self.channel, e
                );
                None
            }
        };

        let scheduler = ClaimScheduler::new(ClaimCycle::new(
            self.api.clone(),
            self.config.claim.clone(),
            self.channel,
            self.peer,
        ));
        let monitor = EventMonitor::new(
            self.api.clone(),
            &self.config,
            me,
            self.channel,
            self.peer,
            guild,
        );

        let claim_task = tokio::spawn(scheduler.run(self.running.clone()));
        let monitor_task = tokio::spawn(monitor.run(self.running.clone()));

        let (claim_result, monitor_result) = tokio::join!(claim_task, monitor_task);
        if let Err(e) = claim_result {
            error!("Claim scheduler task failed: {}", e);
        }
        if let Err(e) = monitor_result {
            error!("Message monitor task failed: {}", e);
        }

        info!("Bot stopped");
        Ok(())
    }
}
