pub mod claim;

use tracing::{error, info};

use crate::pacing::{self, RunFlag};

pub use claim::{ClaimCycle, CycleOutcome, CycleReport};

/// Runs a claim cycle roughly every hour until the run flag is cleared.
///
/// A cycle that aborts (probe not sent, no reply) waits the normal interval.
/// A cycle that errors waits the shorter failure cooldown instead.
pub struct ClaimScheduler {
    cycle: ClaimCycle,
}

impl ClaimScheduler {
    pub fn new(cycle: ClaimCycle) -> Self {
        Self { cycle }
    }

    pub async fn run(self, running: RunFlag) {
        let config = self.cycle.config().clone();

        let initial = config.initial_delay.sample();
        info!(
            "Waiting {:.1} seconds before starting claim checks",
            initial.as_secs_f64()
        );
        running.idle(initial).await;

        while running.is_running() {
            info!("Running scheduled claim check...");
            let wait = match self.cycle.run().await {
                Ok(report) => {
                    log_report(&report);
                    pacing::jittered(config.cycle_interval_secs, config.cycle_jitter_secs)
                }
                Err(e) => {
                    error!("Error during claim check: {:#}", e);
                    config.failure_cooldown.sample()
                }
            };
            info!(
                "Next claim check in {:.1} minutes",
                wait.as_secs_f64() / 60.0
            );
            running.idle(wait).await;
        }

        info!("Claim scheduler stopped");
    }
}

fn log_report(report: &CycleReport) {
    match report.outcome {
        CycleOutcome::Completed => match report.state {
            Some(state) => info!(
                "Claim check done ({}), {}/{} rolls sent",
                state.claim, report.rolls_sent, state.rolls_left
            ),
            None => info!("Claim check done, {} rolls sent", report.rolls_sent),
        },
        CycleOutcome::ProbeFailed => info!("Claim check aborted: probe not sent"),
        CycleOutcome::NoReply => info!("Claim check aborted: no reply"),
    }
}
