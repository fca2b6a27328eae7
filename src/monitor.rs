use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::capture::CaptureLog;
use crate::config::{Config, MonitorConfig};
use crate::cursor::MessageCursor;
use crate::dispatcher::Dispatcher;
use crate::pacing::{self, RunFlag};
use crate::platform::{ChatApi, Identity, Message, Snowflake};
use crate::triggers::{self, TriggerAction, TriggerRule};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Messages newer than the cursor
    pub scanned: usize,
    /// Trigger actions carried out successfully
    pub dispatched: usize,
}

/// Polls the channel and reacts to new messages from the game bot
pub struct EventMonitor {
    api: Arc<dyn ChatApi>,
    dispatcher: Dispatcher,
    rules: Vec<Box<dyn TriggerRule>>,
    capture: CaptureLog,
    config: MonitorConfig,
    me: Identity,
    channel: Snowflake,
    peer: Snowflake,
    /// Guild of `channel`, for messages that do not carry one
    guild: Option<Snowflake>,
    cursor: MessageCursor,
}

impl EventMonitor {
    pub fn new(
        api: Arc<dyn ChatApi>,
        config: &Config,
        me: Identity,
        channel: Snowflake,
        peer: Snowflake,
        guild: Option<Snowflake>,
    ) -> Self {
        let rules = triggers::from_config(&config.triggers);
        let names: Vec<&str> = rules.iter().map(|r| r.name()).collect();
        info!("Trigger rules enabled: {:?}", names);

        let capture = CaptureLog::new(config.capture.path.clone());
        if config.triggers.character_capture {
            info!("Captured characters go to {}", capture.path().display());
        }

        Self {
            dispatcher: Dispatcher::new(api.clone(), peer),
            api,
            rules,
            capture,
            config: config.monitor.clone(),
            me,
            channel,
            peer,
            guild,
            cursor: MessageCursor::new(),
        }
    }

    pub fn cursor(&self) -> &MessageCursor {
        &self.cursor
    }

    pub async fn run(mut self, running: RunFlag) {
        info!("Message monitor started on channel {}", self.channel);

        while running.is_running() {
            let wait = match self.scan_once().await {
                Ok(report) => {
                    if report.dispatched > 0 {
                        info!(
                            "Scan handled {} new messages, {} actions",
                            report.scanned, report.dispatched
                        );
                    } else {
                        debug!("Scan handled {} new messages", report.scanned);
                    }
                    self.config.scan_interval.sample()
                }
                Err(e) => {
                    error!("Error in message monitoring loop: {:#}", e);
                    self.config.error_backoff.sample()
                }
            };
            running.idle(wait).await;
        }

        info!("Message monitor stopped");
    }

    /// Fetch one batch, handle everything newer than the cursor, then move the
    /// cursor. A failed fetch leaves the cursor where it was.
    pub async fn scan_once(&mut self) -> Result<ScanReport> {
        let batch = self
            .api
            .fetch_recent(self.channel, self.config.fetch_limit)
            .await
            .context("Failed to fetch messages")?;

        let mut report = ScanReport::default();
        for message in self.cursor.unseen(&batch) {
            report.scanned += 1;
            if message.is_from(self.me.id) || !message.is_from(self.peer) {
                continue;
            }
            debug!("New message {} from {}", message.id, message.author.username);
            report.dispatched += self.handle_peer_message(message).await;
            pacing::pause(self.config.peer_message_delay).await;
        }

        self.cursor.advance(&batch);
        debug!("Cursor at {:?}", self.cursor.last_seen());
        Ok(report)
    }

    /// Run every rule over `message` and carry out the actions. Failures are
    /// logged per action. Returns the number of actions that succeeded.
    async fn handle_peer_message(&self, message: &Message) -> usize {
        let mut actions = Vec::new();
        for rule in &self.rules {
            let matched = rule.evaluate(message, &self.me);
            if !matched.is_empty() {
                debug!("Rule {} matched message {}", rule.name(), message.id);
            }
            actions.extend(matched);
        }

        let mut done = 0;
        let mut pressed = false;
        for action in &actions {
            let result = match action {
                TriggerAction::React(emoji) => {
                    let result = self.dispatcher.add_reaction(message, emoji).await;
                    pacing::pause(self.config.reaction_delay).await;
                    result
                }
                TriggerAction::PressFirstComponent => {
                    if pressed {
                        continue;
                    }
                    let result = self
                        .dispatcher
                        .press_first_component(message, self.guild)
                        .await;
                    pressed = result.is_ok();
                    result
                }
                TriggerAction::Capture(name) => {
                    self.capture.append(name).await.map(|total| match total {
                        Some(total) => info!("Collected character: {} ({} total)", name, total),
                        None => info!("Collected character: {}", name),
                    })
                }
            };

            match result {
                Ok(()) => done += 1,
                Err(e) => warn!(
                    "Action {:?} on message {} failed: {:#}",
                    action, message.id, e
                ),
            }
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TriggerConfig;
    use crate::testing::{me, message, message_with_button, Call, MockApi, GUILD, ME};

    const CHANNEL: Snowflake = Snowflake::new(1);
    const PEER: Snowflake = Snowflake::new(500);
    const OTHER: Snowflake = Snowflake::new(600);

    fn test_config() -> Config {
        let mut config = Config::default();
        config.capture.path = std::env::temp_dir().join(format!(
            "rollbot-monitor-{}.txt",
            uuid::Uuid::new_v4()
        ));
        config
    }

    fn monitor_with(api: &Arc<MockApi>, config: &Config, guild: Option<Snowflake>) -> EventMonitor {
        EventMonitor::new(api.clone(), config, me(), CHANNEL, PEER, guild)
    }

    fn reactions(api: &MockApi) -> Vec<(Snowflake, String)> {
        api.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::React(id, emoji) => Some((id, emoji)),
                _ => None,
            })
            .collect()
    }

    fn presses(api: &MockApi) -> usize {
        api.calls()
            .iter()
            .filter(|c| matches!(c, Call::Interact(_)))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_loot_emoji_reacts_once_without_press() {
        let api = Arc::new(MockApi::new());
        api.push_batch(vec![message(10, CHANNEL, PEER, "A wild 💎 appears")]);
        let mut monitor = monitor_with(&api, &test_config(), Some(GUILD));

        let report = monitor.scan_once().await.unwrap();

        assert_eq!(report.dispatched, 1);
        assert_eq!(
            reactions(&api),
            vec![(Snowflake::new(10), "%F0%9F%92%8E".to_string())]
        );
        assert_eq!(presses(&api), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_loot_emoji_gets_its_own_reaction() {
        let api = Arc::new(MockApi::new());
        api.push_batch(vec![message(10, CHANNEL, PEER, "💰 🏆 💎")]);
        let mut monitor = monitor_with(&api, &test_config(), Some(GUILD));

        monitor.scan_once().await.unwrap();

        assert_eq!(reactions(&api).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reactions_are_spaced_by_reaction_delay() {
        let api = Arc::new(MockApi::new());
        api.push_batch(vec![message(10, CHANNEL, PEER, "💰 🏆 💎 💛")]);
        let config = test_config();
        let mut monitor = monitor_with(&api, &config, Some(GUILD));

        monitor.scan_once().await.unwrap();

        let instants: Vec<_> = api
            .timed_calls()
            .into_iter()
            .filter(|(_, c)| matches!(c, Call::React(..)))
            .map(|(at, _)| at)
            .collect();
        assert_eq!(instants.len(), 4);
        let delay = config.monitor.reaction_delay;
        for pair in instants.windows(2) {
            let gap = (pair[1] - pair[0]).as_secs_f64();
            assert!(
                gap >= delay.min - 0.005 && gap < delay.max + 0.005,
                "reaction gap {}",
                gap
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_counts_even_when_log_unreadable() {
        let api = Arc::new(MockApi::new());
        api.push_batch(vec![message(10, CHANNEL, PEER, "rollfan claims **Emilia**!")]);
        let config = test_config();
        tokio::fs::write(&config.capture.path, [0xff, 0xfe, b'\n'])
            .await
            .unwrap();
        let mut monitor = monitor_with(&api, &config, Some(GUILD));

        let report = monitor.scan_once().await.unwrap();

        assert_eq!(report.dispatched, 1);
        tokio::fs::remove_file(&config.capture.path).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_batch_twice_dispatches_nothing() {
        let api = Arc::new(MockApi::new());
        api.push_batch(vec![
            message(11, CHANNEL, PEER, "🏆"),
            message(10, CHANNEL, PEER, "💎"),
        ]);
        let mut monitor = monitor_with(&api, &test_config(), Some(GUILD));

        let first = monitor.scan_once().await.unwrap();
        let second = monitor.scan_once().await.unwrap();

        assert_eq!(first.dispatched, 2);
        assert_eq!(second, ScanReport::default());
        assert_eq!(reactions(&api).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_new_messages_are_handled() {
        let api = Arc::new(MockApi::new());
        api.push_batch(vec![message(10, CHANNEL, PEER, "💎")]);
        api.push_batch(vec![
            message(12, CHANNEL, PEER, "💰"),
            message(11, CHANNEL, OTHER, "💎 from a player"),
            message(10, CHANNEL, PEER, "💎"),
        ]);
        let mut monitor = monitor_with(&api, &test_config(), Some(GUILD));

        monitor.scan_once().await.unwrap();
        let report = monitor.scan_once().await.unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.dispatched, 1);
        assert_eq!(
            reactions(&api),
            vec![
                (Snowflake::new(10), "%F0%9F%92%8E".to_string()),
                (Snowflake::new(12), "%F0%9F%92%B0".to_string()),
            ]
        );
        assert_eq!(monitor.cursor().last_seen(), Some(Snowflake::new(12)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_messages_are_skipped() {
        let api = Arc::new(MockApi::new());
        api.push_batch(vec![message(10, CHANNEL, ME, "$wa 💎")]);
        let mut monitor = monitor_with(&api, &test_config(), Some(GUILD));

        let report = monitor.scan_once().await.unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(report.dispatched, 0);
        assert!(reactions(&api).is_empty());
        assert_eq!(monitor.cursor().last_seen(), Some(Snowflake::new(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_never_moves_backwards() {
        let api = Arc::new(MockApi::new());
        api.push_batch(vec![message(20, CHANNEL, OTHER, "hi")]);
        api.push_batch(vec![message(15, CHANNEL, PEER, "💎")]);
        let mut monitor = monitor_with(&api, &test_config(), Some(GUILD));

        monitor.scan_once().await.unwrap();
        let report = monitor.scan_once().await.unwrap();

        assert_eq!(report.scanned, 0);
        assert_eq!(monitor.cursor().last_seen(), Some(Snowflake::new(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_keeps_cursor() {
        let api = Arc::new(MockApi::new());
        api.push_batch(vec![message(10, CHANNEL, OTHER, "hi")]);
        api.push_fetch_failure();
        api.push_batch(vec![message(11, CHANNEL, PEER, "💎"), message(10, CHANNEL, OTHER, "hi")]);
        let mut monitor = monitor_with(&api, &test_config(), Some(GUILD));

        monitor.scan_once().await.unwrap();
        assert!(monitor.scan_once().await.is_err());
        assert_eq!(monitor.cursor().last_seen(), Some(Snowflake::new(10)));

        let report = monitor.scan_once().await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(monitor.cursor().last_seen(), Some(Snowflake::new(11)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_button_pressed_once() {
        let api = Arc::new(MockApi::new());
        api.push_batch(vec![message_with_button(
            10,
            CHANNEL,
            PEER,
            "Rem\nWished by <@42>",
            "claim:10",
        )]);
        // messages fetched over REST carry no guild; the channel's is used
        let mut monitor = monitor_with(&api, &test_config(), Some(GUILD));

        monitor.scan_once().await.unwrap();

        let calls = api.calls();
        let pressed: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::Interact(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(pressed.len(), 1);
        assert_eq!(pressed[0].data.custom_id, "claim:10");
        assert_eq!(pressed[0].guild_id, GUILD);
        assert_eq!(pressed[0].application_id, PEER);
    }

    #[tokio::test(start_paused = true)]
    async fn test_press_failure_does_not_abort_scan() {
        let api = Arc::new(MockApi::new());
        api.push_batch(vec![
            message(11, CHANNEL, PEER, "💎"),
            message_with_button(10, CHANNEL, PEER, "Wished by <@42>", "claim:10"),
        ]);
        let mut monitor = monitor_with(&api, &test_config(), None);

        let report = monitor.scan_once().await.unwrap();

        assert_eq!(presses(&api), 0);
        assert_eq!(report.dispatched, 1);
        assert_eq!(monitor.cursor().last_seen(), Some(Snowflake::new(11)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_rule_appends_name() {
        let api = Arc::new(MockApi::new());
        api.push_batch(vec![message(10, CHANNEL, PEER, "rollfan claims **Emilia**!")]);
        let config = test_config();
        let mut monitor = monitor_with(&api, &config, Some(GUILD));

        let report = monitor.scan_once().await.unwrap();

        assert_eq!(report.dispatched, 1);
        let content = tokio::fs::read_to_string(&config.capture.path).await.unwrap();
        assert!(content.trim_end().ends_with("] Emilia"));
        tokio::fs::remove_file(&config.capture.path).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_rules_do_nothing() {
        let api = Arc::new(MockApi::new());
        api.push_batch(vec![message(10, CHANNEL, PEER, "💎")]);
        let mut config = test_config();
        config.triggers = TriggerConfig {
            loot_reactions: false,
            ..TriggerConfig::default()
        };
        let mut monitor = monitor_with(&api, &config, Some(GUILD));

        let report = monitor.scan_once().await.unwrap();

        assert_eq!(report.dispatched, 0);
        assert!(reactions(&api).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_flag_cleared() {
        let api = Arc::new(MockApi::new());
        api.push_batch(vec![message(10, CHANNEL, PEER, "💎")]);
        let monitor = monitor_with(&api, &test_config(), Some(GUILD));
        let running = RunFlag::new();

        let handle = tokio::spawn(monitor.run(running.clone()));
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        running.stop();
        handle.await.unwrap();

        let fetches = api
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Fetch(15)))
            .count();
        // one scan every 8-15s
        assert!((4..=8).contains(&fetches), "fetches {}", fetches);
        assert_eq!(reactions(&api).len(), 1);
    }
}
