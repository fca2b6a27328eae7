use crate::platform::{Message, Snowflake};

/// Newest message id the monitor has fully processed.
///
/// Only moves forward. Anything at or below it is never handed to trigger rules again.
#[derive(Debug, Clone, Default)]
pub struct MessageCursor {
    last_seen: Option<Snowflake>,
}

impl MessageCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_seen(&self) -> Option<Snowflake> {
        self.last_seen
    }

    pub fn is_seen(&self, id: Snowflake) -> bool {
        self.last_seen.is_some_and(|seen| id <= seen)
    }

    /// Messages of a newest-first batch not yet seen, oldest first.
    pub fn unseen<'a>(&self, batch: &'a [Message]) -> Vec<&'a Message> {
        let mut fresh: Vec<&Message> = batch.iter().filter(|m| !self.is_seen(m.id)).collect();
        fresh.sort_by_key(|m| m.id);
        fresh
    }

    /// Move to the newest id in `batch`. Never moves backwards.
    pub fn advance(&mut self, batch: &[Message]) {
        if let Some(newest) = batch.iter().map(|m| m.id).max() {
            if !self.is_seen(newest) {
                self.last_seen = Some(newest);
            }
        }
    }
}
