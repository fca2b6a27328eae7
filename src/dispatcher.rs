use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::platform::{
    ChatApi, InteractionData, InteractionPayload, Message, Snowflake, COMPONENT_BUTTON,
    INTERACTION_MESSAGE_COMPONENT,
};

/// Reacts to and presses buttons on individual messages
pub struct Dispatcher {
    api: Arc<dyn ChatApi>,
    /// Application that owns the components we press
    application_id: Snowflake,
    session_id: String,
}

impl Dispatcher {
    pub fn new(api: Arc<dyn ChatApi>, application_id: Snowflake) -> Self {
        Self {
            api,
            application_id,
            session_id: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    pub async fn add_reaction(&self, message: &Message, emoji: &str) -> Result<()> {
        let encoded = urlencoding::encode(emoji);
        self.api
            .add_reaction(message.channel_id, message.id, &encoded)
            .await?;
        info!("Reaction added: {}", emoji);
        Ok(())
    }

    /// Build the interaction for the message's first pressable component.
    ///
    /// `fallback_guild` is used when the message itself carries no guild id,
    /// which is the norm for messages fetched over REST.
    pub fn press_payload(
        &self,
        message: &Message,
        fallback_guild: Option<Snowflake>,
    ) -> Result<InteractionPayload> {
        let guild_id = message
            .guild_id
            .or(fallback_guild)
            .with_context(|| format!("Message {} has no guild context", message.id))?;
        let custom_id = message
            .first_pressable()
            .and_then(|c| c.custom_id.clone())
            .with_context(|| format!("Message {} has no pressable component", message.id))?;

        Ok(InteractionPayload {
            kind: INTERACTION_MESSAGE_COMPONENT,
            application_id: self.application_id,
            guild_id,
            channel_id: message.channel_id,
            message_id: message.id,
            message_flags: 0,
            session_id: self.session_id.clone(),
            data: InteractionData {
                component_type: COMPONENT_BUTTON,
                custom_id,
            },
        })
    }

    /// Press the first pressable component. Precondition failures return
    /// before any request is made.
    pub async fn press_first_component(
        &self,
        message: &Message,
        fallback_guild: Option<Snowflake>,
    ) -> Result<()> {
        let payload = self.press_payload(message, fallback_guild)?;
        self.api.invoke_component(&payload).await?;
        info!(
            "Pressed component {} on message {}",
            payload.data.custom_id, message.id
        );
        Ok(())
    }
}
