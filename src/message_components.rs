//! Message component interactions
//!
//! The only components the bot ships are the ✅ Clear buttons attached to
//! clearing-required reminders. Their `custom_id` carries the reminder id
//! (`reminder_clear_<id>`), so a press clears exactly one reminder.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.1.0

use anyhow::Result;
use log::info;
use serenity::model::application::interaction::message_component::MessageComponentInteraction;
use serenity::model::application::interaction::InteractionResponseType;
use serenity::prelude::Context;

use crate::features::reminders::ClearSignals;

const CLEAR_PREFIX: &str = "reminder_clear_";

/// Handler for all message component interactions
pub struct MessageComponentHandler {
    signals: ClearSignals,
}

impl MessageComponentHandler {
    pub fn new(signals: ClearSignals) -> Self {
        Self { signals }
    }

    /// Handle all types of component interactions
    pub async fn handle_component_interaction(
        &self,
        ctx: &Context,
        interaction: &MessageComponentInteraction,
    ) -> Result<()> {
        let custom_id = &interaction.data.custom_id;

        match parse_clear_id(custom_id) {
            Some(reminder_id) => {
                self.handle_clear_button(ctx, interaction, reminder_id).await
            }
            None => {
                interaction
                    .create_interaction_response(&ctx.http, |response| {
                        response
                            .kind(InteractionResponseType::ChannelMessageWithSource)
                            .interaction_response_data(|message| {
                                message.content("Unknown component interaction.").ephemeral(true)
                            })
                    })
                    .await?;
                Ok(())
            }
        }
    }

    async fn handle_clear_button(
        &self,
        ctx: &Context,
        interaction: &MessageComponentInteraction,
        reminder_id: i64,
    ) -> Result<()> {
        let user_id = interaction.user.id.to_string();

        if self.signals.clear(reminder_id) {
            info!("reminder {reminder_id} cleared via button by user {user_id}");
            interaction
                .create_interaction_response(&ctx.http, |response| {
                    response
                        .kind(InteractionResponseType::UpdateMessage)
                        .interaction_response_data(|message| {
                            message
                                .content(format!("✅ Reminder #{reminder_id} cleared."))
                                .components(|c| c) // Clear components
                        })
                })
                .await?;
        } else {
            // No worker is waiting: already cleared, or the window expired.
            interaction
                .create_interaction_response(&ctx.http, |response| {
                    response
                        .kind(InteractionResponseType::ChannelMessageWithSource)
                        .interaction_response_data(|message| {
                            message
                                .content("This reminder is no longer waiting to be cleared.")
                                .ephemeral(true)
                        })
                })
                .await?;
        }

        Ok(())
    }
}

/// Extract the reminder id from a `reminder_clear_<id>` custom id.
fn parse_clear_id(custom_id: &str) -> Option<i64> {
    custom_id.strip_prefix(CLEAR_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clear_id() {
        assert_eq!(parse_clear_id("reminder_clear_42"), Some(42));
        assert_eq!(parse_clear_id("reminder_clear_"), None);
        assert_eq!(parse_clear_id("reminder_clear_abc"), None);
        assert_eq!(parse_clear_id("persona_select"), None);
    }
}
