//! Reminder delivery boundary
//!
//! The [`ReminderNotifier`] trait is the seam between the scheduling core and
//! Discord. Workers talk only to this trait, so the scheduler and delivery
//! protocol can be exercised in tests without a gateway connection.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use anyhow::{Context as AnyhowContext, Result};
use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::application::component::ButtonStyle;
use serenity::model::id::{ChannelId, UserId};
use std::sync::Arc;

use super::entity::Reminder;

/// A resolved delivery destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub channel_id: u64,
}

/// Outbound messaging operations a delivery worker needs.
#[async_trait]
pub trait ReminderNotifier: Send + Sync {
    /// Resolve the reminder's target into a live destination.
    ///
    /// Fails when the channel no longer exists or is unreachable.
    async fn resolve_destination(&self, reminder: &Reminder) -> Result<Destination>;

    /// Send the reminder body. When `reminder.require_clearing` is set the
    /// message carries a Clear button wired to `reminder_clear_<id>`.
    async fn deliver(&self, dest: Destination, reminder: &Reminder, text: &str) -> Result<()>;

    /// Re-send a short nudge for an unacknowledged clearing reminder.
    async fn nudge(&self, dest: Destination, reminder: &Reminder) -> Result<()>;

    /// Best-effort direct message to the reminder's owner (delivery failures).
    async fn notify_owner(&self, reminder: &Reminder, text: &str) -> Result<()>;
}

/// Production notifier backed by the Discord REST API.
pub struct DiscordNotifier {
    http: Arc<Http>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    async fn send_with_optional_button(
        &self,
        dest: Destination,
        reminder: &Reminder,
        content: String,
    ) -> Result<()> {
        ChannelId(dest.channel_id)
            .send_message(&self.http, |m| {
                m.content(content);
                if reminder.require_clearing {
                    m.components(|c| {
                        c.create_action_row(|row| {
                            row.create_button(|button| {
                                button
                                    .custom_id(format!("reminder_clear_{}", reminder.id))
                                    .label("✅ Clear")
                                    .style(ButtonStyle::Success)
                            })
                        })
                    });
                }
                m
            })
            .await
            .with_context(|| format!("failed to send reminder {} to channel {}", reminder.id, dest.channel_id))?;
        Ok(())
    }
}

#[async_trait]
impl ReminderNotifier for DiscordNotifier {
    async fn resolve_destination(&self, reminder: &Reminder) -> Result<Destination> {
        let channel_id: u64 = reminder
            .target
            .parse()
            .with_context(|| format!("reminder {} has malformed target {}", reminder.id, reminder.target))?;

        self.http
            .get_channel(channel_id)
            .await
            .with_context(|| format!("channel {channel_id} is not reachable"))?;

        Ok(Destination { channel_id })
    }

    async fn deliver(&self, dest: Destination, reminder: &Reminder, text: &str) -> Result<()> {
        let content = format!("⏰ <@{}> {}", reminder.owner, text);
        self.send_with_optional_button(dest, reminder, content).await
    }

    async fn nudge(&self, dest: Destination, reminder: &Reminder) -> Result<()> {
        let content = format!(
            "🔔 Reminder! <@{}> this is still waiting to be cleared. Press ✅ Clear or reply `ack`.",
            reminder.owner
        );
        self.send_with_optional_button(dest, reminder, content).await
    }

    async fn notify_owner(&self, reminder: &Reminder, text: &str) -> Result<()> {
        let owner_id: u64 = reminder
            .owner
            .parse()
            .with_context(|| format!("reminder {} has malformed owner {}", reminder.id, reminder.owner))?;

        let dm = UserId(owner_id)
            .create_dm_channel(&self.http)
            .await
            .context("failed to open DM channel")?;
        dm.id
            .send_message(&self.http, |m| m.content(text))
            .await
            .context("failed to DM owner")?;
        Ok(())
    }
}
