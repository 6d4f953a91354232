//! Reminder command handlers
//!
//! Handles: remind, reminders
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info};
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::application::interaction::InteractionResponseType;
use serenity::prelude::Context;
use std::sync::Arc;

use crate::commands::context::CommandContext;
use crate::commands::handler::SlashCommandHandler;
use crate::commands::slash::{get_bool_option, get_integer_option, get_string_option};
use crate::core::response::chunk_for_message;
use crate::features::reminders::{CreateRequest, ListScope, Reminder, ReminderError};

/// Handler for reminder-related commands
pub struct RemindHandler;

#[async_trait]
impl SlashCommandHandler for RemindHandler {
    fn command_names(&self) -> &'static [&'static str] {
        &["remind", "reminders"]
    }

    async fn handle(
        &self,
        ctx: Arc<CommandContext>,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        match command.data.name.as_str() {
            "remind" => self.handle_remind(&ctx, serenity_ctx, command).await,
            "reminders" => self.handle_reminders(&ctx, serenity_ctx, command).await,
            _ => Ok(()),
        }
    }
}

impl RemindHandler {
    /// Handle /remind - create a new reminder
    async fn handle_remind(
        &self,
        ctx: &CommandContext,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        let time_str = get_string_option(&command.data.options, "time")
            .ok_or_else(|| anyhow::anyhow!("Missing time parameter"))?;
        let message = get_string_option(&command.data.options, "message")
            .ok_or_else(|| anyhow::anyhow!("Missing message parameter"))?;
        let require_clearing =
            get_bool_option(&command.data.options, "require_clearing").unwrap_or(false);
        let frequency_str = get_string_option(&command.data.options, "frequency");

        let delay_seconds = match parse_duration(&time_str) {
            Some(secs) => secs,
            None => {
                return respond(serenity_ctx, command,
                    "❌ Invalid time format. Use formats like `30m`, `2h`, `1d`, or `1h30m`.")
                .await;
            }
        };

        let frequency_seconds = match &frequency_str {
            Some(raw) => match parse_duration(raw) {
                Some(secs) => Some(secs),
                None => {
                    return respond(serenity_ctx, command,
                        "❌ Invalid frequency format. Use formats like `1h`, `12h`, or `1d`.")
                    .await;
                }
            },
            None => None,
        };

        let request = CreateRequest {
            owner: command.user.id.to_string(),
            target: command.channel_id.to_string(),
            guild: command.guild_id.map(|id| id.to_string()),
            message,
            delay_seconds,
            require_clearing,
            frequency_seconds,
            can_manage_guild: member_can_manage(command),
        };

        match ctx.reminders.create(request).await {
            Ok(reminder) => {
                let when = format_duration(delay_seconds);
                let mut confirmation = format!(
                    "⏰ Got it! I'll remind you in **{when}** about:\n> {}",
                    reminder.message
                );
                if let Some(frequency) = reminder.frequency {
                    confirmation
                        .push_str(&format!("\nRepeating every **{}**.", format_duration(frequency)));
                }
                if reminder.require_clearing {
                    confirmation.push_str("\nYou'll need to clear it when it fires.");
                }
                confirmation.push_str(&format!("\n\n*Reminder ID: #{}*", reminder.id));
                respond(serenity_ctx, command, &confirmation).await
            }
            Err(e) => report_error(serenity_ctx, command, e).await,
        }
    }

    /// Handle /reminders - list or cancel reminders
    async fn handle_reminders(
        &self,
        ctx: &CommandContext,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        let action = get_string_option(&command.data.options, "action")
            .unwrap_or_else(|| "list".to_string());

        match action.as_str() {
            "cancel" => self.handle_cancel(ctx, serenity_ctx, command).await,
            "server" => self.handle_server_list(ctx, serenity_ctx, command).await,
            _ => self.handle_list(ctx, serenity_ctx, command).await,
        }
    }

    /// Cancel a reminder by id
    async fn handle_cancel(
        &self,
        ctx: &CommandContext,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        let Some(id) = get_integer_option(&command.data.options, "id") else {
            return respond(serenity_ctx, command,
                "❌ Please provide a reminder ID to cancel. Use `/reminders` to see your reminder IDs.")
            .await;
        };

        let requester = command.user.id.to_string();
        let manages_guild = if member_can_manage(command) {
            command.guild_id.map(|id| id.to_string())
        } else {
            None
        };

        match ctx
            .reminders
            .remove(id, &requester, manages_guild.as_deref())
            .await
        {
            Ok(()) => {
                info!("reminder {id} cancelled by user {requester}");
                respond(serenity_ctx, command, &format!("✅ Cancelled reminder #{id}.")).await
            }
            Err(e) => report_error(serenity_ctx, command, e).await,
        }
    }

    /// List the requester's pending reminders
    async fn handle_list(
        &self,
        ctx: &CommandContext,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        let user_id = command.user.id.to_string();
        match ctx.reminders.list(ListScope::Owner(user_id)).await {
            Ok(reminders) if reminders.is_empty() => {
                respond(serenity_ctx, command,
                    "📋 You don't have any pending reminders.\n\nUse `/remind <time> <message>` to create one!")
                .await
            }
            Ok(reminders) => {
                let listing = format_listing("📋 **Your Pending Reminders:**", &reminders);
                respond_chunked(serenity_ctx, command, &listing).await
            }
            Err(e) => report_error(serenity_ctx, command, e).await,
        }
    }

    /// List every reminder on the current server (manager-only)
    async fn handle_server_list(
        &self,
        ctx: &CommandContext,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        let Some(guild_id) = command.guild_id else {
            return respond(serenity_ctx, command, "❌ This only works on a server.").await;
        };
        if !member_can_manage(command) {
            return report_error(serenity_ctx, command, ReminderError::Forbidden).await;
        }

        match ctx
            .reminders
            .list(ListScope::Guild(guild_id.to_string()))
            .await
        {
            Ok(reminders) if reminders.is_empty() => {
                respond(serenity_ctx, command, "📋 No pending reminders on this server.").await
            }
            Ok(reminders) => {
                let listing = format_listing("📋 **Server Reminders:**", &reminders);
                respond_chunked(serenity_ctx, command, &listing).await
            }
            Err(e) => report_error(serenity_ctx, command, e).await,
        }
    }
}

/// Whether the invoking member may manage reminders on this server.
/// Always false in DMs; the service treats DMs as unrestricted anyway.
fn member_can_manage(command: &ApplicationCommandInteraction) -> bool {
    command
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .map_or(false, |perms| perms.manage_guild() || perms.administrator())
}

fn format_listing(header: &str, reminders: &[Reminder]) -> String {
    let now = chrono::Utc::now();
    let mut listing = format!("{header}\n\n");

    for reminder in reminders {
        let diff = reminder.next_remind.signed_duration_since(now);
        let time_display = if diff.num_seconds() > 0 {
            format!("in {}", format_duration(diff.num_seconds()))
        } else {
            "any moment now".to_string()
        };

        let mut tags = Vec::new();
        if let Some(frequency) = reminder.frequency {
            tags.push(format!("every {}", format_duration(frequency)));
        }
        if reminder.require_clearing {
            tags.push("needs clearing".to_string());
        }
        let tag_display = if tags.is_empty() {
            String::new()
        } else {
            format!(" _[{}]_", tags.join(", "))
        };

        listing.push_str(&format!(
            "**#{}** - {time_display}{tag_display}\n> {}\n\n",
            reminder.id, reminder.message
        ));
    }

    listing.push_str("*Use `/reminders cancel <id>` to cancel a reminder.*");
    listing
}

async fn respond(
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
    content: &str,
) -> Result<()> {
    command
        .create_interaction_response(&serenity_ctx.http, |response| {
            response
                .kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|msg| msg.content(content))
        })
        .await?;
    Ok(())
}

/// Respond with the first chunk and follow up with the rest, so long listings
/// never exceed the message limit.
async fn respond_chunked(
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
    content: &str,
) -> Result<()> {
    let chunks = chunk_for_message(content);
    let mut chunks = chunks.into_iter();

    if let Some(first) = chunks.next() {
        respond(serenity_ctx, command, &first).await?;
    }
    for chunk in chunks {
        command
            .create_followup_message(&serenity_ctx.http, |msg| msg.content(chunk))
            .await?;
    }
    Ok(())
}

async fn report_error(
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
    error: ReminderError,
) -> Result<()> {
    if let ReminderError::Internal(e) = &error {
        error!("reminder command failed: {e:#}");
    }
    respond(serenity_ctx, command, &format!("❌ {error}")).await
}

/// Parse a time duration string like "30m", "2h", "1d", "1h30m" into seconds
pub fn parse_duration(time_str: &str) -> Option<i64> {
    let time_str = time_str.trim().to_lowercase();
    let mut total_seconds: i64 = 0;
    let mut current_number = String::new();

    for c in time_str.chars() {
        if c.is_ascii_digit() {
            current_number.push(c);
        } else if !current_number.is_empty() {
            let value: i64 = current_number.parse().ok()?;
            current_number.clear();

            let per_unit = match c {
                's' => 1,
                'm' => 60,
                'h' => 60 * 60,
                'd' => 60 * 60 * 24,
                'w' => 60 * 60 * 24 * 7,
                _ => return None,
            };
            // Absurd magnitudes overflow i64; treat them as malformed.
            let seconds = value.checked_mul(per_unit)?;
            total_seconds = total_seconds.checked_add(seconds)?;
        } else {
            return None;
        }
    }

    // A trailing number without a unit is malformed.
    if !current_number.is_empty() {
        return None;
    }

    if total_seconds > 0 {
        Some(total_seconds)
    } else {
        None
    }
}

/// Format a duration in seconds into a human-readable string
pub fn format_duration(seconds: i64) -> String {
    if seconds < 60 {
        format!("{} second{}", seconds, if seconds == 1 { "" } else { "s" })
    } else if seconds < 3600 {
        let mins = seconds / 60;
        format!("{} minute{}", mins, if mins == 1 { "" } else { "s" })
    } else if seconds < 86400 {
        let hours = seconds / 3600;
        let mins = (seconds % 3600) / 60;
        if mins > 0 {
            format!(
                "{} hour{} {} minute{}",
                hours,
                if hours == 1 { "" } else { "s" },
                mins,
                if mins == 1 { "" } else { "s" }
            )
        } else {
            format!("{} hour{}", hours, if hours == 1 { "" } else { "s" })
        }
    } else {
        let days = seconds / 86400;
        let hours = (seconds % 86400) / 3600;
        if hours > 0 {
            format!(
                "{} day{} {} hour{}",
                days,
                if days == 1 { "" } else { "s" },
                hours,
                if hours == 1 { "" } else { "s" }
            )
        } else {
            format!("{} day{}", days, if days == 1 { "" } else { "s" })
        }
    }
}
