//! Slash command handler trait
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::prelude::Context;
use std::sync::Arc;

use super::context::CommandContext;

/// Trait for slash command handlers.
///
/// A handler processes one or more slash commands and is dispatched by name
/// through the [`CommandRegistry`](super::registry::CommandRegistry).
#[async_trait]
pub trait SlashCommandHandler: Send + Sync {
    /// Command name(s) this handler processes.
    fn command_names(&self) -> &'static [&'static str];

    /// Handle the slash command.
    async fn handle(
        &self,
        ctx: Arc<CommandContext>,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // The trait must stay object-safe, handlers are stored as dyn.
    fn _assert_object_safe(_: &dyn SlashCommandHandler) {}
}
