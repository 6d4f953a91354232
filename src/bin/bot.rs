use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info, warn};
use serenity::async_trait;
use serenity::model::application::interaction::Interaction;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::GuildId;
use serenity::prelude::*;
use std::sync::Arc;

use chime::commands::handlers::RemindHandler;
use chime::commands::{register_global_commands, register_guild_commands, CommandContext, CommandRegistry};
use chime::core::Config;
use chime::database::Database;
use chime::features::reminders::{ClearSignals, DiscordNotifier, ReminderScheduler};
use chime::message_components::MessageComponentHandler;

struct Handler {
    registry: CommandRegistry,
    command_context: Arc<CommandContext>,
    component_handler: MessageComponentHandler,
    signals: ClearSignals,
    guild_id: Option<GuildId>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        // A plain "ack" reply clears every reminder waiting in this channel.
        if ClearSignals::is_ack_message(&msg.content) {
            let cleared = self.signals.ack_channel(&msg.channel_id.to_string());
            if cleared > 0 {
                info!(
                    "user {} acked {cleared} reminder(s) in channel {}",
                    msg.author.id, msg.channel_id
                );
            }
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::ApplicationCommand(command) => {
                let name = command.data.name.clone();
                let Some(handler) = self.registry.get(&name) else {
                    warn!("no handler registered for command /{name}");
                    return;
                };

                if let Err(e) = handler
                    .handle(Arc::clone(&self.command_context), &ctx, &command)
                    .await
                {
                    error!("command /{name} failed: {e:#}");
                }
            }
            Interaction::MessageComponent(component) => {
                if let Err(e) = self
                    .component_handler
                    .handle_component_interaction(&ctx, &component)
                    .await
                {
                    error!("component interaction failed: {e:#}");
                }
            }
            _ => {}
        }
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);

        let registered = match self.guild_id {
            Some(guild_id) => register_guild_commands(&ctx, guild_id).await,
            None => register_global_commands(&ctx).await,
        };
        if let Err(e) = registered {
            error!("failed to register slash commands: {e:#}");
        }

        match self.command_context.database.count_reminders().await {
            Ok(count) => info!("{count} reminder(s) pending in the database"),
            Err(e) => warn!("failed to count pending reminders: {e:#}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting Chime reminder bot...");

    let database = Database::new(&config.database_path).await?;
    let signals = ClearSignals::new();

    let command_context = Arc::new(CommandContext::new(database.clone()));
    let mut registry = CommandRegistry::new();
    registry.register(Arc::new(RemindHandler));

    let guild_id = config
        .discord_guild_id
        .as_ref()
        .and_then(|id| id.parse::<u64>().ok())
        .map(GuildId);

    let handler = Handler {
        registry,
        command_context,
        component_handler: MessageComponentHandler::new(signals.clone()),
        signals: signals.clone(),
        guild_id,
    };

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {e}");
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    info!("Bot configured successfully. Connecting to Discord gateway...");

    // Start the reminder scheduler against the same database. Workers are
    // cancelled with the scheduler task when the process shuts down.
    let notifier = Arc::new(DiscordNotifier::new(client.cache_and_http.http.clone()));
    let scheduler = ReminderScheduler::new(database, notifier, signals);
    tokio::spawn(scheduler.run());

    let mut client = client;
    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {why:?}");
        return Err(anyhow::anyhow!(
            "Failed to establish gateway connection: {}",
            why
        ));
    }

    Ok(())
}
