//! Reminder slash command definitions

use serenity::builder::CreateApplicationCommand;
use serenity::model::application::command::CommandOptionType;

pub fn create_commands() -> Vec<CreateApplicationCommand> {
    vec![create_remind_command(), create_reminders_command()]
}

/// `/remind` — create a one-shot or repeating reminder.
fn create_remind_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name("remind")
        .description("Set a reminder")
        .create_option(|option| {
            option
                .name("time")
                .description("When to remind you, like 30m, 2h, or 1h30m (minimum 2m)")
                .kind(CommandOptionType::String)
                .required(true)
        })
        .create_option(|option| {
            option
                .name("message")
                .description("What to remind you about (start with [ for a;b;c alternatives)")
                .kind(CommandOptionType::String)
                .required(true)
        })
        .create_option(|option| {
            option
                .name("require_clearing")
                .description("Keep nudging until you press Clear or reply 'ack' (manager-only in servers)")
                .kind(CommandOptionType::Boolean)
                .required(false)
        })
        .create_option(|option| {
            option
                .name("frequency")
                .description("Repeat interval, like 1h or 1d (minimum 1h, manager-only in servers)")
                .kind(CommandOptionType::String)
                .required(false)
        })
        .to_owned()
}

/// `/reminders` — list or cancel pending reminders.
fn create_reminders_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name("reminders")
        .description("List or cancel your reminders")
        .create_option(|option| {
            option
                .name("action")
                .description("What to do (default: list your reminders)")
                .kind(CommandOptionType::String)
                .required(false)
                .add_string_choice("list - Your pending reminders", "list")
                .add_string_choice("cancel - Cancel a reminder by id", "cancel")
                .add_string_choice("server - All reminders on this server (manager)", "server")
        })
        .create_option(|option| {
            option
                .name("id")
                .description("Reminder id, for cancel")
                .kind(CommandOptionType::Integer)
                .required(false)
        })
        .to_owned()
}
