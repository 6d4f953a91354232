// Core layer - configuration and shared helpers
pub mod core;

// Features layer - the reminder subsystem
pub mod features;

// UI components - the Clear button
pub mod message_components;

// Infrastructure
pub mod database;

// Application layer
pub mod commands;

// Re-export the most commonly used items
pub use core::Config;
pub use database::Database;
pub use features::reminders::{
    ClearSignals, DiscordNotifier, Reminder, ReminderScheduler, ReminderService,
};
