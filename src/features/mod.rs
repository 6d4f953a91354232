//! # Features Layer
//!
//! Each feature lives in its own module with its own tests. The bot currently
//! ships a single feature: the reminder subsystem.

pub mod reminders;

pub use reminders::{
    ClearSignals, DiscordNotifier, Reminder, ReminderScheduler, ReminderService,
};
