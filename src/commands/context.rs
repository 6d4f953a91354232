//! Shared context for command handlers
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use crate::database::Database;
use crate::features::reminders::ReminderService;

/// Shared state every command handler gets a hold of: the database handle,
/// the reminder service built on top of it, and the bot start time for
/// uptime display.
#[derive(Clone)]
pub struct CommandContext {
    pub database: Database,
    pub reminders: ReminderService,
    pub start_time: std::time::Instant,
}

impl CommandContext {
    pub fn new(database: Database) -> Self {
        let reminders = ReminderService::new(database.clone());
        Self {
            database,
            reminders,
            start_time: std::time::Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_context_clone() {
        // CommandContext must be Clone for sharing across handlers
        fn assert_clone<T: Clone>() {}
        assert_clone::<CommandContext>();
    }
}
