//! Reminder command operations
//!
//! The create/remove/list surface the slash-command glue calls into. All
//! validation and permission gating for reminders lives here; the handlers
//! above only translate Discord interactions into these calls.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use chrono::{Duration as ChronoDuration, Utc};
use log::info;
use std::fmt;

use crate::database::Database;

use super::entity::Reminder;

/// Longest accepted reminder body.
pub const MAX_MESSAGE_LEN: usize = 500;
/// Shortest accepted delay until first delivery.
pub const MIN_DELAY_SECS: i64 = 120;
/// Shortest accepted repeat interval.
pub const MIN_FREQUENCY_SECS: i64 = 3600;

/// User-facing failures of the reminder command surface.
#[derive(Debug)]
pub enum ReminderError {
    /// Rejected input; no record was persisted.
    Validation(String),
    /// The reminder does not exist (or was already removed).
    NotFound,
    /// The requester may not touch this reminder.
    Forbidden,
    /// Database or platform failure.
    Internal(anyhow::Error),
}

impl fmt::Display for ReminderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderError::Validation(reason) => write!(f, "{reason}"),
            ReminderError::NotFound => write!(f, "that reminder doesn't exist"),
            ReminderError::Forbidden => write!(f, "you don't have permission to do that"),
            ReminderError::Internal(e) => write!(f, "internal error: {e}"),
        }
    }
}

impl std::error::Error for ReminderError {}

impl From<anyhow::Error> for ReminderError {
    fn from(e: anyhow::Error) -> Self {
        ReminderError::Internal(e)
    }
}

/// A validated "add reminder" request.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub owner: String,
    pub target: String,
    pub guild: Option<String>,
    pub message: String,
    pub delay_seconds: i64,
    pub require_clearing: bool,
    pub frequency_seconds: Option<i64>,
    /// Whether the requester holds Manage Guild in the target guild. Gates
    /// `require_clearing` and `frequency` in shared channels; irrelevant in DMs.
    pub can_manage_guild: bool,
}

/// Which reminders a list call returns.
#[derive(Debug, Clone)]
pub enum ListScope {
    Owner(String),
    Guild(String),
}

/// Create/remove/list operations over persisted reminders.
#[derive(Clone)]
pub struct ReminderService {
    database: Database,
}

impl ReminderService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Validate and persist a new reminder.
    ///
    /// The scheduling loop promotes it into a live worker on a later poll;
    /// the minimum delay of two minutes guarantees at least one poll happens
    /// before the reminder is due.
    pub async fn create(&self, request: CreateRequest) -> Result<Reminder, ReminderError> {
        if request.message.is_empty() {
            return Err(ReminderError::Validation("the message can't be empty".to_string()));
        }
        if request.message.chars().count() > MAX_MESSAGE_LEN {
            return Err(ReminderError::Validation(format!(
                "the message can't be longer than {MAX_MESSAGE_LEN} characters"
            )));
        }
        if request.delay_seconds < MIN_DELAY_SECS {
            return Err(ReminderError::Validation(format!(
                "reminders must be at least {} minutes out",
                MIN_DELAY_SECS / 60
            )));
        }
        if let Some(frequency) = request.frequency_seconds {
            if frequency < MIN_FREQUENCY_SECS {
                return Err(ReminderError::Validation(format!(
                    "repeating reminders can't run more often than every {} hour",
                    MIN_FREQUENCY_SECS / 3600
                )));
            }
        }
        // Clearing and recurrence are noisy in shared channels, so both are
        // manager-only there. DMs are unrestricted.
        if request.guild.is_some()
            && !request.can_manage_guild
            && (request.require_clearing || request.frequency_seconds.is_some())
        {
            return Err(ReminderError::Validation(
                "only server managers can create clearing or repeating reminders here".to_string(),
            ));
        }

        let mut reminder = Reminder {
            id: 0,
            owner: request.owner,
            target: request.target,
            guild: request.guild,
            message: request.message,
            next_remind: Utc::now() + ChronoDuration::seconds(request.delay_seconds),
            frequency: request.frequency_seconds,
            require_clearing: request.require_clearing,
        };
        reminder.id = self.database.insert_reminder(&reminder).await?;

        info!(
            "created reminder {} for user {} (due {}, frequency {:?}, clearing {})",
            reminder.id, reminder.owner, reminder.next_remind, reminder.frequency, reminder.require_clearing
        );
        Ok(reminder)
    }

    /// Remove a reminder on behalf of `requester`.
    ///
    /// Allowed for the owner, and for guild managers when the reminder is
    /// scoped to the guild they manage. Safe to race against an in-flight
    /// delivery worker: the worker re-fetches before its terminal step and
    /// tolerates an absent record.
    pub async fn remove(
        &self,
        id: i64,
        requester: &str,
        manages_guild: Option<&str>,
    ) -> Result<(), ReminderError> {
        let reminder = self
            .database
            .get_reminder(id)
            .await?
            .ok_or(ReminderError::NotFound)?;

        let is_owner = reminder.owner == requester;
        let is_manager = matches!(
            (&reminder.guild, manages_guild),
            (Some(guild), Some(managed)) if guild == managed
        );
        if !is_owner && !is_manager {
            return Err(ReminderError::Forbidden);
        }

        if self.database.delete_reminder(id).await? {
            info!("reminder {id} removed by user {requester}");
            Ok(())
        } else {
            // Deleted between the fetch and the delete; same outcome for the
            // requester as a plain miss.
            Err(ReminderError::NotFound)
        }
    }

    /// Read-only listing.
    pub async fn list(&self, scope: ListScope) -> Result<Vec<Reminder>, ReminderError> {
        let reminders = match scope {
            ListScope::Owner(owner) => self.database.reminders_for_owner(&owner).await?,
            ListScope::Guild(guild) => self.database.reminders_for_guild(&guild).await?,
        };
        Ok(reminders)
    }
}
