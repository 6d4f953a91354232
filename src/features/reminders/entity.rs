//! Reminder entity
//!
//! The persisted record behind every scheduled notification. One-shot and
//! recurring reminders share this shape; a recurring reminder is simply one
//! with a non-null `frequency`.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled notification, one-shot or recurring.
///
/// Stored in the `reminders` table and owned by at most one delivery worker
/// at a time while in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    /// Primary key, assigned by the database on insert.
    pub id: i64,
    /// Discord user id of the requester.
    pub owner: String,
    /// Discord channel id the reminder is delivered to (DM channels included).
    pub target: String,
    /// Guild id for server-scoped reminders; `None` for DM reminders.
    pub guild: Option<String>,
    /// Free-text body, or a `[a;b;c` choice set (see [`Reminder::render_message`]).
    pub message: String,
    /// Next delivery instant. Advanced by `frequency` on each recurring delivery.
    pub next_remind: DateTime<Utc>,
    /// Repeat interval in seconds. `None` means one-shot.
    pub frequency: Option<i64>,
    /// Whether delivery requires an explicit acknowledgement from the user.
    pub require_clearing: bool,
}

impl Reminder {
    /// Whether this reminder repeats after delivery.
    pub fn is_recurring(&self) -> bool {
        self.frequency.is_some()
    }

    /// Whether `next_remind` has already passed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.next_remind <= now
    }

    /// Compute the literal text to send.
    ///
    /// A message starting with `[` encodes a choice set: the remainder is a
    /// `;`-delimited list of alternatives (a trailing `]` is tolerated), and
    /// one is picked uniformly at random *at delivery time*. Anything else is
    /// returned verbatim.
    pub fn render_message(&self) -> String {
        match choice_set(&self.message) {
            Some(choices) => {
                use rand::Rng;
                let idx = rand::rng().random_range(0..choices.len());
                choices[idx].to_string()
            }
            None => self.message.clone(),
        }
    }
}

/// Parse a `[a;b;c` / `[a;b;c]` choice set, if the message encodes one.
///
/// Returns `None` for plain messages and for degenerate sets with no
/// non-empty alternatives (those are delivered verbatim).
pub fn choice_set(message: &str) -> Option<Vec<&str>> {
    let body = message.strip_prefix('[')?;
    let body = body.strip_suffix(']').unwrap_or(body);

    let choices: Vec<&str> = body
        .split(';')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();

    if choices.is_empty() {
        None
    } else {
        Some(choices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reminder_with_message(message: &str) -> Reminder {
        Reminder {
            id: 1,
            owner: "100".to_string(),
            target: "200".to_string(),
            guild: None,
            message: message.to_string(),
            next_remind: Utc::now(),
            frequency: None,
            require_clearing: false,
        }
    }

    #[test]
    fn test_plain_message_is_verbatim() {
        let reminder = reminder_with_message("water the plants");
        assert_eq!(reminder.render_message(), "water the plants");
    }

    #[test]
    fn test_choice_set_parsing() {
        assert_eq!(choice_set("[a;b;c"), Some(vec!["a", "b", "c"]));
        assert_eq!(choice_set("[a;b;c]"), Some(vec!["a", "b", "c"]));
        assert_eq!(choice_set("[ a ; b ]"), Some(vec!["a", "b"]));
        assert_eq!(choice_set("[only one"), Some(vec!["only one"]));
        assert_eq!(choice_set("no brackets"), None);
        assert_eq!(choice_set("["), None);
        assert_eq!(choice_set("[;;]"), None);
    }

    #[test]
    fn test_rendered_choice_is_a_member() {
        let reminder = reminder_with_message("[a;b;c]");
        for _ in 0..50 {
            let rendered = reminder.render_message();
            assert!(["a", "b", "c"].contains(&rendered.as_str()), "got {rendered}");
        }
    }

    #[test]
    fn test_is_recurring() {
        let mut reminder = reminder_with_message("hi");
        assert!(!reminder.is_recurring());
        reminder.frequency = Some(3600);
        assert!(reminder.is_recurring());
    }

    #[test]
    fn test_is_overdue() {
        let now = Utc::now();
        let mut reminder = reminder_with_message("hi");
        reminder.next_remind = now - Duration::seconds(10);
        assert!(reminder.is_overdue(now));
        reminder.next_remind = now + Duration::seconds(10);
        assert!(!reminder.is_overdue(now));
    }
}
