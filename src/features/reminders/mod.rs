//! # Reminders Feature
//!
//! Persistence-backed reminder scheduling: one-shot and recurring reminders
//! with an optional acknowledgement ("clearing") protocol.
//!
//! Restart recovery is deliberate and simple: no worker state is persisted
//! beyond the reminder record itself, and the scheduler re-derives all active
//! work from the database on its next poll.
//!
//! - **Version**: 1.2.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

pub mod clearing;
pub mod delivery;
pub mod entity;
pub mod notifier;
pub mod scheduler;
pub mod service;

pub use clearing::ClearSignals;
pub use delivery::{ClearState, DEFAULT_ACK_TIMEOUT, MAX_NUDGES};
pub use entity::Reminder;
pub use notifier::{Destination, DiscordNotifier, ReminderNotifier};
pub use scheduler::ReminderScheduler;
pub use service::{
    CreateRequest, ListScope, ReminderError, ReminderService, MAX_MESSAGE_LEN, MIN_DELAY_SECS,
    MIN_FREQUENCY_SECS,
};

#[cfg(test)]
pub(crate) mod test_support {
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::clearing::ClearSignals;
    use super::entity::Reminder;
    use super::notifier::{Destination, ReminderNotifier};

    /// Notifier double that records every call and can inject failures.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub resolves: AtomicUsize,
        pub sends: Mutex<Vec<String>>,
        pub nudge_count: AtomicUsize,
        pub owner_notes: Mutex<Vec<String>>,
        pub fail_resolution: bool,
        pub fail_send: bool,
        /// Fail the nth nudge (1-based) to simulate a transient send error.
        pub fail_nudge_at: Option<usize>,
        /// Artificial send latency, to keep workers alive across polls.
        pub deliver_delay: Duration,
        pub clear_on_nudge: Mutex<Option<(usize, ClearSignals, i64)>>,
    }

    impl RecordingNotifier {
        /// Arrange for the clearing signal to fire right after nudge `n`.
        pub fn clear_after_nudge(&self, n: usize, signals: ClearSignals, id: i64) {
            *self.clear_on_nudge.lock().unwrap() = Some((n, signals, id));
        }
    }

    #[async_trait]
    impl ReminderNotifier for RecordingNotifier {
        async fn resolve_destination(&self, reminder: &Reminder) -> Result<Destination> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            if self.fail_resolution {
                return Err(anyhow!("channel {} is gone", reminder.target));
            }
            Ok(Destination {
                channel_id: reminder.target.parse().unwrap_or(0),
            })
        }

        async fn deliver(&self, _dest: Destination, _reminder: &Reminder, text: &str) -> Result<()> {
            if !self.deliver_delay.is_zero() {
                tokio::time::sleep(self.deliver_delay).await;
            }
            if self.fail_send {
                return Err(anyhow!("send failed"));
            }
            self.sends.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn nudge(&self, _dest: Destination, reminder: &Reminder) -> Result<()> {
            let n = self.nudge_count.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((after, signals, id)) = &*self.clear_on_nudge.lock().unwrap() {
                if n == *after {
                    signals.clear(*id);
                }
            }
            if self.fail_nudge_at == Some(n) {
                return Err(anyhow!("nudge {n} for reminder {} failed", reminder.id));
            }
            Ok(())
        }

        async fn notify_owner(&self, _reminder: &Reminder, text: &str) -> Result<()> {
            self.owner_notes.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }
}
