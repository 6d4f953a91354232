//! Scheduling loop
//!
//! Bridges persisted reminders and live delivery tasks. Every poll interval
//! the loop reads all reminders due within the look-ahead horizon and spawns
//! a delivery worker for each one that is not already active.
//!
//! The active-id set is owned here and injected into each worker, so the
//! scheduler is instantiable per test rather than a process-wide singleton.
//! Because this loop is the only promoter and the membership check and insert
//! happen with no await between them, an id can never be promoted twice while
//! its worker lives.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Workers tracked in a JoinSet so dropping the loop cancels them
//! - 1.0.0: Initial poll-and-promote loop

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashSet;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::database::Database;

use super::clearing::ClearSignals;
use super::delivery::{self, WorkerContext, DEFAULT_ACK_TIMEOUT};
use super::notifier::ReminderNotifier;

/// How often the loop re-reads persisted state.
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// How far ahead of "now" a reminder is promoted into a live timer. Must stay
/// comfortably above the poll interval so nothing slips between polls.
pub const LOOKAHEAD: Duration = Duration::from_secs(300);

/// Polls the database and promotes due reminders into delivery workers.
pub struct ReminderScheduler {
    database: Database,
    notifier: Arc<dyn ReminderNotifier>,
    signals: ClearSignals,
    active: Arc<DashSet<i64>>,
    poll_interval: Duration,
    lookahead: ChronoDuration,
    ack_timeout: Duration,
}

impl ReminderScheduler {
    pub fn new(
        database: Database,
        notifier: Arc<dyn ReminderNotifier>,
        signals: ClearSignals,
    ) -> Self {
        Self {
            database,
            notifier,
            signals,
            active: Arc::new(DashSet::new()),
            poll_interval: POLL_INTERVAL,
            lookahead: ChronoDuration::from_std(LOOKAHEAD).unwrap_or(ChronoDuration::minutes(5)),
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }

    /// Override the timing constants (tests use millisecond-scale values).
    pub fn with_timings(
        mut self,
        poll_interval: Duration,
        lookahead: Duration,
        ack_timeout: Duration,
    ) -> Self {
        self.poll_interval = poll_interval;
        self.lookahead =
            ChronoDuration::from_std(lookahead).unwrap_or(ChronoDuration::minutes(5));
        self.ack_timeout = ack_timeout;
        self
    }

    /// Ids currently owned by a live delivery worker.
    pub fn active_ids(&self) -> Arc<DashSet<i64>> {
        Arc::clone(&self.active)
    }

    /// Run the polling loop forever.
    ///
    /// Dropping the returned future (aborting the task it runs on) stops
    /// polling and cancels every in-flight worker; each worker releases its
    /// active-set entry through its own drop guard.
    pub async fn run(self) {
        let mut workers: JoinSet<()> = JoinSet::new();
        let mut interval = tokio::time::interval(self.poll_interval);

        info!(
            "reminder scheduler started (poll {}s, lookahead {}s)",
            self.poll_interval.as_secs(),
            self.lookahead.num_seconds()
        );

        loop {
            interval.tick().await;

            // Reap finished workers so the set does not grow unbounded.
            while workers.try_join_next().is_some() {}

            let cutoff = Utc::now() + self.lookahead;
            let due = match self.database.due_reminders(cutoff).await {
                Ok(due) => due,
                Err(e) => {
                    error!("reminder poll failed: {e:#}");
                    continue;
                }
            };

            for reminder in due {
                // Check-then-insert with no await in between: this loop is
                // the only promoter, so the pair is effectively atomic.
                if self.active.contains(&reminder.id) {
                    continue;
                }
                self.active.insert(reminder.id);

                debug!(
                    "promoting reminder {} (due {}) into a delivery worker",
                    reminder.id, reminder.next_remind
                );
                let ctx = WorkerContext {
                    database: self.database.clone(),
                    notifier: Arc::clone(&self.notifier),
                    signals: self.signals.clone(),
                    active: Arc::clone(&self.active),
                    ack_timeout: self.ack_timeout,
                };
                workers.spawn(delivery::deliver(ctx, reminder));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::RecordingNotifier;
    use super::*;
    use crate::features::reminders::Reminder;
    use std::sync::atomic::Ordering;

    async fn insert_due(db: &Database, minutes_ago: i64) -> i64 {
        let reminder = Reminder {
            id: 0,
            owner: "100".to_string(),
            target: "200".to_string(),
            guild: None,
            message: "poll me".to_string(),
            next_remind: Utc::now() - ChronoDuration::minutes(minutes_ago),
            frequency: None,
            require_clearing: false,
        };
        db.insert_reminder(&reminder).await.unwrap()
    }

    #[tokio::test]
    async fn test_due_reminder_promoted_once_across_polls() {
        let db = Database::new(":memory:").await.unwrap();
        insert_due(&db, 1).await;

        // Workers hold their reminder for far longer than the test runs, so
        // repeated polls see the id as active.
        let notifier = Arc::new(RecordingNotifier {
            deliver_delay: Duration::from_secs(30),
            ..RecordingNotifier::default()
        });
        let scheduler = ReminderScheduler::new(db, notifier.clone(), ClearSignals::new())
            .with_timings(
                Duration::from_millis(10),
                Duration::from_secs(300),
                Duration::from_secs(1),
            );

        let handle = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.abort();
        let _ = handle.await;

        // Many polls elapsed, exactly one promotion happened.
        assert_eq!(notifier.resolves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_overdue_reminder_is_promoted_and_delivered() {
        let db = Database::new(":memory:").await.unwrap();
        let id = insert_due(&db, 60).await;

        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = ReminderScheduler::new(db.clone(), notifier.clone(), ClearSignals::new())
            .with_timings(
                Duration::from_millis(10),
                Duration::from_secs(300),
                Duration::from_secs(1),
            );
        let active = scheduler.active_ids();

        let handle = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.abort();
        let _ = handle.await;

        assert_eq!(notifier.sends.lock().unwrap().len(), 1);
        assert!(db.get_reminder(id).await.unwrap().is_none());
        // Terminal worker released its active-set entry.
        assert!(!active.contains(&id));
    }

    #[tokio::test]
    async fn test_far_future_reminder_not_promoted() {
        let db = Database::new(":memory:").await.unwrap();
        let reminder = Reminder {
            id: 0,
            owner: "100".to_string(),
            target: "200".to_string(),
            guild: None,
            message: "later".to_string(),
            next_remind: Utc::now() + ChronoDuration::hours(2),
            frequency: None,
            require_clearing: false,
        };
        db.insert_reminder(&reminder).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = ReminderScheduler::new(db, notifier.clone(), ClearSignals::new())
            .with_timings(
                Duration::from_millis(10),
                Duration::from_secs(300),
                Duration::from_secs(1),
            );

        let handle = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.abort();
        let _ = handle.await;

        assert_eq!(notifier.resolves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropping_scheduler_cancels_workers() {
        let db = Database::new(":memory:").await.unwrap();
        let id = insert_due(&db, 1).await;

        let notifier = Arc::new(RecordingNotifier {
            deliver_delay: Duration::from_secs(30),
            ..RecordingNotifier::default()
        });
        let scheduler = ReminderScheduler::new(db.clone(), notifier, ClearSignals::new())
            .with_timings(
                Duration::from_millis(10),
                Duration::from_secs(300),
                Duration::from_secs(1),
            );
        let active = scheduler.active_ids();

        let handle = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(active.contains(&id));

        handle.abort();
        let _ = handle.await;
        // Give the aborted worker a moment to run its drop guard.
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!active.contains(&id));
        // The record survives; a restarted scheduler would re-derive it.
        assert!(db.get_reminder(id).await.unwrap().is_some());
    }
}
