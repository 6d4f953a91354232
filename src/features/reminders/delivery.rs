//! Delivery worker
//!
//! One task per active reminder, owning it from promotion to its terminal
//! disposition: sleep until due, resolve the target, send (optionally running
//! the bounded clearing protocol), then reschedule or delete the record.
//!
//! Every failure here is contained to the one reminder. The worker never
//! panics the scheduler, and the active-set entry is released through a Drop
//! guard so it survives task cancellation as well.
//!
//! - **Version**: 1.2.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.2.0: Drop records whose destination can no longer be resolved
//! - 1.1.0: Clearing protocol with bounded nudges
//! - 1.0.0: Initial fire-and-forget delivery

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashSet;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use crate::database::Database;

use super::clearing::ClearSignals;
use super::entity::Reminder;
use super::notifier::{Destination, ReminderNotifier};

/// Maximum nudges sent for an unacknowledged clearing reminder before it is
/// considered expired.
pub const MAX_NUDGES: usize = 8;

/// Default wait per clearing attempt.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Outcome of the clearing protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearState {
    Waiting,
    Cleared,
    Expired,
}

/// Everything a delivery worker needs, injected by the scheduler.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub database: Database,
    pub notifier: Arc<dyn ReminderNotifier>,
    pub signals: ClearSignals,
    pub active: Arc<DashSet<i64>>,
    pub ack_timeout: Duration,
}

/// Releases the worker's active-set entry and clearing registration when the
/// worker ends, including when its task is cancelled mid-await.
struct ActiveGuard {
    id: i64,
    active: Arc<DashSet<i64>>,
    signals: ClearSignals,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.remove(&self.id);
        self.signals.unregister(self.id);
    }
}

/// Run one reminder's delivery lifecycle to completion.
pub(crate) async fn deliver(ctx: WorkerContext, reminder: Reminder) {
    let request_id = Uuid::new_v4();
    let _guard = ActiveGuard {
        id: reminder.id,
        active: Arc::clone(&ctx.active),
        signals: ctx.signals.clone(),
    };

    let now = Utc::now();
    match (reminder.next_remind - now).to_std() {
        Ok(wait) if !wait.is_zero() => {
            debug!(
                "[{request_id}] reminder {} due in {}s, sleeping",
                reminder.id,
                wait.as_secs()
            );
            sleep(wait).await;
        }
        _ => {
            info!(
                "[{request_id}] reminder {} was due at {}, delivering immediately",
                reminder.id, reminder.next_remind
            );
        }
    }

    let dest = match ctx.notifier.resolve_destination(&reminder).await {
        Ok(dest) => dest,
        Err(e) => {
            error!(
                "[{request_id}] cannot resolve destination for reminder {}: {e:#}",
                reminder.id
            );
            let note = format!(
                "⚠️ I couldn't deliver your reminder “{}” — its channel is no longer reachable, so the reminder has been removed.",
                reminder.message
            );
            if let Err(e) = ctx.notifier.notify_owner(&reminder, &note).await {
                warn!("[{request_id}] failed to notify owner {}: {e:#}", reminder.owner);
            }
            // An unreachable target would otherwise be repolled and fail on
            // every iteration. Drop the record after telling the owner.
            if let Err(e) = ctx.database.delete_reminder(reminder.id).await {
                error!("[{request_id}] failed to remove undeliverable reminder {}: {e:#}", reminder.id);
            }
            return;
        }
    };

    let text = reminder.render_message();

    if reminder.require_clearing {
        // Register before the send so a button press can never race the worker.
        let mut rx = ctx.signals.register(reminder.id, &reminder.target);

        if let Err(e) = ctx.notifier.deliver(dest, &reminder, &text).await {
            error!("[{request_id}] failed to send reminder {}: {e:#}", reminder.id);
            // Record untouched; a later poll retries.
            return;
        }

        let state = await_clearing(
            ctx.notifier.as_ref(),
            dest,
            &reminder,
            &mut rx,
            ctx.ack_timeout,
            request_id,
        )
        .await;
        ctx.signals.unregister(reminder.id);

        match state {
            ClearState::Cleared => {
                info!("[{request_id}] reminder {} cleared by user", reminder.id);
            }
            ClearState::Expired => {
                info!(
                    "[{request_id}] reminder {} expired after {MAX_NUDGES} unanswered nudges",
                    reminder.id
                );
            }
            ClearState::Waiting => {
                warn!("[{request_id}] clearing channel closed for reminder {}", reminder.id);
            }
        }
    } else {
        if let Err(e) = ctx.notifier.deliver(dest, &reminder, &text).await {
            error!("[{request_id}] failed to send reminder {}: {e:#}", reminder.id);
            return;
        }
        info!("[{request_id}] delivered reminder {} to channel {}", reminder.id, dest.channel_id);
    }

    finalize(&ctx, reminder.id, request_id).await;
}

/// Bounded acknowledgement loop: wait up to `ack_timeout` per attempt, nudge
/// on every timeout, and give up after [`MAX_NUDGES`] unanswered nudges.
///
/// A failed nudge send is a missed nudge, not an abort. A closed signal
/// channel (registration dropped out from under the worker) ends the wait in
/// `Waiting`.
async fn await_clearing(
    notifier: &dyn ReminderNotifier,
    dest: Destination,
    reminder: &Reminder,
    rx: &mut mpsc::UnboundedReceiver<()>,
    ack_timeout: Duration,
    request_id: Uuid,
) -> ClearState {
    for attempt in 1..=MAX_NUDGES {
        match timeout(ack_timeout, rx.recv()).await {
            Ok(Some(())) => return ClearState::Cleared,
            Ok(None) => return ClearState::Waiting,
            Err(_elapsed) => {
                debug!(
                    "[{request_id}] reminder {} unacknowledged, nudge {attempt}/{MAX_NUDGES}",
                    reminder.id
                );
                if let Err(e) = notifier.nudge(dest, reminder).await {
                    warn!(
                        "[{request_id}] nudge {attempt} for reminder {} failed: {e:#}",
                        reminder.id
                    );
                }
            }
        }
    }

    ClearState::Expired
}

/// Terminal step: re-fetch the record (it may have been removed while this
/// worker was in flight), then advance recurring reminders by exactly one
/// frequency or delete one-shots.
async fn finalize(ctx: &WorkerContext, id: i64, request_id: Uuid) {
    match ctx.database.get_reminder(id).await {
        Ok(Some(current)) => {
            if let Some(frequency) = current.frequency {
                // Additive: previous instant plus the interval, never
                // now + interval, so delayed deliveries do not drift.
                let next = current.next_remind + ChronoDuration::seconds(frequency);
                match ctx.database.update_next_remind(id, next).await {
                    Ok(()) => info!("[{request_id}] reminder {id} rescheduled for {next}"),
                    Err(e) => error!("[{request_id}] failed to reschedule reminder {id}: {e:#}"),
                }
            } else {
                match ctx.database.delete_reminder(id).await {
                    Ok(_) => debug!("[{request_id}] one-shot reminder {id} removed"),
                    Err(e) => error!("[{request_id}] failed to remove reminder {id}: {e:#}"),
                }
            }
        }
        Ok(None) => {
            debug!("[{request_id}] reminder {id} was removed while in flight");
        }
        Err(e) => {
            error!("[{request_id}] failed to re-fetch reminder {id}: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::RecordingNotifier;
    use super::*;
    use crate::database::{format_timestamp, parse_timestamp};
    use chrono::{DateTime, Utc};
    use std::sync::atomic::Ordering;

    fn truncated(dt: DateTime<Utc>) -> DateTime<Utc> {
        parse_timestamp(&format_timestamp(&dt)).unwrap()
    }

    async fn insert(
        db: &Database,
        message: &str,
        next_remind: DateTime<Utc>,
        frequency: Option<i64>,
        require_clearing: bool,
    ) -> Reminder {
        let mut reminder = Reminder {
            id: 0,
            owner: "100".to_string(),
            target: "200".to_string(),
            guild: None,
            message: message.to_string(),
            next_remind: truncated(next_remind),
            frequency,
            require_clearing,
        };
        reminder.id = db.insert_reminder(&reminder).await.unwrap();
        reminder
    }

    fn worker_ctx(db: &Database, notifier: Arc<RecordingNotifier>) -> (WorkerContext, ClearSignals) {
        let signals = ClearSignals::new();
        let ctx = WorkerContext {
            database: db.clone(),
            notifier,
            signals: signals.clone(),
            active: Arc::new(DashSet::new()),
            ack_timeout: Duration::from_millis(20),
        };
        (ctx, signals)
    }

    #[tokio::test]
    async fn test_one_shot_choice_set_delivery_and_deletion() {
        let db = Database::new(":memory:").await.unwrap();
        let reminder = insert(&db, "[a;b;c]", Utc::now(), None, false).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (ctx, _signals) = worker_ctx(&db, notifier.clone());

        deliver(ctx, reminder.clone()).await;

        let sends = notifier.sends.lock().unwrap();
        assert_eq!(sends.len(), 1);
        assert!(["a", "b", "c"].contains(&sends[0].as_str()), "sent {}", sends[0]);
        assert!(db.get_reminder(reminder.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recurring_reschedule_is_additive() {
        let db = Database::new(":memory:").await.unwrap();
        // Delivered 90 minutes late: the next instant must still be
        // t0 + frequency, not now + frequency.
        let t0 = truncated(Utc::now() - ChronoDuration::minutes(90));
        let reminder = insert(&db, "drift check", t0, Some(3600), false).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (ctx, _signals) = worker_ctx(&db, notifier);

        deliver(ctx, reminder.clone()).await;

        let stored = db.get_reminder(reminder.id).await.unwrap().unwrap();
        assert_eq!(stored.next_remind, t0 + ChronoDuration::seconds(3600));
    }

    #[tokio::test]
    async fn test_ack_retry_bound_is_exactly_eight() {
        let db = Database::new(":memory:").await.unwrap();
        let reminder = insert(&db, "clear me", Utc::now(), None, true).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (ctx, _signals) = worker_ctx(&db, notifier.clone());

        deliver(ctx, reminder.clone()).await;

        assert_eq!(notifier.nudge_count.load(Ordering::SeqCst), MAX_NUDGES);
        // Expired one-shots are still deleted.
        assert!(db.get_reminder(reminder.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_early_clear_short_circuits_nudges() {
        let db = Database::new(":memory:").await.unwrap();
        let reminder = insert(&db, "clear me", Utc::now(), None, true).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (ctx, signals) = worker_ctx(&db, notifier.clone());
        notifier.clear_after_nudge(3, signals, reminder.id);

        deliver(ctx, reminder.clone()).await;

        assert_eq!(notifier.nudge_count.load(Ordering::SeqCst), 3);
        assert!(db.get_reminder(reminder.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_channel_ack_clears_without_nudges() {
        let db = Database::new(":memory:").await.unwrap();
        let reminder = insert(&db, "clear me", Utc::now(), None, true).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (ctx, signals) = worker_ctx(&db, notifier.clone());
        // Generous timeout so the ack always lands during the first wait.
        let ctx = WorkerContext {
            ack_timeout: Duration::from_secs(5),
            ..ctx
        };

        let id = reminder.id;
        let worker = tokio::spawn(deliver(ctx, reminder));
        // Let the worker register and send, then ack in its channel.
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if signals.ack_channel("200") > 0 {
                break;
            }
        }
        worker.await.unwrap();

        assert_eq!(notifier.nudge_count.load(Ordering::SeqCst), 0);
        assert!(db.get_reminder(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dropped_registration_ends_wait_without_nudges() {
        let db = Database::new(":memory:").await.unwrap();
        let reminder = insert(&db, "clear me", Utc::now(), None, true).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (ctx, signals) = worker_ctx(&db, notifier.clone());
        // Generous timeout so the wait is still running when we unregister.
        let ctx = WorkerContext {
            ack_timeout: Duration::from_secs(5),
            ..ctx
        };

        let id = reminder.id;
        let worker = tokio::spawn(deliver(ctx, reminder));
        // Wait for the worker to register, then yank the registration; the
        // closed signal channel must end the wait rather than nudging on.
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if signals.pending_count() > 0 {
                signals.unregister(id);
                break;
            }
        }
        worker.await.unwrap();

        assert_eq!(notifier.nudge_count.load(Ordering::SeqCst), 0);
        // The worker still reached its terminal step.
        assert!(db.get_reminder(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transient_nudge_failure_continues_protocol() {
        let db = Database::new(":memory:").await.unwrap();
        let reminder = insert(&db, "clear me", Utc::now(), None, true).await;
        let notifier = Arc::new(RecordingNotifier {
            fail_nudge_at: Some(2),
            ..RecordingNotifier::default()
        });
        let (ctx, _signals) = worker_ctx(&db, notifier.clone());

        deliver(ctx, reminder.clone()).await;

        // The failed second nudge still counts as an attempt.
        assert_eq!(notifier.nudge_count.load(Ordering::SeqCst), MAX_NUDGES);
        assert!(db.get_reminder(reminder.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_remove_is_tolerated() {
        let db = Database::new(":memory:").await.unwrap();
        let reminder = insert(&db, "soon gone", Utc::now(), Some(3600), false).await;
        // Simulate a /reminders cancel racing the in-flight worker.
        assert!(db.delete_reminder(reminder.id).await.unwrap());

        let notifier = Arc::new(RecordingNotifier::default());
        let (ctx, _signals) = worker_ctx(&db, notifier.clone());
        deliver(ctx, reminder.clone()).await;

        // Delivered, but not resurrected.
        assert_eq!(notifier.sends.lock().unwrap().len(), 1);
        assert!(db.get_reminder(reminder.id).await.unwrap().is_none());
        assert_eq!(db.count_reminders().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_resolution_failure_notifies_owner_and_drops_record() {
        let db = Database::new(":memory:").await.unwrap();
        let reminder = insert(&db, "orphaned", Utc::now(), None, false).await;
        let notifier = Arc::new(RecordingNotifier {
            fail_resolution: true,
            ..RecordingNotifier::default()
        });
        let (ctx, _signals) = worker_ctx(&db, notifier.clone());

        deliver(ctx, reminder.clone()).await;

        assert!(notifier.sends.lock().unwrap().is_empty());
        assert_eq!(notifier.owner_notes.lock().unwrap().len(), 1);
        assert!(db.get_reminder(reminder.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_send_failure_leaves_record_for_retry() {
        let db = Database::new(":memory:").await.unwrap();
        let reminder = insert(&db, "flaky", Utc::now(), None, false).await;
        let notifier = Arc::new(RecordingNotifier {
            fail_send: true,
            ..RecordingNotifier::default()
        });
        let (ctx, _signals) = worker_ctx(&db, notifier.clone());

        deliver(ctx, reminder.clone()).await;

        // Untouched record, released active slot: a later poll retries.
        assert!(db.get_reminder(reminder.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_active_entry_released_on_cancellation() {
        let db = Database::new(":memory:").await.unwrap();
        let reminder = insert(&db, "slow", Utc::now(), None, false).await;
        let notifier = Arc::new(RecordingNotifier {
            deliver_delay: Duration::from_secs(30),
            ..RecordingNotifier::default()
        });
        let (ctx, _signals) = worker_ctx(&db, notifier);
        let active = Arc::clone(&ctx.active);
        active.insert(reminder.id);

        let worker = tokio::spawn(deliver(ctx, reminder.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        worker.abort();
        let _ = worker.await;

        assert!(!active.contains(&reminder.id));
    }
}
