//! Clearing signal registry
//!
//! Bridges Discord events to delivery workers waiting on an acknowledgement.
//! A worker registers its reminder id before the first clearing-required send;
//! the gateway handler then routes two kinds of events here:
//!
//! - the ✅ Clear button (`reminder_clear_<id>` component), scoped to one
//!   reminder by id
//! - a plain text reply starting with `ack`, which clears every pending
//!   reminder in that channel
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.1.0

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

struct PendingClear {
    channel: String,
    tx: mpsc::UnboundedSender<()>,
}

/// Shared registry of reminders currently waiting to be cleared.
#[derive(Clone, Default)]
pub struct ClearSignals {
    pending: Arc<DashMap<i64, PendingClear>>,
}

impl ClearSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reminder as awaiting acknowledgement in `channel`.
    ///
    /// The returned receiver yields once per clearing event. Registration is
    /// replaced if the id was already present (stale entry from an aborted
    /// worker).
    pub fn register(&self, id: i64, channel: &str) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending.insert(
            id,
            PendingClear {
                channel: channel.to_string(),
                tx,
            },
        );
        rx
    }

    /// Drop a reminder's registration. Safe to call when absent.
    pub fn unregister(&self, id: i64) {
        self.pending.remove(&id);
    }

    /// Signal the worker for one reminder id. Returns false if nothing was
    /// waiting (already cleared, expired, or never required clearing).
    pub fn clear(&self, id: i64) -> bool {
        match self.pending.get(&id) {
            Some(entry) => entry.tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Signal every worker waiting in `channel`. Returns how many were hit.
    pub fn ack_channel(&self, channel: &str) -> usize {
        let mut hit = 0;
        for entry in self.pending.iter() {
            if entry.channel == channel && entry.tx.send(()).is_ok() {
                hit += 1;
            }
        }
        hit
    }

    /// Number of reminders currently awaiting acknowledgement.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The acknowledgement predicate: any message starting with the literal
    /// token `ack`, case-insensitively.
    pub fn is_ack_message(text: &str) -> bool {
        let bytes = text.as_bytes();
        bytes.len() >= 3 && bytes[..3].eq_ignore_ascii_case(b"ack")
    }
}
