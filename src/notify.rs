//! Per-user inbox of failed-write messages, drained by the dashboard as toasts.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::SyncErrorKind;
use crate::schemas::{Collection, UserId};
use crate::sync::{DataContext, SyncEvent};

const INBOX_CAPACITY: usize = 50;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: SyncErrorKind,
    pub collection: Collection,
    pub record_id: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl From<&SyncEvent> for Notification {
    fn from(event: &SyncEvent) -> Self {
        Notification {
            kind: event.kind,
            collection: event.collection,
            record_id: event.record_id.clone(),
            message: event.user_message(),
            at: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct Inbox {
    pending: Mutex<HashMap<UserId, VecDeque<Notification>>>,
}

impl Inbox {
    pub async fn push(&self, event: &SyncEvent) {
        let mut pending = self.pending.lock().await;
        let queue = pending.entry(event.user_id.clone()).or_default();
        if queue.len() == INBOX_CAPACITY {
            queue.pop_front();
        }
        queue.push_back(Notification::from(event));
    }

    pub async fn drain(&self, user_id: &str) -> Vec<Notification> {
        self.pending
            .lock()
            .await
            .remove(user_id)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Forwards every sync failure on the bus into the inbox.
    pub fn spawn_collector(self: &Arc<Self>, ctx: &DataContext) -> JoinHandle<()> {
        let inbox = Arc::clone(self);
        let mut events = ctx.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => inbox.push(&event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "notification collector fell behind")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::WriteOp;

    fn event(user: &str, record: &str) -> SyncEvent {
        SyncEvent {
            user_id: user.into(),
            collection: Collection::Notes,
            record_id: record.into(),
            op: WriteOp::Remove,
            kind: SyncErrorKind::Backend,
            message: "database error: timeout".into(),
        }
    }

    #[tokio::test]
    async fn drain_empties_only_the_callers_inbox() {
        let inbox = Inbox::default();
        inbox.push(&event("alice", "n1")).await;
        inbox.push(&event("bob", "n2")).await;

        let alice = inbox.drain("alice").await;
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].message, "Couldn't save your note. Please try again.");
        assert!(inbox.drain("alice").await.is_empty());
        assert_eq!(inbox.drain("bob").await.len(), 1);
    }

    #[tokio::test]
    async fn keeps_the_most_recent_messages() {
        let inbox = Inbox::default();
        for i in 0..INBOX_CAPACITY + 5 {
            inbox.push(&event("alice", &format!("n{i}"))).await;
        }
        let drained = inbox.drain("alice").await;
        assert_eq!(drained.len(), INBOX_CAPACITY);
        assert_eq!(drained[0].record_id, "n5");
    }
}
