//! The data context: a per-user cache kept in step with the document store.
//!
//! Writes are optimistic. The cache is updated and the call returns before the
//! remote write runs. Each user's remote writes are applied one at a time in the
//! order they were issued; a failed write is published on the event bus and the
//! affected collection is re-read from the store. A polling listener replaces
//! every loaded user's cache with a fresh snapshot on each tick, so the last
//! write to reach the store wins.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{StoreError, SyncErrorKind};
use crate::schemas::{Bill, Budget, Collection, Note, Record, StoredDocument, Transaction, UserId};
use crate::store::Store;

const EVENT_CAPACITY: usize = 256;

type WriteJob = BoxFuture<'static, ()>;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub transactions: Vec<Transaction>,
    pub budgets: Vec<Budget>,
    pub bills: Vec<Bill>,
    pub notes: Vec<Note>,
    pub documents: Vec<StoredDocument>,
}

/// A record type with a slot in [`UserData`].
pub trait Cached: Record {
    fn slot(data: &mut UserData) -> &mut Vec<Self>;
}

macro_rules! cached {
    ($ty:ty, $field:ident) => {
        impl Cached for $ty {
            fn slot(data: &mut UserData) -> &mut Vec<Self> {
                &mut data.$field
            }
        }
    };
}

cached!(Transaction, transactions);
cached!(Budget, budgets);
cached!(Bill, bills);
cached!(Note, notes);
cached!(StoredDocument, documents);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOp {
    Add,
    Update,
    Remove,
}

/// A remote write that failed after the cache had already been updated.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    pub user_id: UserId,
    pub collection: Collection,
    pub record_id: String,
    pub op: WriteOp,
    pub kind: SyncErrorKind,
    pub message: String,
}

impl SyncEvent {
    /// Text shown to the user for this failure.
    pub fn user_message(&self) -> String {
        let item = self.collection.item();
        match self.kind {
            SyncErrorKind::PermissionDenied => format!(
                "You don't have permission to change this {item}. Your change was reverted."
            ),
            SyncErrorKind::NotFound => {
                format!("This {item} no longer exists. Your change was reverted.")
            }
            SyncErrorKind::Conflict => format!("This {item} already exists."),
            SyncErrorKind::Backend => format!("Couldn't save your {item}. Please try again."),
        }
    }
}

struct Inner {
    store: Store,
    cache: RwLock<HashMap<UserId, UserData>>,
    events: broadcast::Sender<SyncEvent>,
    // One FIFO of pending remote writes per user.
    lanes: Mutex<HashMap<UserId, mpsc::UnboundedSender<WriteJob>>>,
    in_flight: AtomicUsize,
    idle: Notify,
}

#[derive(Clone)]
pub struct DataContext {
    inner: Arc<Inner>,
}

impl DataContext {
    pub fn new(store: Store) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        DataContext {
            inner: Arc::new(Inner {
                store,
                cache: RwLock::new(HashMap::new()),
                events,
                lanes: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub async fn loaded_users(&self) -> Vec<UserId> {
        self.inner.cache.read().await.keys().cloned().collect()
    }

    /// Loads the user's snapshot on first access.
    pub async fn ensure_loaded(&self, user_id: &str) -> Result<(), StoreError> {
        if self.inner.cache.read().await.contains_key(user_id) {
            return Ok(());
        }
        let data = load_user(&self.inner.store, user_id).await?;
        self.inner
            .cache
            .write()
            .await
            .entry(user_id.to_string())
            .or_insert(data);
        debug!(user = user_id, "loaded snapshot");
        Ok(())
    }

    pub async fn snapshot(&self, user_id: &str) -> Result<UserData, StoreError> {
        self.ensure_loaded(user_id).await?;
        Ok(self
            .inner
            .cache
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    pub async fn get<R: Cached>(&self, user_id: &str, id: &str) -> Result<Option<R>, StoreError> {
        let mut data = self.snapshot(user_id).await?;
        Ok(R::slot(&mut data).iter().find(|record| record.id() == id).cloned())
    }

    pub async fn add<R: Cached>(&self, user_id: &str, record: R) -> Result<R, StoreError> {
        self.with_slot::<R, _>(user_id, |items| items.push(record.clone()))
            .await?;

        let ctx = self.clone();
        let remote = record.clone();
        self.write_behind::<R>(user_id, record.id(), WriteOp::Add, async move {
            ctx.inner.store.insert(&remote).await
        })
        .await;
        Ok(record)
    }

    /// Replaces the cached record with the same id, inserting it locally when
    /// the cache does not hold it. The store's ownership rule decides.
    pub async fn update<R: Cached>(&self, user_id: &str, record: R) -> Result<R, StoreError> {
        self.with_slot::<R, _>(user_id, |items| {
            match items.iter_mut().find(|item| item.id() == record.id()) {
                Some(item) => *item = record.clone(),
                None => items.push(record.clone()),
            }
        })
        .await?;

        let ctx = self.clone();
        let owner = user_id.to_string();
        let remote = record.clone();
        self.write_behind::<R>(user_id, record.id(), WriteOp::Update, async move {
            ctx.inner.store.replace(&owner, &remote).await
        })
        .await;
        Ok(record)
    }

    /// Drops the record locally. Returns whether the cache held it.
    pub async fn remove<R: Cached>(&self, user_id: &str, id: &str) -> Result<bool, StoreError> {
        let mut removed = false;
        self.with_slot::<R, _>(user_id, |items| {
            let before = items.len();
            items.retain(|item| item.id() != id);
            removed = items.len() != before;
        })
        .await?;

        let ctx = self.clone();
        let owner = user_id.to_string();
        let remote_id = id.to_string();
        self.write_behind::<R>(user_id, id, WriteOp::Remove, async move {
            ctx.inner.store.delete::<R>(&owner, &remote_id).await
        })
        .await;
        Ok(removed)
    }

    /// Re-reads every collection of every loaded user.
    pub async fn refresh_all(&self) {
        for user_id in self.loaded_users().await {
            match load_user(&self.inner.store, &user_id).await {
                Ok(data) => {
                    self.inner.cache.write().await.insert(user_id, data);
                }
                Err(err) => warn!(user = %user_id, error = %err, "snapshot refresh failed"),
            }
        }
    }

    /// Polls the store on `period`, the stand-in for a snapshot listener.
    pub fn spawn_listener(&self, period: Duration) -> JoinHandle<()> {
        let ctx = self.clone();
        tokio::spawn(async move {
            info!(?period, backend = ctx.store().backend_name(), "snapshot listener started");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                ctx.refresh_all().await;
            }
        })
    }

    /// Resolves once no remote write is running.
    pub async fn settled(&self) {
        loop {
            let idle = self.inner.idle.notified();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    async fn with_slot<R: Cached, F>(&self, user_id: &str, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Vec<R>),
    {
        self.ensure_loaded(user_id).await?;
        let mut cache = self.inner.cache.write().await;
        let data = cache.entry(user_id.to_string()).or_default();
        mutate(R::slot(data));
        Ok(())
    }

    async fn write_behind<R: Cached>(
        &self,
        user_id: &str,
        record_id: &str,
        op: WriteOp,
        write: impl Future<Output = Result<(), StoreError>> + Send + 'static,
    ) {
        let ctx = self.clone();
        let owner = user_id.to_string();
        let record_id = record_id.to_string();
        let job = async move {
            if let Err(err) = write.await {
                ctx.report::<R>(&owner, &record_id, op, err).await;
            }
        }
        .boxed();

        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let mut lanes = self.inner.lanes.lock().await;
        let lane = lanes
            .entry(user_id.to_string())
            .or_insert_with(|| self.open_lane());
        if let Err(mpsc::error::SendError(job)) = lane.send(job) {
            // Drain task died with a panicking write
            let lane = self.open_lane();
            if lane.send(job).is_err() {
                self.finish_write();
            }
            lanes.insert(user_id.to_string(), lane);
        }
    }

    fn open_lane(&self) -> mpsc::UnboundedSender<WriteJob> {
        let (sender, mut jobs) = mpsc::unbounded_channel::<WriteJob>();
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(job) = jobs.recv().await {
                job.await;
                match inner.upgrade() {
                    Some(inner) => DataContext { inner }.finish_write(),
                    None => break,
                }
            }
        });
        sender
    }

    fn finish_write(&self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }

    async fn report<R: Cached>(&self, user_id: &str, record_id: &str, op: WriteOp, err: StoreError) {
        warn!(
            user = user_id,
            collection = R::COLLECTION.name(),
            record = record_id,
            ?op,
            error = %err,
            "remote write failed"
        );
        let event = SyncEvent {
            user_id: user_id.to_string(),
            collection: R::COLLECTION,
            record_id: record_id.to_string(),
            op,
            kind: err.kind(),
            message: err.to_string(),
        };
        // No subscribers is fine
        let _ = self.inner.events.send(event);

        match self.inner.store.list::<R>(user_id).await {
            Ok(fresh) => {
                let mut cache = self.inner.cache.write().await;
                if let Some(data) = cache.get_mut(user_id) {
                    *R::slot(data) = fresh;
                }
            }
            Err(err) => warn!(user = user_id, error = %err, "reconcile after failed write"),
        }
    }
}

async fn load_user(store: &Store, user_id: &str) -> Result<UserData, StoreError> {
    Ok(UserData {
        transactions: store.list(user_id).await?,
        budgets: store.list(user_id).await?,
        bills: store.list(user_id).await?,
        notes: store.list(user_id).await?,
        documents: store.list(user_id).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::TransactionType;
    use crate::store::MemoryStore;

    fn context() -> DataContext {
        DataContext::new(Store::Memory(MemoryStore::new()))
    }

    fn expense(id: &str, user: &str, amount: f64) -> Transaction {
        Transaction {
            id: id.into(),
            user_id: user.into(),
            kind: TransactionType::Expense,
            amount,
            category: "Food".into(),
            date: "2026-10-01".into(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn writes_show_up_locally_before_the_store() {
        let ctx = context();
        ctx.add("alice", expense("t1", "alice", 10.0)).await.unwrap();

        let local = ctx.snapshot("alice").await.unwrap();
        assert_eq!(local.transactions.len(), 1);

        ctx.settled().await;
        let remote: Vec<Transaction> = ctx.store().list("alice").await.unwrap();
        assert_eq!(remote, vec![expense("t1", "alice", 10.0)]);
    }

    #[tokio::test]
    async fn denied_write_is_published_and_reverted() {
        let ctx = context();
        ctx.add("bob", expense("t1", "bob", 99.0)).await.unwrap();
        ctx.settled().await;

        let mut events = ctx.subscribe();
        ctx.update("alice", expense("t1", "alice", 1.0)).await.unwrap();
        assert_eq!(ctx.snapshot("alice").await.unwrap().transactions.len(), 1);

        let event = events.recv().await.unwrap();
        assert_eq!(event.user_id, "alice");
        assert_eq!(event.op, WriteOp::Update);
        assert_eq!(event.kind, SyncErrorKind::PermissionDenied);
        assert!(event.user_message().contains("permission"));

        ctx.settled().await;
        assert!(ctx.snapshot("alice").await.unwrap().transactions.is_empty());
        let bob: Vec<Transaction> = ctx.store().list("bob").await.unwrap();
        assert_eq!(bob[0].amount, 99.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn writes_to_one_record_land_in_issue_order() {
        let ctx = context();
        let mut events = ctx.subscribe();

        for round in 0..300 {
            let id = format!("b{round}");
            let mut bill = Bill {
                id: id.clone(),
                user_id: "alice".into(),
                name: "Water".into(),
                amount: 30.0,
                due_date: "2026-10-20".into(),
                due_time: "09:00".into(),
                is_paid: false,
            };
            ctx.add("alice", bill.clone()).await.unwrap();
            bill.is_paid = true;
            ctx.update("alice", bill).await.unwrap();
        }
        ctx.settled().await;

        let stored: Vec<Bill> = ctx.store().list("alice").await.unwrap();
        assert_eq!(stored.len(), 300);
        assert!(stored.iter().all(|bill| bill.is_paid));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn removing_a_missing_record_reports_not_found() {
        let ctx = context();
        let mut events = ctx.subscribe();

        let removed = ctx.remove::<Bill>("alice", "nope").await.unwrap();
        assert!(!removed);

        let event = events.recv().await.unwrap();
        assert_eq!(event.collection, Collection::Bills);
        assert_eq!(event.kind, SyncErrorKind::NotFound);
    }

    #[tokio::test]
    async fn refresh_replaces_the_cache_with_the_store() {
        let ctx = context();
        ctx.ensure_loaded("alice").await.unwrap();
        ctx.store()
            .insert(&expense("t9", "alice", 5.0))
            .await
            .unwrap();
        assert!(ctx.snapshot("alice").await.unwrap().transactions.is_empty());

        ctx.refresh_all().await;
        let local = ctx.snapshot("alice").await.unwrap();
        assert_eq!(local.transactions, vec![expense("t9", "alice", 5.0)]);
    }
}
