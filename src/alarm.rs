//! Bill due-date alarms.
//!
//! A ticker checks every loaded user's bills against the clock. Bills that
//! fall due are queued and shown one at a time: only the alarm at the front of
//! a user's queue is current, and it has to be acknowledged before the next
//! one is presented.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::bills::due_at;
use crate::error::ApiError;
use crate::schemas::{Bill, UserId};
use crate::sync::DataContext;

#[derive(Debug, Error, PartialEq)]
pub enum AlarmError {
    #[error("no alarm is pending")]
    NonePending,
    #[error("bill {requested} is not the current alarm ({current})")]
    NotCurrent { requested: String, current: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub bill_id: String,
    pub name: String,
    pub amount: f64,
    pub due_at: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmAction {
    Dismiss,
    Pay,
}

#[derive(Debug, Default)]
pub struct AlarmQueue {
    // Due instant each bill last alarmed for.
    armed: HashMap<String, NaiveDateTime>,
    queue: VecDeque<Alarm>,
}

impl AlarmQueue {
    /// Queues bills that are due, returning how many were added.
    pub fn tick(&mut self, bills: &[Bill], now: NaiveDateTime, lead: chrono::Duration) -> usize {
        let due: HashMap<&str, (&Bill, NaiveDateTime)> = bills
            .iter()
            .filter_map(|bill| match due_at(bill) {
                Ok(at) => Some((bill.id.as_str(), (bill, at))),
                Err(err) => {
                    debug!(bill = %bill.id, error = %err, "skipping bill with bad due date");
                    None
                }
            })
            .collect();

        self.queue.retain(|alarm| {
            matches!(due.get(alarm.bill_id.as_str()), Some((bill, at)) if !bill.is_paid && *at == alarm.due_at)
        });
        // Deleted or rescheduled bills are re-armed
        self.armed
            .retain(|id, armed_at| matches!(due.get(id.as_str()), Some((_, at)) if *at == *armed_at));

        let mut fired = due
            .values()
            .filter(|(bill, at)| !bill.is_paid && *at - lead <= now)
            .filter(|(bill, at)| self.armed.get(&bill.id) != Some(at))
            .map(|(bill, at)| Alarm {
                bill_id: bill.id.clone(),
                name: bill.name.clone(),
                amount: bill.amount,
                due_at: *at,
            })
            .collect::<Vec<_>>();
        fired.sort_by(|a, b| a.due_at.cmp(&b.due_at).then_with(|| a.bill_id.cmp(&b.bill_id)));

        for alarm in &fired {
            self.armed.insert(alarm.bill_id.clone(), alarm.due_at);
        }
        let count = fired.len();
        self.queue.extend(fired);
        count
    }

    pub fn current(&self) -> Option<&Alarm> {
        self.queue.front()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Removes the current alarm if it belongs to `bill_id`.
    pub fn acknowledge(&mut self, bill_id: &str) -> Result<Alarm, AlarmError> {
        let current = self.queue.front().ok_or(AlarmError::NonePending)?;
        if current.bill_id != bill_id {
            return Err(AlarmError::NotCurrent {
                requested: bill_id.to_string(),
                current: current.bill_id.clone(),
            });
        }
        self.queue.pop_front().ok_or(AlarmError::NonePending)
    }

    /// Puts an acknowledged alarm back in front.
    pub fn restore(&mut self, alarm: Alarm) {
        self.queue.push_front(alarm);
    }
}

pub struct AlarmManager {
    ctx: DataContext,
    lead: chrono::Duration,
    queues: Mutex<HashMap<UserId, AlarmQueue>>,
}

impl AlarmManager {
    pub fn new(ctx: DataContext, lead: chrono::Duration) -> Self {
        AlarmManager {
            ctx,
            lead,
            queues: Mutex::new(HashMap::new()),
        }
    }

    async fn check_user(&self, user_id: &str, now: NaiveDateTime) -> Result<(), ApiError> {
        let bills = self.ctx.snapshot(user_id).await?.bills;
        let mut queues = self.queues.lock().await;
        let queue = queues.entry(user_id.to_string()).or_default();
        let fired = queue.tick(&bills, now, self.lead);
        if fired > 0 {
            info!(user = user_id, fired, pending = queue.pending(), "bill alarms raised");
        }
        Ok(())
    }

    /// Checks every user whose data is loaded.
    pub async fn check_all(&self, now: NaiveDateTime) {
        for user_id in self.ctx.loaded_users().await {
            if let Err(err) = self.check_user(&user_id, now).await {
                warn!(user = %user_id, error = %err, "alarm check failed");
            }
        }
    }

    pub async fn current(&self, user_id: &str, now: NaiveDateTime) -> Result<Option<Alarm>, ApiError> {
        self.check_user(user_id, now).await?;
        Ok(self
            .queues
            .lock()
            .await
            .get(user_id)
            .and_then(|queue| queue.current().cloned()))
    }

    /// Acknowledges the current alarm and returns the next one, if any.
    pub async fn acknowledge(
        &self,
        user_id: &str,
        bill_id: &str,
        action: AlarmAction,
    ) -> Result<Option<Alarm>, ApiError> {
        let bill = match action {
            AlarmAction::Pay => self.ctx.get::<Bill>(user_id, bill_id).await?,
            AlarmAction::Dismiss => None,
        };

        let (alarm, next) = {
            let mut queues = self.queues.lock().await;
            let queue = queues.entry(user_id.to_string()).or_default();
            let alarm = queue.acknowledge(bill_id)?;
            (alarm, queue.current().cloned())
        };

        if let Some(mut bill) = bill {
            bill.is_paid = true;
            if let Err(err) = self.ctx.update(user_id, bill).await {
                self.queues
                    .lock()
                    .await
                    .entry(user_id.to_string())
                    .or_default()
                    .restore(alarm);
                return Err(err.into());
            }
        }
        debug!(user = user_id, bill = bill_id, ?action, "alarm acknowledged");
        Ok(next)
    }

    pub fn spawn(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            info!(?period, "bill alarm ticker started");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                manager.check_all(Local::now().naive_local()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bills::bill;
    use crate::store::{MemoryStore, Store};

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn ids(queue: &AlarmQueue) -> Vec<&str> {
        queue.queue.iter().map(|alarm| alarm.bill_id.as_str()).collect()
    }

    #[test]
    fn queues_due_bills_in_due_order_once() {
        let mut queue = AlarmQueue::default();
        let bills = vec![
            bill("rent", "2026-10-14", "09:00"),
            bill("phone", "2026-10-13", "18:00"),
            bill("later", "2026-10-20", "09:00"),
        ];
        let now = at("2026-10-14 10:00");

        assert_eq!(queue.tick(&bills, now, chrono::Duration::zero()), 2);
        assert_eq!(ids(&queue), vec!["phone", "rent"]);
        assert_eq!(queue.tick(&bills, now, chrono::Duration::zero()), 0);
    }

    #[test]
    fn lead_time_raises_alarms_early() {
        let mut queue = AlarmQueue::default();
        let bills = vec![bill("rent", "2026-10-14", "12:00")];
        let now = at("2026-10-14 11:30");

        assert_eq!(queue.tick(&bills, now, chrono::Duration::minutes(15)), 0);
        assert_eq!(queue.tick(&bills, now, chrono::Duration::minutes(45)), 1);
    }

    #[test]
    fn acknowledges_only_the_current_alarm() {
        let mut queue = AlarmQueue::default();
        let bills = vec![
            bill("a", "2026-10-01", "08:00"),
            bill("b", "2026-10-02", "08:00"),
        ];
        queue.tick(&bills, at("2026-10-14 10:00"), chrono::Duration::zero());

        assert_eq!(
            queue.acknowledge("b"),
            Err(AlarmError::NotCurrent {
                requested: "b".into(),
                current: "a".into()
            })
        );
        assert_eq!(queue.acknowledge("a").unwrap().bill_id, "a");
        assert_eq!(queue.current().map(|alarm| alarm.bill_id.as_str()), Some("b"));
        queue.acknowledge("b").unwrap();
        assert_eq!(queue.acknowledge("b"), Err(AlarmError::NonePending));
    }

    #[test]
    fn restored_alarm_is_current_again() {
        let mut queue = AlarmQueue::default();
        let bills = vec![
            bill("a", "2026-10-01", "08:00"),
            bill("b", "2026-10-02", "08:00"),
        ];
        let now = at("2026-10-14 10:00");
        queue.tick(&bills, now, chrono::Duration::zero());

        let alarm = queue.acknowledge("a").unwrap();
        queue.restore(alarm);
        assert_eq!(ids(&queue), vec!["a", "b"]);
        assert_eq!(queue.tick(&bills, now, chrono::Duration::zero()), 0);
        assert_eq!(ids(&queue), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn wrong_pay_ack_leaves_bill_and_queue_alone() {
        let ctx = DataContext::new(Store::Memory(MemoryStore::new()));
        ctx.add("alice", bill("rent", "2026-10-01", "08:00")).await.unwrap();
        ctx.add("alice", bill("phone", "2026-10-02", "08:00")).await.unwrap();
        let manager = AlarmManager::new(ctx.clone(), chrono::Duration::zero());
        let now = at("2026-10-14 10:00");
        manager.current("alice", now).await.unwrap();

        let result = manager.acknowledge("alice", "phone", AlarmAction::Pay).await;
        assert!(matches!(result, Err(ApiError::Alarm(AlarmError::NotCurrent { .. }))));

        let phone = ctx.get::<Bill>("alice", "phone").await.unwrap().unwrap();
        assert!(!phone.is_paid);
        assert_eq!(manager.current("alice", now).await.unwrap().unwrap().bill_id, "rent");
    }

    #[test]
    fn paid_and_deleted_bills_leave_the_queue() {
        let mut queue = AlarmQueue::default();
        let now = at("2026-10-14 10:00");
        let mut bills = vec![
            bill("a", "2026-10-01", "08:00"),
            bill("b", "2026-10-02", "08:00"),
            bill("c", "2026-10-03", "08:00"),
        ];
        queue.tick(&bills, now, chrono::Duration::zero());

        bills[0].is_paid = true;
        bills.remove(1);
        queue.tick(&bills, now, chrono::Duration::zero());
        assert_eq!(ids(&queue), vec!["c"]);
    }

    #[test]
    fn rescheduling_rearms_a_dismissed_bill() {
        let mut queue = AlarmQueue::default();
        let mut bills = vec![bill("a", "2026-10-01", "08:00")];
        queue.tick(&bills, at("2026-10-14 10:00"), chrono::Duration::zero());
        queue.acknowledge("a").unwrap();

        assert_eq!(queue.tick(&bills, at("2026-10-14 11:00"), chrono::Duration::zero()), 0);

        bills[0].due_date = "2026-10-14".into();
        bills[0].due_time = "10:30".into();
        assert_eq!(queue.tick(&bills, at("2026-10-14 11:00"), chrono::Duration::zero()), 1);
    }

    #[tokio::test]
    async fn paying_from_an_alarm_marks_the_bill_paid() {
        let ctx = DataContext::new(Store::Memory(MemoryStore::new()));
        ctx.add("alice", bill("rent", "2026-10-01", "08:00")).await.unwrap();
        ctx.add("alice", bill("phone", "2026-10-02", "08:00")).await.unwrap();
        let manager = AlarmManager::new(ctx.clone(), chrono::Duration::zero());
        let now = at("2026-10-14 10:00");

        let current = manager.current("alice", now).await.unwrap().unwrap();
        assert_eq!(current.bill_id, "rent");

        let next = manager
            .acknowledge("alice", "rent", AlarmAction::Pay)
            .await
            .unwrap();
        assert_eq!(next.map(|alarm| alarm.bill_id), Some("phone".to_string()));

        ctx.settled().await;
        let stored: Vec<Bill> = ctx.store().list("alice").await.unwrap();
        let rent = stored.iter().find(|bill| bill.id == "rent").unwrap();
        assert!(rent.is_paid);
        assert_eq!(manager.current("alice", now).await.unwrap().unwrap().bill_id, "phone");
    }
}
