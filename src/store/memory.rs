use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;

use super::record_path;
use crate::error::StoreError;
use crate::schemas::{Collection, Record, UserId};

struct Entry {
    id: String,
    owner: UserId,
    value: Value,
}

/// Process-local store. Records are kept as JSON values in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, Vec<Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list<R: Record>(&self, user_id: &str) -> Result<Vec<R>, StoreError> {
        let collections = self.collections.read().await;
        let Some(entries) = collections.get(&R::COLLECTION) else {
            return Ok(vec![]);
        };
        entries
            .iter()
            .filter(|entry| entry.owner == user_id)
            .map(|entry| serde_json::from_value(entry.value.clone()).map_err(StoreError::from))
            .collect()
    }

    pub async fn insert<R: Record>(&self, record: &R) -> Result<(), StoreError> {
        let value = serde_json::to_value(record)?;
        let mut collections = self.collections.write().await;
        let entries = collections.entry(R::COLLECTION).or_default();
        if entries.iter().any(|entry| entry.id == record.id()) {
            return Err(StoreError::Conflict(record_path::<R>(record.id())));
        }
        entries.push(Entry {
            id: record.id().to_string(),
            owner: record.user_id().to_string(),
            value,
        });
        Ok(())
    }

    pub async fn replace<R: Record>(&self, user_id: &str, record: &R) -> Result<(), StoreError> {
        let value = serde_json::to_value(record)?;
        let mut collections = self.collections.write().await;
        let entry = collections
            .get_mut(&R::COLLECTION)
            .and_then(|entries| entries.iter_mut().find(|entry| entry.id == record.id()))
            .ok_or_else(|| StoreError::NotFound(record_path::<R>(record.id())))?;
        if entry.owner != user_id || record.user_id() != user_id {
            return Err(StoreError::PermissionDenied(record_path::<R>(record.id())));
        }
        entry.value = value;
        Ok(())
    }

    pub async fn delete<R: Record>(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let entries = collections
            .get_mut(&R::COLLECTION)
            .ok_or_else(|| StoreError::NotFound(record_path::<R>(id)))?;
        let position = entries
            .iter()
            .position(|entry| entry.id == id)
            .ok_or_else(|| StoreError::NotFound(record_path::<R>(id)))?;
        if entries[position].owner != user_id {
            return Err(StoreError::PermissionDenied(record_path::<R>(id)));
        }
        entries.remove(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::Budget;

    fn budget(id: &str, user: &str, amount: f64) -> Budget {
        Budget {
            id: id.into(),
            user_id: user.into(),
            category: "Food".into(),
            amount,
        }
    }

    #[tokio::test]
    async fn lists_only_the_callers_records() {
        let store = MemoryStore::new();
        store.insert(&budget("b1", "alice", 100.0)).await.unwrap();
        store.insert(&budget("b2", "bob", 50.0)).await.unwrap();

        let alice: Vec<Budget> = store.list("alice").await.unwrap();
        assert_eq!(alice, vec![budget("b1", "alice", 100.0)]);
    }

    #[tokio::test]
    async fn rejects_writes_to_records_owned_by_someone_else() {
        let store = MemoryStore::new();
        store.insert(&budget("b1", "bob", 50.0)).await.unwrap();

        let replaced = store.replace("alice", &budget("b1", "alice", 1.0)).await;
        assert!(matches!(replaced, Err(StoreError::PermissionDenied(_))));

        let deleted = store.delete::<Budget>("alice", "b1").await;
        assert!(matches!(deleted, Err(StoreError::PermissionDenied(_))));

        let bob: Vec<Budget> = store.list("bob").await.unwrap();
        assert_eq!(bob[0].amount, 50.0);
    }

    #[tokio::test]
    async fn duplicate_ids_and_missing_records_are_reported() {
        let store = MemoryStore::new();
        store.insert(&budget("b1", "alice", 1.0)).await.unwrap();
        assert!(matches!(
            store.insert(&budget("b1", "alice", 2.0)).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.delete::<Budget>("alice", "missing").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
