//! Document store backends.
//!
//! Every record type lives in its own collection and is keyed by its string
//! `id`. Writes are checked against the record owner: a caller can only
//! replace or delete records whose stored `userId` matches its own.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use crate::error::StoreError;
use crate::schemas::Record;

pub enum Store {
    Memory(MemoryStore),
    Mongo(MongoStore),
}

impl Store {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Mongo(_) => "mongodb",
        }
    }

    /// Full result set of a user's records in `R`'s collection.
    pub async fn list<R: Record>(&self, user_id: &str) -> Result<Vec<R>, StoreError> {
        match self {
            Store::Memory(store) => store.list(user_id).await,
            Store::Mongo(store) => store.list(user_id).await,
        }
    }

    pub async fn insert<R: Record>(&self, record: &R) -> Result<(), StoreError> {
        match self {
            Store::Memory(store) => store.insert(record).await,
            Store::Mongo(store) => store.insert(record).await,
        }
    }

    pub async fn replace<R: Record>(&self, user_id: &str, record: &R) -> Result<(), StoreError> {
        match self {
            Store::Memory(store) => store.replace(user_id, record).await,
            Store::Mongo(store) => store.replace(user_id, record).await,
        }
    }

    pub async fn delete<R: Record>(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        match self {
            Store::Memory(store) => store.delete::<R>(user_id, id).await,
            Store::Mongo(store) => store.delete::<R>(user_id, id).await,
        }
    }
}

fn record_path<R: Record>(id: &str) -> String {
    format!("{}/{}", R::COLLECTION.name(), id)
}
