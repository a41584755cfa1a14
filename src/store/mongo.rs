use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::{Client, Collection, Database};
use tracing::debug;

use super::record_path;
use crate::error::StoreError;
use crate::schemas::Record;

pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        Ok(MongoStore {
            database: client.database(database),
        })
    }

    fn collection<R: Record>(&self) -> Collection<R> {
        self.database.collection(R::COLLECTION.name())
    }

    /// Fails unless a record with `id` exists and belongs to `user_id`.
    async fn check_owner<R: Record>(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        let existing = self
            .database
            .collection::<Document>(R::COLLECTION.name())
            .find_one(doc! { "id": id }, None)
            .await?
            .ok_or_else(|| StoreError::NotFound(record_path::<R>(id)))?;
        match existing.get_str("userId") {
            Ok(owner) if owner == user_id => Ok(()),
            _ => Err(StoreError::PermissionDenied(record_path::<R>(id))),
        }
    }

    pub async fn list<R: Record>(&self, user_id: &str) -> Result<Vec<R>, StoreError> {
        let cursor = self
            .collection::<R>()
            .find(doc! { "userId": user_id }, None)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn insert<R: Record>(&self, record: &R) -> Result<(), StoreError> {
        let existing = self
            .database
            .collection::<Document>(R::COLLECTION.name())
            .find_one(doc! { "id": record.id() }, None)
            .await?;
        if existing.is_some() {
            return Err(StoreError::Conflict(record_path::<R>(record.id())));
        }
        self.collection::<R>().insert_one(record, None).await?;
        debug!(path = %record_path::<R>(record.id()), "inserted");
        Ok(())
    }

    pub async fn replace<R: Record>(&self, user_id: &str, record: &R) -> Result<(), StoreError> {
        if record.user_id() != user_id {
            return Err(StoreError::PermissionDenied(record_path::<R>(record.id())));
        }
        self.check_owner::<R>(user_id, record.id()).await?;
        self.collection::<R>()
            .replace_one(doc! { "id": record.id(), "userId": user_id }, record, None)
            .await?;
        Ok(())
    }

    pub async fn delete<R: Record>(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        self.check_owner::<R>(user_id, id).await?;
        self.collection::<R>()
            .delete_one(doc! { "id": id, "userId": user_id }, None)
            .await?;
        Ok(())
    }
}
