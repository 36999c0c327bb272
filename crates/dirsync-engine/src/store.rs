//! Control-plane object store.
//!
//! [`ObjectStore`] is the seam between the engine and whatever holds the
//! declared objects. [`InMemoryStore`] implements it with the record semantics
//! a declarative control plane provides: generations that move with the spec,
//! a status that only the engine writes and finalizers that hold back removal.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use dirsync_api::{AnyObject, Kind, ObjectKey, Resource, Status};

use crate::error::{StoreError, StoreResult};

/// A read-modify-write step applied by [`ObjectStore::patch`].
pub type Mutation = Box<dyn FnOnce(&mut AnyObject) + Send>;

const EVENT_CAPACITY: usize = 1024;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<AnyObject>>;

    async fn list(&self, kind: Kind) -> StoreResult<Vec<AnyObject>>;

    /// Create a new record. Fails if one already exists.
    async fn create(&self, object: AnyObject) -> StoreResult<AnyObject>;

    /// Create the record or replace its spec and metadata.
    ///
    /// Status, finalizers and the deletion marker of an existing record are
    /// kept. The generation moves only when the spec changes.
    async fn apply(&self, object: AnyObject) -> StoreResult<AnyObject>;

    /// Read-modify-write of an existing record.
    ///
    /// Returns `None` when the patch cleared the last finalizer of a record
    /// being deleted, which removes it.
    async fn patch(&self, key: &ObjectKey, mutation: Mutation) -> StoreResult<Option<AnyObject>>;

    /// Request deletion. Records with finalizers get a deletion marker and
    /// stay until the finalizers are removed.
    async fn delete(&self, key: &ObjectKey) -> StoreResult<()>;

    /// Keys of records as they change.
    fn subscribe(&self) -> broadcast::Receiver<ObjectKey>;
}

impl dyn ObjectStore {
    /// Fetch a record as a concrete kind.
    pub async fn get_as<T: Resource>(&self, namespace: &str, name: &str) -> StoreResult<Option<T>> {
        let key = ObjectKey::new(T::KIND, namespace, name);
        Ok(self.get(&key).await?.and_then(T::from_any))
    }

    /// Set the status of a record, writing only when it differs.
    pub async fn update_status(&self, key: &ObjectKey, status: Status) -> StoreResult<()> {
        self.patch(
            key,
            Box::new(move |object: &mut AnyObject| {
                if let Some(current) = object.status_mut() {
                    *current = status;
                }
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn add_finalizer(&self, key: &ObjectKey, finalizer: &str) -> StoreResult<()> {
        let finalizer = finalizer.to_string();
        self.patch(
            key,
            Box::new(move |object: &mut AnyObject| {
                object.meta_mut().add_finalizer(&finalizer);
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn remove_finalizer(&self, key: &ObjectKey, finalizer: &str) -> StoreResult<()> {
        let finalizer = finalizer.to_string();
        self.patch(
            key,
            Box::new(move |object: &mut AnyObject| {
                object.meta_mut().remove_finalizer(&finalizer);
            }),
        )
        .await?;
        Ok(())
    }
}

/// Object store held in memory.
pub struct InMemoryStore {
    objects: RwLock<BTreeMap<ObjectKey, AnyObject>>,
    events: broadcast::Sender<ObjectKey>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            objects: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn notify(&self, key: &ObjectKey) {
        // No receivers is fine.
        let _ = self.events.send(key.clone());
    }

    fn fresh(mut object: AnyObject) -> AnyObject {
        let meta = object.meta_mut();
        meta.uid = Some(Uuid::new_v4());
        meta.generation = 1;
        meta.deletion_timestamp = None;
        if let Some(status) = object.status_mut() {
            *status = Status::default();
        }
        object
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<AnyObject>> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn list(&self, kind: Kind) -> StoreResult<Vec<AnyObject>> {
        Ok(self
            .objects
            .read()
            .await
            .values()
            .filter(|object| object.kind() == kind)
            .cloned()
            .collect())
    }

    async fn create(&self, object: AnyObject) -> StoreResult<AnyObject> {
        object.validate()?;
        let key = object.key();

        let mut objects = self.objects.write().await;
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key));
        }

        let object = Self::fresh(object);
        objects.insert(key.clone(), object.clone());
        drop(objects);

        debug!(key = %key, "Created object");
        self.notify(&key);
        Ok(object)
    }

    async fn apply(&self, object: AnyObject) -> StoreResult<AnyObject> {
        object.validate()?;
        let key = object.key();

        let mut objects = self.objects.write().await;
        let updated = match objects.get(&key) {
            None => Self::fresh(object),
            Some(existing) => {
                let mut updated = object;
                let generation = if updated.same_spec(existing) {
                    existing.meta().generation
                } else {
                    existing.meta().generation + 1
                };

                let meta = updated.meta_mut();
                meta.uid = existing.meta().uid;
                meta.generation = generation;
                meta.finalizers = existing.meta().finalizers.clone();
                meta.deletion_timestamp = existing.meta().deletion_timestamp;
                if let (Some(status), Some(current)) = (updated.status_mut(), existing.status()) {
                    *status = current.clone();
                }

                if &updated == existing {
                    return Ok(updated);
                }
                updated
            }
        };

        objects.insert(key.clone(), updated.clone());
        drop(objects);

        debug!(key = %key, generation = updated.meta().generation, "Applied object");
        self.notify(&key);
        Ok(updated)
    }

    async fn patch(&self, key: &ObjectKey, mutation: Mutation) -> StoreResult<Option<AnyObject>> {
        let mut objects = self.objects.write().await;
        let existing = objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        let mut updated = existing.clone();
        mutation(&mut updated);

        if updated.key() != *key {
            return Err(StoreError::ImmutableField {
                key: key.clone(),
                field: "kind/namespace/name",
            });
        }

        let generation = if updated.same_spec(&existing) {
            existing.meta().generation
        } else {
            existing.meta().generation + 1
        };
        let meta = updated.meta_mut();
        meta.uid = existing.meta().uid;
        meta.generation = generation;
        meta.deletion_timestamp = existing.meta().deletion_timestamp;

        if updated == existing {
            return Ok(Some(updated));
        }

        let removed = updated.meta().deletion_timestamp.is_some() && updated.meta().finalizers.is_empty();
        if removed {
            objects.remove(key);
        } else {
            objects.insert(key.clone(), updated.clone());
        }
        drop(objects);

        self.notify(key);
        if removed {
            debug!(key = %key, "Last finalizer removed, object deleted");
            Ok(None)
        } else {
            Ok(Some(updated))
        }
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        if object.meta().finalizers.is_empty() {
            objects.remove(key);
            drop(objects);
            debug!(key = %key, "Deleted object");
        } else if object.meta().deletion_timestamp.is_none() {
            object.meta_mut().deletion_timestamp = Some(Utc::now());
            drop(objects);
            debug!(key = %key, "Marked object for deletion");
        } else {
            return Ok(());
        }

        self.notify(key);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ObjectKey> {
        self.events.subscribe()
    }
}
