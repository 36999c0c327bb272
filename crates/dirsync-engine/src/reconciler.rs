//! Generic reconciliation of directory objects.
//!
//! One pass of [`ObjectReconciler::reconcile`]:
//!
//! 1. A record marked for deletion has its entry removed, then its finalizer.
//! 2. Otherwise the finalizer is attached before anything touches the
//!    directory.
//! 3. References are resolved. Unresolved means Pending and a retry after the
//!    retry interval; a resolution error means Failed.
//! 4. The DN is computed, the entry mapped and upserted.
//! 5. The status moves to Ready for the observed generation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use dirsync_api::{Kind, Lifecycle, ObjectKey, Phase, Status};
use dirsync_directory::dn::same_dn;
use dirsync_directory::{DirectoryError, PasswordHasher};

use crate::config::EngineConfig;
use crate::dn::DnComputer;
use crate::error::{DnError, EngineError, EngineResult, ErrorClass};
use crate::events::{
    Event, EventRecorder, REASON_CREATED, REASON_DELETED, REASON_FAILED, REASON_NOT_READY,
};
use crate::mapper::{MapToEntry, MappingContext};
use crate::object::DirectoryObject;
use crate::provider::ClientProvider;
use crate::registry::KindRegistry;
use crate::resolver::{Resolution, Resolver};
use crate::store::ObjectStore;

/// What the scheduler should do after a reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileOutcome {
    pub requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }
}

/// One kind's reconcile function.
#[async_trait]
pub trait Reconcile: Send + Sync {
    fn kind(&self) -> Kind;

    async fn reconcile(&self, key: &ObjectKey) -> EngineResult<ReconcileOutcome>;
}

/// Collaborators shared by every reconciler.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn ObjectStore>,
    pub resolver: Resolver,
    pub dn: DnComputer,
    pub clients: Arc<dyn ClientProvider>,
    pub events: Arc<dyn EventRecorder>,
    pub hasher: PasswordHasher,
    pub config: EngineConfig,
}

impl Context {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: Arc<KindRegistry>,
        clients: Arc<dyn ClientProvider>,
        events: Arc<dyn EventRecorder>,
        config: EngineConfig,
    ) -> Self {
        let resolver = Resolver::new(store.clone(), registry);
        let dn = DnComputer::new(resolver.clone(), config.max_reference_depth);
        Self {
            store,
            resolver,
            dn,
            clients,
            events,
            hasher: PasswordHasher::new(),
            config,
        }
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Write `next` as the status of `key` unless it equals `current`.
    pub(crate) async fn write_status(
        &self,
        key: &ObjectKey,
        current: &Status,
        next: Status,
    ) -> EngineResult<()> {
        if next != *current {
            self.store.update_status(key, next).await?;
        }
        Ok(())
    }
}

/// Reconciles one kind of directory object.
pub struct ObjectReconciler<T: DirectoryObject> {
    ctx: Context,
    map: MapToEntry<T>,
}

impl<T: DirectoryObject> ObjectReconciler<T> {
    pub fn new(ctx: Context, map: MapToEntry<T>) -> Self {
        Self { ctx, map }
    }

    async fn pending(&self, object: &T, reason: String) -> EngineResult<ReconcileOutcome> {
        let key = object.key();
        info!(object = %key, reason = %reason, "Dependencies not ready");
        let mut status = object.status().clone();
        status.mark(Phase::Pending, object.meta().generation, REASON_NOT_READY, &reason);
        self.ctx.write_status(&key, object.status(), status).await?;
        self.ctx
            .events
            .record(Event::warning(&key, REASON_NOT_READY, reason))
            .await;
        Ok(ReconcileOutcome::requeue(self.ctx.config.retry_interval()))
    }

    async fn failed(&self, object: &T, err: EngineError) -> EngineResult<ReconcileOutcome> {
        let key = object.key();
        let message = err.to_string();
        error!(object = %key, class = ?err.class(), error = %message, "Reconcile failed");
        let mut status = object.status().clone();
        status.mark(Phase::Failed, object.meta().generation, REASON_FAILED, &message);
        self.ctx.write_status(&key, object.status(), status).await?;
        self.ctx
            .events
            .record(Event::warning(&key, REASON_FAILED, message))
            .await;
        Err(err)
    }

    /// Route an error to Pending or Failed by its class.
    async fn report(&self, object: &T, err: EngineError) -> EngineResult<ReconcileOutcome> {
        match err.class() {
            ErrorClass::Transient => self.pending(object, err.to_string()).await,
            ErrorClass::Permanent | ErrorClass::Infrastructure => self.failed(object, err).await,
        }
    }

    async fn cleanup(&self, object: &T) -> EngineResult<ReconcileOutcome> {
        let key = object.key();
        let finalizer = &self.ctx.config.finalizer;

        if !object.meta().has_finalizer(finalizer) {
            return Ok(ReconcileOutcome::done());
        }

        if let Some(dn) = object.status().distinguished_name.clone() {
            let spec = object.object_spec();
            let root = self
                .ctx
                .resolver
                .find_directory(&spec.directory_ref, &object.meta().namespace)
                .await?;

            match root {
                Some(root) if root.metadata.lifecycle() == Lifecycle::Active => {
                    let client = self.ctx.clients.client_for(&root).await?;
                    match client.delete_entry(&dn, object.delete_recursively()).await {
                        Ok(()) => {
                            info!(object = %key, dn = %dn, "Deleted entry");
                            self.ctx
                                .events
                                .record(Event::normal(
                                    &key,
                                    REASON_DELETED,
                                    format!("Deleted entry {dn}"),
                                ))
                                .await;
                        }
                        Err(DirectoryError::NotFound { .. }) => {
                            debug!(object = %key, dn = %dn, "Entry already gone");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                _ => {
                    warn!(object = %key, dn = %dn, "Directory is gone, skipping entry cleanup");
                    self.ctx
                        .events
                        .record(Event::warning(
                            &key,
                            REASON_DELETED,
                            format!(
                                "Directory '{}' is gone, entry {dn} was not removed",
                                spec.directory_ref.name
                            ),
                        ))
                        .await;
                }
            }
        }

        self.ctx.store.remove_finalizer(&key, finalizer).await?;
        debug!(object = %key, "Removed finalizer");
        Ok(ReconcileOutcome::done())
    }

    async fn sync(&self, object: &T) -> EngineResult<ReconcileOutcome> {
        let key = object.key();

        let references = match object.resolve_references(&self.ctx.resolver).await {
            Ok(Resolution::Resolved(references)) => references,
            Ok(Resolution::Unresolved(reason)) => return self.pending(object, reason).await,
            Err(e) => return self.failed(object, e.into()).await,
        };

        let computed = match object.compute_distinguished_name(&self.ctx.dn).await {
            Ok(computed) => computed,
            Err(DnError::Unresolved(reason)) => return self.pending(object, reason).await,
            Err(e) => return self.failed(object, e.into()).await,
        };

        let mapping = MappingContext {
            dn: &computed.dn,
            password: references.password.as_deref().map(String::as_str),
            hasher: &self.ctx.hasher,
        };
        let entry = match (self.map)(object, &mapping) {
            Ok(entry) => entry,
            Err(e) => return self.failed(object, e.into()).await,
        };

        let client = match self.ctx.clients.client_for(&computed.directory).await {
            Ok(client) => client,
            Err(e) => return self.report(object, e).await,
        };

        let outcome = match client.create_or_update_entry(&entry).await {
            Ok(outcome) => outcome,
            Err(DirectoryError::NotFound { .. }) => {
                let reason = format!("parent entry {} does not exist yet", computed.parent_dn);
                return self.pending(object, reason).await;
            }
            Err(e) => return self.failed(object, e.into()).await,
        };

        if let Some(previous) = &object.status().distinguished_name {
            if !same_dn(previous, &computed.dn) {
                info!(object = %key, from = %previous, to = %computed.dn, "Entry moved");
                match client.delete_entry(previous, object.delete_recursively()).await {
                    Ok(()) | Err(DirectoryError::NotFound { .. }) => {}
                    Err(e) => return self.failed(object, e.into()).await,
                }
            }
        }

        if outcome.changed() {
            info!(object = %key, dn = %computed.dn, ?outcome, "Applied entry");
        }

        let became_ready = object.phase() != Some(Phase::Ready);
        let mut status = object.status().clone();
        status.mark(
            Phase::Ready,
            object.meta().generation,
            "Synchronized",
            &format!("Entry {} is in sync", computed.dn),
        );
        status.distinguished_name = Some(computed.dn.clone());
        self.ctx.write_status(&key, object.status(), status).await?;

        if outcome.created() || became_ready {
            let message = if outcome.created() {
                format!("Created entry {}", computed.dn)
            } else {
                format!("Entry {} is ready", computed.dn)
            };
            self.ctx
                .events
                .record(Event::normal(&key, REASON_CREATED, message))
                .await;
        }

        Ok(ReconcileOutcome::done())
    }
}

#[async_trait]
impl<T: DirectoryObject> Reconcile for ObjectReconciler<T> {
    fn kind(&self) -> Kind {
        T::KIND
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn reconcile(&self, key: &ObjectKey) -> EngineResult<ReconcileOutcome> {
        if key.kind != T::KIND {
            return Err(EngineError::WrongKind(key.clone(), T::KIND));
        }

        let Some(object) = self.ctx.store.get(key).await?.and_then(T::from_any) else {
            debug!("Object is gone");
            return Ok(ReconcileOutcome::done());
        };

        if object.meta().lifecycle() == Lifecycle::Deleting {
            return self.cleanup(&object).await;
        }

        let finalizer = &self.ctx.config.finalizer;
        if !object.meta().has_finalizer(finalizer) {
            self.ctx.store.add_finalizer(key, finalizer).await?;
            debug!("Added finalizer");
        }

        self.sync(&object).await
    }
}
