//! Directory root reconciliation.
//!
//! A root is Ready once its certificate secret exists, its admin password
//! secret exists (generated on first sight) and its directory answers a ping.
//! Provisioning of the server process is not done here.

use async_trait::async_trait;
use tracing::{debug, error, info, instrument};
use zeroize::Zeroizing;

use dirsync_api::{
    AnyObject, DirectoryRoot, Kind, Lifecycle, ObjectKey, ObjectMeta, Phase, Resource, Secret,
};
use dirsync_directory::dn::{domain_to_suffix, same_dn};

use crate::error::{EngineError, EngineResult, ErrorClass, StoreError};
use crate::events::{
    Event, REASON_CREATED, REASON_DELETED, REASON_FAILED, REASON_NOT_READY, REASON_PENDING,
};
use crate::provider::{admin_secret_name, ADMIN_PASSWORD_KEY};
use crate::reconciler::{Context, Reconcile, ReconcileOutcome};

/// Label tying generated secrets to their root.
pub const DIRECTORY_LABEL: &str = "dirsync.io/directory";

/// Generate a random alphanumeric password.
///
/// Uses OsRng directly from the operating system's CSPRNG.
pub fn generate_password(length: usize) -> Zeroizing<String> {
    use rand::distributions::Alphanumeric;
    use rand::rngs::OsRng;
    use rand::Rng;

    Zeroizing::new(
        (0..length)
            .map(|_| OsRng.sample(Alphanumeric) as char)
            .collect(),
    )
}

pub struct DirectoryRootReconciler {
    ctx: Context,
}

impl DirectoryRootReconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    async fn pending(
        &self,
        root: &DirectoryRoot,
        reason: &str,
        message: String,
    ) -> EngineResult<ReconcileOutcome> {
        let key = root.key();
        info!(root = %key, reason, message = %message, "Directory not ready");
        let mut status = root.status.clone();
        status.mark(Phase::Pending, root.metadata.generation, reason, &message);
        self.ctx.write_status(&key, &root.status, status).await?;
        self.ctx
            .events
            .record(Event::warning(&key, reason, message))
            .await;
        Ok(ReconcileOutcome::requeue(self.ctx.config.retry_interval()))
    }

    async fn failed(&self, root: &DirectoryRoot, err: EngineError) -> EngineResult<ReconcileOutcome> {
        let key = root.key();
        let message = err.to_string();
        error!(root = %key, error = %message, "Directory reconcile failed");
        let mut status = root.status.clone();
        status.mark(Phase::Failed, root.metadata.generation, REASON_FAILED, &message);
        self.ctx.write_status(&key, &root.status, status).await?;
        self.ctx
            .events
            .record(Event::warning(&key, REASON_FAILED, message))
            .await;
        Err(err)
    }

    /// Create the admin password secret unless it exists. Never regenerates.
    async fn ensure_admin_secret(&self, root: &DirectoryRoot) -> EngineResult<bool> {
        let namespace = &root.metadata.namespace;
        let name = admin_secret_name(&root.metadata.name);

        let existing: Option<Secret> = self.ctx.store.get_as(namespace, &name).await?;
        if existing.is_some() {
            return Ok(false);
        }

        let password = generate_password(self.ctx.config.admin_password_length);
        let mut meta = ObjectMeta::new(namespace.as_str(), name.as_str());
        meta.labels
            .insert(DIRECTORY_LABEL.to_string(), root.metadata.name.clone());
        let secret = Secret::new(meta).with_entry(ADMIN_PASSWORD_KEY, password.as_str());

        match self.ctx.store.create(AnyObject::Secret(secret)).await {
            Ok(_) => {
                info!(root = %root.key(), secret = %name, "Generated admin password secret");
                self.ctx
                    .events
                    .record(Event::normal(
                        &root.key(),
                        REASON_CREATED,
                        format!("Generated admin password secret '{name}'"),
                    ))
                    .await;
                Ok(true)
            }
            Err(StoreError::AlreadyExists(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn cleanup(&self, root: &DirectoryRoot) -> EngineResult<ReconcileOutcome> {
        let key = root.key();
        self.ctx.clients.release(&key).await;

        let finalizer = &self.ctx.config.finalizer;
        if root.metadata.has_finalizer(finalizer) {
            self.ctx.store.remove_finalizer(&key, finalizer).await?;
            self.ctx
                .events
                .record(Event::normal(
                    &key,
                    REASON_DELETED,
                    format!("Directory '{}' removed", root.metadata.name),
                ))
                .await;
            debug!(root = %key, "Removed finalizer");
        }
        Ok(ReconcileOutcome::done())
    }
}

#[async_trait]
impl Reconcile for DirectoryRootReconciler {
    fn kind(&self) -> Kind {
        Kind::DirectoryRoot
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn reconcile(&self, key: &ObjectKey) -> EngineResult<ReconcileOutcome> {
        if key.kind != Kind::DirectoryRoot {
            return Err(EngineError::WrongKind(key.clone(), Kind::DirectoryRoot));
        }

        let root: Option<DirectoryRoot> = self.ctx.store.get_as(&key.namespace, &key.name).await?;
        let Some(root) = root else {
            self.ctx.clients.release(key).await;
            return Ok(ReconcileOutcome::done());
        };

        if root.metadata.lifecycle() == Lifecycle::Deleting {
            return self.cleanup(&root).await;
        }

        let finalizer = &self.ctx.config.finalizer;
        if !root.metadata.has_finalizer(finalizer) {
            self.ctx.store.add_finalizer(key, finalizer).await?;
        }

        let suffix = match domain_to_suffix(&root.spec.domain) {
            Ok(suffix) => suffix,
            Err(e) => return self.failed(&root, e.into()).await,
        };
        if let Some(recorded) = root.status.distinguished_name.as_deref() {
            if !same_dn(recorded, &suffix) {
                let err = EngineError::ImmutableField {
                    key: key.clone(),
                    field: "spec.domain",
                    recorded: recorded.to_string(),
                    requested: suffix,
                };
                return self.failed(&root, err).await;
            }
        }

        let certificate = &root.spec.certificate_secret_ref.name;
        let certificate_secret: Option<Secret> =
            self.ctx.store.get_as(&key.namespace, certificate).await?;
        if certificate_secret.is_none() {
            return self
                .pending(
                    &root,
                    REASON_NOT_READY,
                    format!("certificate secret '{certificate}' not found"),
                )
                .await;
        }

        self.ensure_admin_secret(&root).await?;

        let client = match self.ctx.clients.client_for(&root).await {
            Ok(client) => client,
            Err(e) if e.class() == ErrorClass::Transient => {
                return self.pending(&root, REASON_NOT_READY, e.to_string()).await
            }
            Err(e) => return self.failed(&root, e).await,
        };

        if let Err(e) = client.ping().await {
            if e.is_transient() {
                return self
                    .pending(
                        &root,
                        REASON_PENDING,
                        format!("directory server not reachable: {e}"),
                    )
                    .await;
            }
            return self.failed(&root, e.into()).await;
        }

        let became_ready = root.status.phase != Some(Phase::Ready);
        let mut status = root.status.clone();
        status.mark(
            Phase::Ready,
            root.metadata.generation,
            "Available",
            &format!("Directory {suffix} is reachable"),
        );
        status.distinguished_name = Some(suffix.clone());
        self.ctx.write_status(key, &root.status, status).await?;

        if became_ready {
            self.ctx
                .events
                .record(Event::normal(
                    key,
                    REASON_CREATED,
                    format!("Directory {suffix} is ready"),
                ))
                .await;
        }

        Ok(ReconcileOutcome::done())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use dirsync_api::{DirectoryRootSpec, LocalReference};
    use dirsync_directory::{DirectoryClient, InMemoryDirectory};

    use crate::config::EngineConfig;
    use crate::events::MemoryRecorder;
    use crate::provider::{ClientProvider, StaticClientProvider};
    use crate::registry::KindRegistry;
    use crate::store::{InMemoryStore, ObjectStore};

    /// Provider that counts released roots.
    struct CountingProvider {
        inner: StaticClientProvider,
        released: AtomicUsize,
    }

    #[async_trait]
    impl ClientProvider for CountingProvider {
        async fn client_for(&self, root: &DirectoryRoot) -> EngineResult<Arc<dyn DirectoryClient>> {
            self.inner.client_for(root).await
        }

        async fn release(&self, _root: &ObjectKey) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        store: Arc<dyn ObjectStore>,
        directory: Arc<InMemoryDirectory>,
        events: Arc<MemoryRecorder>,
        provider: Arc<CountingProvider>,
        reconciler: DirectoryRootReconciler,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryStore::new());
        let directory = Arc::new(InMemoryDirectory::new("dc=example,dc=com"));
        let events = Arc::new(MemoryRecorder::new());
        let provider = Arc::new(CountingProvider {
            inner: StaticClientProvider::new(directory.clone()),
            released: AtomicUsize::new(0),
        });
        let ctx = Context::new(
            store.clone(),
            Arc::new(KindRegistry::standard()),
            provider.clone(),
            events.clone(),
            EngineConfig::default(),
        );
        Fixture {
            store,
            directory,
            events,
            provider,
            reconciler: DirectoryRootReconciler::new(ctx),
        }
    }

    fn root(domain: &str) -> AnyObject {
        AnyObject::DirectoryRoot(DirectoryRoot::new(
            ObjectMeta::new("default", "example"),
            DirectoryRootSpec {
                domain: domain.to_string(),
                organization: "Example".to_string(),
                certificate_secret_ref: LocalReference::new("example-tls"),
                image: None,
                address_override: None,
                debug_level: None,
                file_descriptor_limit: None,
                resources: None,
                volume_mounts: Vec::new(),
                volume_claim_templates: Vec::new(),
            },
        ))
    }

    fn certificate() -> AnyObject {
        AnyObject::Secret(
            Secret::new(ObjectMeta::new("default", "example-tls")).with_entry("ca.crt", "PEM"),
        )
    }

    fn key() -> ObjectKey {
        ObjectKey::new(Kind::DirectoryRoot, "default", "example")
    }

    async fn current(store: &Arc<dyn ObjectStore>) -> Option<DirectoryRoot> {
        store.get_as("default", "example").await.unwrap()
    }

    async fn admin_password(store: &Arc<dyn ObjectStore>) -> Option<String> {
        let secret: Option<Secret> = store
            .get_as("default", "dirsync-example-admin-password")
            .await
            .unwrap();
        secret.and_then(|s| s.get(ADMIN_PASSWORD_KEY).map(str::to_string))
    }

    #[test]
    fn test_generate_password() {
        let password = generate_password(32);
        assert_eq!(password.len(), 32);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(*password, *generate_password(32));
    }

    #[tokio::test]
    async fn test_missing_certificate_is_pending() {
        let f = fixture();
        f.store.create(root("example.com")).await.unwrap();

        let outcome = f.reconciler.reconcile(&key()).await.unwrap();
        assert!(outcome.requeue_after.is_some());

        let root = current(&f.store).await.unwrap();
        assert_eq!(root.status.phase, Some(Phase::Pending));
        assert!(root.metadata.has_finalizer("dirsync.io/finalizer"));
        assert!(admin_password(&f.store).await.is_none());
    }

    #[tokio::test]
    async fn test_ready_and_password_is_kept() {
        let f = fixture();
        f.store.create(root("example.com")).await.unwrap();
        f.store.create(certificate()).await.unwrap();

        let outcome = f.reconciler.reconcile(&key()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::done());

        let root = current(&f.store).await.unwrap();
        assert!(root.status.is_ready_for(1));
        assert_eq!(
            root.status.distinguished_name.as_deref(),
            Some("dc=example,dc=com")
        );

        let password = admin_password(&f.store).await.unwrap();
        assert_eq!(password.len(), 32);

        f.reconciler.reconcile(&key()).await.unwrap();
        assert_eq!(admin_password(&f.store).await.unwrap(), password);
        assert!(f.events.has_reason(&key(), REASON_CREATED).await);
    }

    #[tokio::test]
    async fn test_unreachable_directory_is_pending() {
        let f = fixture();
        f.store.create(root("example.com")).await.unwrap();
        f.store.create(certificate()).await.unwrap();
        f.directory.set_available(false);

        let outcome = f.reconciler.reconcile(&key()).await.unwrap();
        assert_eq!(outcome.requeue_after, Some(std::time::Duration::from_secs(5)));
        assert!(f.events.has_reason(&key(), REASON_PENDING).await);

        f.directory.set_available(true);
        f.reconciler.reconcile(&key()).await.unwrap();
        assert_eq!(current(&f.store).await.unwrap().status.phase, Some(Phase::Ready));
    }

    #[tokio::test]
    async fn test_invalid_domain_fails() {
        let f = fixture();
        f.store.create(root("example..com")).await.unwrap();

        let err = f.reconciler.reconcile(&key()).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Permanent);
        assert_eq!(current(&f.store).await.unwrap().status.phase, Some(Phase::Failed));
    }

    #[tokio::test]
    async fn test_domain_change_is_refused() {
        let f = fixture();
        f.store.create(root("example.com")).await.unwrap();
        f.store.create(certificate()).await.unwrap();
        f.reconciler.reconcile(&key()).await.unwrap();

        let changed = f.store.apply(root("other.org")).await.unwrap();
        assert_eq!(changed.meta().generation, 2);

        let err = f.reconciler.reconcile(&key()).await.unwrap_err();
        assert!(matches!(err, EngineError::ImmutableField { field: "spec.domain", .. }));
        assert_eq!(err.class(), ErrorClass::Permanent);

        let root_now = current(&f.store).await.unwrap();
        assert_eq!(root_now.status.phase, Some(Phase::Failed));
        assert_eq!(
            root_now.status.distinguished_name.as_deref(),
            Some("dc=example,dc=com")
        );
        assert!(root_now
            .status
            .conditions
            .iter()
            .any(|c| c.message.contains("dc=other,dc=org")));

        // Going back to the recorded domain recovers.
        f.store.apply(root("example.com")).await.unwrap();
        f.reconciler.reconcile(&key()).await.unwrap();
        let root_now = current(&f.store).await.unwrap();
        assert!(root_now.status.is_ready_for(3));
        assert_eq!(
            root_now.status.distinguished_name.as_deref(),
            Some("dc=example,dc=com")
        );
    }

    #[tokio::test]
    async fn test_deletion_releases_client() {
        let f = fixture();
        f.store.create(root("example.com")).await.unwrap();
        f.store.create(certificate()).await.unwrap();
        f.reconciler.reconcile(&key()).await.unwrap();

        f.store.delete(&key()).await.unwrap();
        assert!(current(&f.store).await.is_some());

        f.reconciler.reconcile(&key()).await.unwrap();
        assert!(current(&f.store).await.is_none());
        assert_eq!(f.provider.released.load(Ordering::SeqCst), 1);
        assert!(f.events.has_reason(&key(), REASON_DELETED).await);
    }
}
