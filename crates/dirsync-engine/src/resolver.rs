//! Reference resolution.
//!
//! A reference resolves to one of three states: resolved, unresolved (the
//! target does not exist yet, retried later) or an error (the reference can
//! never be satisfied as written, surfaced to the user).

use std::sync::Arc;

use tracing::debug;
use zeroize::Zeroizing;

use dirsync_api::{
    AnyObject, DirectoryRoot, Kind, Lifecycle, LocalReference, ObjectKey, ObjectReference, Phase,
    Secret,
};

use crate::error::ResolveError;
use crate::registry::KindRegistry;
use crate::store::ObjectStore;

/// Outcome of a resolution that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    Resolved(T),
    /// The target is missing or not ready; the reason is shown to the user.
    Unresolved(String),
}

impl<T> Resolution<T> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolution<U> {
        match self {
            Resolution::Resolved(value) => Resolution::Resolved(f(value)),
            Resolution::Unresolved(reason) => Resolution::Unresolved(reason),
        }
    }

    pub fn resolved(self) -> Option<T> {
        match self {
            Resolution::Resolved(value) => Some(value),
            Resolution::Unresolved(_) => None,
        }
    }
}

/// Unwrap a resolved value or return the unresolved reason from the caller.
macro_rules! resolved {
    ($resolution:expr) => {
        match $resolution {
            $crate::resolver::Resolution::Resolved(value) => value,
            $crate::resolver::Resolution::Unresolved(reason) => {
                return Ok($crate::resolver::Resolution::Unresolved(reason))
            }
        }
    };
}

pub(crate) use resolved;

/// Resolves references against the store.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn ObjectStore>,
    registry: Arc<KindRegistry>,
}

impl Resolver {
    pub fn new(store: Arc<dyn ObjectStore>, registry: Arc<KindRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Resolve the owning directory root of an object in `namespace`.
    ///
    /// A root that is being deleted, or has not reported Ready yet, counts as
    /// unresolved.
    pub async fn resolve_directory(
        &self,
        reference: &LocalReference,
        namespace: &str,
    ) -> Result<Resolution<DirectoryRoot>, ResolveError> {
        let root: Option<DirectoryRoot> = self.store.get_as(namespace, &reference.name).await?;

        let Some(root) = root else {
            debug!(name = %reference.name, namespace, "Directory root not found");
            return Ok(Resolution::Unresolved(format!(
                "directory '{}' not found",
                reference.name
            )));
        };

        if root.metadata.lifecycle() == Lifecycle::Deleting {
            return Ok(Resolution::Unresolved(format!(
                "directory '{}' is being deleted",
                reference.name
            )));
        }
        if root.status.phase != Some(Phase::Ready) {
            return Ok(Resolution::Unresolved(format!(
                "directory '{}' is not ready",
                reference.name
            )));
        }

        Ok(Resolution::Resolved(root))
    }

    /// Resolve a directory root whatever its phase. Used during cleanup.
    pub async fn find_directory(
        &self,
        reference: &LocalReference,
        namespace: &str,
    ) -> Result<Option<DirectoryRoot>, ResolveError> {
        Ok(self.store.get_as(namespace, &reference.name).await?)
    }

    /// Resolve a parent reference. The target must produce a DN.
    pub async fn resolve_parent(
        &self,
        reference: &ObjectReference,
        namespace: &str,
    ) -> Result<Resolution<AnyObject>, ResolveError> {
        let info = self
            .registry
            .lookup(&reference.api_version, &reference.kind)
            .ok_or_else(|| ResolveError::UnknownKind {
                api_version: reference.api_version.clone(),
                kind: reference.kind.clone(),
            })?;

        if !info.produces_dn {
            return Err(ResolveError::NotDnCapable {
                kind: info.kind,
                name: reference.name.clone(),
            });
        }

        let key = ObjectKey::new(
            info.kind,
            reference.namespace_or(namespace),
            reference.name.clone(),
        );
        match self.store.get(&key).await? {
            Some(parent) => Ok(Resolution::Resolved(parent)),
            None => {
                debug!(parent = %key, "Parent not found");
                Ok(Resolution::Unresolved(format!(
                    "parent {} '{}' not found",
                    info.kind, reference.name
                )))
            }
        }
    }

    /// Resolve one key of a secret.
    pub async fn resolve_secret(
        &self,
        name: &str,
        key: &str,
        namespace: &str,
    ) -> Result<Resolution<Zeroizing<String>>, ResolveError> {
        let secret: Option<Secret> = self.store.get_as(namespace, name).await?;

        let Some(secret) = secret else {
            return Ok(Resolution::Unresolved(format!("secret '{name}' not found")));
        };

        secret
            .get(key)
            .map(|value| Resolution::Resolved(Zeroizing::new(value.to_string())))
            .ok_or_else(|| ResolveError::MissingSecretKey {
                secret: ObjectKey::new(Kind::Secret, namespace, name),
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use dirsync_api::{
        DirectoryRootSpec, ObjectMeta, OrganizationalUnit, OrganizationalUnitSpec,
        DirectoryObjectSpec, API_VERSION,
    };

    async fn resolver() -> Resolver {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryStore::new());
        store
            .create(AnyObject::OrganizationalUnit(OrganizationalUnit::new(
                ObjectMeta::new("default", "users"),
                OrganizationalUnitSpec {
                    object: DirectoryObjectSpec::new("example"),
                    name: "users".to_string(),
                    description: None,
                },
            )))
            .await
            .unwrap();
        store
            .create(AnyObject::Secret(
                Secret::new(ObjectMeta::new("default", "alice-password"))
                    .with_entry("password", "hunter2"),
            ))
            .await
            .unwrap();
        Resolver::new(store, Arc::new(KindRegistry::standard()))
    }

    fn root() -> AnyObject {
        AnyObject::DirectoryRoot(DirectoryRoot::new(
            ObjectMeta::new("default", "example"),
            DirectoryRootSpec {
                domain: "example.com".to_string(),
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

    #[tokio::test]
    async fn test_missing_parent_is_unresolved() {
        let resolver = resolver().await;
        let reference = ObjectReference::new("OrganizationalUnit", "ghost");

        let resolution = resolver.resolve_parent(&reference, "default").await.unwrap();
        assert!(matches!(resolution, Resolution::Unresolved(reason) if reason.contains("ghost")));
    }

    #[tokio::test]
    async fn test_existing_parent_resolves() {
        let resolver = resolver().await;
        let reference = ObjectReference::new("OrganizationalUnit", "users");

        let parent = resolver
            .resolve_parent(&reference, "default")
            .await
            .unwrap()
            .resolved()
            .unwrap();
        assert_eq!(parent.kind(), Kind::OrganizationalUnit);
    }

    #[tokio::test]
    async fn test_parent_in_other_namespace() {
        let resolver = resolver().await;
        let reference = ObjectReference::new("OrganizationalUnit", "users").with_namespace("other");

        let resolution = resolver.resolve_parent(&reference, "default").await.unwrap();
        assert!(!resolution.is_resolved());
    }

    #[tokio::test]
    async fn test_parent_of_wrong_kind_is_error() {
        let resolver = resolver().await;
        let reference = ObjectReference::new("Secret", "alice-password").with_api_version("v1");

        let err = resolver
            .resolve_parent(&reference, "default")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotDnCapable { kind: Kind::Secret, .. }));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_error() {
        let resolver = resolver().await;
        let unknown = ObjectReference::new("ConfigMap", "users");
        assert!(matches!(
            resolver.resolve_parent(&unknown, "default").await,
            Err(ResolveError::UnknownKind { .. })
        ));

        let wrong_version =
            ObjectReference::new("OrganizationalUnit", "users").with_api_version("dirsync.io/v9");
        assert!(matches!(
            resolver.resolve_parent(&wrong_version, "default").await,
            Err(ResolveError::UnknownKind { .. })
        ));
        assert_eq!(unknown.api_version, API_VERSION);
    }

    #[tokio::test]
    async fn test_directory_must_be_ready() {
        let resolver = resolver().await;
        let reference = LocalReference::new("example");

        let missing = resolver.resolve_directory(&reference, "default").await.unwrap();
        assert!(matches!(missing, Resolution::Unresolved(reason) if reason.contains("not found")));

        resolver.store().create(root()).await.unwrap();
        let pending = resolver.resolve_directory(&reference, "default").await.unwrap();
        assert!(matches!(pending, Resolution::Unresolved(reason) if reason.contains("not ready")));

        let key = ObjectKey::new(Kind::DirectoryRoot, "default", "example");
        let mut status = dirsync_api::Status::default();
        status.mark(Phase::Ready, 1, "Ready", "ready");
        resolver.store().update_status(&key, status).await.unwrap();

        let ready = resolver.resolve_directory(&reference, "default").await.unwrap();
        assert_eq!(ready.resolved().unwrap().spec.domain, "example.com");
    }

    #[tokio::test]
    async fn test_secret_resolution() {
        let resolver = resolver().await;

        let value = resolver
            .resolve_secret("alice-password", "password", "default")
            .await
            .unwrap()
            .resolved()
            .unwrap();
        assert_eq!(value.as_str(), "hunter2");

        let missing = resolver
            .resolve_secret("bob-password", "password", "default")
            .await
            .unwrap();
        assert!(!missing.is_resolved());

        assert!(matches!(
            resolver
                .resolve_secret("alice-password", "token", "default")
                .await,
            Err(ResolveError::MissingSecretKey { .. })
        ));
    }
}
