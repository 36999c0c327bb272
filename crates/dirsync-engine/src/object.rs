//! The capability shared by every object that lives inside a directory.

use async_trait::async_trait;
use zeroize::Zeroizing;

use dirsync_api::{
    AnyObject, DirectoryObjectSpec, DirectoryRoot, Group, OrganizationalUnit, Phase, Resource,
    SecretKeyReference, Status, User,
};
use dirsync_directory::dn::rdn;
use dirsync_directory::DirectoryResult;

use crate::dn::{ComputedDn, DnComputer};
use crate::error::{DnError, ResolveError};
use crate::resolver::{resolved, Resolution, Resolver};

/// Everything an object depends on, resolved.
pub struct ResolvedReferences {
    pub directory: DirectoryRoot,
    pub parent: Option<AnyObject>,
    pub password: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for ResolvedReferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedReferences")
            .field("directory", &self.directory.metadata.name)
            .field("parent", &self.parent.as_ref().map(AnyObject::key))
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// An object that produces a directory entry.
#[async_trait]
pub trait DirectoryObject: Resource {
    fn object_spec(&self) -> &DirectoryObjectSpec;

    /// The object's own `attr=value` component.
    fn relative_dn(&self) -> DirectoryResult<String>;

    fn status(&self) -> &Status;

    fn set_status(&mut self, status: Status);

    fn phase(&self) -> Option<Phase> {
        self.status().phase
    }

    /// Whether removing the entry also removes everything below it.
    fn delete_recursively(&self) -> bool {
        false
    }

    /// Secret holding the object's password, if any.
    fn password_reference(&self) -> Option<&SecretKeyReference> {
        None
    }

    /// Resolve the directory root, the parent and any secret.
    async fn resolve_references(
        &self,
        resolver: &Resolver,
    ) -> Result<Resolution<ResolvedReferences>, ResolveError> {
        let namespace = &self.meta().namespace;
        let spec = self.object_spec();

        let directory = resolved!(
            resolver
                .resolve_directory(&spec.directory_ref, namespace)
                .await?
        );

        let parent = match &spec.parent_ref {
            Some(reference) => Some(resolved!(
                resolver.resolve_parent(reference, namespace).await?
            )),
            None => None,
        };

        let password = match self.password_reference() {
            Some(reference) => Some(resolved!(
                resolver
                    .resolve_secret(&reference.name, &reference.key, namespace)
                    .await?
            )),
            None => None,
        };

        Ok(Resolution::Resolved(ResolvedReferences {
            directory,
            parent,
            password,
        }))
    }

    async fn compute_distinguished_name(
        &self,
        computer: &DnComputer,
    ) -> Result<ComputedDn, DnError> {
        let rdn = self.relative_dn()?;
        computer.compute(&self.key(), &rdn, self.object_spec()).await
    }
}

impl DirectoryObject for OrganizationalUnit {
    fn object_spec(&self) -> &DirectoryObjectSpec {
        &self.spec.object
    }

    fn relative_dn(&self) -> DirectoryResult<String> {
        rdn("ou", &self.spec.name)
    }

    fn status(&self) -> &Status {
        &self.status
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    fn delete_recursively(&self) -> bool {
        true
    }
}

impl DirectoryObject for Group {
    fn object_spec(&self) -> &DirectoryObjectSpec {
        &self.spec.object
    }

    fn relative_dn(&self) -> DirectoryResult<String> {
        rdn("cn", &self.spec.name)
    }

    fn status(&self) -> &Status {
        &self.status
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
    }
}

impl DirectoryObject for User {
    fn object_spec(&self) -> &DirectoryObjectSpec {
        &self.spec.object
    }

    fn relative_dn(&self) -> DirectoryResult<String> {
        rdn("uid", &self.spec.username)
    }

    fn status(&self) -> &Status {
        &self.status
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    fn password_reference(&self) -> Option<&SecretKeyReference> {
        self.spec.password_secret_ref.as_ref()
    }
}
