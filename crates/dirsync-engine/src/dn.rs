//! Distinguished name computation.
//!
//! An object's DN is its own RDN followed by the RDNs of its parent chain and
//! finally the suffix of its directory root. The chain is walked iteratively
//! with a visited set and a depth bound, so a cycle among parent references
//! fails instead of looping.

use std::collections::HashSet;

use tracing::debug;

use dirsync_api::{AnyObject, DirectoryObjectSpec, DirectoryRoot, Kind, ObjectKey, Resource};
use dirsync_directory::dn::{child_dn, domain_to_suffix};

use crate::error::{DnError, ResolveError};
use crate::object::DirectoryObject;
use crate::resolver::{Resolution, Resolver};

/// Result of a DN computation.
#[derive(Debug, Clone)]
pub struct ComputedDn {
    pub dn: String,
    /// DN of the entry the object hangs under.
    pub parent_dn: String,
    /// The root the chain ended at.
    pub directory: DirectoryRoot,
}

/// DN suffix of a directory root.
///
/// Once the root has recorded its suffix that value is used; a later edit of
/// the domain does not move existing entries.
pub fn root_suffix(root: &DirectoryRoot) -> Result<String, DnError> {
    match &root.status.distinguished_name {
        Some(recorded) => Ok(recorded.clone()),
        None => Ok(domain_to_suffix(&root.spec.domain)?),
    }
}

/// RDN an ancestor contributes to the DN of its descendants.
pub fn relative_dn(object: &AnyObject) -> Result<String, DnError> {
    let rdn = match object {
        AnyObject::OrganizationalUnit(ou) => ou.relative_dn()?,
        AnyObject::Group(group) => group.relative_dn()?,
        AnyObject::User(user) => user.relative_dn()?,
        AnyObject::DirectoryRoot(_) | AnyObject::Secret(_) => {
            return Err(ResolveError::NotDnCapable {
                kind: object.kind(),
                name: object.meta().name.clone(),
            }
            .into())
        }
    };
    Ok(rdn)
}

#[derive(Clone)]
pub struct DnComputer {
    resolver: Resolver,
    max_depth: usize,
}

impl DnComputer {
    pub fn new(resolver: Resolver, max_depth: usize) -> Self {
        Self {
            resolver,
            max_depth,
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Compute the DN of the object identified by `key`, whose own RDN is
    /// `rdn` and whose references are `spec`.
    pub async fn compute(
        &self,
        key: &ObjectKey,
        rdn: &str,
        spec: &DirectoryObjectSpec,
    ) -> Result<ComputedDn, DnError> {
        let root = match self
            .resolver
            .resolve_directory(&spec.directory_ref, &key.namespace)
            .await?
        {
            Resolution::Resolved(root) => root,
            Resolution::Unresolved(reason) => return Err(DnError::Unresolved(reason)),
        };
        let root_key = root.key();
        let suffix = root_suffix(&root)?;

        let mut visited: HashSet<ObjectKey> = HashSet::from([key.clone()]);
        let mut chain: Vec<ObjectKey> = vec![key.clone()];
        let mut ancestors: Vec<String> = Vec::new();

        let mut next = spec.parent_ref.clone();
        let mut namespace = key.namespace.clone();

        while let Some(reference) = next.take() {
            if chain.len() > self.max_depth {
                return Err(DnError::ReferenceDepthExceeded {
                    key: key.clone(),
                    limit: self.max_depth,
                });
            }

            let parent = match self.resolver.resolve_parent(&reference, &namespace).await? {
                Resolution::Resolved(parent) => parent,
                Resolution::Unresolved(reason) => return Err(DnError::Unresolved(reason)),
            };
            let parent_key = parent.key();

            if !visited.insert(parent_key.clone()) {
                chain.push(parent_key);
                return Err(DnError::CyclicReference {
                    chain: format_chain(&chain),
                });
            }
            chain.push(parent_key.clone());

            if parent_key.kind == Kind::DirectoryRoot {
                if parent_key != root_key {
                    return Err(DnError::DirectoryMismatch {
                        ancestor: parent_key,
                        expected: root_key.name.clone(),
                        found: parent.meta().name.clone(),
                    });
                }
                break;
            }

            let parent_spec = object_spec(&parent)?;
            let parent_root =
                ObjectKey::new(Kind::DirectoryRoot, &parent_key.namespace, &parent_spec.directory_ref.name);
            if parent_root != root_key {
                return Err(DnError::DirectoryMismatch {
                    ancestor: parent_key,
                    expected: root_key.name.clone(),
                    found: parent_spec.directory_ref.name.clone(),
                });
            }

            ancestors.push(relative_dn(&parent)?);
            next = parent_spec.parent_ref.clone();
            namespace = parent_key.namespace;
        }

        let parent_dn = ancestors
            .iter()
            .rev()
            .fold(suffix, |dn, rdn| child_dn(rdn, &dn));
        let dn = child_dn(rdn, &parent_dn);

        debug!(object = %key, dn = %dn, depth = chain.len(), "Computed distinguished name");

        Ok(ComputedDn {
            dn,
            parent_dn,
            directory: root,
        })
    }
}

fn object_spec(object: &AnyObject) -> Result<&DirectoryObjectSpec, DnError> {
    match object {
        AnyObject::OrganizationalUnit(ou) => Ok(ou.object_spec()),
        AnyObject::Group(group) => Ok(group.object_spec()),
        AnyObject::User(user) => Ok(user.object_spec()),
        AnyObject::DirectoryRoot(_) | AnyObject::Secret(_) => Err(ResolveError::NotDnCapable {
            kind: object.kind(),
            name: object.meta().name.clone(),
        }
        .into()),
    }
}

fn format_chain(chain: &[ObjectKey]) -> String {
    chain
        .iter()
        .map(|key| format!("{}/{}", key.kind, key.name))
        .collect::<Vec<_>>()
        .join(" -> ")
}
