//! # dirsync API
//!
//! Control-plane object schema for dirsync.
//!
//! Every managed directory is declared as a [`DirectoryRoot`]; the entries
//! that live inside it are declared as [`OrganizationalUnit`], [`Group`] and
//! [`User`] objects that reference their root and, optionally, a parent
//! object. Credentials are carried by [`Secret`] objects.
//!
//! Objects are usually written as YAML manifests:
//!
//! ```yaml
//! apiVersion: dirsync.io/v1alpha1
//! kind: Group
//! metadata:
//!   name: admins
//!   namespace: default
//! spec:
//!   directoryRef:
//!     name: example
//!   name: admins
//!   members:
//!     - uid=alice,ou=users,dc=example,dc=com
//! ```
//!
//! ## Crate Organization
//!
//! - [`meta`] - Object metadata, keys, kinds and lifecycle
//! - [`reference`] - Named references between objects
//! - [`status`] - Phases and condition records
//! - [`objects`] - The object kinds themselves
//! - [`manifest`] - Multi-document manifest decoding

pub mod error;
pub mod manifest;
pub mod meta;
pub mod objects;
pub mod reference;
pub mod status;

pub use error::{ApiError, ApiResult};
pub use manifest::{decode_manifests, AnyObject};
pub use meta::{Kind, Lifecycle, ObjectKey, ObjectMeta, DEFAULT_NAMESPACE};
pub use objects::{
    DirectoryObjectSpec, DirectoryRoot, DirectoryRootSpec, Group, GroupSpec, OrganizationalUnit,
    OrganizationalUnitSpec, Resource, Secret, User, UserSpec,
};
pub use reference::{LocalReference, ObjectReference, SecretKeyReference};
pub use status::{Condition, ConditionStatus, Phase, Status};

/// API group and version of every dirsync kind.
pub const API_VERSION: &str = "dirsync.io/v1alpha1";

/// API version used for secrets.
pub const SECRET_API_VERSION: &str = "v1";
