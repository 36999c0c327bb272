//! Control-plane object kinds.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::manifest::AnyObject;
use crate::meta::{Kind, ObjectKey, ObjectMeta};
use crate::reference::{LocalReference, ObjectReference, SecretKeyReference};
use crate::status::Status;

fn default_api_version() -> String {
    crate::API_VERSION.to_string()
}

fn default_secret_api_version() -> String {
    crate::SECRET_API_VERSION.to_string()
}

/// Behaviour shared by every stored kind.
pub trait Resource: Clone + Send + Sync + 'static {
    const KIND: Kind;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Extract this kind from a type-erased object.
    fn from_any(object: AnyObject) -> Option<Self>;

    fn into_any(self) -> AnyObject;

    fn key(&self) -> ObjectKey {
        let meta = self.meta();
        ObjectKey::new(Self::KIND, meta.namespace.clone(), meta.name.clone())
    }
}

macro_rules! impl_resource {
    ($ty:ident, $kind:ident) => {
        impl Resource for $ty {
            const KIND: Kind = Kind::$kind;

            fn meta(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }

            fn from_any(object: AnyObject) -> Option<Self> {
                match object {
                    AnyObject::$kind(inner) => Some(inner),
                    _ => None,
                }
            }

            fn into_any(self) -> AnyObject {
                AnyObject::$kind(self)
            }
        }
    };
}

fn require(kind: Kind, meta: &ObjectMeta, field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(
            kind.as_str(),
            &meta.name,
            format!("{field} is required"),
        ));
    }
    Ok(())
}

fn validate_meta(kind: Kind, meta: &ObjectMeta) -> ApiResult<()> {
    require(kind, meta, "metadata.name", &meta.name)?;
    require(kind, meta, "metadata.namespace", &meta.namespace)
}

// ---------------------------------------------------------------------------
// DirectoryRoot
// ---------------------------------------------------------------------------

/// The top of a managed directory tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRootSpec {
    /// Dotted domain, converted to the `dc=` suffix of every entry.
    pub domain: String,

    pub organization: String,

    /// Secret holding the directory's TLS material (`ca.crt`).
    pub certificate_secret_ref: LocalReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Address used instead of the derived in-cluster service address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_override: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_level: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_descriptor_limit: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_claim_templates: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRoot {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub metadata: ObjectMeta,
    pub spec: DirectoryRootSpec,
    #[serde(default)]
    pub status: Status,
}

impl DirectoryRoot {
    pub fn new(metadata: ObjectMeta, spec: DirectoryRootSpec) -> Self {
        Self {
            api_version: default_api_version(),
            metadata,
            spec,
            status: Status::default(),
        }
    }

    pub fn validate(&self) -> ApiResult<()> {
        validate_meta(Kind::DirectoryRoot, &self.metadata)?;
        require(Kind::DirectoryRoot, &self.metadata, "spec.domain", &self.spec.domain)?;
        require(
            Kind::DirectoryRoot,
            &self.metadata,
            "spec.organization",
            &self.spec.organization,
        )?;
        require(
            Kind::DirectoryRoot,
            &self.metadata,
            "spec.certificateSecretRef.name",
            &self.spec.certificate_secret_ref.name,
        )
    }
}

impl_resource!(DirectoryRoot, DirectoryRoot);

// ---------------------------------------------------------------------------
// Directory objects
// ---------------------------------------------------------------------------

/// Fields shared by every entry that lives inside a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryObjectSpec {
    /// The owning directory root.
    pub directory_ref: LocalReference,

    /// Optional parent entry. When absent the entry sits directly under the
    /// root suffix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_ref: Option<ObjectReference>,
}

impl DirectoryObjectSpec {
    pub fn new(directory: impl Into<String>) -> Self {
        Self {
            directory_ref: LocalReference::new(directory),
            parent_ref: None,
        }
    }

    pub fn with_parent(mut self, parent: ObjectReference) -> Self {
        self.parent_ref = Some(parent);
        self
    }

    fn validate(&self, kind: Kind, meta: &ObjectMeta) -> ApiResult<()> {
        require(kind, meta, "spec.directoryRef.name", &self.directory_ref.name)?;
        if let Some(parent) = &self.parent_ref {
            require(kind, meta, "spec.parentRef.kind", &parent.kind)?;
            require(kind, meta, "spec.parentRef.name", &parent.name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationalUnitSpec {
    #[serde(flatten)]
    pub object: DirectoryObjectSpec,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationalUnit {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub metadata: ObjectMeta,
    pub spec: OrganizationalUnitSpec,
    #[serde(default)]
    pub status: Status,
}

impl OrganizationalUnit {
    pub fn new(metadata: ObjectMeta, spec: OrganizationalUnitSpec) -> Self {
        Self {
            api_version: default_api_version(),
            metadata,
            spec,
            status: Status::default(),
        }
    }

    pub fn validate(&self) -> ApiResult<()> {
        let kind = Kind::OrganizationalUnit;
        validate_meta(kind, &self.metadata)?;
        self.spec.object.validate(kind, &self.metadata)?;
        require(kind, &self.metadata, "spec.name", &self.spec.name)
    }
}

impl_resource!(OrganizationalUnit, OrganizationalUnit);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSpec {
    #[serde(flatten)]
    pub object: DirectoryObjectSpec,

    /// Common name of the group.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Member DNs. Not checked for existence.
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub metadata: ObjectMeta,
    pub spec: GroupSpec,
    #[serde(default)]
    pub status: Status,
}

impl Group {
    pub fn new(metadata: ObjectMeta, spec: GroupSpec) -> Self {
        Self {
            api_version: default_api_version(),
            metadata,
            spec,
            status: Status::default(),
        }
    }

    pub fn validate(&self) -> ApiResult<()> {
        let kind = Kind::Group;
        validate_meta(kind, &self.metadata)?;
        self.spec.object.validate(kind, &self.metadata)?;
        require(kind, &self.metadata, "spec.name", &self.spec.name)?;
        if self.spec.members.iter().all(|m| m.trim().is_empty()) {
            return Err(ApiError::validation(
                kind.as_str(),
                &self.metadata.name,
                "spec.members must contain at least one member",
            ));
        }
        Ok(())
    }
}

impl_resource!(Group, Group);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
    #[serde(flatten)]
    pub object: DirectoryObjectSpec,

    /// Common name (usually the full name).
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub surname: String,

    /// Login name, used as the `uid` naming attribute.
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret_ref: Option<SecretKeyReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub metadata: ObjectMeta,
    pub spec: UserSpec,
    #[serde(default)]
    pub status: Status,
}

impl User {
    pub fn new(metadata: ObjectMeta, spec: UserSpec) -> Self {
        Self {
            api_version: default_api_version(),
            metadata,
            spec,
            status: Status::default(),
        }
    }

    pub fn validate(&self) -> ApiResult<()> {
        let kind = Kind::User;
        validate_meta(kind, &self.metadata)?;
        self.spec.object.validate(kind, &self.metadata)?;
        require(kind, &self.metadata, "spec.name", &self.spec.name)?;
        require(kind, &self.metadata, "spec.surname", &self.spec.surname)?;
        require(kind, &self.metadata, "spec.username", &self.spec.username)?;
        if let Some(secret) = &self.spec.password_secret_ref {
            require(kind, &self.metadata, "spec.passwordSecretRef.name", &secret.name)?;
            require(kind, &self.metadata, "spec.passwordSecretRef.key", &secret.key)?;
        }
        Ok(())
    }
}

impl_resource!(User, User);

// ---------------------------------------------------------------------------
// Secret
// ---------------------------------------------------------------------------

/// Opaque key/value credential material.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    #[serde(default = "default_secret_api_version")]
    pub api_version: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            api_version: default_secret_api_version(),
            metadata,
            data: BTreeMap::new(),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn validate(&self) -> ApiResult<()> {
        validate_meta(Kind::Secret, &self.metadata)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("api_version", &self.api_version)
            .field("metadata", &self.metadata)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl_resource!(Secret, Secret);

#[cfg(test)]
mod tests {
    use super::*;

    fn group(members: Vec<&str>) -> Group {
        Group::new(
            ObjectMeta::new("default", "admins"),
            GroupSpec {
                object: DirectoryObjectSpec::new("example"),
                name: "admins".to_string(),
                description: None,
                members: members.into_iter().map(String::from).collect(),
            },
        )
    }

    #[test]
    fn test_group_requires_members() {
        assert!(group(vec!["uid=alice,dc=example,dc=com"]).validate().is_ok());

        let err = group(vec![]).validate().unwrap_err();
        assert!(err.to_string().contains("at least one member"));
    }

    #[test]
    fn test_user_requires_username() {
        let user = User::new(
            ObjectMeta::new("default", "alice"),
            UserSpec {
                object: DirectoryObjectSpec::new("example"),
                name: "Alice Liddell".to_string(),
                description: None,
                surname: "Liddell".to_string(),
                username: "".to_string(),
                email: None,
                password_secret_ref: None,
            },
        );

        let err = user.validate().unwrap_err();
        assert!(err.to_string().contains("spec.username"));
    }

    #[test]
    fn test_spec_fields_use_camel_case() {
        let spec: OrganizationalUnitSpec = serde_json::from_value(serde_json::json!({
            "directoryRef": {"name": "example"},
            "parentRef": {"kind": "OrganizationalUnit", "name": "people"},
            "name": "users"
        }))
        .unwrap();

        assert_eq!(spec.object.directory_ref.name, "example");
        assert_eq!(spec.object.parent_ref.unwrap().name, "people");
        assert!(spec.description.is_none());
    }

    #[test]
    fn test_secret_debug_hides_values() {
        let secret = Secret::new(ObjectMeta::new("default", "alice-password"))
            .with_entry("password", "hunter2");

        let debug = format!("{secret:?}");
        assert!(debug.contains("password"));
        assert!(!debug.contains("hunter2"));
        assert_eq!(secret.get("password"), Some("hunter2"));
    }

    #[test]
    fn test_resource_key() {
        let key = group(vec!["cn=x"]).key();
        assert_eq!(key, ObjectKey::new(Kind::Group, "default", "admins"));
    }
}
