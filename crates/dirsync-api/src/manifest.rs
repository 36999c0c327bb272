//! Type-erased objects and multi-document manifest decoding.

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::meta::{Kind, ObjectKey, ObjectMeta};
use crate::objects::{DirectoryRoot, Group, OrganizationalUnit, Secret, User};
use crate::status::Status;

/// Any stored object, tagged by its `kind` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AnyObject {
    DirectoryRoot(DirectoryRoot),
    OrganizationalUnit(OrganizationalUnit),
    Group(Group),
    User(User),
    Secret(Secret),
}

impl AnyObject {
    pub fn kind(&self) -> Kind {
        match self {
            AnyObject::DirectoryRoot(_) => Kind::DirectoryRoot,
            AnyObject::OrganizationalUnit(_) => Kind::OrganizationalUnit,
            AnyObject::Group(_) => Kind::Group,
            AnyObject::User(_) => Kind::User,
            AnyObject::Secret(_) => Kind::Secret,
        }
    }

    pub fn api_version(&self) -> &str {
        match self {
            AnyObject::DirectoryRoot(o) => &o.api_version,
            AnyObject::OrganizationalUnit(o) => &o.api_version,
            AnyObject::Group(o) => &o.api_version,
            AnyObject::User(o) => &o.api_version,
            AnyObject::Secret(o) => &o.api_version,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            AnyObject::DirectoryRoot(o) => &o.metadata,
            AnyObject::OrganizationalUnit(o) => &o.metadata,
            AnyObject::Group(o) => &o.metadata,
            AnyObject::User(o) => &o.metadata,
            AnyObject::Secret(o) => &o.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            AnyObject::DirectoryRoot(o) => &mut o.metadata,
            AnyObject::OrganizationalUnit(o) => &mut o.metadata,
            AnyObject::Group(o) => &mut o.metadata,
            AnyObject::User(o) => &mut o.metadata,
            AnyObject::Secret(o) => &mut o.metadata,
        }
    }

    pub fn key(&self) -> ObjectKey {
        let meta = self.meta();
        ObjectKey::new(self.kind(), meta.namespace.clone(), meta.name.clone())
    }

    /// Status block, if the kind carries one.
    pub fn status(&self) -> Option<&Status> {
        match self {
            AnyObject::DirectoryRoot(o) => Some(&o.status),
            AnyObject::OrganizationalUnit(o) => Some(&o.status),
            AnyObject::Group(o) => Some(&o.status),
            AnyObject::User(o) => Some(&o.status),
            AnyObject::Secret(_) => None,
        }
    }

    pub fn status_mut(&mut self) -> Option<&mut Status> {
        match self {
            AnyObject::DirectoryRoot(o) => Some(&mut o.status),
            AnyObject::OrganizationalUnit(o) => Some(&mut o.status),
            AnyObject::Group(o) => Some(&mut o.status),
            AnyObject::User(o) => Some(&mut o.status),
            AnyObject::Secret(_) => None,
        }
    }

    /// Whether `self` and `other` declare the same desired state.
    ///
    /// Objects of different kinds never share a spec.
    pub fn same_spec(&self, other: &AnyObject) -> bool {
        match (self, other) {
            (AnyObject::DirectoryRoot(a), AnyObject::DirectoryRoot(b)) => a.spec == b.spec,
            (AnyObject::OrganizationalUnit(a), AnyObject::OrganizationalUnit(b)) => {
                a.spec == b.spec
            }
            (AnyObject::Group(a), AnyObject::Group(b)) => a.spec == b.spec,
            (AnyObject::User(a), AnyObject::User(b)) => a.spec == b.spec,
            (AnyObject::Secret(a), AnyObject::Secret(b)) => a.data == b.data,
            _ => false,
        }
    }

    pub fn validate(&self) -> ApiResult<()> {
        let expected = match self.kind() {
            Kind::Secret => crate::SECRET_API_VERSION,
            _ => crate::API_VERSION,
        };
        if self.api_version() != expected {
            return Err(ApiError::validation(
                self.kind().as_str(),
                &self.meta().name,
                format!(
                    "unsupported apiVersion '{}', expected '{}'",
                    self.api_version(),
                    expected
                ),
            ));
        }

        match self {
            AnyObject::DirectoryRoot(o) => o.validate(),
            AnyObject::OrganizationalUnit(o) => o.validate(),
            AnyObject::Group(o) => o.validate(),
            AnyObject::User(o) => o.validate(),
            AnyObject::Secret(o) => o.validate(),
        }
    }
}

/// Decode a stream of `---` separated YAML documents.
///
/// Empty documents are skipped. Every decoded object is validated; the first
/// failure aborts decoding and names the (1-based) document it came from.
pub fn decode_manifests(input: &str) -> ApiResult<Vec<AnyObject>> {
    let mut objects = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(input).enumerate() {
        let document_number = index + 1;
        let invalid = |message: String| ApiError::InvalidManifest {
            document: document_number,
            message,
        };

        let value = serde_yaml::Value::deserialize(document).map_err(|e| invalid(e.to_string()))?;
        if value.is_null() {
            continue;
        }

        let kind = value
            .get("kind")
            .and_then(serde_yaml::Value::as_str)
            .ok_or_else(|| invalid("missing 'kind'".to_string()))?;
        kind.parse::<Kind>()?;

        let object: AnyObject =
            serde_yaml::from_value(value).map_err(|e| invalid(e.to_string()))?;
        object.validate()?;
        objects.push(object);
    }

    Ok(objects)
}
