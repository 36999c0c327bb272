//! Attribute mapping.
//!
//! Pure functions from a directory object to the entry it should produce.
//! Optional fields that are absent or empty produce no attribute at all, so an
//! update removes them from the stored entry.

use dirsync_api::{Group, OrganizationalUnit, User};
use dirsync_directory::entry::OBJECT_CLASS;
use dirsync_directory::{DirectoryEntry, PasswordCredential, PasswordHasher};

use crate::error::MappingError;

const OU_CLASSES: &[&str] = &["top", "organizationalUnit"];
const GROUP_CLASSES: &[&str] = &["top", "groupOfNames"];
const USER_CLASSES: &[&str] = &["top", "person", "organizationalPerson", "inetOrgPerson"];

/// Inputs a mapping needs beyond the object itself.
pub struct MappingContext<'a> {
    pub dn: &'a str,
    /// Plaintext password from the referenced secret.
    pub password: Option<&'a str>,
    pub hasher: &'a PasswordHasher,
}

/// Per-kind mapping function handed to the generic reconciler.
pub type MapToEntry<T> = fn(&T, &MappingContext<'_>) -> Result<DirectoryEntry, MappingError>;

pub fn map_organizational_unit(
    ou: &OrganizationalUnit,
    ctx: &MappingContext<'_>,
) -> Result<DirectoryEntry, MappingError> {
    let name = required("spec.name", &ou.spec.name)?;
    Ok(DirectoryEntry::new(ctx.dn)
        .with_values(OBJECT_CLASS, OU_CLASSES.iter().copied())
        .with_attribute("ou", name)
        .with_optional("description", ou.spec.description.as_deref()))
}

pub fn map_group(group: &Group, ctx: &MappingContext<'_>) -> Result<DirectoryEntry, MappingError> {
    let name = required("spec.name", &group.spec.name)?;

    let mut members: Vec<&str> = Vec::with_capacity(group.spec.members.len());
    for member in group.spec.members.iter().map(|m| m.trim()) {
        if !member.is_empty() && !members.contains(&member) {
            members.push(member);
        }
    }
    if members.is_empty() {
        return Err(MappingError::EmptyField {
            field: "spec.members",
        });
    }

    Ok(DirectoryEntry::new(ctx.dn)
        .with_values(OBJECT_CLASS, GROUP_CLASSES.iter().copied())
        .with_attribute("cn", name)
        .with_optional("description", group.spec.description.as_deref())
        .with_values("member", members))
}

pub fn map_user(user: &User, ctx: &MappingContext<'_>) -> Result<DirectoryEntry, MappingError> {
    let name = required("spec.name", &user.spec.name)?;
    let surname = required("spec.surname", &user.spec.surname)?;
    let username = required("spec.username", &user.spec.username)?;

    let mut entry = DirectoryEntry::new(ctx.dn)
        .with_values(OBJECT_CLASS, USER_CLASSES.iter().copied())
        .with_attribute("cn", name)
        .with_attribute("sn", surname)
        .with_attribute("uid", username)
        .with_optional("mail", user.spec.email.as_deref())
        .with_optional("description", user.spec.description.as_deref());

    if let Some(password) = ctx.password.filter(|p| !p.is_empty()) {
        entry = entry.with_password(PasswordCredential::new(password, ctx.hasher)?);
    }

    Ok(entry)
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, MappingError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(MappingError::EmptyField { field });
    }
    Ok(value)
}
