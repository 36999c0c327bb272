//! Attribute-level diff between an existing and a desired entry.

use std::collections::HashSet;

use tracing::debug;

use crate::dn;
use crate::entry::{DirectoryEntry, OBJECT_CLASS, USER_PASSWORD};
use crate::error::DirectoryResult;

/// Attributes maintained by the server. They are never diffed or removed.
pub const OPERATIONAL_ATTRIBUTES: &[&str] = &[
    "entryUUID",
    "entryCSN",
    "entryDN",
    "createTimestamp",
    "modifyTimestamp",
    "creatorsName",
    "modifiersName",
    "structuralObjectClass",
    "subschemaSubentry",
    "hasSubordinates",
    "numSubordinates",
    "contextCSN",
    "memberOf",
    "pwdChangedTime",
    "pwdFailureTime",
    "pwdAccountLockedTime",
    "nsUniqueId",
    "objectGUID",
    "whenCreated",
    "whenChanged",
];

pub fn is_operational(attribute: &str) -> bool {
    OPERATIONAL_ATTRIBUTES
        .iter()
        .any(|op| op.eq_ignore_ascii_case(attribute))
}

/// A single change to an existing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    /// The attribute is missing and gets these values.
    Add { attribute: String, values: Vec<String> },
    /// The attribute's values are replaced wholesale.
    Replace { attribute: String, values: Vec<String> },
    /// The attribute is removed entirely.
    Delete { attribute: String },
}

impl Modification {
    pub fn attribute(&self) -> &str {
        match self {
            Modification::Add { attribute, .. }
            | Modification::Replace { attribute, .. }
            | Modification::Delete { attribute } => attribute,
        }
    }
}

fn same_values(attribute: &str, existing: &[String], desired: &[String]) -> bool {
    if attribute.eq_ignore_ascii_case(OBJECT_CLASS) {
        let a: HashSet<String> = existing.iter().map(|v| v.to_lowercase()).collect();
        let b: HashSet<String> = desired.iter().map(|v| v.to_lowercase()).collect();
        return a == b;
    }
    let a: HashSet<&str> = existing.iter().map(String::as_str).collect();
    let b: HashSet<&str> = desired.iter().map(String::as_str).collect();
    a == b
}

/// Compute the minimal set of modifications turning `existing` into `desired`.
///
/// Values are compared as sets. A `userPassword` carried as a credential is
/// left alone when any stored value already verifies against it, so an
/// unchanged password is never re-hashed. The naming attribute of the entry's
/// RDN is never deleted.
pub fn diff_entries(
    existing: &DirectoryEntry,
    desired: &DirectoryEntry,
) -> DirectoryResult<Vec<Modification>> {
    let (rdn_attribute, _) = dn::leading_rdn(&desired.dn)?;
    let mut modifications = Vec::new();

    for (attribute, values) in desired.attributes() {
        if is_operational(attribute) {
            continue;
        }

        let Some(current) = existing.get(attribute) else {
            modifications.push(Modification::Add {
                attribute: attribute.to_string(),
                values: values.to_vec(),
            });
            continue;
        };

        if attribute.eq_ignore_ascii_case(USER_PASSWORD) {
            if let Some(credential) = desired.password() {
                if current.iter().any(|stored| credential.matches(stored)) {
                    debug!(dn = %desired.dn, "Stored password hash still matches");
                    continue;
                }
            }
        }

        if !same_values(attribute, current, values) {
            modifications.push(Modification::Replace {
                attribute: attribute.to_string(),
                values: values.to_vec(),
            });
        }
    }

    for attribute in existing.attribute_names() {
        if is_operational(attribute)
            || attribute.eq_ignore_ascii_case(&rdn_attribute)
            || desired.has(attribute)
        {
            continue;
        }
        modifications.push(Modification::Delete {
            attribute: attribute.to_string(),
        });
    }

    Ok(modifications)
}

/// Apply modifications to an entry in place.
pub fn apply_modifications(entry: &mut DirectoryEntry, modifications: &[Modification]) {
    for modification in modifications {
        match modification {
            Modification::Add { attribute, values } | Modification::Replace { attribute, values } => {
                entry.set(attribute, values.clone());
            }
            Modification::Delete { attribute } => {
                entry.remove(attribute);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::{PasswordCredential, PasswordHasher};

    const DN: &str = "cn=admins,dc=example,dc=com";

    fn group(members: &[&str], description: Option<&str>) -> DirectoryEntry {
        DirectoryEntry::new(DN)
            .with_values("objectClass", ["top", "groupOfNames"])
            .with_attribute("cn", "admins")
            .with_optional("description", description)
            .with_values("member", members.iter().copied())
    }

    #[test]
    fn test_identical_entries_have_no_diff() {
        let entry = group(&["uid=a", "uid=b"], Some("Admins"));
        assert!(diff_entries(&entry, &entry).unwrap().is_empty());
    }

    #[test]
    fn test_value_order_is_ignored() {
        let existing = group(&["uid=b", "uid=a"], None);
        let desired = group(&["uid=a", "uid=b"], None);
        assert!(diff_entries(&existing, &desired).unwrap().is_empty());
    }

    #[test]
    fn test_object_class_case_is_ignored() {
        let existing = group(&["uid=a"], None).with_values("objectclass", ["TOP", "groupofnames"]);
        let desired = group(&["uid=a"], None);
        assert!(diff_entries(&existing, &desired).unwrap().is_empty());
    }

    #[test]
    fn test_added_changed_and_removed_attributes() {
        let existing = group(&["uid=a"], Some("Admins"));
        let desired = group(&["uid=a", "uid=b"], None).with_attribute("businessCategory", "ops");

        let mods = diff_entries(&existing, &desired).unwrap();
        assert_eq!(
            mods,
            vec![
                Modification::Add {
                    attribute: "businessCategory".to_string(),
                    values: vec!["ops".to_string()],
                },
                Modification::Replace {
                    attribute: "member".to_string(),
                    values: vec!["uid=a".to_string(), "uid=b".to_string()],
                },
                Modification::Delete {
                    attribute: "description".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_operational_and_rdn_attributes_are_kept() {
        let existing = group(&["uid=a"], None)
            .with_attribute("entryUUID", "7b0d...")
            .with_attribute("modifyTimestamp", "20240101000000Z");
        let mut desired = group(&["uid=a"], None);
        desired.remove("cn");

        assert!(diff_entries(&existing, &desired).unwrap().is_empty());
    }

    #[test]
    fn test_matching_password_is_not_rehashed() {
        let hasher = PasswordHasher::with_params(1024, 1, 1).unwrap();
        let stored_hash = hasher.hash("hunter2").unwrap();
        let existing = DirectoryEntry::new("uid=alice,dc=example,dc=com")
            .with_attribute("uid", "alice")
            .with_attribute("userPassword", stored_hash.clone());

        let same = DirectoryEntry::new("uid=alice,dc=example,dc=com")
            .with_attribute("uid", "alice")
            .with_password(PasswordCredential::new("hunter2", &hasher).unwrap());
        assert!(diff_entries(&existing, &same).unwrap().is_empty());

        let changed = DirectoryEntry::new("uid=alice,dc=example,dc=com")
            .with_attribute("uid", "alice")
            .with_password(PasswordCredential::new("hunter3", &hasher).unwrap());
        let mods = diff_entries(&existing, &changed).unwrap();
        assert_eq!(mods.len(), 1);
        assert_eq!(mods[0].attribute(), "userPassword");
    }

    #[test]
    fn test_apply_modifications() {
        let mut existing = group(&["uid=a"], Some("Admins"));
        let desired = group(&["uid=b"], None);

        let mods = diff_entries(&existing, &desired).unwrap();
        apply_modifications(&mut existing, &mods);
        assert_eq!(existing, desired);
    }
}
