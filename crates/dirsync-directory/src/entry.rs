//! Directory entries.

use std::collections::BTreeMap;

use crate::password::PasswordCredential;

/// Attribute holding user passwords.
pub const USER_PASSWORD: &str = "userPassword";

/// Attribute holding the entry's object classes.
pub const OBJECT_CLASS: &str = "objectClass";

/// A DN plus its attributes.
///
/// Attribute names are matched case-insensitively; the spelling of the first
/// insertion is kept. An attribute with no values is never stored, so "absent"
/// and "empty" are the same thing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryEntry {
    pub dn: String,
    attributes: BTreeMap<String, Vec<String>>,
    password: Option<PasswordCredential>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
            password: None,
        }
    }

    /// Add a single-valued attribute.
    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, vec![value.into()]);
        self
    }

    /// Add an attribute with many values.
    pub fn with_values<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(name, values.into_iter().map(Into::into).collect());
        self
    }

    /// Add an attribute only when `value` is present and non-empty.
    pub fn with_optional(mut self, name: &str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.set(name, vec![value.to_string()]);
        }
        self
    }

    /// Attach a password. Its hash becomes the `userPassword` value.
    pub fn with_password(mut self, credential: PasswordCredential) -> Self {
        self.set(USER_PASSWORD, vec![credential.hashed().to_string()]);
        self.password = Some(credential);
        self
    }

    /// Replace all values of `name`. Empty strings are dropped, duplicates
    /// collapse to their first occurrence and an empty list removes the
    /// attribute.
    pub fn set(&mut self, name: &str, values: Vec<String>) {
        let mut cleaned: Vec<String> = Vec::with_capacity(values.len());
        for value in values {
            if !value.is_empty() && !cleaned.contains(&value) {
                cleaned.push(value);
            }
        }

        let key = self.key_for(name).unwrap_or_else(|| name.to_string());
        if cleaned.is_empty() {
            self.attributes.remove(&key);
        } else {
            self.attributes.insert(key, cleaned);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let key = self.key_for(name)?;
        self.attributes.remove(&key)
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        let key = self.key_for(name)?;
        self.attributes.get(&key).map(Vec::as_slice)
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|values| values.first()).map(String::as_str)
    }

    pub fn has(&self, name: &str) -> bool {
        self.key_for(name).is_some()
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.attributes
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn password(&self) -> Option<&PasswordCredential> {
        self.password.as_ref()
    }

    /// The entry as a directory holds it, without the attached plaintext.
    pub fn into_stored(mut self) -> Self {
        self.password = None;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    fn key_for(&self, name: &str) -> Option<String> {
        self.attributes
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_are_case_insensitive() {
        let entry = DirectoryEntry::new("ou=users,dc=example,dc=com")
            .with_values("objectClass", ["top", "organizationalUnit"])
            .with_attribute("ou", "users");

        assert_eq!(entry.get("OBJECTCLASS").unwrap().len(), 2);
        assert_eq!(entry.first("OU"), Some("users"));
        assert!(entry.has("objectclass"));
    }

    #[test]
    fn test_set_keeps_first_spelling() {
        let mut entry = DirectoryEntry::new("cn=x").with_attribute("Description", "a");
        entry.set("description", vec!["b".to_string()]);

        let names: Vec<&str> = entry.attribute_names().collect();
        assert_eq!(names, vec!["Description"]);
        assert_eq!(entry.first("description"), Some("b"));
    }

    #[test]
    fn test_empty_values_mean_absent() {
        let entry = DirectoryEntry::new("cn=x")
            .with_attribute("description", "")
            .with_optional("mail", None)
            .with_values("member", Vec::<String>::new());

        assert!(entry.is_empty());
        assert!(!entry.has("description"));
    }

    #[test]
    fn test_duplicate_values_collapse() {
        let entry = DirectoryEntry::new("cn=admins")
            .with_values("member", ["uid=a", "uid=b", "uid=a"]);

        assert_eq!(entry.get("member").unwrap(), ["uid=a", "uid=b"]);
    }

    #[test]
    fn test_remove() {
        let mut entry = DirectoryEntry::new("cn=x").with_attribute("mail", "x@example.com");
        assert_eq!(entry.remove("MAIL"), Some(vec!["x@example.com".to_string()]));
        assert_eq!(entry.remove("mail"), None);
    }
}
