//! In-memory directory.
//!
//! Implements [`DirectoryClient`] with the tree rules of a real server: a new
//! entry's parent must exist and entries with children cannot be removed
//! non-recursively. Used by tests and by embedders that want a dry run.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::client::{ApplyOutcome, DirectoryClient};
use crate::diff::{apply_modifications, diff_entries};
use crate::dn;
use crate::entry::DirectoryEntry;
use crate::error::{DirectoryError, DirectoryResult};

/// A directory held in memory, keyed by normalized DN.
#[derive(Debug)]
pub struct InMemoryDirectory {
    suffix: String,
    entries: RwLock<BTreeMap<String, DirectoryEntry>>,
    available: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryDirectory {
    /// Create a directory whose suffix entry already exists.
    pub fn new(suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        let mut root = DirectoryEntry::new(suffix.clone()).with_values("objectClass", ["top", "dcObject"]);
        if let Ok((attribute, value)) = dn::leading_rdn(&suffix) {
            root.set(&attribute, vec![dn::unescape_dn_value(&value)]);
        }

        let mut entries = BTreeMap::new();
        entries.insert(dn::normalize(&suffix), root);

        Self {
            suffix,
            entries: RwLock::new(entries),
            available: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    /// Create a directory for a dotted domain.
    pub fn for_domain(domain: &str) -> DirectoryResult<Self> {
        Ok(Self::new(dn::domain_to_suffix(domain)?))
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Simulate the server going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful add, modify and delete operations.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn contains(&self, dn: &str) -> bool {
        self.entries.read().await.contains_key(&dn::normalize(dn))
    }

    /// DNs of every entry, suffix included, in sorted order.
    pub async fn dns(&self) -> Vec<String> {
        self.entries
            .read()
            .await
            .values()
            .map(|entry| entry.dn.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn check_available(&self) -> DirectoryResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DirectoryError::connection_failed(format!(
                "directory {} is unavailable",
                self.suffix
            )))
        }
    }

    fn children_of<'a>(
        entries: &'a BTreeMap<String, DirectoryEntry>,
        dn: &str,
    ) -> impl Iterator<Item = &'a String> + 'a {
        let dn = dn.to_string();
        entries
            .keys()
            .filter(move |key| dn::is_descendant_of(key, &dn))
    }
}

#[async_trait]
impl DirectoryClient for InMemoryDirectory {
    async fn ping(&self) -> DirectoryResult<()> {
        self.check_available()
    }

    async fn get_entry(&self, dn: &str) -> DirectoryResult<DirectoryEntry> {
        self.check_available()?;
        self.entries
            .read()
            .await
            .get(&dn::normalize(dn))
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound { dn: dn.to_string() })
    }

    #[instrument(skip(self, entry), fields(dn = %entry.dn))]
    async fn create_or_update_entry(&self, entry: &DirectoryEntry) -> DirectoryResult<ApplyOutcome> {
        self.check_available()?;
        if entry.is_empty() {
            return Err(DirectoryError::InvalidEntry {
                dn: entry.dn.clone(),
                message: "entry has no attributes".to_string(),
            });
        }

        let key = dn::normalize(&entry.dn);
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.get_mut(&key) {
            let modifications = diff_entries(existing, entry)?;
            if modifications.is_empty() {
                debug!("Entry already up to date");
                return Ok(ApplyOutcome::Unchanged);
            }
            apply_modifications(existing, &modifications);
            self.writes.fetch_add(1, Ordering::SeqCst);
            debug!(modifications = modifications.len(), "Entry updated");
            return Ok(ApplyOutcome::Updated);
        }

        let parent = dn::parent_dn(&entry.dn).ok_or_else(|| {
            DirectoryError::invalid_dn(&entry.dn, "entry would sit outside the directory suffix")
        })?;
        if !entries.contains_key(&dn::normalize(&parent)) {
            return Err(DirectoryError::NotFound { dn: parent });
        }

        entries.insert(key, entry.clone().into_stored());
        self.writes.fetch_add(1, Ordering::SeqCst);
        info!("Entry created");
        Ok(ApplyOutcome::Created)
    }

    #[instrument(skip(self))]
    async fn delete_entry(&self, dn: &str, recursive: bool) -> DirectoryResult<()> {
        self.check_available()?;
        let key = dn::normalize(dn);
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) {
            return Err(DirectoryError::NotFound { dn: dn.to_string() });
        }

        let mut descendants: Vec<String> = Self::children_of(&entries, &key).cloned().collect();
        if !descendants.is_empty() && !recursive {
            return Err(DirectoryError::NotAllowedOnNonLeaf { dn: dn.to_string() });
        }

        descendants.sort_by_key(|d| std::cmp::Reverse(dn::depth(d)));
        for descendant in &descendants {
            entries.remove(descendant);
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        entries.remove(&key);
        self.writes.fetch_add(1, Ordering::SeqCst);

        info!(removed = descendants.len() + 1, "Entry deleted");
        Ok(())
    }
}
