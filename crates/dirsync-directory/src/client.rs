//! The directory client seam.

use async_trait::async_trait;

use crate::entry::DirectoryEntry;
use crate::error::DirectoryResult;

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No entry existed; it was created.
    Created,
    /// The entry existed and was modified.
    Updated,
    /// The entry already matched.
    Unchanged,
}

impl ApplyOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, ApplyOutcome::Unchanged)
    }

    pub fn created(&self) -> bool {
        matches!(self, ApplyOutcome::Created)
    }
}

/// Entry-level operations against a directory.
///
/// Implementations must be safe to share across concurrent reconciles.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Liveness check: the session can be established and the base entry read.
    async fn ping(&self) -> DirectoryResult<()>;

    /// Read the entry at `dn`. Missing entries are `DirectoryError::NotFound`.
    async fn get_entry(&self, dn: &str) -> DirectoryResult<DirectoryEntry>;

    /// Create the entry, or patch an existing one to match it.
    async fn create_or_update_entry(&self, entry: &DirectoryEntry) -> DirectoryResult<ApplyOutcome>;

    /// Remove the entry at `dn`.
    ///
    /// With `recursive` every descendant is removed first, deepest entries
    /// first. Without it an entry that has children is refused with
    /// `DirectoryError::NotAllowedOnNonLeaf`.
    async fn delete_entry(&self, dn: &str, recursive: bool) -> DirectoryResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_outcome_flags() {
        assert!(ApplyOutcome::Created.changed());
        assert!(ApplyOutcome::Created.created());
        assert!(ApplyOutcome::Updated.changed());
        assert!(!ApplyOutcome::Updated.created());
        assert!(!ApplyOutcome::Unchanged.changed());
        assert!(!ApplyOutcome::Unchanged.created());
    }
}
