//! # dirsync directory
//!
//! Entry-level access to an LDAP directory.
//!
//! [`DirectoryClient`] is the seam the engine talks to. It reads entries,
//! upserts them with a minimal attribute diff and deletes them, optionally
//! together with their subtree. Two implementations are provided:
//!
//! - [`LdapDirectoryClient`] - LDAPS on top of `ldap3`, lazily bound, every
//!   request bounded by a timeout
//! - [`InMemoryDirectory`] - the same tree rules held in memory
//!
//! ## Example
//!
//! ```no_run
//! use dirsync_directory::{DirectoryClient, DirectoryConfig, DirectoryEntry, LdapDirectoryClient};
//!
//! # async fn example() -> dirsync_directory::DirectoryResult<()> {
//! let config = DirectoryConfig::new(
//!     "ldaps://ldap.example.com:636",
//!     "dc=example,dc=com",
//!     "cn=admin,dc=example,dc=com",
//!     "secret",
//! );
//! let client = LdapDirectoryClient::new(config)?;
//!
//! let entry = DirectoryEntry::new("ou=users,dc=example,dc=com")
//!     .with_values("objectClass", ["top", "organizationalUnit"])
//!     .with_attribute("ou", "users");
//! let outcome = client.create_or_update_entry(&entry).await?;
//! println!("changed: {}", outcome.changed());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod diff;
pub mod dn;
pub mod entry;
pub mod error;
pub mod ldap;
pub mod memory;
pub mod password;

pub use client::{ApplyOutcome, DirectoryClient};
pub use config::{ConnectionSettings, DirectoryConfig};
pub use diff::{diff_entries, Modification};
pub use entry::DirectoryEntry;
pub use error::{DirectoryError, DirectoryResult};
pub use ldap::LdapDirectoryClient;
pub use memory::InMemoryDirectory;
pub use password::{PasswordCredential, PasswordHasher};
