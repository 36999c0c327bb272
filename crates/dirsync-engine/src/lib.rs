//! # dirsync engine
//!
//! Reconciliation of declared directory objects against LDAP directories.
//!
//! The engine watches an [`ObjectStore`] holding [`dirsync_api`] objects and
//! drives every object towards its declared state:
//!
//! 1. A [`DirectoryRoot`](dirsync_api::DirectoryRoot) is checked for its
//!    certificate and admin password secrets and pinged. Once reachable it
//!    is `Ready` and its base DN is published in its status.
//! 2. Organizational units, groups and users resolve their directory root,
//!    their parent and their secrets through the [`Resolver`].
//! 3. The [`DnComputer`] walks the parent chain up to the root and builds
//!    the distinguished name, refusing cycles, overly deep chains and
//!    parents in another directory.
//! 4. A mapper turns the object into a [`DirectoryEntry`](dirsync_directory::DirectoryEntry)
//!    which the [`DirectoryClient`](dirsync_directory::DirectoryClient) upserts.
//!
//! Deleted objects are held back by a finalizer until their entry is gone.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dirsync_engine::{
//!     Context, Controller, EngineConfig, InMemoryStore, KindRegistry, LdapClientProvider,
//!     LogRecorder, ObjectStore,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> dirsync_engine::EngineResult<()> {
//! let config = EngineConfig::default();
//! let store: Arc<dyn ObjectStore> = Arc::new(InMemoryStore::new());
//! let clients = Arc::new(LdapClientProvider::new(store.clone(), config.clone()));
//! let ctx = Context::new(
//!     store,
//!     Arc::new(KindRegistry::standard()),
//!     clients,
//!     Arc::new(LogRecorder),
//!     config,
//! );
//!
//! Controller::standard(ctx).run(CancellationToken::new()).await
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod dn;
pub mod error;
pub mod events;
pub mod mapper;
pub mod object;
pub mod provider;
pub mod reconciler;
pub mod registry;
pub mod resolver;
pub mod root;
pub mod store;

pub use config::EngineConfig;
pub use controller::{depends_on, Controller};
pub use dn::{ComputedDn, DnComputer};
pub use error::{
    DnError, EngineError, EngineResult, ErrorClass, MappingError, ResolveError, StoreError,
    StoreResult,
};
pub use events::{Event, EventRecorder, EventType, LogRecorder, MemoryRecorder, RecordedEvent};
pub use mapper::{map_group, map_organizational_unit, map_user, MapToEntry, MappingContext};
pub use object::{DirectoryObject, ResolvedReferences};
pub use provider::{ClientProvider, LdapClientProvider, StaticClientProvider};
pub use reconciler::{Context, ObjectReconciler, Reconcile, ReconcileOutcome};
pub use registry::{KindInfo, KindRegistry};
pub use resolver::{Resolution, Resolver};
pub use root::{DirectoryRootReconciler, DIRECTORY_LABEL};
pub use store::{InMemoryStore, Mutation, ObjectStore};
