//! End-to-end synchronization tests.
//!
//! Manifests are decoded into an [`InMemoryStore`] and driven by the standard
//! controller against an [`InMemoryDirectory`]:
//! - DN construction for objects under the root and under other objects
//! - Pending objects catching up once their dependencies become ready
//! - Updates that leave stored password hashes alone
//! - Deletion through finalizers
//! - Rejection of reference cycles

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dirsync_api::{decode_manifests, AnyObject, Kind, ObjectKey, Phase, Status, User};
use dirsync_directory::{DirectoryClient, InMemoryDirectory, PasswordHasher};
use dirsync_engine::{
    Context, Controller, EngineConfig, EngineResult, InMemoryStore, KindRegistry, MemoryRecorder,
    ObjectStore, StaticClientProvider,
};

const MANIFESTS: &str = r#"
apiVersion: v1
kind: Secret
metadata:
  name: example-tls
data:
  ca.crt: PEM
---
apiVersion: dirsync.io/v1alpha1
kind: DirectoryRoot
metadata:
  name: example
spec:
  domain: example.com
  organization: Example Inc.
  certificateSecretRef:
    name: example-tls
---
apiVersion: dirsync.io/v1alpha1
kind: OrganizationalUnit
metadata:
  name: users
spec:
  directoryRef:
    name: example
  name: users
  description: All users
---
apiVersion: dirsync.io/v1alpha1
kind: Group
metadata:
  name: admins
spec:
  directoryRef:
    name: example
  name: admins
  members:
    - uid=alice,ou=users,dc=example,dc=com
---
apiVersion: v1
kind: Secret
metadata:
  name: alice-password
data:
  password: wonderland
---
apiVersion: dirsync.io/v1alpha1
kind: User
metadata:
  name: alice
spec:
  directoryRef:
    name: example
  parentRef:
    kind: OrganizationalUnit
    name: users
  name: Alice Liddell
  surname: Liddell
  username: alice
  email: alice@example.com
  passwordSecretRef:
    name: alice-password
    key: password
"#;

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    store: Arc<dyn ObjectStore>,
    directory: Arc<InMemoryDirectory>,
    events: Arc<MemoryRecorder>,
    shutdown: CancellationToken,
    handle: JoinHandle<EngineResult<()>>,
}

impl Harness {
    async fn start(manifests: &str) -> Self {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryStore::new());
        for object in decode_manifests(manifests).unwrap() {
            store.apply(object).await.unwrap();
        }

        let directory = Arc::new(InMemoryDirectory::new("dc=example,dc=com"));
        let events = Arc::new(MemoryRecorder::new());
        let config = EngineConfig {
            retry_interval_secs: 1,
            resync_interval_secs: 1,
            ..EngineConfig::default()
        };
        let ctx = Context::new(
            store.clone(),
            Arc::new(KindRegistry::standard()),
            Arc::new(StaticClientProvider::new(directory.clone())),
            events.clone(),
            config,
        )
        .with_hasher(PasswordHasher::with_params(1024, 1, 1).unwrap());

        let controller = Arc::new(Controller::standard(ctx));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let controller = controller.clone();
            let shutdown = shutdown.clone();
            async move { controller.run(shutdown).await }
        });

        Self {
            store,
            directory,
            events,
            shutdown,
            handle,
        }
    }

    async fn status(&self, key: &ObjectKey) -> Option<Status> {
        self.store
            .get(key)
            .await
            .unwrap()
            .and_then(|object| object.status().cloned())
    }

    async fn wait_for_phase(&self, key: &ObjectKey, phase: Phase) -> Status {
        for _ in 0..400 {
            if let Some(status) = self.status(key).await {
                if status.phase == Some(phase) {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("{key} never reached {phase:?}: {:?}", self.status(key).await);
    }

    async fn wait_for_removal(&self, key: &ObjectKey) {
        for _ in 0..400 {
            if self.store.get(key).await.unwrap().is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("{key} was never removed");
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

fn key(kind: Kind, name: &str) -> ObjectKey {
    ObjectKey::new(kind, "default", name)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_manifests_converge_to_directory_entries() {
    let harness = Harness::start(MANIFESTS).await;

    let root = harness
        .wait_for_phase(&key(Kind::DirectoryRoot, "example"), Phase::Ready)
        .await;
    assert_eq!(root.distinguished_name.as_deref(), Some("dc=example,dc=com"));

    let users = harness
        .wait_for_phase(&key(Kind::OrganizationalUnit, "users"), Phase::Ready)
        .await;
    assert_eq!(
        users.distinguished_name.as_deref(),
        Some("ou=users,dc=example,dc=com")
    );

    let admins = harness
        .wait_for_phase(&key(Kind::Group, "admins"), Phase::Ready)
        .await;
    assert_eq!(
        admins.distinguished_name.as_deref(),
        Some("cn=admins,dc=example,dc=com")
    );

    let alice = harness
        .wait_for_phase(&key(Kind::User, "alice"), Phase::Ready)
        .await;
    assert_eq!(
        alice.distinguished_name.as_deref(),
        Some("uid=alice,ou=users,dc=example,dc=com")
    );
    assert!(alice.is_ready_for(1));

    let entry = harness
        .directory
        .get_entry("uid=alice,ou=users,dc=example,dc=com")
        .await
        .unwrap();
    assert_eq!(entry.first("sn"), Some("Liddell"));
    assert_eq!(entry.first("mail"), Some("alice@example.com"));
    assert!(entry
        .first("userPassword")
        .is_some_and(|hash| hash.starts_with("{ARGON2}") && !hash.contains("wonderland")));

    let group = harness
        .directory
        .get_entry("cn=admins,dc=example,dc=com")
        .await
        .unwrap();
    assert_eq!(
        group.get("member"),
        Some(&["uid=alice,ou=users,dc=example,dc=com".to_string()][..])
    );

    // The admin password secret was generated for the root.
    let admin = harness
        .store
        .get(&key(Kind::Secret, "dirsync-example-admin-password"))
        .await
        .unwrap();
    assert!(admin.is_some());

    assert!(
        harness
            .events
            .has_reason(&key(Kind::User, "alice"), "Created")
            .await
    );

    harness.stop().await;
}

#[tokio::test]
async fn test_update_keeps_password_hash() {
    let harness = Harness::start(MANIFESTS).await;
    let alice_key = key(Kind::User, "alice");
    let dn = "uid=alice,ou=users,dc=example,dc=com";

    harness.wait_for_phase(&alice_key, Phase::Ready).await;
    let before = harness.directory.get_entry(dn).await.unwrap();

    let mut alice: User = harness
        .store
        .get_as("default", "alice")
        .await
        .unwrap()
        .unwrap();
    alice.spec.description = Some("Down the rabbit hole".to_string());
    let applied = harness.store.apply(AnyObject::User(alice)).await.unwrap();
    assert_eq!(applied.meta().generation, 2);

    for _ in 0..400 {
        if harness
            .status(&alice_key)
            .await
            .is_some_and(|status| status.is_ready_for(2))
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    let after = harness.directory.get_entry(dn).await.unwrap();
    assert_eq!(after.first("description"), Some("Down the rabbit hole"));
    assert_eq!(after.first("userPassword"), before.first("userPassword"));

    harness.stop().await;
}

#[tokio::test]
async fn test_children_wait_for_their_root() {
    let manifests = MANIFESTS.replacen("  name: example-tls\ndata:", "  name: other-tls\ndata:", 1);
    let harness = Harness::start(&manifests).await;

    let root = harness
        .wait_for_phase(&key(Kind::DirectoryRoot, "example"), Phase::Pending)
        .await;
    assert!(root.conditions.iter().any(|c| c.message.contains("example-tls")));
    let users = harness
        .wait_for_phase(&key(Kind::OrganizationalUnit, "users"), Phase::Pending)
        .await;
    assert!(users.distinguished_name.is_none());
    assert!(!harness.directory.contains("ou=users,dc=example,dc=com").await);

    // Supplying the certificate lets everything converge.
    harness
        .store
        .apply(
            decode_manifests(
                "apiVersion: v1\nkind: Secret\nmetadata:\n  name: example-tls\ndata:\n  ca.crt: PEM\n",
            )
            .unwrap()
            .remove(0),
        )
        .await
        .unwrap();

    harness
        .wait_for_phase(&key(Kind::User, "alice"), Phase::Ready)
        .await;
    assert!(harness.directory.contains("ou=users,dc=example,dc=com").await);

    harness.stop().await;
}

#[tokio::test]
async fn test_deletion_removes_entries() {
    let harness = Harness::start(MANIFESTS).await;
    let users_key = key(Kind::OrganizationalUnit, "users");
    let alice_key = key(Kind::User, "alice");
    let admins_key = key(Kind::Group, "admins");

    harness.wait_for_phase(&alice_key, Phase::Ready).await;
    harness.wait_for_phase(&admins_key, Phase::Ready).await;

    harness.store.delete(&admins_key).await.unwrap();
    harness.wait_for_removal(&admins_key).await;
    assert!(!harness.directory.contains("cn=admins,dc=example,dc=com").await);

    // Removing the unit takes the user's entry with it.
    harness.store.delete(&users_key).await.unwrap();
    harness.wait_for_removal(&users_key).await;
    assert!(!harness.directory.contains("ou=users,dc=example,dc=com").await);
    assert!(!harness
        .directory
        .contains("uid=alice,ou=users,dc=example,dc=com")
        .await);
    assert!(harness.directory.contains("dc=example,dc=com").await);

    harness.stop().await;
}

#[tokio::test]
async fn test_reference_cycle_is_rejected() {
    let manifests = format!(
        "{MANIFESTS}{}",
        r#"
---
apiVersion: dirsync.io/v1alpha1
kind: OrganizationalUnit
metadata:
  name: left
spec:
  directoryRef:
    name: example
  parentRef:
    kind: OrganizationalUnit
    name: right
  name: left
---
apiVersion: dirsync.io/v1alpha1
kind: OrganizationalUnit
metadata:
  name: right
spec:
  directoryRef:
    name: example
  parentRef:
    kind: OrganizationalUnit
    name: left
  name: right
"#
    );
    let harness = Harness::start(&manifests).await;

    let left = harness
        .wait_for_phase(&key(Kind::OrganizationalUnit, "left"), Phase::Failed)
        .await;
    assert!(left
        .conditions
        .iter()
        .any(|c| c.message.contains("OrganizationalUnit/left")));
    assert!(!harness.directory.contains("ou=left,ou=right,dc=example,dc=com").await);

    // The rest of the directory is unaffected.
    harness
        .wait_for_phase(&key(Kind::User, "alice"), Phase::Ready)
        .await;

    harness.stop().await;
}
