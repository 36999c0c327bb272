//! CLI session tests against an in-memory directory.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use dirsync::manifests;
use dirsync::session::{load_store, Report, Session, DELETED_KINDS};
use dirsync::CliError;
use dirsync_api::{Kind, Phase};
use dirsync_directory::InMemoryDirectory;
use dirsync_engine::{EngineConfig, MemoryRecorder, StaticClientProvider};

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
---
apiVersion: dirsync.io/v1alpha1
kind: Group
metadata:
  name: admins
spec:
  directoryRef:
    name: example
  parentRef:
    kind: OrganizationalUnit
    name: users
  name: admins
  members:
    - uid=alice,ou=users,dc=example,dc=com
"#;

static FILES: AtomicUsize = AtomicUsize::new(0);

/// Write `content` to a fresh file under the temp directory.
fn manifest_file(name: &str, content: &str) -> PathBuf {
    let n = FILES.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!(
        "dirsync-{}-{n}-{name}.yaml",
        std::process::id()
    ));
    std::fs::write(&path, content).unwrap();
    path
}

fn config() -> EngineConfig {
    EngineConfig {
        retry_interval_secs: 1,
        resync_interval_secs: 1,
        ..EngineConfig::default()
    }
}

async fn start(directory: Arc<InMemoryDirectory>) -> Session {
    let path = manifest_file("session", MANIFESTS);
    let objects = manifests::load(&[path]).unwrap();
    let store = load_store(objects).await.unwrap();
    Session::start(
        store,
        Arc::new(StaticClientProvider::new(directory)),
        Arc::new(MemoryRecorder::new()),
        config(),
        CancellationToken::new(),
    )
}

#[test]
fn test_later_manifest_replaces_earlier_object() {
    let first = manifest_file("first", MANIFESTS);
    let second = manifest_file(
        "second",
        r#"
apiVersion: dirsync.io/v1alpha1
kind: OrganizationalUnit
metadata:
  name: users
spec:
  directoryRef:
    name: example
  name: people
"#,
    );

    let objects = manifests::load(&[first, second]).unwrap();
    assert_eq!(objects.len(), 4);
    let users = objects
        .iter()
        .find(|o| o.kind() == Kind::OrganizationalUnit)
        .unwrap();
    match users {
        dirsync_api::AnyObject::OrganizationalUnit(ou) => assert_eq!(ou.spec.name, "people"),
        other => panic!("unexpected object {:?}", other.key()),
    }
}

#[test]
fn test_unreadable_manifest_is_reported() {
    let missing = std::env::temp_dir().join("dirsync-does-not-exist.yaml");
    assert!(matches!(
        manifests::load(&[missing]),
        Err(CliError::Io { .. })
    ));

    let broken = manifest_file("broken", "kind: Gadget\nmetadata:\n  name: x\n");
    assert!(matches!(
        manifests::load(&[broken]),
        Err(CliError::Manifest { .. })
    ));
}

#[tokio::test]
async fn test_apply_converges_and_reports() {
    let directory = Arc::new(InMemoryDirectory::new("dc=example,dc=com"));
    let session = start(directory.clone()).await;

    let report = session
        .wait_until_settled(Duration::from_secs(10))
        .await
        .unwrap();
    assert!(report.is_converged());
    assert_eq!(report.objects.len(), 3);
    assert!(directory
        .contains("cn=admins,ou=users,dc=example,dc=com")
        .await);

    let table = report.render();
    let mut lines = table.lines();
    assert!(lines.next().unwrap().starts_with("OBJECT"));
    assert!(table.contains("Group/admins"));
    assert!(table.contains("cn=admins,ou=users,dc=example,dc=com"));

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_directory_does_not_converge() {
    let directory = Arc::new(InMemoryDirectory::new("dc=example,dc=com"));
    directory.set_available(false);
    let session = start(directory).await;

    let report = session
        .wait_until_settled(Duration::from_millis(600))
        .await
        .unwrap();
    assert!(!report.is_converged());
    assert_eq!(report.unconverged(), 3);
    assert!(report
        .objects
        .iter()
        .all(|o| o.phase != Some(Phase::Ready)));

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_delete_removes_entries_and_keeps_root() {
    let directory = Arc::new(InMemoryDirectory::new("dc=example,dc=com"));
    let session = start(directory.clone()).await;
    session
        .wait_until_settled(Duration::from_secs(10))
        .await
        .unwrap();

    let deletion = session
        .delete_all(&DELETED_KINDS, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(deletion.requested, 2);
    assert!(deletion.remaining.is_empty());
    assert!(!directory.contains("ou=users,dc=example,dc=com").await);

    let report = Report::collect(session.store()).await.unwrap();
    assert_eq!(report.objects.len(), 1);
    assert_eq!(report.objects[0].key.kind, Kind::DirectoryRoot);

    session.stop().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_session_is_interrupted() {
    let directory = Arc::new(InMemoryDirectory::new("dc=example,dc=com"));
    directory.set_available(false);
    let path = manifest_file("cancelled", MANIFESTS);
    let store = load_store(manifests::load(&[path]).unwrap()).await.unwrap();
    let shutdown = CancellationToken::new();
    let session = Session::start(
        store,
        Arc::new(StaticClientProvider::new(directory)),
        Arc::new(MemoryRecorder::new()),
        config(),
        shutdown.clone(),
    );

    shutdown.cancel();
    assert!(matches!(
        session.wait_until_settled(Duration::from_secs(10)).await,
        Err(CliError::Interrupted)
    ));
    session.stop().await.unwrap();
}
