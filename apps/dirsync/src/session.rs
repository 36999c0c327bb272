//! A controller run over a set of loaded objects.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dirsync_api::{AnyObject, Kind, ObjectKey, Phase};
use dirsync_engine::{
    ClientProvider, Context, Controller, EngineConfig, EngineResult, EventRecorder, InMemoryStore,
    KindRegistry, ObjectStore,
};

use crate::error::{CliError, CliResult};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Kinds that show up in the report.
pub const REPORTED_KINDS: [Kind; 4] = [
    Kind::DirectoryRoot,
    Kind::OrganizationalUnit,
    Kind::Group,
    Kind::User,
];

/// Kinds removed by `dirsync delete`. Roots stay so children can clean up.
pub const DELETED_KINDS: [Kind; 3] = [Kind::OrganizationalUnit, Kind::Group, Kind::User];

/// Build a store holding `objects`.
pub async fn load_store(objects: Vec<AnyObject>) -> CliResult<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemoryStore::new());
    for object in objects {
        store.apply(object).await?;
    }
    Ok(store)
}

/// Where one object stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectState {
    pub key: ObjectKey,
    pub phase: Option<Phase>,
    /// Ready for the current generation.
    pub current: bool,
    pub distinguished_name: Option<String>,
    pub message: Option<String>,
}

impl ObjectState {
    fn from_object(object: &AnyObject) -> Self {
        let status = object.status();
        let phase = status.and_then(|s| s.phase);
        Self {
            key: object.key(),
            phase,
            current: status.is_some_and(|s| s.is_ready_for(object.meta().generation)),
            distinguished_name: status.and_then(|s| s.distinguished_name.clone()),
            message: status
                .zip(phase)
                .and_then(|(s, p)| s.condition(p.condition_type()))
                .map(|c| c.message.clone()),
        }
    }
}

/// Phases of every reported object.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub objects: Vec<ObjectState>,
}

impl Report {
    pub async fn collect(store: &Arc<dyn ObjectStore>) -> CliResult<Self> {
        let mut objects = Vec::new();
        for kind in REPORTED_KINDS {
            objects.extend(store.list(kind).await?.iter().map(ObjectState::from_object));
        }
        Ok(Self { objects })
    }

    /// Every object is Ready.
    pub fn is_converged(&self) -> bool {
        self.objects.iter().all(|o| o.current)
    }

    /// Every object is Ready or Failed.
    pub fn is_settled(&self) -> bool {
        self.objects
            .iter()
            .all(|o| o.current || o.phase == Some(Phase::Failed))
    }

    /// Objects that are not Ready.
    pub fn unconverged(&self) -> usize {
        self.objects.iter().filter(|o| !o.current).count()
    }

    /// The report as a table.
    pub fn render(&self) -> String {
        let rows: Vec<[String; 4]> = self
            .objects
            .iter()
            .map(|o| {
                [
                    format!("{}/{}", o.key.kind, o.key.name),
                    o.phase.map_or_else(|| "-".to_string(), |p| p.to_string()),
                    o.distinguished_name.clone().unwrap_or_else(|| "-".to_string()),
                    o.message.clone().unwrap_or_default(),
                ]
            })
            .collect();

        let header = ["OBJECT", "PHASE", "DN", "MESSAGE"];
        let mut widths = header.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let mut out = String::new();
        let mut line = |cells: [&str; 4]| {
            let _ = writeln!(
                out,
                "{:<w0$}  {:<w1$}  {:<w2$}  {}",
                cells[0],
                cells[1],
                cells[2],
                cells[3],
                w0 = widths[0],
                w1 = widths[1],
                w2 = widths[2],
            );
        };
        line(header);
        for row in &rows {
            line([&row[0], &row[1], &row[2], &row[3]]);
        }
        out
    }
}

/// Result of [`Session::delete_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub requested: usize,
    /// Records still held back by their finalizer.
    pub remaining: Vec<ObjectKey>,
}

/// A running controller.
pub struct Session {
    store: Arc<dyn ObjectStore>,
    shutdown: CancellationToken,
    handle: JoinHandle<EngineResult<()>>,
}

impl Session {
    /// Start the standard controller over `store`.
    pub fn start(
        store: Arc<dyn ObjectStore>,
        clients: Arc<dyn ClientProvider>,
        events: Arc<dyn EventRecorder>,
        config: EngineConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let ctx = Context::new(
            store.clone(),
            Arc::new(KindRegistry::standard()),
            clients,
            events,
            config,
        );
        let controller = Controller::standard(ctx);
        let handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { controller.run(shutdown).await }
        });

        Self {
            store,
            shutdown,
            handle,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Poll until every object has settled, `timeout` passed or the session
    /// was cancelled. Returns the last report either way.
    pub async fn wait_until_settled(&self, timeout: Duration) -> CliResult<Report> {
        let deadline = Instant::now() + timeout;
        loop {
            let report = Report::collect(&self.store).await?;
            if report.is_settled() {
                debug!(objects = report.objects.len(), "All objects settled");
                return Ok(report);
            }
            if Instant::now() >= deadline {
                warn!(unconverged = report.unconverged(), "Timed out waiting for objects");
                return Ok(report);
            }
            if self.wait(POLL_INTERVAL).await {
                return Err(CliError::Interrupted);
            }
        }
    }

    /// Request deletion of every object of `kinds` and wait for the records
    /// to go.
    pub async fn delete_all(&self, kinds: &[Kind], timeout: Duration) -> CliResult<Deletion> {
        let mut keys = Vec::new();
        for kind in kinds {
            keys.extend(self.store.list(*kind).await?.iter().map(AnyObject::key));
        }
        for key in &keys {
            info!(object = %key, "Deleting");
            self.store.delete(key).await?;
        }

        let deadline = Instant::now() + timeout;
        loop {
            let mut remaining = Vec::new();
            for key in &keys {
                if self.store.get(key).await?.is_some() {
                    remaining.push(key.clone());
                }
            }
            if remaining.is_empty() || Instant::now() >= deadline {
                return Ok(Deletion {
                    requested: keys.len(),
                    remaining,
                });
            }
            if self.wait(POLL_INTERVAL).await {
                return Err(CliError::Interrupted);
            }
        }
    }

    /// Sleep for `period`. True when the session was cancelled meanwhile.
    async fn wait(&self, period: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => true,
            _ = sleep(period) => false,
        }
    }

    /// Run until the session is cancelled from outside.
    pub async fn watch(&self) {
        self.shutdown.cancelled().await;
    }

    /// Stop the controller and wait for it.
    pub async fn stop(self) -> CliResult<()> {
        self.shutdown.cancel();
        match self.handle.await {
            Ok(result) => Ok(result?),
            Err(e) => Err(CliError::Config(format!("controller task failed: {e}"))),
        }
    }
}
