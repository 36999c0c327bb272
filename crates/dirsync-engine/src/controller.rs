//! Work queue driving the reconcilers.
//!
//! Keys arrive from [`Controller::enqueue`], from store change notifications
//! and from a periodic resync. At most one reconcile runs per key; a key that
//! arrives while its reconcile is in flight runs once more afterwards. The
//! number of concurrent reconciles is bounded by the `workers` setting.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use dirsync_api::{AnyObject, Kind, ObjectKey};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::mapper::{map_group, map_organizational_unit, map_user};
use crate::provider::admin_secret_name;
use crate::reconciler::{Context, ObjectReconciler, Reconcile, ReconcileOutcome};
use crate::root::DirectoryRootReconciler;
use crate::store::ObjectStore;

/// Kinds whose changes can affect other objects.
const WATCHED_KINDS: [Kind; 4] = [
    Kind::DirectoryRoot,
    Kind::OrganizationalUnit,
    Kind::Group,
    Kind::User,
];

/// Whether a change to `key` should re-run the reconcile of `object`.
pub fn depends_on(object: &AnyObject, key: &ObjectKey) -> bool {
    let namespace = &object.meta().namespace;
    let spec = match object {
        AnyObject::OrganizationalUnit(ou) => Some(&ou.spec.object),
        AnyObject::Group(group) => Some(&group.spec.object),
        AnyObject::User(user) => Some(&user.spec.object),
        AnyObject::DirectoryRoot(_) | AnyObject::Secret(_) => None,
    };

    match key.kind {
        Kind::DirectoryRoot => spec.is_some_and(|spec| {
            &key.namespace == namespace && spec.directory_ref.name == key.name
        }),
        Kind::OrganizationalUnit | Kind::Group | Kind::User => spec
            .and_then(|spec| spec.parent_ref.as_ref())
            .is_some_and(|parent| {
                parent.kind == key.kind.as_str()
                    && parent.name == key.name
                    && parent.namespace_or(namespace) == key.namespace
            }),
        Kind::Secret => {
            if &key.namespace != namespace {
                return false;
            }
            match object {
                AnyObject::User(user) => user
                    .spec
                    .password_secret_ref
                    .as_ref()
                    .is_some_and(|secret| secret.name == key.name),
                AnyObject::DirectoryRoot(root) => {
                    root.spec.certificate_secret_ref.name == key.name
                        || admin_secret_name(&root.metadata.name) == key.name
                }
                _ => false,
            }
        }
    }
}

/// Result of one reconcile task. `None` means the task ended without a
/// result.
struct Completion {
    key: ObjectKey,
    result: Option<EngineResult<ReconcileOutcome>>,
}

/// Reports a task's completion, also when it panics or is aborted.
struct CompletionGuard {
    key: Option<ObjectKey>,
    done: mpsc::UnboundedSender<Completion>,
}

impl CompletionGuard {
    fn finish(mut self, result: EngineResult<ReconcileOutcome>) {
        if let Some(key) = self.key.take() {
            let _ = self.done.send(Completion {
                key,
                result: Some(result),
            });
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            let _ = self.done.send(Completion { key, result: None });
        }
    }
}

/// Per-run bookkeeping of the work queue.
struct Dispatcher {
    reconcilers: HashMap<Kind, Arc<dyn Reconcile>>,
    in_flight: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    scheduled: HashMap<ObjectKey, Instant>,
    tasks: JoinSet<()>,
    timers: JoinSet<(ObjectKey, Instant)>,
    semaphore: Arc<Semaphore>,
    done: mpsc::UnboundedSender<Completion>,
    retry_interval: Duration,
    resync_interval: Duration,
}

impl Dispatcher {
    fn dispatch(&mut self, key: ObjectKey) {
        let Some(reconciler) = self.reconcilers.get(&key.kind).cloned() else {
            return;
        };

        if self.in_flight.contains(&key) {
            self.dirty.insert(key);
            return;
        }
        self.in_flight.insert(key.clone());

        let guard = CompletionGuard {
            key: Some(key.clone()),
            done: self.done.clone(),
        };
        let semaphore = self.semaphore.clone();
        self.tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            let result = reconciler.reconcile(&key).await;
            guard.finish(result);
        });
    }

    fn schedule(&mut self, key: ObjectKey, after: Duration) {
        let deadline = Instant::now() + after;
        if let Some(existing) = self.scheduled.get(&key) {
            if *existing <= deadline {
                return;
            }
        }
        self.scheduled.insert(key.clone(), deadline);
        self.timers.spawn(async move {
            sleep_until(deadline).await;
            (key, deadline)
        });
    }

    /// A timer fired. Stale timers, replaced by an earlier deadline, are
    /// ignored.
    fn fire(&mut self, key: ObjectKey, deadline: Instant) {
        if self.scheduled.get(&key) == Some(&deadline) {
            self.scheduled.remove(&key);
            self.dispatch(key);
        }
    }

    fn complete(&mut self, completion: Completion) {
        let Completion { key, result } = completion;
        self.in_flight.remove(&key);

        match result {
            Some(Ok(outcome)) => {
                if let Some(after) = outcome.requeue_after {
                    debug!(key = %key, after_ms = after.as_millis() as u64, "Requeue requested");
                    self.schedule(key.clone(), after);
                }
            }
            Some(Err(e)) => {
                warn!(key = %key, error = %e, "Reconcile failed, retrying at resync interval");
                self.schedule(key.clone(), self.resync_interval);
            }
            None => {
                error!(key = %key, "Reconcile ended without a result");
                self.schedule(key.clone(), self.retry_interval);
            }
        }

        if self.dirty.remove(&key) {
            self.dispatch(key);
        }
    }

    async fn shutdown(&mut self) {
        self.timers.shutdown().await;
        self.tasks.shutdown().await;
    }
}

/// Runs reconcilers for the keys of registered kinds.
pub struct Controller {
    store: Arc<dyn ObjectStore>,
    config: EngineConfig,
    reconcilers: HashMap<Kind, Arc<dyn Reconcile>>,
    queue: mpsc::UnboundedSender<ObjectKey>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<ObjectKey>>>,
}

impl Controller {
    pub fn new(store: Arc<dyn ObjectStore>, config: EngineConfig) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        Self {
            store,
            config,
            reconcilers: HashMap::new(),
            queue,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Controller with a reconciler for every dirsync kind.
    pub fn standard(ctx: Context) -> Self {
        let store = ctx.store.clone();
        let config = ctx.config.clone();
        Self::new(store, config)
            .register(Arc::new(DirectoryRootReconciler::new(ctx.clone())))
            .register(Arc::new(ObjectReconciler::new(
                ctx.clone(),
                map_organizational_unit,
            )))
            .register(Arc::new(ObjectReconciler::new(ctx.clone(), map_group)))
            .register(Arc::new(ObjectReconciler::new(ctx, map_user)))
    }

    #[must_use]
    pub fn register(mut self, reconciler: Arc<dyn Reconcile>) -> Self {
        self.reconcilers.insert(reconciler.kind(), reconciler);
        self
    }

    pub fn kinds(&self) -> impl Iterator<Item = Kind> + '_ {
        self.reconcilers.keys().copied()
    }

    /// Ask for a reconcile of `key`.
    pub fn enqueue(&self, key: ObjectKey) {
        // The receiver lives as long as the controller.
        let _ = self.queue.send(key);
    }

    /// Keys of every object of a registered kind.
    async fn all_keys(&self) -> Vec<ObjectKey> {
        let mut keys = Vec::new();
        for kind in self.reconcilers.keys() {
            match self.store.list(*kind).await {
                Ok(objects) => keys.extend(objects.iter().map(AnyObject::key)),
                Err(e) => error!(kind = %kind, error = %e, "Failed to list objects"),
            }
        }
        keys
    }

    /// Keys of objects depending on `key`.
    async fn dependents(&self, key: &ObjectKey) -> Vec<ObjectKey> {
        let mut keys = Vec::new();
        for kind in WATCHED_KINDS {
            if !self.reconcilers.contains_key(&kind) {
                continue;
            }
            match self.store.list(kind).await {
                Ok(objects) => keys.extend(
                    objects
                        .iter()
                        .filter(|object| depends_on(object, key))
                        .map(AnyObject::key),
                ),
                Err(e) => error!(kind = %kind, error = %e, "Failed to list objects"),
            }
        }
        keys
    }

    /// Run until `shutdown` is cancelled. In-flight reconciles are aborted on
    /// shutdown.
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) -> EngineResult<()> {
        let mut queue = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| EngineError::Config("controller is already running".into()))?;
        let mut events = self.store.subscribe();
        let mut events_open = true;

        let (done, mut completions) = mpsc::unbounded_channel();
        let mut dispatcher = Dispatcher {
            reconcilers: self.reconcilers.clone(),
            in_flight: HashSet::new(),
            dirty: HashSet::new(),
            scheduled: HashMap::new(),
            tasks: JoinSet::new(),
            timers: JoinSet::new(),
            semaphore: Arc::new(Semaphore::new(self.config.workers)),
            done,
            retry_interval: self.config.retry_interval(),
            resync_interval: self.config.resync_interval(),
        };

        let mut resync = interval(self.config.resync_interval());
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            workers = self.config.workers,
            kinds = self.reconcilers.len(),
            resync_interval_secs = self.config.resync_interval_secs,
            "Starting controller"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping controller");
                    break;
                }
                _ = resync.tick() => {
                    let keys = self.all_keys().await;
                    debug!(count = keys.len(), "Resync");
                    for key in keys {
                        dispatcher.dispatch(key);
                    }
                }
                Some(key) = queue.recv() => {
                    dispatcher.dispatch(key);
                }
                event = events.recv(), if events_open => match event {
                    Ok(key) => {
                        let dependents = self.dependents(&key).await;
                        dispatcher.dispatch(key);
                        for dependent in dependents {
                            dispatcher.dispatch(dependent);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed store notifications, resyncing");
                        for key in self.all_keys().await {
                            dispatcher.dispatch(key);
                        }
                    }
                    Err(RecvError::Closed) => {
                        warn!("Store notifications closed");
                        events_open = false;
                    }
                },
                Some(completion) = completions.recv() => {
                    dispatcher.complete(completion);
                }
                Some(Ok((key, deadline))) = dispatcher.timers.join_next() => {
                    dispatcher.fire(key, deadline);
                }
                Some(finished) = dispatcher.tasks.join_next() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            error!(error = %e, "Reconcile task panicked");
                        }
                    }
                }
            }
        }

        dispatcher.shutdown().await;
        info!("Controller stopped");
        Ok(())
    }
}
