//! MutationQueue - オフラインキュー本体
//!
//! # フロー
//! 1. `enqueue` でエントリを追加し、スナップショットを永続化してから返る
//! 2. オンラインになる（または `replay_all` を呼ぶ）と、`queued_at` 昇順で
//!    handler を 1 件ずつ実行する
//! 3. パスの最後に completed を取り除いて永続化し、イベントを出す
//!
//! # ロックの方針
//! - メモリ上の状態は `std::sync::Mutex` で守り、await をまたいで保持しない
//! - 永続化は `tokio::sync::Mutex` で直列化し、スナップショットはロック取得後に
//!   取る（最後に書かれたものが常に最新になる）
//! - ロック順序は state → handlers のみ

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::runtime::Handle;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use super::builder::QueueBuilder;
use super::bus::EventBus;
use super::status::QueueStatus;
use crate::config::QueueConfig;
use crate::domain::{
    ActionType, HandlerError, MutationId, MutationStatus, NewMutation, QueueError, QueueEvent,
    QueuedMutation,
};
use crate::ports::{
    Clock, ConnectivityListener, ConnectivityMonitor, PersistentStore, Reachability,
    Subscription, is_reachable,
};
use crate::typed::{DynHandler, Handler, HandlerRegistry, Mutation};

/// Result of [`MutationQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Appended and persisted.
    Accepted,
    /// An entry with the same id already exists; nothing changed.
    Duplicate,
}

/// Why [`MutationQueue::replay_all`] returned without running a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyReplaying,
    Offline,
}

/// Counts for one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Candidates left untouched because connectivity dropped mid-pass.
    pub deferred: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    Skipped(SkipReason),
    Finished(ReplaySummary),
}

impl ReplayOutcome {
    pub fn summary(&self) -> Option<&ReplaySummary> {
        match self {
            ReplayOutcome::Finished(summary) => Some(summary),
            ReplayOutcome::Skipped(_) => None,
        }
    }
}

#[derive(Default)]
struct QueueState {
    mutations: Vec<QueuedMutation>,
    is_online: bool,
    is_replaying: bool,
    initialized: bool,
}

impl QueueState {
    fn pending_count(&self) -> usize {
        self.mutations.iter().filter(|m| m.is_eligible()).count()
    }

    fn has_replayable(&self, max_retries: Option<u32>) -> bool {
        self.mutations.iter().any(|m| m.is_replayable(max_retries))
    }

    fn contains(&self, id: &MutationId) -> bool {
        self.mutations.iter().any(|m| &m.id == id)
    }

    /// The record dispatched by the running pass. Only one entry is ever
    /// `replaying` at a time.
    fn find_replaying(&mut self, id: &MutationId) -> Option<&mut QueuedMutation> {
        self.mutations
            .iter_mut()
            .find(|m| &m.id == id && m.status == MutationStatus::Replaying)
    }

    /// Oldest replayable entry not yet attempted in this pass. Ties on
    /// `queued_at` go to the earlier list position.
    fn next_candidate(
        &self,
        attempted: &HashSet<MutationId>,
        max_retries: Option<u32>,
    ) -> Option<usize> {
        self.mutations
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_replayable(max_retries) && !attempted.contains(&m.id))
            .min_by_key(|(_, m)| m.queued_at)
            .map(|(index, _)| index)
    }

    fn remaining_candidates(
        &self,
        attempted: &HashSet<MutationId>,
        max_retries: Option<u32>,
    ) -> usize {
        self.mutations
            .iter()
            .filter(|m| m.is_replayable(max_retries) && !attempted.contains(&m.id))
            .count()
    }

    /// What goes to storage: everything except completed entries.
    fn persisted(&self) -> Vec<&QueuedMutation> {
        self.mutations
            .iter()
            .filter(|m| !m.status.is_terminal())
            .collect()
    }
}

pub(crate) struct QueueParts {
    pub config: QueueConfig,
    pub store: Arc<dyn PersistentStore>,
    pub connectivity: Arc<dyn ConnectivityMonitor>,
    pub clock: Arc<dyn Clock>,
    pub registry: HandlerRegistry,
}

struct Inner {
    config: QueueConfig,
    store: Arc<dyn PersistentStore>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    clock: Arc<dyn Clock>,
    handlers: RwLock<HandlerRegistry>,
    bus: EventBus,
    state: Mutex<QueueState>,
    persist_lock: tokio::sync::Mutex<()>,
    /// Set once storage has been read into `state`.
    loaded: OnceCell<()>,
    connectivity_subscription: Mutex<Option<Subscription>>,
    background: Mutex<Vec<JoinHandle<ReplayOutcome>>>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers(&self) -> RwLockReadGuard<'_, HandlerRegistry> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers_mut(&self) -> RwLockWriteGuard<'_, HandlerRegistry> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn connectivity_subscription(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.connectivity_subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn background(&self) -> MutexGuard<'_, Vec<JoinHandle<ReplayOutcome>>> {
        self.background.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the single-flight flag if a pass ends without reaching its normal
/// exit (handler panic, future dropped). Entries left `replaying` go back to
/// `pending`, the same normalization a restart would apply.
struct ReplayGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl<'a> ReplayGuard<'a> {
    fn arm(inner: &'a Inner) -> Self {
        Self { inner, armed: true }
    }

    fn release(mut self) {
        self.armed = false;
        self.inner.state().is_replaying = false;
    }
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.state();
        state.is_replaying = false;
        for m in state.mutations.iter_mut() {
            if m.recover() {
                tracing::warn!(id = %m.id, "replay interrupted, mutation returned to pending");
            }
        }
    }
}

enum Step {
    Dispatch {
        id: MutationId,
        handler: Arc<dyn DynHandler>,
        payload: serde_json::Value,
    },
    Missing {
        id: MutationId,
        error: HandlerError,
    },
}

/// Durable offline mutation queue.
///
/// Cheap to clone; clones share the same queue.
///
/// # 使用例
/// ```ignore
/// let queue = MutationQueue::builder()
///     .store(FileStore::new(data_dir))
///     .connectivity(monitor)
///     .typed::<CreateTransaction, _>(CreateTransactionHandler::new(api))
///     .build()?;
///
/// queue.initialize().await;
/// queue.enqueue_typed(MutationId::generate(), "Lunch", &tx).await?;
/// ```
#[derive(Clone)]
pub struct MutationQueue {
    inner: Arc<Inner>,
}

impl MutationQueue {
    pub fn builder() -> QueueBuilder {
        QueueBuilder::new()
    }

    pub(crate) fn from_parts(parts: QueueParts) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: parts.config,
                store: parts.store,
                connectivity: parts.connectivity,
                clock: parts.clock,
                handlers: RwLock::new(parts.registry),
                bus: EventBus::new(),
                state: Mutex::new(QueueState::default()),
                persist_lock: tokio::sync::Mutex::new(()),
                loaded: OnceCell::new(),
                connectivity_subscription: Mutex::new(None),
                background: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    /// Load the persisted queue, start watching connectivity, and kick off a
    /// replay pass in the background if online with work pending.
    ///
    /// Calling it again while initialized does nothing. After [`destroy`]
    /// it re-subscribes without reloading storage.
    ///
    /// [`destroy`]: MutationQueue::destroy
    pub async fn initialize(&self) {
        {
            let mut state = self.inner.state();
            if state.initialized {
                tracing::debug!("offline queue already initialized");
                return;
            }
            state.initialized = true;
        }
        self.ensure_loaded().await;

        // 先に購読してから現在値を読む（間の変化を取りこぼさない）
        let runtime = Handle::try_current().ok();
        let subscription = self
            .inner
            .connectivity
            .subscribe(self.connectivity_listener(runtime.clone()));
        let previous = self.inner.connectivity_subscription().replace(subscription);
        if let Some(previous) = previous {
            previous.unsubscribe();
        }

        let online = is_reachable(self.inner.connectivity.fetch_once().await);
        let (should_replay, pending) = {
            let mut state = self.inner.state();
            state.is_online = online;
            (
                online && state.has_replayable(self.inner.config.max_retries),
                state.pending_count(),
            )
        };

        tracing::info!(online, pending, "offline queue initialized");
        if should_replay {
            self.spawn_replay(runtime.as_ref());
        }
    }

    /// Stop watching connectivity. The queue itself is left intact.
    pub fn destroy(&self) {
        let subscription = self.inner.connectivity_subscription().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        self.inner.state().initialized = false;
        tracing::debug!("offline queue destroyed");
    }

    /// Wait until every replay pass started in the background (by
    /// `initialize` or a connectivity change) has finished.
    pub async fn settle(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.inner.background());
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::error!(error = %e, "background replay task failed");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // handlers
    // ------------------------------------------------------------------

    /// Register `handler` for `action`, replacing (and returning) any
    /// previous one.
    pub fn register_handler(
        &self,
        action: impl Into<ActionType>,
        handler: Arc<dyn DynHandler>,
    ) -> Option<Arc<dyn DynHandler>> {
        self.inner.handlers_mut().register(action, handler)
    }

    pub fn register_fn<F, Fut>(
        &self,
        action: impl Into<ActionType>,
        f: F,
    ) -> Option<Arc<dyn DynHandler>>
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.inner.handlers_mut().register_fn(action, f)
    }

    pub fn register_typed<T: Mutation, H: Handler<T> + 'static>(
        &self,
        handler: H,
    ) -> Option<Arc<dyn DynHandler>> {
        self.inner.handlers_mut().register_typed::<T, H>(handler)
    }

    /// Drop the handler for `action`. Queued entries for it stay queued and
    /// fail with a missing-handler error until one is registered again.
    pub fn unregister_handler(&self, action: &ActionType) -> Option<Arc<dyn DynHandler>> {
        self.inner.handlers_mut().unregister(action)
    }

    pub fn registered_actions(&self) -> Vec<ActionType> {
        self.inner.handlers().registered_actions()
    }

    // ------------------------------------------------------------------
    // queue operations
    // ------------------------------------------------------------------

    /// Append a mutation and persist the queue before returning.
    ///
    /// A known id is ignored (`Enqueued::Duplicate`). If the write fails the
    /// entry stays queued in memory, `queue-changed` is still emitted, and
    /// the store error is returned so the caller knows durability is not yet
    /// guaranteed.
    ///
    /// Called before `initialize`, it reads storage first, so the duplicate
    /// check and the write both see the stored queue.
    pub async fn enqueue(&self, mutation: NewMutation) -> Result<Enqueued, QueueError> {
        self.ensure_loaded().await;
        {
            let mut state = self.inner.state();
            if state.contains(&mutation.id) {
                tracing::warn!(id = %mutation.id, "mutation already queued, ignoring duplicate");
                return Ok(Enqueued::Duplicate);
            }
            let queued_at = self.inner.clock.now();
            tracing::debug!(id = %mutation.id, action = %mutation.action, "queueing mutation");
            state.mutations.push(QueuedMutation::new(mutation, queued_at));
        }

        let persisted = self.persist().await;
        self.emit_queue_changed();
        persisted.map(|()| Enqueued::Accepted)
    }

    /// Enqueue a typed mutation under `T::ACTION`.
    pub async fn enqueue_typed<T: Mutation>(
        &self,
        id: impl Into<MutationId>,
        description: impl Into<String>,
        mutation: &T,
    ) -> Result<Enqueued, QueueError> {
        let payload = serde_json::to_value(mutation)?;
        self.enqueue(NewMutation::new(id, T::action(), payload).with_description(description))
            .await
    }

    /// Run one replay pass: every `pending`/`failed` entry, oldest first,
    /// one handler at a time.
    pub async fn replay_all(&self) -> ReplayOutcome {
        let max_retries = self.inner.config.max_retries;
        {
            let mut state = self.inner.state();
            if state.is_replaying {
                tracing::debug!("replay already in progress, skipping");
                return ReplayOutcome::Skipped(SkipReason::AlreadyReplaying);
            }
            if !state.is_online {
                tracing::debug!("offline, skipping replay");
                return ReplayOutcome::Skipped(SkipReason::Offline);
            }
            state.is_replaying = true;
        }
        let guard = ReplayGuard::arm(&self.inner);
        tracing::info!(pending = self.pending_count(), "replaying offline queue");

        let mut summary = ReplaySummary::default();
        let mut attempted: HashSet<MutationId> = HashSet::new();

        loop {
            let step = {
                let mut state = self.inner.state();
                let Some(index) = state.next_candidate(&attempted, max_retries) else {
                    break;
                };
                if !state.is_online {
                    summary.deferred = state.remaining_candidates(&attempted, max_retries);
                    tracing::info!(
                        deferred = summary.deferred,
                        "connectivity lost, deferring remaining mutations"
                    );
                    break;
                }

                let handler = self.inner.handlers().get(&state.mutations[index].action);
                let entry = &mut state.mutations[index];
                attempted.insert(entry.id.clone());
                match handler {
                    Some(handler) => {
                        entry.start_replay();
                        Step::Dispatch {
                            id: entry.id.clone(),
                            handler,
                            payload: entry.payload.clone(),
                        }
                    }
                    None => {
                        let error = HandlerError::missing(&entry.action);
                        entry.mark_failed(error.to_string());
                        Step::Missing {
                            id: entry.id.clone(),
                            error,
                        }
                    }
                }
            };

            let event = match step {
                Step::Missing { id, error } => {
                    tracing::warn!(%id, %error, "no handler for queued mutation");
                    summary.failed += 1;
                    QueueEvent::ReplayFailed {
                        id,
                        error: error.to_string(),
                    }
                }
                Step::Dispatch {
                    id,
                    handler,
                    payload,
                } => {
                    tracing::debug!(%id, "replaying mutation");
                    self.inner
                        .bus
                        .emit(&QueueEvent::ReplayStarted { id: id.clone() });

                    let result = handler.handle_dyn(&payload).await;

                    // remove + 再 enqueue された同じ id の新しいエントリには触らない
                    let mut state = self.inner.state();
                    let entry = state.find_replaying(&id);
                    match result {
                        Ok(()) => {
                            if let Some(entry) = entry {
                                entry.mark_completed();
                            }
                            summary.succeeded += 1;
                            QueueEvent::ReplayCompleted { id }
                        }
                        Err(error) => {
                            if let Some(entry) = entry {
                                entry.mark_failed(error.to_string());
                            }
                            tracing::warn!(%id, %error, "mutation replay failed");
                            summary.failed += 1;
                            QueueEvent::ReplayFailed {
                                id,
                                error: error.to_string(),
                            }
                        }
                    }
                }
            };
            self.inner.bus.emit(&event);
        }

        self.inner
            .state()
            .mutations
            .retain(|m| !m.status.is_terminal());
        if let Err(e) = self.persist().await {
            tracing::debug!(error = %e, "replay results stay in memory until the next successful write");
        }
        guard.release();

        self.emit_queue_changed();
        self.inner.bus.emit(&QueueEvent::ReplayAllCompleted {
            success_count: summary.succeeded,
            fail_count: summary.failed,
        });
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            deferred = summary.deferred,
            "replay pass finished"
        );
        ReplayOutcome::Finished(summary)
    }

    /// Entries still waiting for a successful replay (`pending` or `failed`),
    /// in queue order.
    pub fn get_pending_mutations(&self) -> Vec<QueuedMutation> {
        self.inner
            .state()
            .mutations
            .iter()
            .filter(|m| m.is_eligible())
            .cloned()
            .collect()
    }

    pub fn get_mutation(&self, id: &MutationId) -> Option<QueuedMutation> {
        self.inner
            .state()
            .mutations
            .iter()
            .find(|m| &m.id == id)
            .cloned()
    }

    /// Remove one entry. Returns whether it existed. Persists and emits
    /// `queue-changed` either way.
    pub async fn remove_mutation(&self, id: &MutationId) -> Result<bool, QueueError> {
        self.ensure_loaded().await;
        let removed = {
            let mut state = self.inner.state();
            let before = state.mutations.len();
            state.mutations.retain(|m| &m.id != id);
            state.mutations.len() != before
        };
        if removed {
            tracing::info!(%id, "removed queued mutation");
        }

        let persisted = self.persist().await;
        self.emit_queue_changed();
        persisted.map(|()| removed)
    }

    /// Drop every entry. Returns how many were removed.
    pub async fn clear_all(&self) -> Result<usize, QueueError> {
        self.ensure_loaded().await;
        let removed = {
            let mut state = self.inner.state();
            let removed = state.mutations.len();
            state.mutations.clear();
            removed
        };
        tracing::info!(removed, "cleared offline queue");

        let persisted = self.persist().await;
        self.emit_queue_changed();
        persisted.map(|()| removed)
    }

    /// Observe queue events. The returned handle removes the listener.
    pub fn add_event_listener(
        &self,
        listener: impl Fn(&QueueEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.bus.subscribe(listener)
    }

    // ------------------------------------------------------------------
    // read-only state
    // ------------------------------------------------------------------

    pub fn is_online(&self) -> bool {
        self.inner.state().is_online
    }

    pub fn is_replaying(&self) -> bool {
        self.inner.state().is_replaying
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state().pending_count()
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.inner.state();
        QueueStatus {
            is_online: state.is_online,
            is_replaying: state.is_replaying,
            ..QueueStatus::collect(&state.mutations, self.inner.config.max_retries)
        }
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    /// Read storage into memory, once per instance. Concurrent callers wait
    /// for the first read to finish.
    async fn ensure_loaded(&self) {
        self.inner.loaded.get_or_init(|| self.load()).await;
    }

    async fn load(&self) {
        let loaded = self.read_stored().await;

        let (restored, recovered, pending) = {
            let mut state = self.inner.state();
            let mut seen = HashSet::new();
            let mut recovered = 0;
            state.mutations = loaded
                .into_iter()
                .filter(|m| !m.status.is_terminal() && seen.insert(m.id.clone()))
                .map(|mut m| {
                    if m.recover() {
                        recovered += 1;
                    }
                    m
                })
                .collect();
            (state.mutations.len(), recovered, state.pending_count())
        };

        tracing::info!(restored, recovered, "restored offline queue");
        if restored > 0 {
            self.inner.bus.emit(&QueueEvent::QueueChanged {
                pending_count: pending,
            });
        }
    }

    /// Stored entries, or nothing if storage is empty or unreadable.
    async fn read_stored(&self) -> Vec<QueuedMutation> {
        let key = self.inner.config.storage_key.as_str();
        let bytes = match self.inner.store.load(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(key, "no persisted offline queue");
                return Vec::new();
            }
            Err(e) => {
                tracing::error!(key, error = %e, "failed to load offline queue, starting empty");
                return Vec::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::error!(key, error = %e, "persisted offline queue is unreadable, starting empty");
                Vec::new()
            }
        }
    }

    async fn persist(&self) -> Result<(), QueueError> {
        let _write = self.inner.persist_lock.lock().await;

        let encoded = {
            let state = self.inner.state();
            serde_json::to_vec(&state.persisted())
        };
        let bytes = match encoded {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode offline queue");
                return Err(e.into());
            }
        };

        if let Err(e) = self
            .inner
            .store
            .save(&self.inner.config.storage_key, bytes)
            .await
        {
            tracing::error!(error = %e, "failed to persist offline queue, keeping it in memory");
            return Err(e.into());
        }
        Ok(())
    }

    fn emit_queue_changed(&self) {
        let pending_count = self.pending_count();
        self.inner
            .bus
            .emit(&QueueEvent::QueueChanged { pending_count });
    }

    fn connectivity_listener(&self, runtime: Option<Handle>) -> ConnectivityListener {
        let inner = Arc::downgrade(&self.inner);
        Arc::new(move |reachability: Reachability| {
            if let Some(inner) = inner.upgrade() {
                MutationQueue { inner }.on_connectivity(reachability, runtime.as_ref());
            }
        })
    }

    fn on_connectivity(&self, reachability: Reachability, runtime: Option<&Handle>) {
        let online = is_reachable(reachability);
        let (changed, should_replay) = {
            let mut state = self.inner.state();
            let was_online = std::mem::replace(&mut state.is_online, online);
            let changed = was_online != online;
            (
                changed,
                changed
                    && online
                    && state.initialized
                    && state.has_replayable(self.inner.config.max_retries),
            )
        };
        if !changed {
            return;
        }

        tracing::info!(online, "connectivity changed");
        self.inner
            .bus
            .emit(&QueueEvent::ConnectivityChanged { is_online: online });
        if should_replay {
            self.spawn_replay(runtime);
        }
    }

    fn spawn_replay(&self, runtime: Option<&Handle>) {
        let Some(runtime) = runtime else {
            tracing::warn!("no tokio runtime captured at initialize, replay must be started manually");
            return;
        };
        let queue = self.clone();
        let task = runtime.spawn(async move { queue.replay_all().await });

        let mut background = self.inner.background();
        background.retain(|t| !t.is_finished());
        background.push(task);
    }
}
