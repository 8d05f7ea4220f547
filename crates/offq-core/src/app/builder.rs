//! QueueBuilder - MutationQueue の構築とワイヤリング
//!
//! # ポイント
//! - store / connectivity は必須、clock は SystemClock がデフォルト
//! - `expect_actions()` で起動時に handler の登録漏れを検出する（Fail-fast）

use std::future::Future;
use std::sync::Arc;

use super::manager::{MutationQueue, QueueParts};
use crate::config::QueueConfig;
use crate::domain::{ActionType, HandlerError};
use crate::ports::{Clock, ConnectivityMonitor, PersistentStore, SystemClock};
use crate::typed::{DynHandler, Handler, HandlerRegistry, Mutation};

/// Builds a [`MutationQueue`].
///
/// # 使用例
/// ```ignore
/// let queue = QueueBuilder::new()
///     .store(FileStore::new("/var/lib/app/queue"))
///     .connectivity(monitor)
///     .typed::<CreateTransaction, _>(CreateTransactionHandler::new(api))
///     .expect_actions(&[CreateTransaction::ACTION])
///     .build()?;
/// ```
#[derive(Default)]
pub struct QueueBuilder {
    config: QueueConfig,
    store: Option<Arc<dyn PersistentStore>>,
    connectivity: Option<Arc<dyn ConnectivityMonitor>>,
    clock: Option<Arc<dyn Clock>>,
    registry: HandlerRegistry,
    expected_actions: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("no persistent store configured")]
    MissingStore,

    #[error("no connectivity monitor configured")]
    MissingConnectivity,

    #[error("missing handlers for actions: {0:?}")]
    MissingActions(Vec<String>),
}

impl QueueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: impl PersistentStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn connectivity(mut self, connectivity: impl ConnectivityMonitor + 'static) -> Self {
        self.connectivity = Some(Arc::new(connectivity));
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn handler(mut self, action: impl Into<ActionType>, handler: Arc<dyn DynHandler>) -> Self {
        self.registry.register(action, handler);
        self
    }

    pub fn handler_fn<F, Fut>(mut self, action: impl Into<ActionType>, f: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.registry.register_fn(action, f);
        self
    }

    pub fn typed<T: Mutation, H: Handler<T> + 'static>(mut self, handler: H) -> Self {
        self.registry.register_typed::<T, H>(handler);
        self
    }

    /// Actions that must have a handler by the time `build()` runs.
    pub fn expect_actions(mut self, actions: &[&str]) -> Self {
        self.expected_actions = Some(actions.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<MutationQueue, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let connectivity = self.connectivity.ok_or(BuildError::MissingConnectivity)?;

        if let Some(expected) = &self.expected_actions {
            let missing: Vec<String> = expected
                .iter()
                .filter(|a| !self.registry.contains(&ActionType::new(a.as_str())))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingActions(missing));
            }
        }

        Ok(MutationQueue::from_parts(QueueParts {
            config: self.config,
            store,
            connectivity,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            registry: self.registry,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{ManualConnectivity, MemoryStore};
    use crate::typed::mutation::fixtures::{CreateTransaction, DeleteTransaction};
    use async_trait::async_trait;

    struct AcceptAll;

    #[async_trait]
    impl Handler<CreateTransaction> for AcceptAll {
        async fn handle(&self, _mutation: CreateTransaction) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    fn base() -> QueueBuilder {
        QueueBuilder::new()
            .store(MemoryStore::new())
            .connectivity(ManualConnectivity::offline())
    }

    #[test]
    fn build_success() {
        let queue = base()
            .typed::<CreateTransaction, _>(AcceptAll)
            .expect_actions(&[CreateTransaction::ACTION])
            .build()
            .unwrap();
        assert_eq!(
            queue.registered_actions(),
            vec![ActionType::new(CreateTransaction::ACTION)]
        );
    }

    #[test]
    fn build_reports_missing_actions() {
        let result = base()
            .typed::<CreateTransaction, _>(AcceptAll)
            .expect_actions(&[CreateTransaction::ACTION, DeleteTransaction::ACTION])
            .build();
        assert!(matches!(
            result,
            Err(BuildError::MissingActions(missing)) if missing == vec![DeleteTransaction::ACTION.to_string()]
        ));
    }

    #[test]
    fn build_without_expectations_accepts_empty_registry() {
        let queue = base().build().unwrap();
        assert!(queue.registered_actions().is_empty());
    }

    #[test]
    fn handler_fn_counts_as_registered() {
        let result = base()
            .handler_fn("notes.create", |_payload| async { Ok(()) })
            .expect_actions(&["notes.create"])
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn store_and_connectivity_are_required() {
        let no_store = QueueBuilder::new()
            .connectivity(ManualConnectivity::online())
            .build();
        assert!(matches!(no_store, Err(BuildError::MissingStore)));

        let no_net = QueueBuilder::new().store(MemoryStore::new()).build();
        assert!(matches!(no_net, Err(BuildError::MissingConnectivity)));
    }
}
