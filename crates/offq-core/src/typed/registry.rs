//! HandlerRegistry - Handler の登録と管理
//!
//! # ポイント
//! - HashMap での型消去された trait object の管理
//! - Generic methods での登録と型安全性
//! - Arc による共有所有権（replay 中は clone した Arc を await する）

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::handler::{DynHandler, FnHandler, Handler, TypedHandler};
use super::mutation::Mutation;
use crate::domain::{ActionType, HandlerError};

/// HandlerRegistry は action → handler の対応を保持する
///
/// # 使用例
/// ```ignore
/// let mut registry = HandlerRegistry::new();
/// registry.register_typed::<CreateTransaction, _>(CreateTransactionHandler);
/// registry.register_fn("legacy.sync", |payload| async move { Ok(()) });
///
/// let handler = registry.get(&ActionType::new("legacy.sync"));
/// ```
///
/// # 登録ルール
/// - 同じ action への再登録は上書き（last wins）、置き換えた handler を返す
/// - action 名は検証しない。未登録の action は replay 時に失敗として記録され、
///   後から登録すれば次のパスで成功できる
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ActionType, Arc<dyn DynHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a type-erased handler for `action`, returning the one it replaced.
    pub fn register(
        &mut self,
        action: impl Into<ActionType>,
        handler: Arc<dyn DynHandler>,
    ) -> Option<Arc<dyn DynHandler>> {
        self.handlers.insert(action.into(), handler)
    }

    /// Register a typed handler under `T::ACTION`.
    pub fn register_typed<T: Mutation, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Option<Arc<dyn DynHandler>> {
        self.register(T::action(), Arc::new(TypedHandler::new(handler)))
    }

    /// Register an async closure `payload -> Result<(), HandlerError>`.
    pub fn register_fn<F, Fut>(
        &mut self,
        action: impl Into<ActionType>,
        f: F,
    ) -> Option<Arc<dyn DynHandler>>
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.register(action, Arc::new(FnHandler::new(f)))
    }

    pub fn get(&self, action: &ActionType) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(action).cloned()
    }

    pub fn contains(&self, action: &ActionType) -> bool {
        self.handlers.contains_key(action)
    }

    pub fn unregister(&mut self, action: &ActionType) -> Option<Arc<dyn DynHandler>> {
        self.handlers.remove(action)
    }

    /// Registered actions, sorted.
    pub fn registered_actions(&self) -> Vec<ActionType> {
        let mut actions: Vec<ActionType> = self.handlers.keys().cloned().collect();
        actions.sort();
        actions
    }
}
