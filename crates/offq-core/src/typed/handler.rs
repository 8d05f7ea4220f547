//! Handler trait - Mutation を実際に適用する Handler の定義
//!
//! # ポイント
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (DynHandler)
//! - Type erasure パターン (TypedHandler<T, H> → DynHandler)
//! - クロージャ登録 (FnHandler)

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Deserialize;

use super::mutation::Mutation;
use crate::domain::HandlerError;

/// Handler は Mutation をバックエンドに適用する
///
/// # 使用例
/// ```ignore
/// struct CreateTransactionHandler { api: ApiClient }
///
/// #[async_trait]
/// impl Handler<CreateTransaction> for CreateTransactionHandler {
///     async fn handle(&self, m: CreateTransaction) -> Result<(), HandlerError> {
///         self.api.post_transaction(&m).await.map_err(|e| HandlerError::new(e.to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<T: Mutation>: Send + Sync {
    async fn handle(&self, mutation: T) -> Result<(), HandlerError>;
}

/// DynHandler は object-safe な Handler の抽象化
///
/// payload は JSON のまま渡される。`HashMap<ActionType, Arc<dyn DynHandler>>`
/// に格納するための形。
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, payload: &serde_json::Value) -> Result<(), HandlerError>;
}

/// `Handler<T>` を `DynHandler` に変換するラッパー
///
/// payload の decode 失敗は handler の失敗として扱う。
pub struct TypedHandler<T: Mutation, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Mutation, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Mutation, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(&self, payload: &serde_json::Value) -> Result<(), HandlerError> {
        let mutation = T::deserialize(payload)?;
        self.handler.handle(mutation).await
    }
}

/// クロージャを `DynHandler` として使うためのラッパー
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> DynHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle_dyn(&self, payload: &serde_json::Value) -> Result<(), HandlerError> {
        (self.f)(payload.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::mutation::fixtures::CreateTransaction;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    struct RecordingHandler {
        seen: Arc<Mutex<Vec<CreateTransaction>>>,
    }

    #[async_trait]
    impl Handler<CreateTransaction> for RecordingHandler {
        async fn handle(&self, mutation: CreateTransaction) -> Result<(), HandlerError> {
            self.seen.lock().unwrap().push(mutation);
            Ok(())
        }
    }

    #[tokio::test]
    async fn typed_handler_decodes_payload() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = TypedHandler::new(RecordingHandler { seen: seen.clone() });

        handler
            .handle_dyn(&json!({"amount_cents": 1250, "memo": "lunch"}))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].amount_cents, 1250);
        assert_eq!(seen[0].memo, "lunch");
    }

    #[tokio::test]
    async fn typed_handler_reports_bad_payload_as_failure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = TypedHandler::new(RecordingHandler { seen: seen.clone() });

        let err = handler.handle_dyn(&json!({"memo": 3})).await.unwrap_err();
        assert!(err.message().starts_with("payload decode:"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fn_handler_passes_payload_through() {
        let handler = FnHandler::new(|payload: serde_json::Value| async move {
            if payload["ok"] == true {
                Ok(())
            } else {
                Err(HandlerError::new("rejected"))
            }
        });

        assert!(handler.handle_dyn(&json!({"ok": true})).await.is_ok());
        let err = handler.handle_dyn(&json!({"ok": false})).await.unwrap_err();
        assert_eq!(err.message(), "rejected");
    }
}
