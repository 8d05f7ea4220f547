//! Mutation trait - 型付き Mutation の定義
//!
//! # ポイント
//! - Associated Constants (`const ACTION`)
//! - action 名の typo を型で排除する

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::ActionType;

/// Mutation は action 名と payload の型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct CreateTransaction {
///     amount_cents: i64,
///     memo: String,
/// }
///
/// impl Mutation for CreateTransaction {
///     const ACTION: &'static str = "transactions.create.v1";
/// }
/// ```
///
/// # Trait Bounds
/// - `Serialize`: enqueue 時に payload にするため
/// - `DeserializeOwned`: replay 時に payload から復元するため
/// - `Send + Sync + 'static`: handler を Arc に格納できるため
pub trait Mutation: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// action 名
    ///
    /// # 命名規約
    /// - `{domain}.{verb}.v{major}`
    /// - 例: `transactions.create.v1`
    const ACTION: &'static str;

    fn action() -> ActionType {
        ActionType::new(Self::ACTION)
    }
}
