//! Typed - 型付き Mutation API
//!
//! このモジュールは action 名の typo を型で排除し、
//! Handler との対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Mutation` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure
//!
//! 文字列の action で登録する経路（`register_fn` など）も残してあり、
//! 型を持たない呼び出し側はそちらを使う。

pub mod handler;
pub mod mutation;
pub mod registry;

pub use self::handler::{DynHandler, FnHandler, Handler, TypedHandler};
pub use self::mutation::Mutation;
pub use self::registry::HandlerRegistry;
