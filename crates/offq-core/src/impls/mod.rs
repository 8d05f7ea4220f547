//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **MemoryStore**: テスト用の PersistentStore（書き込み失敗を注入できる）
//! - **FileStore**: ディレクトリ配下に 1 key = 1 file で保存
//! - **ManualConnectivity**: 手動で切り替える ConnectivityMonitor
//!
//! 本番の到達性検出やストレージはアプリ側が ports を実装して渡す。

pub mod file_store;
pub mod manual_connectivity;
pub mod memory_store;

pub use self::file_store::FileStore;
pub use self::manual_connectivity::ManualConnectivity;
pub use self::memory_store::MemoryStore;
