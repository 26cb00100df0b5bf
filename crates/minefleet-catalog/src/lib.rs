//! MineFleet Catalog — 上流アーティファクトカタログのクライアント
//!
//! レート制御・バッチ化・再試行を備えたHTTPクライアントです。
//! 応答は操作ごとの明示的なスキーマへ厳密にデコードされ、
//! 未知のフィールドは `extra` へ退避されます。
//!
//! APIキー（CATALOG_API_KEY）が未設定の場合、全操作は
//! I/Oを発生させる前に `CatalogDisabled` で失敗します。

mod cache;
mod client;
mod error;
mod schema;

pub use cache::ModListCache;
pub use client::{CatalogClient, CatalogConfig, DOWNLOAD_CEILING_BYTES};
pub use error::CatalogError;
pub use schema::*;
