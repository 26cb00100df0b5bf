//! MineFleet Registry — サーバーレコードの正本
//!
//! サーバー・モッドパック・バックアップの永続レコードを一元管理します。
//! 名前とポートの一意性検査は単一のクリティカルセクションで直列化され、
//! 並行作成が両方成功することはありません。
//!
//! 永続化はJSONドキュメントへのアトミック書き込み（一時ファイル + rename）です。

mod port;
mod store;

pub use port::find_available_port;
pub use store::{Registry, ServerPatch};
