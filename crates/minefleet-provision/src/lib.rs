//! MineFleet Provision — モッドパックからのサーバー構築
//!
//! 単一のリクエストから「アーカイブ取得 → 展開 → マニフェスト解釈 →
//! モッド解決 → 一括ダウンロード → オーバーライド配置 → レコード永続化」
//! までを駆動し、進捗をリアルタイムに配信します。
//!
//! パイプラインは線形のResult連鎖で構成され、途中のどの失敗でも
//! 一時ディレクトリの後始末が保証されます（スコープ束縛）。

mod manifest;
mod orchestrator;
mod progress;

pub use manifest::{classify_modloader, ManifestFile, MinecraftSection, ModLoader, PackManifest};
pub use orchestrator::{Orchestrator, ProvisionRequest};
pub use progress::{ProgressChannel, ProgressEvent, TERMINAL_RETENTION};
