//! コンソールログ行（一時データ）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ログ行の出自ストリーム
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    /// コマンドエコーなど、システムが注入した行
    System,
}

/// ログ行
///
/// サーバーごとのリングバッファ（既定1000行）に保持され、
/// 溢れた場合は古い行から破棄されます。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    pub server_id: Uuid,
    /// サーバー内で単調増加する通番
    pub seq: u64,
    pub wall_time: DateTime<Utc>,
    pub stream: LogStream,
    pub text: String,
}
