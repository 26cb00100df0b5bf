//! モッドパックキャッシュレコード

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// モッドパックレコード（永続キャッシュ、上流カタログID基準）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModpackRecord {
    /// 上流カタログのプロジェクトID
    pub catalog_id: i64,
    pub name: String,
    #[serde(default)]
    pub authors: Vec<String>,
    /// 対象ゲームバージョン
    pub game_version: String,
    /// モッドローダー系統（forge / fabric / neoforge / …）
    pub modloader: String,
    pub download_url: Option<String>,
    pub icon_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}
