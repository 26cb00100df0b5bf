//! バックアップレコード

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// バックアップの進行状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// バックアップの契機
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupKind {
    Manual,
    Scheduled,
}

/// バックアップレコード（永続）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub id: Uuid,
    pub server_id: Uuid,
    pub display_name: String,
    pub status: BackupStatus,
    pub kind: BackupKind,
    /// アーカイブファイルの絶対パス
    pub archive_path: Option<String>,
    pub size_bytes: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BackupRecord {
    pub fn new(server_id: Uuid, display_name: impl Into<String>, kind: BackupKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            server_id,
            display_name: display_name.into(),
            status: BackupStatus::Pending,
            kind,
            archive_path: None,
            size_bytes: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}
