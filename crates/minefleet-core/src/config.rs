//! 起動時設定
//!
//! 環境変数を起動時に一度だけ読み込み、型付きの設定値へ変換します。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// エンジン全体の設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// サーバーディレクトリのルート（SERVERS_BASE_DIR）
    pub servers_base_dir: PathBuf,
    /// コンテナ内から見たホスト側パス（HOST_SERVERS_PATH、nsenter実行用）
    pub host_servers_path: Option<PathBuf>,
    /// 上流カタログのAPIキー（CATALOG_API_KEY、未設定ならカタログ機能無効）
    pub catalog_api_key: Option<String>,
    /// 既定のJVMオプション（DEFAULT_JAVA_OPTS）
    pub default_java_opts: String,
    /// バックアップ保持日数（BACKUP_RETENTION_DAYS）
    pub backup_retention_days: u32,
    /// 定期バックアップのcron式（BACKUP_CRON、未設定なら定期実行なし）
    pub backup_cron: Option<String>,
    /// レジストリ永続化先（DATABASE_URL）
    pub registry_path: PathBuf,
    /// アーティファクトキャッシュのルート
    pub cache_dir: PathBuf,
    /// バックアップアーカイブの保存先
    pub backups_dir: PathBuf,
}

impl EngineConfig {
    /// 環境変数から設定を構築
    pub fn from_env() -> Self {
        let servers_base_dir = std::env::var("SERVERS_BASE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/servers"));

        let registry_path = std::env::var("DATABASE_URL")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/registry.json"));

        let data_root = servers_base_dir
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("./data"));
        let cache_dir = data_root.join("cache");
        let backups_dir = data_root.join("backups");

        Self {
            servers_base_dir,
            host_servers_path: std::env::var("HOST_SERVERS_PATH").ok().map(PathBuf::from),
            catalog_api_key: std::env::var("CATALOG_API_KEY").ok().filter(|k| !k.is_empty()),
            default_java_opts: std::env::var("DEFAULT_JAVA_OPTS").unwrap_or_default(),
            backup_retention_days: std::env::var("BACKUP_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(14),
            backup_cron: std::env::var("BACKUP_CRON").ok().filter(|c| !c.is_empty()),
            registry_path,
            cache_dir,
            backups_dir,
        }
    }

    /// サーバーIDに対応するストレージディレクトリ
    pub fn server_dir(&self, storage: &crate::model::Storage) -> PathBuf {
        match storage {
            crate::model::Storage::NamedVolume(name) => self.servers_base_dir.join(name),
            crate::model::Storage::BindPath(path) => PathBuf::from(path),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            servers_base_dir: PathBuf::from("./data/servers"),
            host_servers_path: None,
            catalog_api_key: None,
            default_java_opts: String::new(),
            backup_retention_days: 14,
            backup_cron: None,
            registry_path: PathBuf::from("./data/registry.json"),
            cache_dir: PathBuf::from("./data/cache"),
            backups_dir: PathBuf::from("./data/backups"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Storage;

    /// NamedVolumeがベースディレクトリ配下に解決されることを確認
    #[test]
    fn test_server_dir_named_volume() {
        let config = EngineConfig::default();
        let dir = config.server_dir(&Storage::NamedVolume("minefleet-alpha".into()));
        assert_eq!(dir, PathBuf::from("./data/servers/minefleet-alpha"));
    }

    /// BindPathがそのまま使われることを確認
    #[test]
    fn test_server_dir_bind_path() {
        let config = EngineConfig::default();
        let dir = config.server_dir(&Storage::BindPath("/srv/mc/alpha".into()));
        assert_eq!(dir, PathBuf::from("/srv/mc/alpha"));
    }
}
