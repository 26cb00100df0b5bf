//! MineFleet Backup — サーバーディレクトリのアーカイブ
//!
//! tar.gz形式でサーバーディレクトリ全体を退避します。
//! 復元はステージング方式です: 一時ディレクトリへ展開してから
//! 現行ディレクトリと入れ替えるため、途中失敗で現行データは壊れません。

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use minefleet_core::{
    BackupKind, BackupRecord, BackupStatus, EngineConfig, EngineError, LifecycleState, Result,
    ServerRecord,
};
use minefleet_registry::Registry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct BackupService {
    registry: Arc<Registry>,
    config: EngineConfig,
}

impl BackupService {
    pub fn new(registry: Arc<Registry>, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    fn archive_path(&self, record: &BackupRecord) -> PathBuf {
        self.config
            .backups_dir
            .join(format!("{}-{}.tar.gz", record.server_id, record.id))
    }

    /// バックアップを作成
    ///
    /// レコードはPending→InProgress→Completed/Failedと進みます。
    pub async fn create(
        &self,
        server: &ServerRecord,
        display_name: Option<String>,
        kind: BackupKind,
    ) -> Result<BackupRecord> {
        let display_name = display_name.unwrap_or_else(|| {
            format!("{}-{}", server.name, Utc::now().format("%Y%m%d-%H%M%S"))
        });
        let mut record = BackupRecord::new(server.id, display_name, kind);
        self.registry.insert_backup(record.clone()).await?;

        record.status = BackupStatus::InProgress;
        self.registry.update_backup(record.clone()).await?;

        let server_dir = self.config.server_dir(&server.storage);
        let archive_path = self.archive_path(&record);

        let result = {
            let server_dir = server_dir.clone();
            let archive_path = archive_path.clone();
            tokio::task::spawn_blocking(move || write_archive(&server_dir, &archive_path))
                .await
                .map_err(|e| EngineError::internal(format!("backup task: {e}")))?
        };

        match result {
            Ok(size_bytes) => {
                record.status = BackupStatus::Completed;
                record.archive_path = Some(archive_path.display().to_string());
                record.size_bytes = Some(size_bytes);
                record.completed_at = Some(Utc::now());
                info!(backup_id = %record.id, server = %server.name, size_bytes, "backup completed");
            }
            Err(err) => {
                record.status = BackupStatus::Failed;
                record.completed_at = Some(Utc::now());
                warn!(backup_id = %record.id, server = %server.name, kind = err.kind(), "backup failed");
            }
        }
        self.registry.update_backup(record.clone()).await?;
        Ok(record)
    }

    /// バックアップを削除（アーカイブとレコード）
    pub async fn delete(&self, backup_id: Uuid) -> Result<()> {
        let record = self.registry.get_backup(backup_id).await?;
        if let Some(path) = &record.archive_path {
            let path = Path::new(path);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        self.registry.delete_backup(backup_id).await?;
        Ok(())
    }

    /// ステージング方式の復元
    ///
    /// 停止中のサーバーに対してのみ実行できます。一時ディレクトリへ
    /// 展開が完了してから現行ディレクトリと入れ替えます。
    pub async fn restore(&self, server: &ServerRecord, backup_id: Uuid) -> Result<()> {
        if server.state.is_live() {
            return Err(EngineError::InvalidRequest(format!(
                "サーバー '{}' を停止してから復元してください",
                server.name
            )));
        }

        let record = self.registry.get_backup(backup_id).await?;
        if record.status != BackupStatus::Completed {
            return Err(EngineError::InvalidRequest(
                "完了していないバックアップは復元できません".to_string(),
            ));
        }
        let archive_path = record
            .archive_path
            .as_deref()
            .map(PathBuf::from)
            .ok_or_else(|| EngineError::NotFound("バックアップアーカイブ".to_string()))?;

        let server_dir = self.config.server_dir(&server.storage);
        let server_name = server.name.clone();
        tokio::task::spawn_blocking(move || {
            staged_restore(&archive_path, &server_dir, &server_name)
        })
        .await
        .map_err(|e| EngineError::internal(format!("restore task: {e}")))??;

        info!(backup_id = %backup_id, server = %server.name, "backup restored");
        Ok(())
    }

    /// 保持日数を超えた完了済みバックアップを削除
    pub async fn prune_expired(&self) -> Result<u32> {
        let cutoff =
            Utc::now() - chrono::Duration::days(self.config.backup_retention_days as i64);
        let mut pruned = 0;

        for server in self.registry.list_servers().await {
            for backup in self.registry.list_backups(server.id).await {
                if backup.status == BackupStatus::Completed && backup.created_at < cutoff {
                    self.delete(backup.id).await?;
                    pruned += 1;
                }
            }
        }
        if pruned > 0 {
            info!(pruned, "expired backups pruned");
        }
        Ok(pruned)
    }

    /// 定期バックアップの実行
    ///
    /// 対象はプロパティ `scheduled-backups` が `false` でないサーバー
    /// （autoStartには紐づけない）。稼働状態は問いません。
    pub async fn run_scheduled(&self) -> Result<u32> {
        let mut count = 0;
        for server in self.registry.list_servers().await {
            let eligible = server
                .properties
                .get("scheduled-backups")
                .map(|v| v != "false")
                .unwrap_or(true);
            if !eligible {
                continue;
            }
            if server.state == LifecycleState::Error {
                continue;
            }
            self.create(&server, None, BackupKind::Scheduled).await?;
            count += 1;
        }
        Ok(count)
    }
}

/// tar.gzアーカイブを書き出してサイズを返す
fn write_archive(server_dir: &Path, archive_path: &Path) -> Result<u64> {
    if !server_dir.is_dir() {
        return Err(EngineError::NotFound(server_dir.display().to_string()));
    }
    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder
        .append_dir_all(".", server_dir)
        .map_err(|e| EngineError::internal(format!("tar append: {e}")))?;
    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| EngineError::internal(format!("tar finish: {e}")))?;

    Ok(std::fs::metadata(archive_path)?.len())
}

/// ステージングしてから入れ替える復元
fn staged_restore(archive_path: &Path, server_dir: &Path, server_name: &str) -> Result<()> {
    let parent = server_dir
        .parent()
        .ok_or_else(|| EngineError::internal("server dir has no parent"))?;
    std::fs::create_dir_all(parent)?;

    // 1. 同一ファイルシステム上でステージング展開
    let staging = tempfile::tempdir_in(parent)?;
    let file = std::fs::File::open(archive_path)?;
    let decoder = GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive
        .unpack(staging.path())
        .map_err(|e| EngineError::internal(format!("tar unpack: {e}")))?;

    // 2. 現行を退避してから入れ替え
    let displaced = parent.join(format!(
        ".{server_name}-pre-restore-{}",
        Utc::now().format("%Y%m%d%H%M%S")
    ));
    if server_dir.exists() {
        std::fs::rename(server_dir, &displaced)?;
    }
    let staging_path = staging.keep();
    if let Err(e) = std::fs::rename(&staging_path, server_dir) {
        // 入れ替えに失敗したら現行を戻す
        let _ = std::fs::rename(&displaced, server_dir);
        let _ = std::fs::remove_dir_all(&staging_path);
        return Err(e.into());
    }
    if displaced.exists() {
        std::fs::remove_dir_all(&displaced)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use minefleet_core::EngineFamily;

    struct Fixture {
        _dir: tempfile::TempDir,
        registry: Arc<Registry>,
        service: BackupService,
        config: EngineConfig,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            servers_base_dir: dir.path().join("servers"),
            registry_path: dir.path().join("registry.json"),
            cache_dir: dir.path().join("cache"),
            backups_dir: dir.path().join("backups"),
            ..EngineConfig::default()
        };
        let registry = Arc::new(Registry::open(&config.registry_path).unwrap());
        let service = BackupService::new(registry.clone(), config.clone());
        Fixture {
            _dir: dir,
            registry,
            service,
            config,
        }
    }

    async fn seeded_server(f: &Fixture) -> ServerRecord {
        let record = f
            .registry
            .create_server(ServerRecord::new(
                "alpha",
                EngineFamily::Vanilla,
                "1.20.4",
                25565,
                2048,
            ))
            .await
            .unwrap();
        let server_dir = f.config.server_dir(&record.storage);
        std::fs::create_dir_all(server_dir.join("world")).unwrap();
        std::fs::write(server_dir.join("server.properties"), "motd=hello\n").unwrap();
        std::fs::write(server_dir.join("world/level.dat"), b"world data").unwrap();
        record
    }

    /// 作成がCompletedに至り、アーカイブが存在することを確認
    #[tokio::test]
    async fn test_create_backup_completes() {
        let f = fixture();
        let server = seeded_server(&f).await;

        let backup = f
            .service
            .create(&server, Some("manual-1".into()), BackupKind::Manual)
            .await
            .unwrap();

        assert_eq!(backup.status, BackupStatus::Completed);
        assert!(backup.size_bytes.unwrap() > 0);
        assert!(Path::new(backup.archive_path.as_ref().unwrap()).is_file());
    }

    /// ディレクトリ欠落時にFailedへ遷移することを確認
    #[tokio::test]
    async fn test_create_backup_fails_without_dir() {
        let f = fixture();
        let server = f
            .registry
            .create_server(ServerRecord::new(
                "ghost",
                EngineFamily::Vanilla,
                "1.20.4",
                25566,
                1024,
            ))
            .await
            .unwrap();

        let backup = f
            .service
            .create(&server, None, BackupKind::Manual)
            .await
            .unwrap();
        assert_eq!(backup.status, BackupStatus::Failed);
    }

    /// 復元が内容を入れ替えることを確認
    #[tokio::test]
    async fn test_restore_replaces_content() {
        let f = fixture();
        let server = seeded_server(&f).await;
        let backup = f
            .service
            .create(&server, None, BackupKind::Manual)
            .await
            .unwrap();

        // バックアップ後に内容を壊す
        let server_dir = f.config.server_dir(&server.storage);
        std::fs::write(server_dir.join("server.properties"), "motd=corrupted\n").unwrap();
        std::fs::remove_file(server_dir.join("world/level.dat")).unwrap();

        f.service.restore(&server, backup.id).await.unwrap();

        let motd = std::fs::read_to_string(server_dir.join("server.properties")).unwrap();
        assert_eq!(motd, "motd=hello\n");
        assert!(server_dir.join("world/level.dat").is_file());
    }

    /// 稼働中サーバーの復元が拒否されることを確認
    #[tokio::test]
    async fn test_restore_rejected_while_live() {
        let f = fixture();
        let server = seeded_server(&f).await;
        let backup = f
            .service
            .create(&server, None, BackupKind::Manual)
            .await
            .unwrap();

        let mut live = server.clone();
        live.state = LifecycleState::Running;
        let err = f.service.restore(&live, backup.id).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
    }

    /// 削除でアーカイブとレコードが消えることを確認
    #[tokio::test]
    async fn test_delete_removes_archive_and_record() {
        let f = fixture();
        let server = seeded_server(&f).await;
        let backup = f
            .service
            .create(&server, None, BackupKind::Manual)
            .await
            .unwrap();
        let archive = PathBuf::from(backup.archive_path.as_ref().unwrap());

        f.service.delete(backup.id).await.unwrap();
        assert!(!archive.exists());
        assert_eq!(
            f.registry.get_backup(backup.id).await.unwrap_err().kind(),
            "NotFound"
        );
    }

    /// scheduled-backups=falseのサーバーが定期対象から外れることを確認
    #[tokio::test]
    async fn test_scheduled_eligibility_is_configurable() {
        let f = fixture();
        let server = seeded_server(&f).await;

        let mut patch = minefleet_registry::ServerPatch::default();
        let mut properties = server.properties.clone();
        properties.insert("scheduled-backups".to_string(), "false".to_string());
        patch.properties = Some(properties);
        f.registry.update_server(server.id, patch).await.unwrap();

        let count = f.service.run_scheduled().await.unwrap();
        assert_eq!(count, 0);
    }
}
