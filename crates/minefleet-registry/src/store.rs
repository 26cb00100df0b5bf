//! レジストリ本体

use crate::port::find_available_port;
use chrono::Utc;
use minefleet_core::{
    BackupRecord, EngineError, LifecycleState, ModpackRecord, Result, ServerRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// 予約可能なポートの下限（特権ポートは割り当てない）
const PORT_MIN: u16 = 1024;

/// 永続化されるドキュメント全体
#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    servers: HashMap<Uuid, ServerRecord>,
    #[serde(default)]
    modpacks: HashMap<i64, ModpackRecord>,
    #[serde(default)]
    backups: HashMap<Uuid, BackupRecord>,
}

/// サーバーレコードの部分更新
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub port: Option<u16>,
    pub memory_mb: Option<u32>,
    pub java_opts: Option<String>,
    pub auto_start: Option<bool>,
    pub game: Option<minefleet_core::GameOptions>,
    pub properties: Option<std::collections::BTreeMap<String, String>>,
}

/// サーバーレジストリ
///
/// 全変更は内部Mutexで直列化されます。読み出しはスナップショットを返し、
/// 内部バッファを外へ貸し出しません。
pub struct Registry {
    path: PathBuf,
    doc: Mutex<Document>,
}

impl Registry {
    /// 永続化先を指定してレジストリを開く（存在しなければ空で開始）
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)
                .map_err(|e| EngineError::internal(format!("registry parse: {e}")))?
        } else {
            Document::default()
        };
        info!(path = %path.display(), "registry opened");
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    /// アトミック書き込み（一時ファイル + rename）
    fn persist(&self, doc: &Document) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    // ---- サーバー ----

    /// サーバーレコードを作成
    ///
    /// 名前・ポートの衝突検査と挿入は同一クリティカルセクション内で行われ、
    /// 並行作成のどちらか一方だけが成功します。
    pub async fn create_server(&self, record: ServerRecord) -> Result<ServerRecord> {
        let mut doc = self.doc.lock().await;

        if doc.servers.values().any(|s| s.name == record.name) {
            return Err(EngineError::ConflictName(record.name));
        }
        if record.port < PORT_MIN {
            return Err(EngineError::InvalidRequest(format!(
                "ポートは{PORT_MIN}以上を指定してください: {}",
                record.port
            )));
        }
        if doc.servers.values().any(|s| s.port == record.port) {
            return Err(EngineError::ConflictPort(record.port));
        }

        doc.servers.insert(record.id, record.clone());
        self.persist(&doc)?;
        info!(id = %record.id, name = %record.name, port = record.port, "server created");
        Ok(record)
    }

    pub async fn get_server(&self, id: Uuid) -> Result<ServerRecord> {
        let doc = self.doc.lock().await;
        doc.servers
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    pub async fn get_server_by_name(&self, name: &str) -> Result<ServerRecord> {
        let doc = self.doc.lock().await;
        doc.servers
            .values()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    /// 全サーバーのスナップショット（名前順）
    pub async fn list_servers(&self) -> Vec<ServerRecord> {
        let doc = self.doc.lock().await;
        let mut servers: Vec<_> = doc.servers.values().cloned().collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        servers
    }

    /// 部分更新（名前・ポートの一意性は更新時も検査）
    pub async fn update_server(&self, id: Uuid, patch: ServerPatch) -> Result<ServerRecord> {
        let mut doc = self.doc.lock().await;

        if let Some(name) = &patch.name {
            if doc.servers.values().any(|s| s.id != id && &s.name == name) {
                return Err(EngineError::ConflictName(name.clone()));
            }
        }
        if let Some(port) = patch.port {
            if doc.servers.values().any(|s| s.id != id && s.port == port) {
                return Err(EngineError::ConflictPort(port));
            }
        }

        let record = doc
            .servers
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        if let Some(name) = patch.name {
            record.name = name;
        }
        if let Some(description) = patch.description {
            record.description = Some(description);
        }
        if let Some(version) = patch.version {
            record.version = version;
        }
        if let Some(port) = patch.port {
            record.port = port;
        }
        if let Some(memory_mb) = patch.memory_mb {
            record.memory_mb = memory_mb;
        }
        if let Some(java_opts) = patch.java_opts {
            record.java_opts = java_opts;
        }
        if let Some(auto_start) = patch.auto_start {
            record.auto_start = auto_start;
        }
        if let Some(game) = patch.game {
            record.game = game;
        }
        if let Some(properties) = patch.properties {
            record.properties = properties;
        }
        record.updated_at = Utc::now();

        let updated = record.clone();
        self.persist(&doc)?;
        Ok(updated)
    }

    /// ライフサイクル状態を更新
    ///
    /// 確定的な遷移（Running / Stopped / Exited / Error）は
    /// スーパーバイザーのイベントストリームからのみ呼ばれます。
    pub async fn set_state(
        &self,
        id: Uuid,
        state: LifecycleState,
        process_handle: Option<String>,
    ) -> Result<ServerRecord> {
        let mut doc = self.doc.lock().await;
        let record = doc
            .servers
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        debug!(id = %id, from = %record.state, to = %state, "state transition");
        record.state = state;
        record.process_handle = process_handle;
        record.updated_at = Utc::now();

        let updated = record.clone();
        self.persist(&doc)?;
        Ok(updated)
    }

    pub async fn delete_server(&self, id: Uuid) -> Result<ServerRecord> {
        let mut doc = self.doc.lock().await;
        let record = doc
            .servers
            .remove(&id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        doc.backups.retain(|_, b| b.server_id != id);
        self.persist(&doc)?;
        info!(id = %id, name = %record.name, "server deleted");
        Ok(record)
    }

    /// 要求ポートから上方向に空きポートを探す
    pub async fn find_available_port(&self, requested: u16) -> u16 {
        let doc = self.doc.lock().await;
        let reserved: Vec<u16> = doc.servers.values().map(|s| s.port).collect();
        find_available_port(requested.max(PORT_MIN), &reserved)
    }

    // ---- モッドパック ----

    /// カタログIDで作成または更新
    pub async fn upsert_modpack(&self, record: ModpackRecord) -> Result<ModpackRecord> {
        let mut doc = self.doc.lock().await;
        doc.modpacks.insert(record.catalog_id, record.clone());
        self.persist(&doc)?;
        Ok(record)
    }

    pub async fn list_modpacks(&self) -> Vec<ModpackRecord> {
        let doc = self.doc.lock().await;
        let mut packs: Vec<_> = doc.modpacks.values().cloned().collect();
        packs.sort_by(|a, b| a.name.cmp(&b.name));
        packs
    }

    pub async fn get_modpack(&self, catalog_id: i64) -> Option<ModpackRecord> {
        let doc = self.doc.lock().await;
        doc.modpacks.get(&catalog_id).cloned()
    }

    // ---- バックアップ ----

    pub async fn insert_backup(&self, record: BackupRecord) -> Result<BackupRecord> {
        let mut doc = self.doc.lock().await;
        doc.backups.insert(record.id, record.clone());
        self.persist(&doc)?;
        Ok(record)
    }

    pub async fn update_backup(&self, record: BackupRecord) -> Result<BackupRecord> {
        let mut doc = self.doc.lock().await;
        if !doc.backups.contains_key(&record.id) {
            return Err(EngineError::NotFound(record.id.to_string()));
        }
        doc.backups.insert(record.id, record.clone());
        self.persist(&doc)?;
        Ok(record)
    }

    pub async fn get_backup(&self, id: Uuid) -> Result<BackupRecord> {
        let doc = self.doc.lock().await;
        doc.backups
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    pub async fn list_backups(&self, server_id: Uuid) -> Vec<BackupRecord> {
        let doc = self.doc.lock().await;
        let mut backups: Vec<_> = doc
            .backups
            .values()
            .filter(|b| b.server_id == server_id)
            .cloned()
            .collect();
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        backups
    }

    pub async fn delete_backup(&self, id: Uuid) -> Result<BackupRecord> {
        let mut doc = self.doc.lock().await;
        let record = doc
            .backups
            .remove(&id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        self.persist(&doc)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minefleet_core::EngineFamily;
    use std::sync::Arc;

    fn open_registry() -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path().join("registry.json")).unwrap();
        (dir, registry)
    }

    fn record(name: &str, port: u16) -> ServerRecord {
        ServerRecord::new(name, EngineFamily::Vanilla, "1.20.4", port, 2048)
    }

    /// 同名サーバーの作成が拒否されることを確認
    #[tokio::test]
    async fn test_name_conflict() {
        let (_dir, registry) = open_registry();
        registry.create_server(record("alpha", 25565)).await.unwrap();
        let err = registry
            .create_server(record("alpha", 25566))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ConflictName");
    }

    /// 同一ポートの作成が拒否されることを確認
    #[tokio::test]
    async fn test_port_conflict() {
        let (_dir, registry) = open_registry();
        registry.create_server(record("alpha", 25565)).await.unwrap();
        let err = registry
            .create_server(record("beta", 25565))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ConflictPort");
    }

    /// 並行作成で片方だけが成功することを確認
    #[tokio::test]
    async fn test_concurrent_create_one_wins() {
        let (_dir, registry) = open_registry();
        let registry = Arc::new(registry);

        let a = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.create_server(record("alpha", 25565)).await })
        };
        let b = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.create_server(record("alpha", 25566)).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let ok_count = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok_count, 1);
        let err = results.iter().find(|r| r.is_err()).unwrap();
        assert_eq!(err.as_ref().unwrap_err().kind(), "ConflictName");
    }

    /// ポート割当が予約済みを飛ばすことを確認
    #[tokio::test]
    async fn test_find_available_port_skips_reserved() {
        let (_dir, registry) = open_registry();
        for (i, port) in (25565..=25570).enumerate() {
            registry
                .create_server(record(&format!("s{i}"), port))
                .await
                .unwrap();
        }
        assert_eq!(registry.find_available_port(25565).await, 25571);
    }

    /// 再オープンでレコードが維持されることを確認
    #[tokio::test]
    async fn test_persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        let registry = Registry::open(&path).unwrap();
        let created = registry.create_server(record("alpha", 25565)).await.unwrap();
        drop(registry);

        let reopened = Registry::open(&path).unwrap();
        let loaded = reopened.get_server(created.id).await.unwrap();
        assert_eq!(loaded.name, "alpha");
        assert_eq!(loaded.port, 25565);
    }

    /// 削除後にレコードが残らないことを確認
    #[tokio::test]
    async fn test_delete_removes_record_and_backups() {
        let (_dir, registry) = open_registry();
        let created = registry.create_server(record("alpha", 25565)).await.unwrap();
        registry
            .insert_backup(BackupRecord::new(
                created.id,
                "alpha-1",
                minefleet_core::BackupKind::Manual,
            ))
            .await
            .unwrap();

        registry.delete_server(created.id).await.unwrap();
        assert_eq!(
            registry.get_server(created.id).await.unwrap_err().kind(),
            "NotFound"
        );
        assert!(registry.list_backups(created.id).await.is_empty());
    }

    /// 特権ポートが拒否されることを確認
    #[tokio::test]
    async fn test_privileged_port_rejected() {
        let (_dir, registry) = open_registry();
        let err = registry
            .create_server(record("alpha", 80))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
    }
}
