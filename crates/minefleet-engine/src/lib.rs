//! MineFleet Engine — 明示的な合成ルート
//!
//! 起動時に全コンポーネントを組み立てた `Engine` 値を構築します。
//! リクエストハンドラーはグローバルではなく `&Engine` を受け取ります。
//!
//! サーバーの起動・停止・削除といった操作パイプラインはここに集約され、
//! スーパーバイザーのイベントストリームをレジストリへ反映する
//! ミラータスクもEngineが所有します。

use minefleet_backup::BackupService;
use minefleet_catalog::{CatalogClient, CatalogConfig};
use minefleet_core::files::SafeFiles;
use minefleet_core::{
    EngineConfig, EngineError, LifecycleState, Result, ServerRecord, Storage,
};
use minefleet_install::{ArtifactCache, ArtifactInstaller, ConfigWriter, VersionInfo, VersionResolver};
use minefleet_provision::{Orchestrator, ProgressChannel, ProvisionRequest};
use minefleet_registry::Registry;
use minefleet_supervisor::{
    DirectExecutor, HostExecutor, NamespaceExecutor, SubscriptionHub, Supervisor,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

pub use minefleet_provision::ProgressEvent;

/// コントロールプレーン全体のルート値
pub struct Engine {
    pub config: EngineConfig,
    pub registry: Arc<Registry>,
    pub catalog: Arc<CatalogClient>,
    pub hub: Arc<SubscriptionHub>,
    pub supervisor: Arc<Supervisor>,
    pub installer: Arc<ArtifactInstaller>,
    pub resolver: Arc<VersionResolver>,
    pub progress: Arc<ProgressChannel>,
    pub orchestrator: Arc<Orchestrator>,
    pub backups: Arc<BackupService>,
}

impl Engine {
    /// 設定から全コンポーネントを組み立てる
    ///
    /// HOST_SERVERS_PATHが設定されている場合、子プロセスは
    /// ホスト名前空間へ入ってから起動されます（コンテナ内デプロイ）。
    pub fn new(config: EngineConfig) -> Result<Arc<Self>> {
        let registry = Arc::new(Registry::open(&config.registry_path)?);
        let catalog = Arc::new(
            CatalogClient::new(CatalogConfig::with_api_key(config.catalog_api_key.clone()))
                .map_err(EngineError::from)?,
        );
        let hub = Arc::new(SubscriptionHub::new());

        let executor: Arc<dyn HostExecutor> = match &config.host_servers_path {
            Some(host_path) => {
                info!(host_path = %host_path.display(), "using namespace-entering executor");
                Arc::new(NamespaceExecutor::new(
                    config.servers_base_dir.clone(),
                    host_path.clone(),
                ))
            }
            None => Arc::new(DirectExecutor),
        };

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let supervisor = Arc::new(Supervisor::new(executor, hub.clone(), events_tx));

        // スーパーバイザーのイベントをレジストリへ反映するミラータスク
        {
            let registry = registry.clone();
            tokio::spawn(async move {
                while let Some(event) = events_rx.recv().await {
                    if let Err(e) = registry
                        .set_state(event.server_id, event.state, event.process_handle)
                        .await
                    {
                        // レコード削除後に遅れて届いたイベントは無視してよい
                        if e.kind() != "NotFound" {
                            error!(server_id = %event.server_id, kind = e.kind(), "state mirror failed");
                        }
                    }
                }
            });
        }

        let resolver = Arc::new(VersionResolver::default());
        let installer = Arc::new(ArtifactInstaller::new(
            resolver.clone(),
            catalog.clone(),
            ArtifactCache::new(config.cache_dir.clone()),
        ));
        let progress = Arc::new(ProgressChannel::new());
        let orchestrator = Arc::new(Orchestrator::new(
            catalog.clone(),
            registry.clone(),
            progress.clone(),
            config.clone(),
        ));
        let backups = Arc::new(BackupService::new(registry.clone(), config.clone()));

        Ok(Arc::new(Self {
            config,
            registry,
            catalog,
            hub,
            supervisor,
            installer,
            resolver,
            progress,
            orchestrator,
            backups,
        }))
    }

    /// サーバーのストレージディレクトリに閉じたファイル操作
    pub fn files(&self, record: &ServerRecord) -> SafeFiles {
        SafeFiles::new(self.config.server_dir(&record.storage))
    }

    /// 起動パイプライン
    ///
    /// STARTINGを先に予約し、実行体の保証 → 設定描画 → 起動と進みます。
    /// 起動前の失敗は状態をErrorにして呼び出し元へ返します。
    pub async fn start_server(&self, id: Uuid) -> Result<ServerRecord> {
        let record = self.registry.get_server(id).await?;
        if self.supervisor.has_entry(id).await {
            return Err(EngineError::AlreadyRunning(record.name));
        }

        let record = self
            .registry
            .set_state(id, LifecycleState::Starting, None)
            .await?;

        match self.start_pipeline(&record).await {
            Ok(()) => self.registry.get_server(id).await,
            Err(err) => {
                warn!(id = %id, name = %record.name, kind = err.kind(), "start pipeline failed");
                let _ = self
                    .registry
                    .set_state(id, LifecycleState::Error, None)
                    .await;
                self.hub.publish_state(id, LifecycleState::Error);
                Err(err)
            }
        }
    }

    async fn start_pipeline(&self, record: &ServerRecord) -> Result<()> {
        let server_dir = self.config.server_dir(&record.storage);
        std::fs::create_dir_all(&server_dir)?;

        let cancel = CancellationToken::new();
        let runnable = self
            .installer
            .ensure_runnable(&server_dir, record.engine, &record.version, &cancel)
            .await?;

        ConfigWriter::write_all(&server_dir, record)?;
        ConfigWriter::write_jvm_args(&server_dir, record, runnable.kind)?;

        self.supervisor
            .start(record, &runnable, &server_dir, &self.config.default_java_opts)
            .await
    }

    /// 停止パイプライン（猶予付き／強制）
    pub async fn stop_server(&self, id: Uuid, force: bool) -> Result<ServerRecord> {
        let record = self.registry.get_server(id).await?;
        let code = self.supervisor.stop(id, &record.name, force).await?;
        info!(id = %id, name = %record.name, code, "server stopped");
        self.registry.get_server(id).await
    }

    /// 再起動 = 猶予付き停止 → 起動
    pub async fn restart_server(&self, id: Uuid) -> Result<ServerRecord> {
        match self.stop_server(id, false).await {
            Ok(_) => {}
            Err(e) if e.kind() == "AlreadyStopped" => {}
            Err(e) => return Err(e),
        }
        self.start_server(id).await
    }

    /// コマンド注入
    pub async fn send_command(&self, id: Uuid, text: &str) -> Result<()> {
        let record = self.registry.get_server(id).await?;
        self.supervisor.send_command(id, &record.name, text).await
    }

    /// 削除パイプライン
    ///
    /// 進行中のプロビジョニングをキャンセルし、稼働中なら停止してから
    /// レコードを削除します。システムが作成したストレージ
    /// （NamedVolume）はディレクトリごと片付けます。
    pub async fn delete_server(&self, id: Uuid) -> Result<()> {
        let record = self.registry.get_server(id).await?;

        if self.orchestrator.cancel_for_server(id).await {
            info!(id = %id, "active provisioning session cancelled");
        }

        if self.supervisor.has_entry(id).await {
            match self.supervisor.stop(id, &record.name, false).await {
                Ok(_) => {}
                Err(e) if e.kind() == "AlreadyStopped" => {}
                Err(e) => return Err(e),
            }
        }

        self.registry.delete_server(id).await?;
        self.hub.remove_server(id);

        if let Storage::NamedVolume(_) = &record.storage {
            let server_dir = self.config.server_dir(&record.storage);
            if server_dir.exists() {
                std::fs::remove_dir_all(&server_dir)?;
            }
        }
        Ok(())
    }

    /// モッドパックからのプロビジョニング開始
    pub async fn provision(&self, request: ProvisionRequest) -> Result<String> {
        if !self.catalog.is_enabled() {
            return Err(EngineError::CatalogDisabled);
        }
        Ok(self.orchestrator.provision(request).await)
    }

    /// エンジン系統の利用可能バージョン一覧
    pub async fn versions(&self, engine: minefleet_core::EngineFamily) -> Result<Vec<VersionInfo>> {
        self.resolver.available_versions(engine).await
    }

    /// autoStart付きレコードを全て起動（デーモン起動時）
    ///
    /// 個別の失敗はログに残すのみで続行します。
    pub async fn autostart_all(&self) {
        for record in self.registry.list_servers().await {
            if !record.auto_start {
                continue;
            }
            info!(id = %record.id, name = %record.name, "autostarting server");
            if let Err(e) = self.start_server(record.id).await {
                error!(id = %record.id, name = %record.name, kind = e.kind(), "autostart failed");
            }
        }
    }
}
