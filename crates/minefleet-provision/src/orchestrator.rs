//! プロビジョニングオーケストレーター
//!
//! リクエスト受理後すぐにセッションIDを返し、実作業は背景タスクで
//! マイルストーンを配信しながら進みます。モッドのダウンロードは
//! セマフォで5並列に制限され、個別失敗は数えるだけで致命にしません。

use crate::manifest::{classify_modloader, PackManifest};
use crate::progress::ProgressChannel;
use minefleet_catalog::{CatalogClient, ModListCache, ModListEntry};
use minefleet_core::{
    EngineConfig, EngineError, ModpackRecord, Result, ServerRecord, Storage,
};
use minefleet_registry::Registry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// モッドダウンロードの同時実行上限
const MOD_DOWNLOAD_CONCURRENCY: usize = 5;

/// モッドパックからのサーバー構築リクエスト
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub display_name: String,
    pub description: Option<String>,
    pub catalog_modpack_id: i64,
    pub catalog_file_id: i64,
    pub requested_port: u16,
    pub memory_mb: u32,
    pub jvm_opts: Option<String>,
    pub storage_path: Option<String>,
}

struct ActiveSession {
    cancel: CancellationToken,
    server_id: Option<Uuid>,
}

pub struct Orchestrator {
    catalog: Arc<CatalogClient>,
    registry: Arc<Registry>,
    progress: Arc<ProgressChannel>,
    config: EngineConfig,
    mod_list_cache: ModListCache,
    active: Mutex<HashMap<String, ActiveSession>>,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<CatalogClient>,
        registry: Arc<Registry>,
        progress: Arc<ProgressChannel>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            registry,
            progress,
            config,
            mod_list_cache: ModListCache::default(),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// プロビジョニングを開始してセッションIDを即時に返す
    pub async fn provision(self: &Arc<Self>, request: ProvisionRequest) -> String {
        let session_id = self.progress.create_session();
        let cancel = CancellationToken::new();
        self.active.lock().await.insert(
            session_id.clone(),
            ActiveSession {
                cancel: cancel.clone(),
                server_id: None,
            },
        );

        let this = self.clone();
        let id = session_id.clone();
        tokio::spawn(async move {
            this.run(&id, request, cancel).await;
        });
        session_id
    }

    /// セッションをキャンセル
    pub async fn cancel_session(&self, session_id: &str) -> bool {
        let active = self.active.lock().await;
        match active.get(session_id) {
            Some(session) => {
                session.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// サーバーIDに紐づく進行中セッションをキャンセル（削除時）
    pub async fn cancel_for_server(&self, server_id: Uuid) -> bool {
        let active = self.active.lock().await;
        for session in active.values() {
            if session.server_id == Some(server_id) {
                session.cancel.cancel();
                return true;
            }
        }
        false
    }

    async fn run(self: &Arc<Self>, session_id: &str, request: ProvisionRequest, cancel: CancellationToken) {
        let result = self.pipeline(session_id, &request, &cancel).await;
        match result {
            Ok(server_id) => {
                info!(session_id, server_id = %server_id, "provisioning complete");
                self.progress.complete(session_id, server_id);
            }
            Err(err) => {
                warn!(session_id, kind = err.kind(), "provisioning failed");
                self.progress.error(session_id, err.to_string());
            }
        }
        self.active.lock().await.remove(session_id);
    }

    /// 線形のResultパイプライン
    ///
    /// どのステップの失敗も一時ディレクトリの後始末（TempDirのスコープ）を
    /// 逃しません。
    async fn pipeline(
        &self,
        session_id: &str,
        request: &ProvisionRequest,
        cancel: &CancellationToken,
    ) -> Result<Uuid> {
        let progress = &self.progress;

        // 1. メタデータとファイル詳細を並行取得
        progress.progress(session_id, "fetching", 5, "カタログ情報を取得中");
        let (file, meta) = tokio::join!(
            self.catalog
                .file_detail(request.catalog_modpack_id, request.catalog_file_id),
            self.catalog.modpack_meta(request.catalog_modpack_id),
        );
        let file = file.map_err(EngineError::from)?;
        let meta = meta.map_err(EngineError::from)?;
        ensure_not_cancelled(cancel)?;

        // 2. アーカイブのダウンロード（500MB上限はクライアント側で強制）
        progress.progress(session_id, "downloading", 15, "モッドパックをダウンロード中");
        let archive_url = file.download_url.clone().ok_or_else(|| {
            EngineError::UpstreamUnavailable("ダウンロードURLが提供されていません".to_string())
        })?;
        let archive = self
            .catalog
            .download(&archive_url, cancel)
            .await
            .map_err(EngineError::from)?;
        ensure_not_cancelled(cancel)?;

        // 3. 一時ディレクトリへ展開（スコープ束縛で必ず片付く）
        progress.progress(session_id, "extracting", 35, "アーカイブを展開中");
        let temp = tempfile::tempdir()?;
        let dest = temp.path().to_path_buf();
        tokio::task::spawn_blocking(move || extract_zip(&archive, &dest))
            .await
            .map_err(|e| EngineError::internal(format!("extract task: {e}")))??;
        ensure_not_cancelled(cancel)?;

        // 4. マニフェストの解釈とモッドローダー分類
        progress.progress(session_id, "parsing", 45, "マニフェストを解釈中");
        let manifest_path = temp.path().join("manifest.json");
        if !manifest_path.is_file() {
            return Err(EngineError::ManifestMissing);
        }
        let manifest = PackManifest::parse(&std::fs::read_to_string(&manifest_path)?)?;
        let (engine, version) = classify_modloader(&manifest);

        // 5. モッドパックレコードのupsert
        progress.progress(session_id, "database", 55, "モッドパック情報を保存中");
        self.registry
            .upsert_modpack(ModpackRecord {
                catalog_id: request.catalog_modpack_id,
                name: meta.name.clone(),
                authors: meta.authors.iter().map(|a| a.name.clone()).collect(),
                game_version: manifest.minecraft.version.clone(),
                modloader: engine.as_str().to_string(),
                download_url: Some(archive_url),
                icon_url: meta.logo.as_ref().map(|l| l.url.clone()),
                updated_at: chrono::Utc::now(),
            })
            .await?;

        // 6. ポート割当
        progress.progress(session_id, "port", 48, "ポートを割当中");
        let port = self.registry.find_available_port(request.requested_port).await;

        // 7. サーバーレコードをStoppedで作成
        progress.progress(session_id, "creating", 50, "サーバーレコードを作成中");
        let mut record =
            ServerRecord::new(&request.display_name, engine, version, port, request.memory_mb);
        record.description = request.description.clone();
        record.java_opts = request.jvm_opts.clone().unwrap_or_default();
        record.modpack_id = Some(request.catalog_modpack_id);
        if let Some(path) = &request.storage_path {
            record.storage = Storage::BindPath(path.clone());
        }
        let record = self.registry.create_server(record).await?;
        if let Some(session) = self.active.lock().await.get_mut(session_id) {
            session.server_id = Some(record.id);
        }

        // 8. オーバーライドの配置とマニフェストの保存（ブロッキングI/Oは退避）
        progress.progress(session_id, "copying", 55, "設定ファイルを配置中");
        let server_dir = self.config.server_dir(&record.storage);
        {
            let server_dir = server_dir.clone();
            let overrides_dir = temp.path().join(&manifest.overrides);
            let manifest_path = manifest_path.clone();
            tokio::task::spawn_blocking(move || -> Result<()> {
                std::fs::create_dir_all(&server_dir)?;
                if overrides_dir.is_dir() {
                    copy_dir_recursive(&overrides_dir, &server_dir)?;
                }
                std::fs::copy(&manifest_path, server_dir.join("modpack-manifest.json"))?;
                Ok(())
            })
            .await
            .map_err(|e| EngineError::internal(format!("copy task: {e}")))??;
        }
        ensure_not_cancelled(cancel)?;

        // 9. モッドの一括ダウンロード
        self.download_mods(session_id, &manifest, &server_dir, cancel)
            .await?;

        // 10. 後始末
        progress.progress(session_id, "cleanup", 95, "一時ファイルを削除中");
        drop(temp);

        Ok(record.id)
    }

    /// モッドの一括ダウンロード（5並列、個別失敗は数えるだけ）
    ///
    /// 1つも成功しなかった場合のみセッション全体を失敗させます。
    async fn download_mods(
        &self,
        session_id: &str,
        manifest: &PackManifest,
        server_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let total = manifest.files.len() as u32;
        if total == 0 {
            return Ok(());
        }

        let mods_dir = server_dir.join("mods");
        std::fs::create_dir_all(&mods_dir)?;

        let semaphore = Arc::new(Semaphore::new(MOD_DOWNLOAD_CONCURRENCY));
        let mut handles = Vec::with_capacity(manifest.files.len());
        for file_ref in &manifest.files {
            let catalog = self.catalog.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let mods_dir = mods_dir.clone();
            let (project_id, file_id) = (file_ref.project_id, file_ref.file_id);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                if cancel.is_cancelled() {
                    return Err(EngineError::CancelledByCaller);
                }
                let detail = catalog
                    .file_detail(project_id, file_id)
                    .await
                    .map_err(EngineError::from)?;
                let url = detail.download_url.ok_or_else(|| {
                    EngineError::UpstreamUnavailable(format!(
                        "mod {project_id}/{file_id} にダウンロードURLがありません"
                    ))
                })?;
                let bytes = catalog.download(&url, &cancel).await.map_err(EngineError::from)?;
                tokio::fs::write(mods_dir.join(&detail.file_name), bytes).await?;
                Ok::<_, EngineError>(detail.file_name)
            }));
        }

        let mut succeeded: u32 = 0;
        let mut completed: u32 = 0;
        for handle in handles {
            match handle.await {
                Ok(Ok(file_name)) => {
                    succeeded += 1;
                    completed += 1;
                    self.progress.progress_counted(
                        session_id,
                        "downloading-mods",
                        mod_percent(completed, total),
                        format!("{file_name} を取得しました"),
                        completed,
                        total,
                    );
                }
                Ok(Err(EngineError::CancelledByCaller)) => {
                    return Err(EngineError::CancelledByCaller);
                }
                Ok(Err(err)) => {
                    completed += 1;
                    warn!(session_id, kind = err.kind(), "mod download failed");
                    self.progress.progress_counted(
                        session_id,
                        "downloading-mods",
                        mod_percent(completed, total),
                        "モッドの取得に失敗しました（継続します）",
                        completed,
                        total,
                    );
                }
                Err(e) => {
                    completed += 1;
                    warn!(session_id, error = %e, "mod download task panicked");
                }
            }
        }

        if succeeded == 0 {
            return Err(EngineError::UpstreamUnavailable(
                "すべてのモッドのダウンロードに失敗しました".to_string(),
            ));
        }
        Ok(())
    }

    /// モッドリスト展開（メタデータのみの読み取り経路）
    ///
    /// アーカイブからマニフェストだけを読み、projectIDを一括照会して
    /// 結合します。結果は(modpack_id, file_id)ごとに30分キャッシュされます。
    pub async fn mod_list(
        &self,
        modpack_id: i64,
        file_id: i64,
    ) -> Result<Arc<Vec<ModListEntry>>> {
        let catalog = self.catalog.clone();
        self.mod_list_cache
            .get_or_fetch(modpack_id, file_id, || async move {
                let detail = catalog
                    .file_detail(modpack_id, file_id)
                    .await
                    .map_err(EngineError::from)?;
                let url = detail.download_url.ok_or_else(|| {
                    EngineError::UpstreamUnavailable(
                        "ダウンロードURLが提供されていません".to_string(),
                    )
                })?;
                let archive = catalog
                    .download(&url, &CancellationToken::new())
                    .await
                    .map_err(EngineError::from)?;

                let manifest =
                    tokio::task::spawn_blocking(move || read_manifest_from_zip(&archive))
                        .await
                        .map_err(|e| EngineError::internal(format!("manifest task: {e}")))??;

                let ids: Vec<i64> = manifest.files.iter().map(|f| f.project_id).collect();
                let metadata = catalog
                    .mod_metadata_batch(&ids)
                    .await
                    .map_err(EngineError::from)?;
                let by_id: HashMap<i64, _> =
                    metadata.into_iter().map(|m| (m.id, m)).collect();

                Ok(manifest
                    .files
                    .iter()
                    .map(|f| {
                        let meta = by_id.get(&f.project_id);
                        ModListEntry {
                            project_id: f.project_id,
                            file_id: f.file_id,
                            required: f.required,
                            name: meta.map(|m| m.name.clone()),
                            slug: meta.map(|m| m.slug.clone()),
                            summary: meta.and_then(|m| m.summary.clone()),
                            logo: meta.and_then(|m| m.logo.as_ref().map(|l| l.url.clone())),
                            website_url: meta
                                .and_then(|m| m.links.as_ref())
                                .and_then(|l| l.website_url.clone()),
                        }
                    })
                    .collect())
            })
            .await
    }

    /// 最新ファイルのモッドリスト
    pub async fn latest_mod_list(&self, modpack_id: i64) -> Result<Arc<Vec<ModListEntry>>> {
        let files = self
            .catalog
            .modpack_files(modpack_id, None)
            .await
            .map_err(EngineError::from)?;
        let latest = files
            .last()
            .ok_or_else(|| EngineError::NotFound(format!("modpack {modpack_id} のファイル")))?;
        self.mod_list(modpack_id, latest.id).await
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(EngineError::CancelledByCaller)
    } else {
        Ok(())
    }
}

/// モッドダウンロード段階の進捗率: 60 + floor(done/total * 20)
fn mod_percent(done: u32, total: u32) -> u8 {
    (60 + (done as u64 * 20 / total.max(1) as u64)) as u8
}

/// zipアーカイブを展開
fn extract_zip(bytes: &[u8], dest: &Path) -> Result<()> {
    let reader = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| EngineError::ManifestInvalid(format!("アーカイブを開けません: {e}")))?;
    archive
        .extract(dest)
        .map_err(|e| EngineError::ManifestInvalid(format!("アーカイブを展開できません: {e}")))?;
    Ok(())
}

/// zipからmanifest.jsonだけを読む（全展開を避ける）
fn read_manifest_from_zip(bytes: &[u8]) -> Result<PackManifest> {
    use std::io::Read;

    let reader = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| EngineError::ManifestInvalid(format!("アーカイブを開けません: {e}")))?;
    let mut file = archive
        .by_name("manifest.json")
        .map_err(|_| EngineError::ManifestMissing)?;
    let mut json = String::new();
    file.read_to_string(&mut json)
        .map_err(|e| EngineError::ManifestInvalid(e.to_string()))?;
    PackManifest::parse(&json)
}

/// ディレクトリの再帰コピー
fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}
