//! アーティファクトインストーラー
//!
//! サーバーディレクトリ内に実行可能な実体（スクリプトまたはjar）を保証します。
//! 既存ディレクトリの自律検出を最優先し、なければ取得計画を実行します。

use crate::cache::ArtifactCache;
use crate::resolver::{FetchPlan, VersionResolver};
use minefleet_catalog::CatalogClient;
use minefleet_core::{EngineError, EngineFamily, Result, Runnable, RunnableKind};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// インストーラー実行の上限時間（10分）
const INSTALLER_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// InstallerFailedに載せるstderrの行数
const STDERR_TAIL_LINES: usize = 20;

/// 優先順の起動スクリプト名
const SCRIPT_NAMES: [&str; 4] = ["run.sh", "start.sh", "run.bat", "start.bat"];

/// jar名の優先キーワード
const JAR_KEYWORDS: [&str; 10] = [
    "server", "forge", "neoforge", "fabric", "paper", "spigot", "bukkit", "purpur", "folia",
    "minecraft",
];

/// ディレクトリ内の実行体を自律検出
///
/// 優先順: run.sh → start.sh → run.bat → start.bat → jar。
/// jarはインストーラー・ライブラリを除外し、エンジンキーワードを含む名前を
/// 優先、なければ名前順の先頭を選びます。
pub fn detect_runnable(dir: &Path) -> Result<Option<Runnable>> {
    for name in SCRIPT_NAMES {
        let path = dir.join(name);
        if path.is_file() {
            debug!(path = %path.display(), "runnable script detected");
            return Ok(Some(Runnable {
                kind: RunnableKind::Script,
                path,
            }));
        }
    }

    let mut jars: Vec<PathBuf> = Vec::new();
    if dir.is_dir() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if path.is_file()
                && name.ends_with(".jar")
                && !name.contains("installer")
                && !name.contains("library")
            {
                jars.push(path);
            }
        }
    }
    jars.sort();

    let preferred = jars.iter().find(|path| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        JAR_KEYWORDS.iter().any(|kw| name.contains(kw))
    });

    Ok(preferred.or(jars.first()).map(|path| {
        debug!(path = %path.display(), "runnable jar detected");
        Runnable {
            kind: RunnableKind::Jar,
            path: path.clone(),
        }
    }))
}

pub struct ArtifactInstaller {
    resolver: std::sync::Arc<VersionResolver>,
    catalog: std::sync::Arc<CatalogClient>,
    cache: ArtifactCache,
}

impl ArtifactInstaller {
    pub fn new(
        resolver: std::sync::Arc<VersionResolver>,
        catalog: std::sync::Arc<CatalogClient>,
        cache: ArtifactCache,
    ) -> Self {
        Self {
            resolver,
            catalog,
            cache,
        }
    }

    /// サーバーディレクトリに実行体を保証して記述子を返す
    pub async fn ensure_runnable(
        &self,
        server_dir: &Path,
        engine: EngineFamily,
        version: &str,
        cancel: &CancellationToken,
    ) -> Result<Runnable> {
        std::fs::create_dir_all(server_dir)?;

        // 1. 既存の実行体を検出（事前配置済みディレクトリの再利用）
        if let Some(runnable) = detect_runnable(server_dir)? {
            info!(path = %runnable.path.display(), "existing runnable reused");
            return Ok(runnable);
        }

        // 2. 取得計画
        let plan = self.resolver.resolve(engine, version).await?;

        match plan {
            FetchPlan::DirectJar { url } => {
                let jar_name = format!("{}-server.jar", engine.as_str());
                let jar_path = server_dir.join(&jar_name);
                let bytes = self
                    .fetch_cached(&format!("{}-{version}", engine.as_str()), &url, cancel)
                    .await?;
                std::fs::write(&jar_path, bytes)?;
                info!(path = %jar_path.display(), "server jar installed");
                Ok(Runnable {
                    kind: RunnableKind::Jar,
                    path: jar_path,
                })
            }
            FetchPlan::InstallerRun { url, argv } => {
                let installer_name = url
                    .rsplit('/')
                    .next()
                    .unwrap_or("installer.jar")
                    .to_string();
                let installer_path = server_dir.join(&installer_name);
                let bytes = self
                    .fetch_cached(
                        &format!("{}-{version}-installer", engine.as_str()),
                        &url,
                        cancel,
                    )
                    .await?;
                std::fs::write(&installer_path, bytes)?;

                run_installer(server_dir, &argv).await?;

                // 3. インストーラー出力を再検出
                let runnable = detect_runnable(server_dir)?.ok_or_else(|| {
                    EngineError::InstallerFailed {
                        stderr_tail: "インストーラーは成功しましたが実行体が見つかりません"
                            .to_string(),
                    }
                })?;

                if let Err(e) = std::fs::remove_file(&installer_path) {
                    warn!(path = %installer_path.display(), error = %e, "installer jar cleanup failed");
                }
                info!(path = %runnable.path.display(), "installer produced runnable");
                Ok(runnable)
            }
        }
    }

    /// キャッシュ経由のダウンロード
    async fn fetch_cached(
        &self,
        key: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        if let Some(bytes) = self.cache.get_by_key(key)? {
            debug!(key, "artifact cache hit");
            return Ok(bytes);
        }
        let bytes = self.catalog.download(url, cancel).await.map_err(EngineError::from)?;
        let hash = self.cache.put(&bytes)?;
        self.cache.link(key, &hash)?;
        Ok(bytes)
    }
}

/// 外部インストーラーを実行（10分で打ち切り）
async fn run_installer(server_dir: &Path, argv: &[String]) -> Result<()> {
    let (program, args) = argv.split_first().ok_or_else(|| {
        EngineError::internal("installer argv is empty")
    })?;

    info!(program, ?args, dir = %server_dir.display(), "running installer");
    let child = tokio::process::Command::new(program)
        .args(args)
        .current_dir(server_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let output = match tokio::time::timeout(INSTALLER_TIMEOUT, child.wait_with_output()).await {
        Ok(output) => output?,
        Err(_) => {
            return Err(EngineError::Timeout(
                "インストーラーの実行が10分を超えました".to_string(),
            ));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::InstallerFailed {
            stderr_tail: tail_lines(&stderr, STDERR_TAIL_LINES),
        });
    }
    Ok(())
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}
