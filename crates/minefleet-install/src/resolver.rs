//! バージョンリゾルバー
//!
//! (エンジン, バージョン) を具体的な取得計画へ解決します。
//! 上流ごとのAPI（PaperMC / Mojang / Fabric / Purpur / Maven）を辿り、
//! 直接ダウンロードURLまたはインストーラー実行計画を返します。

use minefleet_core::{EngineError, EngineFamily, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const METADATA_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;

/// 取得計画
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPlan {
    /// 直接ダウンロードできるサーバーjar
    DirectJar { url: String },
    /// インストーラーをダウンロードして実行する
    InstallerRun { url: String, argv: Vec<String> },
}

/// リリースチャネル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionChannel {
    Release,
    Beta,
    Alpha,
}

/// 利用可能なバージョン1件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub id: String,
    pub channel: Option<VersionChannel>,
    /// Forge/Fabric/NeoForgeでは対象ゲームバージョンでグループ化
    pub game_version: Option<String>,
}

/// 上流エンドポイント（テストで差し替え可能）
#[derive(Debug, Clone)]
pub struct Upstreams {
    pub paper: String,
    pub purpur: String,
    pub mojang_manifest: String,
    pub fabric_meta: String,
    pub quilt_meta: String,
    pub bukkit_mirror: String,
    pub forge_maven: String,
    pub forge_promotions: String,
    pub neoforge_maven: String,
}

impl Default for Upstreams {
    fn default() -> Self {
        Self {
            paper: "https://api.papermc.io".to_string(),
            purpur: "https://api.purpurmc.org".to_string(),
            mojang_manifest: "https://piston-meta.mojang.com/mc/game/version_manifest.json"
                .to_string(),
            fabric_meta: "https://meta.fabricmc.net".to_string(),
            quilt_meta: "https://meta.quiltmc.org".to_string(),
            bukkit_mirror: "https://download.getbukkit.org".to_string(),
            forge_maven: "https://maven.minecraftforge.net".to_string(),
            forge_promotions:
                "https://files.minecraftforge.net/net/minecraftforge/forge/promotions_slim.json"
                    .to_string(),
            neoforge_maven: "https://maven.neoforged.net".to_string(),
        }
    }
}

pub struct VersionResolver {
    http: reqwest::Client,
    upstreams: Upstreams,
}

impl Default for VersionResolver {
    fn default() -> Self {
        Self::new(Upstreams::default())
    }
}

// ---- 上流応答のスキーマ ----

#[derive(Debug, Deserialize)]
struct PaperBuilds {
    builds: Vec<PaperBuild>,
}

#[derive(Debug, Deserialize)]
struct PaperBuild {
    build: u32,
    downloads: PaperDownloads,
}

#[derive(Debug, Deserialize)]
struct PaperDownloads {
    application: PaperApplication,
}

#[derive(Debug, Deserialize)]
struct PaperApplication {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PaperProject {
    versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PurpurVersion {
    builds: PurpurBuilds,
}

#[derive(Debug, Deserialize)]
struct PurpurBuilds {
    latest: String,
}

#[derive(Debug, Deserialize)]
struct PurpurProject {
    versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MojangManifest {
    versions: Vec<MojangVersion>,
}

#[derive(Debug, Deserialize)]
struct MojangVersion {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct MojangVersionDetail {
    downloads: MojangDownloads,
}

#[derive(Debug, Deserialize)]
struct MojangDownloads {
    server: Option<MojangServerDownload>,
}

#[derive(Debug, Deserialize)]
struct MojangServerDownload {
    url: String,
}

#[derive(Debug, Deserialize)]
struct FabricGameVersion {
    version: String,
    stable: bool,
}

#[derive(Debug, Deserialize)]
struct ForgePromotions {
    promos: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct NeoForgeVersions {
    versions: Vec<String>,
}

impl VersionResolver {
    pub fn new(upstreams: Upstreams) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("minefleet/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("reqwest client");
        Self { http, upstreams }
    }

    /// 冪等なGETを再試行付きで実行
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut last_err = EngineError::UpstreamUnavailable(url.to_string());
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(500 * (1 << (attempt - 1)))).await;
            }
            let response = self
                .http
                .get(url)
                .timeout(METADATA_TIMEOUT)
                .send()
                .await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.json::<T>().await.map_err(|e| {
                            EngineError::UpstreamUnavailable(format!("{url}: {e}"))
                        });
                    }
                    if status.is_client_error() {
                        return Err(EngineError::UpstreamUnavailable(format!("{url}: {status}")));
                    }
                    warn!(url = %url, status = %status, attempt, "upstream request failed, retrying");
                    last_err = EngineError::UpstreamUnavailable(format!("{url}: {status}"));
                }
                Err(e) => {
                    if e.is_timeout() {
                        return Err(EngineError::Timeout(url.to_string()));
                    }
                    warn!(url = %url, error = %e, attempt, "upstream request failed, retrying");
                    last_err = EngineError::UpstreamUnavailable(e.to_string());
                }
            }
        }
        Err(last_err)
    }

    /// (エンジン, バージョン) を取得計画へ解決
    pub async fn resolve(&self, engine: EngineFamily, version: &str) -> Result<FetchPlan> {
        debug!(engine = %engine, version, "resolving fetch plan");
        match engine {
            EngineFamily::Paper => self.resolve_paper_project("paper", version).await,
            EngineFamily::Folia => self.resolve_paper_project("folia", version).await,
            EngineFamily::Purpur => self.resolve_purpur(version).await,
            EngineFamily::Vanilla => self.resolve_vanilla(version).await,
            EngineFamily::Fabric => Ok(FetchPlan::DirectJar {
                url: format!(
                    "{}/v2/versions/loader/{version}/latest/latest/server/jar",
                    self.upstreams.fabric_meta
                ),
            }),
            EngineFamily::Quilt => Ok(FetchPlan::DirectJar {
                url: format!(
                    "{}/v3/versions/loader/{version}/latest/latest/server/jar",
                    self.upstreams.quilt_meta
                ),
            }),
            EngineFamily::Spigot => Ok(FetchPlan::DirectJar {
                url: format!("{}/spigot/spigot-{version}.jar", self.upstreams.bukkit_mirror),
            }),
            EngineFamily::Bukkit => Ok(FetchPlan::DirectJar {
                url: format!(
                    "{}/craftbukkit/craftbukkit-{version}.jar",
                    self.upstreams.bukkit_mirror
                ),
            }),
            EngineFamily::Forge => {
                // バージョン形式: {mcVersion}-{forgeVersion}
                let jar = format!("forge-{version}-installer.jar");
                Ok(FetchPlan::InstallerRun {
                    url: format!(
                        "{}/net/minecraftforge/forge/{version}/{jar}",
                        self.upstreams.forge_maven
                    ),
                    argv: installer_argv(&jar),
                })
            }
            EngineFamily::NeoForge => {
                let jar = format!("neoforge-{version}-installer.jar");
                Ok(FetchPlan::InstallerRun {
                    url: format!(
                        "{}/releases/net/neoforged/neoforge/{version}/{jar}",
                        self.upstreams.neoforge_maven
                    ),
                    argv: installer_argv(&jar),
                })
            }
        }
    }

    async fn resolve_paper_project(&self, project: &str, version: &str) -> Result<FetchPlan> {
        let builds: PaperBuilds = self
            .get_json(&format!(
                "{}/v2/projects/{project}/versions/{version}/builds",
                self.upstreams.paper
            ))
            .await?;
        let latest = builds.builds.last().ok_or_else(|| {
            EngineError::NotFound(format!("{project} {version} にビルドがありません"))
        })?;
        Ok(FetchPlan::DirectJar {
            url: format!(
                "{}/v2/projects/{project}/versions/{version}/builds/{}/downloads/{}",
                self.upstreams.paper, latest.build, latest.downloads.application.name
            ),
        })
    }

    async fn resolve_purpur(&self, version: &str) -> Result<FetchPlan> {
        let detail: PurpurVersion = self
            .get_json(&format!("{}/v2/purpur/{version}", self.upstreams.purpur))
            .await?;
        Ok(FetchPlan::DirectJar {
            url: format!(
                "{}/v2/purpur/{version}/{}/download",
                self.upstreams.purpur, detail.builds.latest
            ),
        })
    }

    async fn resolve_vanilla(&self, version: &str) -> Result<FetchPlan> {
        let manifest: MojangManifest = self.get_json(&self.upstreams.mojang_manifest).await?;
        let entry = manifest
            .versions
            .iter()
            .find(|v| v.id == version)
            .ok_or_else(|| EngineError::NotFound(format!("バージョン {version}")))?;

        let detail: MojangVersionDetail = self.get_json(&entry.url).await?;
        let server = detail.downloads.server.ok_or_else(|| {
            EngineError::NotFound(format!("バージョン {version} にサーバー配布がありません"))
        })?;
        Ok(FetchPlan::DirectJar { url: server.url })
    }

    /// 利用可能なバージョン一覧（メタデータのみ）
    pub async fn available_versions(&self, engine: EngineFamily) -> Result<Vec<VersionInfo>> {
        match engine {
            EngineFamily::Vanilla => {
                let manifest: MojangManifest =
                    self.get_json(&self.upstreams.mojang_manifest).await?;
                Ok(manifest
                    .versions
                    .into_iter()
                    .map(|v| VersionInfo {
                        channel: Some(match v.kind.as_str() {
                            "release" => VersionChannel::Release,
                            "snapshot" => VersionChannel::Beta,
                            _ => VersionChannel::Alpha,
                        }),
                        id: v.id,
                        game_version: None,
                    })
                    .collect())
            }
            EngineFamily::Paper | EngineFamily::Folia => {
                let project = if engine == EngineFamily::Paper {
                    "paper"
                } else {
                    "folia"
                };
                let detail: PaperProject = self
                    .get_json(&format!("{}/v2/projects/{project}", self.upstreams.paper))
                    .await?;
                Ok(release_versions(detail.versions))
            }
            EngineFamily::Purpur => {
                let detail: PurpurProject = self
                    .get_json(&format!("{}/v2/purpur", self.upstreams.purpur))
                    .await?;
                Ok(release_versions(detail.versions))
            }
            EngineFamily::Fabric | EngineFamily::Quilt => {
                let base = if engine == EngineFamily::Fabric {
                    format!("{}/v2/versions/game", self.upstreams.fabric_meta)
                } else {
                    format!("{}/v3/versions/game", self.upstreams.quilt_meta)
                };
                let versions: Vec<FabricGameVersion> = self.get_json(&base).await?;
                Ok(versions
                    .into_iter()
                    .map(|v| VersionInfo {
                        id: v.version.clone(),
                        channel: Some(if v.stable {
                            VersionChannel::Release
                        } else {
                            VersionChannel::Beta
                        }),
                        game_version: Some(v.version),
                    })
                    .collect())
            }
            EngineFamily::Forge => {
                let promotions: ForgePromotions =
                    self.get_json(&self.upstreams.forge_promotions).await?;
                Ok(promotions
                    .promos
                    .into_iter()
                    .filter_map(|(key, forge_version)| {
                        // キー形式: {mcVersion}-latest / {mcVersion}-recommended
                        let (game_version, tag) = key.rsplit_once('-')?;
                        Some(VersionInfo {
                            id: format!("{game_version}-{forge_version}"),
                            channel: Some(if tag == "recommended" {
                                VersionChannel::Release
                            } else {
                                VersionChannel::Beta
                            }),
                            game_version: Some(game_version.to_string()),
                        })
                    })
                    .collect())
            }
            EngineFamily::NeoForge => {
                let listing: NeoForgeVersions = self
                    .get_json(&format!(
                        "{}/api/maven/versions/releases/net/neoforged/neoforge",
                        self.upstreams.neoforge_maven
                    ))
                    .await?;
                Ok(listing
                    .versions
                    .into_iter()
                    .map(|v| VersionInfo {
                        game_version: Some(neoforge_game_version(&v)),
                        channel: Some(VersionChannel::Release),
                        id: v,
                    })
                    .collect())
            }
            // ミラーに一覧APIがないため空（ユーザー持ち込みjarへのフォールバック前提）
            EngineFamily::Spigot | EngineFamily::Bukkit => Ok(Vec::new()),
        }
    }
}

fn release_versions(versions: Vec<String>) -> Vec<VersionInfo> {
    versions
        .into_iter()
        .map(|id| VersionInfo {
            id,
            channel: Some(VersionChannel::Release),
            game_version: None,
        })
        .collect()
}

fn installer_argv(jar: &str) -> Vec<String> {
    vec![
        "java".to_string(),
        "-jar".to_string(),
        jar.to_string(),
        "--installServer".to_string(),
    ]
}

/// NeoForgeバージョンから対象ゲームバージョンを導出
///
/// `major≥21 && minor==0` なら `1.{major}`、それ以外は `1.{major}.{minor}`。
pub fn neoforge_game_version(version: &str) -> String {
    let mut parts = version.split('.');
    let major: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minor: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    if major >= 21 && minor == 0 {
        format!("1.{major}")
    } else {
        format!("1.{major}.{minor}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fabricの合成URLを確認
    #[tokio::test]
    async fn test_fabric_url_composition() {
        let resolver = VersionResolver::default();
        let plan = resolver
            .resolve(EngineFamily::Fabric, "1.20.4")
            .await
            .unwrap();
        assert_eq!(
            plan,
            FetchPlan::DirectJar {
                url: "https://meta.fabricmc.net/v2/versions/loader/1.20.4/latest/latest/server/jar"
                    .to_string()
            }
        );
    }

    /// Spigotミラーのパターンを確認
    #[tokio::test]
    async fn test_spigot_mirror_url() {
        let resolver = VersionResolver::default();
        let plan = resolver
            .resolve(EngineFamily::Spigot, "1.20.4")
            .await
            .unwrap();
        assert_eq!(
            plan,
            FetchPlan::DirectJar {
                url: "https://download.getbukkit.org/spigot/spigot-1.20.4.jar".to_string()
            }
        );
    }

    /// Forgeがインストーラー実行計画になることを確認
    #[tokio::test]
    async fn test_forge_installer_plan() {
        let resolver = VersionResolver::default();
        let plan = resolver
            .resolve(EngineFamily::Forge, "1.20.1-47.2.0")
            .await
            .unwrap();
        match plan {
            FetchPlan::InstallerRun { url, argv } => {
                assert!(url.ends_with("/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar"));
                assert_eq!(
                    argv,
                    vec!["java", "-jar", "forge-1.20.1-47.2.0-installer.jar", "--installServer"]
                );
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    /// NeoForgeのゲームバージョン導出規則を確認
    #[test]
    fn test_neoforge_game_version_rule() {
        assert_eq!(neoforge_game_version("21.0.167"), "1.21");
        assert_eq!(neoforge_game_version("21.1.95"), "1.21.1");
        assert_eq!(neoforge_game_version("20.4.237"), "1.20.4");
    }

    // ---- スタブ上流を使ったAPI追跡経路 ----

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// パス→JSON本文の固定応答を返す最小HTTPスタブ
    ///
    /// 本文が自身のアドレスを参照できるよう、bind後にルートを構築します。
    /// 登録外のパスには404を返す（4xx即時失敗の経路も踏める）。
    async fn spawn_stub_with(
        build: impl FnOnce(std::net::SocketAddr) -> Vec<(String, String)>,
    ) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = build(addr);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let mut total = 0;
                    loop {
                        match socket.read(&mut buf[total..]).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => total += n,
                        }
                        if buf[..total].windows(4).any(|w| w == b"\r\n\r\n")
                            || total == buf.len()
                        {
                            break;
                        }
                    }
                    let head = String::from_utf8_lossy(&buf[..total]).to_string();
                    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();

                    let response = match routes.iter().find(|(p, _)| *p == path) {
                        Some((_, body)) => format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                            body.len()
                        ),
                        None => {
                            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                                .to_string()
                        }
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        addr
    }

    async fn spawn_stub(routes: Vec<(String, String)>) -> std::net::SocketAddr {
        spawn_stub_with(|_| routes).await
    }

    fn resolver_against(addr: std::net::SocketAddr) -> VersionResolver {
        let base = format!("http://{addr}");
        VersionResolver::new(Upstreams {
            paper: base.clone(),
            purpur: base.clone(),
            mojang_manifest: format!("{base}/mc/game/version_manifest.json"),
            ..Upstreams::default()
        })
    }

    /// PaperのプロジェクトAPIを辿って最新ビルドのURLに至ることを確認
    #[tokio::test]
    async fn test_paper_resolves_latest_build() {
        let addr = spawn_stub(vec![(
            "/v2/projects/paper/versions/1.20.4/builds".to_string(),
            r#"{"builds": [
                {"build": 395, "downloads": {"application": {"name": "paper-1.20.4-395.jar"}}},
                {"build": 396, "downloads": {"application": {"name": "paper-1.20.4-396.jar"}}}
            ]}"#
            .to_string(),
        )])
        .await;

        let plan = resolver_against(addr)
            .resolve(EngineFamily::Paper, "1.20.4")
            .await
            .unwrap();
        assert_eq!(
            plan,
            FetchPlan::DirectJar {
                url: format!(
                    "http://{addr}/v2/projects/paper/versions/1.20.4/builds/396/downloads/paper-1.20.4-396.jar"
                )
            }
        );
    }

    /// 未知バージョンのPaperが4xxで即時失敗することを確認
    #[tokio::test]
    async fn test_paper_unknown_version_fails_fast() {
        let addr = spawn_stub(vec![]).await;
        let err = resolver_against(addr)
            .resolve(EngineFamily::Paper, "9.99.9")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "UpstreamUnavailable");
    }

    /// Purpurの最新ビルド解決を確認
    #[tokio::test]
    async fn test_purpur_resolves_latest_build() {
        let addr = spawn_stub(vec![(
            "/v2/purpur/1.20.4".to_string(),
            r#"{"builds": {"latest": "2062"}}"#.to_string(),
        )])
        .await;

        let plan = resolver_against(addr)
            .resolve(EngineFamily::Purpur, "1.20.4")
            .await
            .unwrap();
        assert_eq!(
            plan,
            FetchPlan::DirectJar {
                url: format!("http://{addr}/v2/purpur/1.20.4/2062/download")
            }
        );
    }

    /// Vanillaのマニフェスト→詳細→server URLの連鎖を確認
    ///
    /// 詳細ドキュメントのURLはマニフェスト内の絶対URLで示される。
    #[tokio::test]
    async fn test_vanilla_manifest_chain() {
        let addr = spawn_stub_with(|addr| {
            vec![
                (
                    "/mc/game/version_manifest.json".to_string(),
                    format!(
                        r#"{{"versions": [
                            {{"id": "24w07a", "type": "snapshot", "url": "http://{addr}/v1/packages/def/24w07a.json"}},
                            {{"id": "1.20.4", "type": "release", "url": "http://{addr}/v1/packages/abc/1.20.4.json"}}
                        ]}}"#
                    ),
                ),
                (
                    "/v1/packages/abc/1.20.4.json".to_string(),
                    r#"{"downloads": {"server": {"url": "https://piston-data.example/server-1.20.4.jar"}}}"#
                        .to_string(),
                ),
            ]
        })
        .await;

        let plan = resolver_against(addr)
            .resolve(EngineFamily::Vanilla, "1.20.4")
            .await
            .unwrap();
        assert_eq!(
            plan,
            FetchPlan::DirectJar {
                url: "https://piston-data.example/server-1.20.4.jar".to_string()
            }
        );
    }

    /// マニフェストに存在しないVanillaバージョンがNotFoundになることを確認
    #[tokio::test]
    async fn test_vanilla_unknown_version_not_found() {
        let addr = spawn_stub(vec![(
            "/mc/game/version_manifest.json".to_string(),
            r#"{"versions": [{"id": "1.20.4", "type": "release", "url": "http://unused.example/x.json"}]}"#
                .to_string(),
        )])
        .await;

        let err = resolver_against(addr)
            .resolve(EngineFamily::Vanilla, "1.99.9")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    /// Paperのバージョン一覧がreleaseチャネルで返ることを確認
    #[tokio::test]
    async fn test_paper_version_listing() {
        let addr = spawn_stub(vec![(
            "/v2/projects/paper".to_string(),
            r#"{"versions": ["1.20.2", "1.20.4"]}"#.to_string(),
        )])
        .await;

        let versions = resolver_against(addr)
            .available_versions(EngineFamily::Paper)
            .await
            .unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[1].id, "1.20.4");
        assert_eq!(versions[1].channel, Some(VersionChannel::Release));
    }
}
