//! カタログHTTPクライアント
//!
//! - メタデータ要求: 30秒タイムアウト、5xxのみ指数バックオフで最大3回再試行
//! - ダウンロード: 5分タイムアウト、500MB上限、チャンク間でキャンセル応答
//! - バルク照会: 100件ずつに分割

use crate::error::{CatalogError, Result};
use crate::schema::{Envelope, FileDetail, ModMetadata, ModpackMeta, Paging, SearchHit};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// ダウンロードサイズ上限（500MB）
pub const DOWNLOAD_CEILING_BYTES: u64 = 500 * 1024 * 1024;

/// メタデータ要求のタイムアウト
const METADATA_TIMEOUT: Duration = Duration::from_secs(30);
/// ダウンロードのタイムアウト
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// 再試行回数（冪等なGETのみ）
const MAX_RETRIES: u32 = 3;
/// バルク照会の1リクエスト上限
const BATCH_CHUNK: usize = 100;
/// 同時リクエスト数の上限
const MAX_INFLIGHT: usize = 8;

/// 対象ゲームのカタログID
const GAME_ID: u32 = 432;
/// モッドパックのクラスID
const MODPACK_CLASS_ID: u32 = 4471;

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.curseforge.com".to_string(),
            api_key: None,
        }
    }
}

impl CatalogConfig {
    pub fn with_api_key(api_key: Option<String>) -> Self {
        Self {
            api_key,
            ..Default::default()
        }
    }
}

pub struct CatalogClient {
    http: reqwest::Client,
    config: CatalogConfig,
    inflight: Semaphore,
}

impl CatalogClient {
    pub fn new(config: CatalogConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("minefleet/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CatalogError::Upstream(e.to_string()))?;
        Ok(Self {
            http,
            config,
            inflight: Semaphore::new(MAX_INFLIGHT),
        })
    }

    /// カタログ機能が有効かどうか
    pub fn is_enabled(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or(CatalogError::Disabled)
    }

    /// 冪等なGETを再試行付きで実行してデコード
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let api_key = self.api_key()?.to_string();
        let url = format!("{}{}", self.config.base_url, path);
        let _permit = self.inflight.acquire().await.expect("semaphore closed");

        let mut last_err = CatalogError::Upstream("no attempt made".to_string());
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // 指数バックオフ: 500ms, 1s, 2s
                let delay = Duration::from_millis(500 * (1 << (attempt - 1)));
                tokio::time::sleep(delay).await;
            }

            let response = self
                .http
                .get(&url)
                .query(query)
                .header("x-api-key", &api_key)
                .timeout(METADATA_TIMEOUT)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp
                            .json::<T>()
                            .await
                            .map_err(|e| CatalogError::Decode(e.to_string()));
                    }
                    // 4xxは即時失敗、5xxのみ再試行
                    if status.is_client_error() {
                        return Err(CatalogError::Upstream(format!("{url}: {status}")));
                    }
                    warn!(url = %url, status = %status, attempt, "catalog request failed, retrying");
                    last_err = CatalogError::Upstream(format!("{url}: {status}"));
                }
                Err(e) => {
                    if e.is_timeout() {
                        return Err(CatalogError::Timeout(url));
                    }
                    warn!(url = %url, error = %e, attempt, "catalog request failed, retrying");
                    last_err = e.into();
                }
            }
        }
        Err(last_err)
    }

    /// モッドパック検索
    pub async fn search(
        &self,
        query: &str,
        game_version: Option<&str>,
        page: u32,
    ) -> Result<(Vec<SearchHit>, Option<Paging>)> {
        let page_size = 20u32;
        let mut params = vec![
            ("gameId", GAME_ID.to_string()),
            ("classId", MODPACK_CLASS_ID.to_string()),
            ("searchFilter", query.to_string()),
            ("sortField", "2".to_string()),
            ("sortOrder", "desc".to_string()),
            ("index", (page * page_size).to_string()),
            ("pageSize", page_size.to_string()),
        ];
        if let Some(version) = game_version {
            params.push(("gameVersion", version.to_string()));
        }

        let envelope: Envelope<Vec<SearchHit>> = self.get_json("/v1/mods/search", &params).await?;
        Ok((envelope.data, envelope.pagination))
    }

    /// モッドパックのメタデータ
    pub async fn modpack_meta(&self, id: i64) -> Result<ModpackMeta> {
        let envelope: Envelope<ModpackMeta> =
            self.get_json(&format!("/v1/mods/{id}"), &[]).await?;
        Ok(envelope.data)
    }

    /// モッドパックの説明文（HTML）
    pub async fn modpack_description(&self, id: i64) -> Result<String> {
        let envelope: Envelope<String> = self
            .get_json(&format!("/v1/mods/{id}/description"), &[])
            .await?;
        Ok(envelope.data)
    }

    /// モッドパックのファイル一覧
    pub async fn modpack_files(
        &self,
        id: i64,
        game_version: Option<&str>,
    ) -> Result<Vec<FileDetail>> {
        let mut params = vec![("pageSize", "50".to_string())];
        if let Some(version) = game_version {
            params.push(("gameVersion", version.to_string()));
        }
        let envelope: Envelope<Vec<FileDetail>> = self
            .get_json(&format!("/v1/mods/{id}/files"), &params)
            .await?;
        Ok(envelope.data)
    }

    /// 単一ファイルの詳細
    pub async fn file_detail(&self, id: i64, file_id: i64) -> Result<FileDetail> {
        let envelope: Envelope<FileDetail> = self
            .get_json(&format!("/v1/mods/{id}/files/{file_id}"), &[])
            .await?;
        Ok(envelope.data)
    }

    /// ファイルの変更履歴（HTML）
    pub async fn file_changelog(&self, id: i64, file_id: i64) -> Result<String> {
        let envelope: Envelope<String> = self
            .get_json(&format!("/v1/mods/{id}/files/{file_id}/changelog"), &[])
            .await?;
        Ok(envelope.data)
    }

    /// モッドメタデータのバルク照会（100件ずつ分割）
    pub async fn mod_metadata_batch(&self, ids: &[i64]) -> Result<Vec<ModMetadata>> {
        let api_key = self.api_key()?.to_string();
        let url = format!("{}/v1/mods", self.config.base_url);

        let mut all = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_CHUNK) {
            let _permit = self.inflight.acquire().await.expect("semaphore closed");
            debug!(count = chunk.len(), "bulk mod lookup");

            let response = self
                .http
                .post(&url)
                .header("x-api-key", &api_key)
                .timeout(METADATA_TIMEOUT)
                .json(&serde_json::json!({ "modIds": chunk }))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(CatalogError::Upstream(format!("{url}: {status}")));
            }

            let envelope: Envelope<Vec<ModMetadata>> = response
                .json()
                .await
                .map_err(|e| CatalogError::Decode(e.to_string()))?;
            all.extend(envelope.data);
        }
        Ok(all)
    }

    /// バイナリをダウンロード
    ///
    /// Content-Lengthまたは受信済みバイト数が上限を超えた時点で中断します。
    /// チャンク間でキャンセルトークンに応答します。
    pub async fn download(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let _permit = self.inflight.acquire().await.expect("semaphore closed");

        let fut = async {
            let response = self.http.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(CatalogError::Upstream(format!("{url}: {status}")));
            }

            if let Some(length) = response.content_length() {
                if length > DOWNLOAD_CEILING_BYTES {
                    return Err(CatalogError::TooLarge {
                        limit_mb: DOWNLOAD_CEILING_BYTES / (1024 * 1024),
                    });
                }
            }

            let mut body: Vec<u8> = Vec::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                if cancel.is_cancelled() {
                    return Err(CatalogError::Cancelled);
                }
                let chunk = chunk?;
                if body.len() as u64 + chunk.len() as u64 > DOWNLOAD_CEILING_BYTES {
                    return Err(CatalogError::TooLarge {
                        limit_mb: DOWNLOAD_CEILING_BYTES / (1024 * 1024),
                    });
                }
                body.extend_from_slice(&chunk);
            }
            Ok(body)
        };

        match tokio::time::timeout(DOWNLOAD_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => Err(CatalogError::Timeout(url.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// APIキー未設定でメタデータ操作が即時失敗することを確認
    #[tokio::test]
    async fn test_disabled_without_api_key() {
        let client = CatalogClient::new(CatalogConfig::default()).unwrap();
        assert!(!client.is_enabled());

        let err = client.modpack_meta(123).await.unwrap_err();
        assert!(matches!(err, CatalogError::Disabled));

        let err = client.search("atm", None, 0).await.unwrap_err();
        assert!(matches!(err, CatalogError::Disabled));

        let err = client.mod_metadata_batch(&[1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, CatalogError::Disabled));
    }

    /// バルク照会のチャンク分割境界を確認
    #[test]
    fn test_batch_chunking_boundaries() {
        let ids: Vec<i64> = (0..250).collect();
        let chunks: Vec<_> = ids.chunks(BATCH_CHUNK).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 100);
        assert_eq!(chunks[2].len(), 50);
    }
}
