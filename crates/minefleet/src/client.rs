//! デーモンAPIクライアント
//!
//! レジストリとスーパーバイザーを保持するプロセスはデーモンただ1つです。
//! CLIの操作コマンドはすべてHTTP API経由でそのデーモンに依頼し、
//! 自前の競合する状態を持ちません。

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;

/// デーモンが返したエラー応答
#[derive(Debug, Deserialize)]
pub struct RemoteError {
    pub kind: String,
    pub message: String,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RemoteError {}

pub struct DaemonClient {
    base_url: String,
    http: reqwest::Client,
}

impl DaemonClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn decode(response: reqwest::Response) -> anyhow::Result<Value> {
        let status = response.status();
        if status.is_success() {
            if status == reqwest::StatusCode::NO_CONTENT {
                return Ok(Value::Null);
            }
            return Ok(response.json().await.unwrap_or(Value::Null));
        }
        let remote: RemoteError = response
            .json()
            .await
            .unwrap_or_else(|_| RemoteError {
                kind: "Internal".to_string(),
                message: format!("デーモンがエラーを返しました: {status}"),
            });
        Err(remote.into())
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<Value> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .with_context(|| {
                format!(
                    "デーモンに接続できません（{}）。minefleet serve は起動していますか？",
                    self.base_url
                )
            })?;
        Self::decode(response).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> anyhow::Result<Value> {
        let mut request = self.http.post(format!("{}{path}", self.base_url));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.with_context(|| {
            format!(
                "デーモンに接続できません（{}）。minefleet serve は起動していますか？",
                self.base_url
            )
        })?;
        Self::decode(response).await
    }

    pub async fn delete(&self, path: &str) -> anyhow::Result<Value> {
        let response = self
            .http
            .delete(format!("{}{path}", self.base_url))
            .send()
            .await
            .with_context(|| {
                format!(
                    "デーモンに接続できません（{}）。minefleet serve は起動していますか？",
                    self.base_url
                )
            })?;
        Self::decode(response).await
    }

    /// WebSocketエンドポイントのURL
    pub fn ws_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.replacen("http", "ws", 1))
    }

    /// サーバー名からIDを引く
    pub async fn server_id(&self, name: &str) -> anyhow::Result<String> {
        let servers = self.get("/api/servers").await?;
        let id = servers
            .as_array()
            .and_then(|list| {
                list.iter()
                    .find(|s| s["name"].as_str() == Some(name))
                    .and_then(|s| s["id"].as_str())
                    .map(String::from)
            })
            .ok_or_else(|| anyhow::anyhow!("サーバー '{name}' が見つかりません"))?;
        Ok(id)
    }
}
