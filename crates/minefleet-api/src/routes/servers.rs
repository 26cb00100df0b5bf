//! サーバー操作のハンドラー

use crate::error::{ApiError, ApiResult};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use minefleet_core::{
    EngineError, EngineFamily, GameOptions, LogLine, ServerRecord, Storage,
};
use minefleet_engine::Engine;
use minefleet_install::VersionInfo;
use minefleet_registry::ServerPatch;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// サーバー作成リクエスト
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServerRequest {
    pub name: String,
    pub description: Option<String>,
    pub engine: String,
    pub version: String,
    pub port: u16,
    pub memory_mb: u32,
    #[serde(default)]
    pub java_opts: String,
    #[serde(default)]
    pub auto_start: bool,
    pub game: Option<GameOptions>,
    pub storage_path: Option<String>,
}

pub async fn list_servers(State(engine): State<Arc<Engine>>) -> Json<Vec<ServerRecord>> {
    Json(engine.registry.list_servers().await)
}

pub async fn get_server(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ServerRecord>> {
    Ok(Json(engine.registry.get_server(id).await?))
}

pub async fn create_server(
    State(engine): State<Arc<Engine>>,
    Json(request): Json<CreateServerRequest>,
) -> ApiResult<(StatusCode, Json<ServerRecord>)> {
    let family = EngineFamily::parse(&request.engine).ok_or_else(|| {
        ApiError(EngineError::InvalidRequest(format!(
            "未知のエンジン系統です: {}",
            request.engine
        )))
    })?;
    if request.name.trim().is_empty() {
        return Err(ApiError(EngineError::InvalidRequest(
            "サーバー名を指定してください".to_string(),
        )));
    }

    let mut record = ServerRecord::new(
        request.name,
        family,
        request.version,
        request.port,
        request.memory_mb,
    );
    record.description = request.description;
    record.java_opts = request.java_opts;
    record.auto_start = request.auto_start;
    if let Some(game) = request.game {
        record.game = game;
    }
    if let Some(path) = request.storage_path {
        record.storage = Storage::BindPath(path);
    }

    let created = engine.registry.create_server(record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_server(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    Json(patch): Json<ServerPatch>,
) -> ApiResult<Json<ServerRecord>> {
    Ok(Json(engine.registry.update_server(id, patch).await?))
}

pub async fn delete_server(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    engine.delete_server(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start_server(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ServerRecord>> {
    Ok(Json(engine.start_server(id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct StopRequest {
    #[serde(default)]
    pub force: bool,
}

pub async fn stop_server(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    Json(body): Json<StopRequest>,
) -> ApiResult<Json<ServerRecord>> {
    Ok(Json(engine.stop_server(id, body.force).await?))
}

pub async fn restart_server(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ServerRecord>> {
    Ok(Json(engine.restart_server(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub text: String,
}

/// コマンドRPC（応答タイムアウト10秒）
pub async fn send_command(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<StatusCode> {
    tokio::time::timeout(
        std::time::Duration::from_secs(10),
        engine.send_command(id, &request.text),
    )
    .await
    .map_err(|_| ApiError(EngineError::Timeout("コマンド送信".to_string())))??;
    Ok(StatusCode::NO_CONTENT)
}

/// ログリングのスナップショット
pub async fn server_logs(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<LogLine>>> {
    // レコードの存在確認を先に行う
    engine.registry.get_server(id).await?;
    Ok(Json(engine.hub.snapshot_logs(id)))
}

pub async fn versions(
    State(engine): State<Arc<Engine>>,
    Path(engine_name): Path<String>,
) -> ApiResult<Json<Vec<VersionInfo>>> {
    let family = EngineFamily::parse(&engine_name).ok_or_else(|| {
        ApiError(EngineError::InvalidRequest(format!(
            "未知のエンジン系統です: {engine_name}"
        )))
    })?;
    Ok(Json(engine.versions(family).await?))
}
