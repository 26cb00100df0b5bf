//! バックアップ操作のハンドラー

use crate::error::ApiResult;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use minefleet_core::{BackupKind, BackupRecord};
use minefleet_engine::Engine;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBackupRequest {
    pub display_name: Option<String>,
}

pub async fn backups_list(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<BackupRecord>>> {
    engine.registry.get_server(id).await?;
    Ok(Json(engine.registry.list_backups(id).await))
}

pub async fn backups_create(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    Json(body): Json<CreateBackupRequest>,
) -> ApiResult<(StatusCode, Json<BackupRecord>)> {
    let server = engine.registry.get_server(id).await?;
    let display_name = body.display_name;
    let record = engine
        .backups
        .create(&server, display_name, BackupKind::Manual)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn backups_get(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BackupRecord>> {
    Ok(Json(engine.registry.get_backup(id).await?))
}

pub async fn backups_delete(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    engine.backups.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn backups_restore(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let backup = engine.registry.get_backup(id).await?;
    let server = engine.registry.get_server(backup.server_id).await?;
    engine.backups.restore(&server, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 保持日数を超えたバックアップの削除
pub async fn backups_prune(
    State(engine): State<Arc<Engine>>,
) -> ApiResult<Json<serde_json::Value>> {
    let pruned = engine.backups.prune_expired().await?;
    Ok(Json(serde_json::json!({ "pruned": pruned })))
}

/// 定期バックアップの実行（外部cronからの起動を想定）
pub async fn backups_run_scheduled(
    State(engine): State<Arc<Engine>>,
) -> ApiResult<Json<serde_json::Value>> {
    let count = engine.backups.run_scheduled().await?;
    Ok(Json(serde_json::json!({ "count": count })))
}
