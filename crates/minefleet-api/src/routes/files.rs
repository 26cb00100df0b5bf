//! サーバースコープのファイル操作ハンドラー
//!
//! パス検証はSafeFiles側でいかなる変更よりも先に行われます。

use crate::error::{ApiError, ApiResult};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use minefleet_core::files::FileEntry;
use minefleet_core::EngineError;
use minefleet_engine::Engine;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct MkdirRequest {
    pub path: String,
}

pub async fn files_list(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<Vec<FileEntry>>> {
    let record = engine.registry.get_server(id).await?;
    Ok(Json(engine.files(&record).list(&query.path)?))
}

pub async fn files_read(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    Query(query): Query<PathQuery>,
) -> ApiResult<String> {
    let record = engine.registry.get_server(id).await?;
    Ok(engine.files(&record).read_text(&query.path)?)
}

pub async fn files_download(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    Query(query): Query<PathQuery>,
) -> ApiResult<impl IntoResponse> {
    let record = engine.registry.get_server(id).await?;
    let bytes = engine.files(&record).read_bytes(&query.path)?;
    let filename = query
        .path
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("download")
        .to_string();
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

pub async fn files_write(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    Json(request): Json<WriteRequest>,
) -> ApiResult<StatusCode> {
    let record = engine.registry.get_server(id).await?;
    engine
        .files(&record)
        .write(&request.path, request.content.as_bytes())?;
    Ok(StatusCode::NO_CONTENT)
}

/// multipartアップロード（fileフィールドの内容を書き込む）
pub async fn files_upload(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    Query(query): Query<PathQuery>,
    mut multipart: Multipart,
) -> ApiResult<StatusCode> {
    let record = engine.registry.get_server(id).await?;
    let files = engine.files(&record);

    let mut uploaded = false;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError(EngineError::InvalidRequest(format!("multipart: {e}")))
    })? {
        let name = field.file_name().map(|n| n.to_string());
        let data = field.bytes().await.map_err(|e| {
            ApiError(EngineError::InvalidRequest(format!("multipart: {e}")))
        })?;
        let target = match &name {
            Some(filename) if query.path.is_empty() => filename.clone(),
            Some(filename) => format!("{}/{}", query.path.trim_end_matches('/'), filename),
            None => query.path.clone(),
        };
        files.write(&target, &data)?;
        uploaded = true;
    }

    if !uploaded {
        return Err(ApiError(EngineError::InvalidRequest(
            "アップロードするファイルがありません".to_string(),
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn files_mkdir(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    Json(request): Json<MkdirRequest>,
) -> ApiResult<StatusCode> {
    let record = engine.registry.get_server(id).await?;
    engine.files(&record).mkdir(&request.path)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn files_delete(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    Query(query): Query<PathQuery>,
) -> ApiResult<StatusCode> {
    let record = engine.registry.get_server(id).await?;
    engine.files(&record).delete(&query.path)?;
    Ok(StatusCode::NO_CONTENT)
}
