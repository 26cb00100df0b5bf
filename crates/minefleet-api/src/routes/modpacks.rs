//! モッドパック操作のハンドラー

use crate::error::ApiResult;
use axum::extract::{Path, Query, State};
use axum::Json;
use minefleet_catalog::{FileDetail, ModListEntry, ModpackMeta, Paging, SearchHit};
use minefleet_core::{EngineError, ModpackRecord};
use minefleet_engine::Engine;
use minefleet_provision::ProvisionRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    pub game_version: Option<String>,
    #[serde(default)]
    pub page: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesQuery {
    pub game_version: Option<String>,
}

pub async fn modpacks_search(
    State(engine): State<Arc<Engine>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let (hits, paging) = engine
        .catalog
        .search(&query.query, query.game_version.as_deref(), query.page)
        .await
        .map_err(EngineError::from)?;
    Ok(Json(SearchResponse { hits, paging }))
}

/// 既知のモッドパック（永続キャッシュ）一覧
pub async fn modpacks_cached(State(engine): State<Arc<Engine>>) -> Json<Vec<ModpackRecord>> {
    Json(engine.registry.list_modpacks().await)
}

pub async fn modpack_get(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ModpackMeta>> {
    Ok(Json(
        engine.catalog.modpack_meta(id).await.map_err(EngineError::from)?,
    ))
}

pub async fn modpack_description(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<i64>,
) -> ApiResult<String> {
    Ok(engine
        .catalog
        .modpack_description(id)
        .await
        .map_err(EngineError::from)?)
}

pub async fn modpack_files(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<i64>,
    Query(query): Query<FilesQuery>,
) -> ApiResult<Json<Vec<FileDetail>>> {
    Ok(Json(
        engine
            .catalog
            .modpack_files(id, query.game_version.as_deref())
            .await
            .map_err(EngineError::from)?,
    ))
}

pub async fn modpack_changelog(
    State(engine): State<Arc<Engine>>,
    Path((id, file_id)): Path<(i64, i64)>,
) -> ApiResult<String> {
    Ok(engine
        .catalog
        .file_changelog(id, file_id)
        .await
        .map_err(EngineError::from)?)
}

/// モッドリスト展開（30分キャッシュ・シングルフライト）
pub async fn modpack_mods(
    State(engine): State<Arc<Engine>>,
    Path((id, file_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Vec<ModListEntry>>> {
    let list = engine.orchestrator.mod_list(id, file_id).await?;
    Ok(Json(list.as_ref().clone()))
}

/// 最新ファイルのモッドリスト
pub async fn modpack_mods_latest(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<ModListEntry>>> {
    let list = engine.orchestrator.latest_mod_list(id).await?;
    Ok(Json(list.as_ref().clone()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionResponse {
    pub session_id: String,
}

/// モッドパックからのサーバー構築（セッションIDを即時返却）
pub async fn modpacks_create_server(
    State(engine): State<Arc<Engine>>,
    Json(request): Json<ProvisionRequest>,
) -> ApiResult<Json<ProvisionResponse>> {
    let session_id = engine.provision(request).await?;
    Ok(Json(ProvisionResponse { session_id }))
}
