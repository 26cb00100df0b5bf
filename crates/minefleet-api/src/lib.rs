//! MineFleet API — HTTP/WebSocketコントロールプレーン
//!
//! コアエンジンの薄いラッパーです。全ハンドラーは `Arc<Engine>` を
//! 状態として受け取り、エラーは閉じた集合の
//! `{kind, message, context}` で応答します。

mod error;
mod routes;
mod ws;

pub use error::ApiError;

use axum::routing::{get, post};
use axum::Router;
use minefleet_engine::Engine;
use std::sync::Arc;
use tracing::info;

/// ルーターを構築
pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        // サーバー
        .route("/api/servers", get(routes::list_servers).post(routes::create_server))
        .route(
            "/api/servers/{id}",
            get(routes::get_server)
                .patch(routes::update_server)
                .delete(routes::delete_server),
        )
        .route("/api/servers/{id}/start", post(routes::start_server))
        .route("/api/servers/{id}/stop", post(routes::stop_server))
        .route("/api/servers/{id}/restart", post(routes::restart_server))
        .route("/api/servers/{id}/command", post(routes::send_command))
        .route("/api/servers/{id}/logs", get(routes::server_logs))
        .route("/api/versions/{engine}", get(routes::versions))
        // ファイル
        .route(
            "/api/servers/{id}/files",
            get(routes::files_list).delete(routes::files_delete),
        )
        .route("/api/servers/{id}/files/read", get(routes::files_read))
        .route("/api/servers/{id}/files/download", get(routes::files_download))
        .route("/api/servers/{id}/files/write", post(routes::files_write))
        .route("/api/servers/{id}/files/upload", post(routes::files_upload))
        .route("/api/servers/{id}/files/mkdir", post(routes::files_mkdir))
        // モッドパック
        .route("/api/modpacks", get(routes::modpacks_cached))
        .route("/api/modpacks/search", get(routes::modpacks_search))
        .route("/api/modpacks/create-server", post(routes::modpacks_create_server))
        .route("/api/modpacks/{id}", get(routes::modpack_get))
        .route("/api/modpacks/{id}/description", get(routes::modpack_description))
        .route("/api/modpacks/{id}/files", get(routes::modpack_files))
        .route(
            "/api/modpacks/{id}/files/{file_id}/changelog",
            get(routes::modpack_changelog),
        )
        .route(
            "/api/modpacks/{id}/files/{file_id}/mods",
            get(routes::modpack_mods),
        )
        .route("/api/modpacks/{id}/mods", get(routes::modpack_mods_latest))
        // バックアップ
        .route(
            "/api/servers/{id}/backups",
            get(routes::backups_list).post(routes::backups_create),
        )
        .route(
            "/api/backups/{id}",
            get(routes::backups_get).delete(routes::backups_delete),
        )
        .route("/api/backups/{id}/restore", post(routes::backups_restore))
        .route("/api/backups/prune", post(routes::backups_prune))
        .route("/api/backups/run-scheduled", post(routes::backups_run_scheduled))
        // ストリーミング
        .route("/ws/console/{id}", get(ws::console))
        .route("/ws/provision/{session_id}", get(ws::provision))
        .with_state(engine)
}

/// HTTPサーバーを起動
pub async fn serve(engine: Arc<Engine>, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = router(engine);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "control plane listening");
    axum::serve(listener, app).await?;
    Ok(())
}
