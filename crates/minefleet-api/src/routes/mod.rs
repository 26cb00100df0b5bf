//! ルートハンドラー

mod backups;
mod files;
mod modpacks;
mod servers;

pub use backups::*;
pub use files::*;
pub use modpacks::*;
pub use servers::*;

use axum::Json;
use serde_json::json;

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "minefleet",
    }))
}
