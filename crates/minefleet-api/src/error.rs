//! APIエラー応答
//!
//! 閉じたエラー集合を `{kind, message, context}` のJSONへ写像します。
//! `Internal` の詳細はログにのみ残り、応答には安定メッセージが載ります。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use minefleet_core::EngineError;
use serde_json::json;

pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::NotFound(_) | EngineError::UnknownSession(_) => StatusCode::NOT_FOUND,
            EngineError::ConflictName(_)
            | EngineError::ConflictPort(_)
            | EngineError::NotRunning(_)
            | EngineError::AlreadyRunning(_)
            | EngineError::AlreadyStopped(_) => StatusCode::CONFLICT,
            EngineError::InvalidPath(_)
            | EngineError::InvalidRequest(_)
            | EngineError::ManifestMissing
            | EngineError::ManifestInvalid(_)
            | EngineError::CancelledByCaller => StatusCode::BAD_REQUEST,
            EngineError::CatalogDisabled => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            EngineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EngineError::DownloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            EngineError::SlowConsumer => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::ChecksumMismatch { .. }
            | EngineError::InstallerFailed { .. }
            | EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "kind": self.0.kind(),
            "message": self.0.to_string(),
            "context": serde_json::Value::Null,
        });
        (self.status(), Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
