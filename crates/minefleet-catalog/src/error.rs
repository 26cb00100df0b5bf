use minefleet_core::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error(
        "カタログ機能は無効です\n\nヒント:\n  • 環境変数 CATALOG_API_KEY を設定してください"
    )]
    Disabled,

    #[error("上流カタログへの接続に失敗しました: {0}")]
    Upstream(String),

    #[error("上流カタログの応答を解釈できません: {0}")]
    Decode(String),

    #[error("ダウンロードサイズが上限（{limit_mb}MB）を超えています")]
    TooLarge { limit_mb: u64 },

    #[error("カタログ要求がタイムアウトしました: {0}")]
    Timeout(String),

    #[error("ダウンロードがキャンセルされました")]
    Cancelled,
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CatalogError::Timeout(err.to_string())
        } else if err.is_decode() {
            CatalogError::Decode(err.to_string())
        } else {
            CatalogError::Upstream(err.to_string())
        }
    }
}

impl From<CatalogError> for EngineError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Disabled => EngineError::CatalogDisabled,
            CatalogError::Upstream(msg) => EngineError::UpstreamUnavailable(msg),
            CatalogError::Decode(msg) => EngineError::UpstreamUnavailable(msg),
            CatalogError::TooLarge { limit_mb } => EngineError::DownloadTooLarge { limit_mb },
            CatalogError::Timeout(msg) => EngineError::Timeout(msg),
            CatalogError::Cancelled => EngineError::CancelledByCaller,
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
