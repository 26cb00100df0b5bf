use thiserror::Error;

/// コントロールプレーン全体で共有する閉じたエラー集合
///
/// HTTP/WSの応答には `kind()` の安定した識別子が載ります。
/// 内部エラー（`Internal`）の詳細文字列はログにのみ出力され、
/// 利用者にはそのまま露出しません。
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("対象が見つかりません: {0}")]
    NotFound(String),

    #[error("サーバー名 '{0}' は既に使用されています")]
    ConflictName(String),

    #[error(
        "ポート {0} は既に使用されています\n\nヒント:\n  • 別のポート番号を指定してください\n  • minefleet ps で使用中のポートを確認できます"
    )]
    ConflictPort(u16),

    #[error("不正なパスです: {0}")]
    InvalidPath(String),

    #[error("不正なリクエスト: {0}")]
    InvalidRequest(String),

    #[error("サーバー '{0}' は起動していません")]
    NotRunning(String),

    #[error("サーバー '{0}' は既に起動しています")]
    AlreadyRunning(String),

    #[error("サーバー '{0}' は既に停止しています")]
    AlreadyStopped(String),

    #[error(
        "カタログ機能は無効です\n\nヒント:\n  • 環境変数 CATALOG_API_KEY を設定してください"
    )]
    CatalogDisabled,

    #[error("上流サービスに接続できません: {0}")]
    UpstreamUnavailable(String),

    #[error("ダウンロードサイズが上限（{limit_mb}MB）を超えています")]
    DownloadTooLarge { limit_mb: u64 },

    #[error("チェックサムが一致しません: {path}")]
    ChecksumMismatch { path: String },

    #[error("インストーラーの実行に失敗しました:\n{stderr_tail}")]
    InstallerFailed { stderr_tail: String },

    #[error("manifest.json がアーカイブ内に見つかりません")]
    ManifestMissing,

    #[error("manifest.json を解釈できません: {0}")]
    ManifestInvalid(String),

    #[error("セッションが見つかりません: {0}")]
    UnknownSession(String),

    #[error("購読者が配信に追従できないため切断されました")]
    SlowConsumer,

    #[error("タイムアウトしました: {0}")]
    Timeout(String),

    #[error("呼び出し元によってキャンセルされました")]
    CancelledByCaller,

    // 内部詳細はDisplayに載せない（ログのみ）
    #[error("内部エラーが発生しました")]
    Internal(String),
}

impl EngineError {
    /// API応答に載せる安定した識別子
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "NotFound",
            EngineError::ConflictName(_) => "ConflictName",
            EngineError::ConflictPort(_) => "ConflictPort",
            EngineError::InvalidPath(_) => "InvalidPath",
            EngineError::InvalidRequest(_) => "InvalidRequest",
            EngineError::NotRunning(_) => "NotRunning",
            EngineError::AlreadyRunning(_) => "AlreadyRunning",
            EngineError::AlreadyStopped(_) => "AlreadyStopped",
            EngineError::CatalogDisabled => "CatalogDisabled",
            EngineError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            EngineError::DownloadTooLarge { .. } => "DownloadTooLarge",
            EngineError::ChecksumMismatch { .. } => "ChecksumMismatch",
            EngineError::InstallerFailed { .. } => "InstallerFailed",
            EngineError::ManifestMissing => "ManifestMissing",
            EngineError::ManifestInvalid(_) => "ManifestInvalid",
            EngineError::UnknownSession(_) => "UnknownSession",
            EngineError::SlowConsumer => "SlowConsumer",
            EngineError::Timeout(_) => "Timeout",
            EngineError::CancelledByCaller => "CancelledByCaller",
            EngineError::Internal(_) => "Internal",
        }
    }

    /// 内部エラーを生成（詳細はtracingへ、表示は安定メッセージ）
    pub fn internal(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        tracing::error!(detail = %detail, "internal error");
        EngineError::Internal(detail)
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => EngineError::NotFound(err.to_string()),
            _ => EngineError::internal(format!("io error: {err}")),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::internal(format!("json error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    /// kindがAPI契約どおりの識別子を返すことを確認
    #[test]
    fn test_error_kind_is_stable() {
        assert_eq!(EngineError::ConflictName("alpha".into()).kind(), "ConflictName");
        assert_eq!(EngineError::ConflictPort(25565).kind(), "ConflictPort");
        assert_eq!(EngineError::CatalogDisabled.kind(), "CatalogDisabled");
        assert_eq!(EngineError::SlowConsumer.kind(), "SlowConsumer");
    }

    /// Internalの詳細がDisplayへ露出しないことを確認
    #[test]
    fn test_internal_message_is_stable() {
        let err = EngineError::Internal("secret detail".into());
        assert!(!err.to_string().contains("secret detail"));
    }

    /// io::ErrorのNotFoundがNotFoundへ写像されることを確認
    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EngineError = io.into();
        assert_eq!(err.kind(), "NotFound");
    }
}
