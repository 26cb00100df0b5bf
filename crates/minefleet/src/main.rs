mod client;
mod commands;

use clap::{Parser, Subcommand};
use minefleet_core::EngineError;

/// 終了コード: 0 成功 / 1 一般失敗 / 2 設定不備 / 3 外部依存の障害
const EXIT_FAILURE: i32 = 1;
const EXIT_MISCONFIGURATION: i32 = 2;
const EXIT_UPSTREAM: i32 = 3;

#[derive(Parser)]
#[command(
    name = "minefleet",
    version,
    about = "ゲームサーバー群を単一ホストで管理するコントロールプレーン"
)]
struct Cli {
    /// 稼働中デーモンのAPIアドレス（start/stop/logs等で使用）
    #[arg(
        long,
        global = true,
        default_value = "http://127.0.0.1:8700",
        env = "MINEFLEET_API_URL"
    )]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// コントロールプレーンデーモンを起動
    Serve {
        /// 待ち受けアドレス
        #[arg(long, default_value = "127.0.0.1:8700")]
        addr: String,
    },
    /// サーバー一覧を表示
    Ps,
    /// サーバーレコードを作成
    Create {
        /// サーバー名（一意）
        name: String,
        /// エンジン系統（vanilla / paper / fabric / forge / …）
        #[arg(long)]
        engine: String,
        /// バージョン文字列（系統ごとに意味が異なる）
        #[arg(long)]
        version: String,
        #[arg(long, default_value_t = 25565)]
        port: u16,
        /// メモリ（MB）
        #[arg(long, default_value_t = 2048)]
        memory: u32,
        /// デーモン起動時に自動起動する
        #[arg(long)]
        auto_start: bool,
    },
    /// サーバーを削除
    Delete {
        name: String,
        /// 確認なしで削除
        #[arg(long)]
        yes: bool,
    },
    /// サーバーを起動（デーモン経由）
    Start { name: String },
    /// サーバーを停止（デーモン経由）
    Stop {
        name: String,
        /// 猶予なしで強制停止
        #[arg(long)]
        force: bool,
    },
    /// サーバーを再起動（デーモン経由）
    Restart { name: String },
    /// コンソールコマンドを送信（デーモン経由）
    Cmd { name: String, text: String },
    /// コンソールログを表示（デーモン経由）
    Logs {
        name: String,
        /// 追跡表示
        #[arg(short, long)]
        follow: bool,
    },
    /// 利用可能なバージョン一覧
    Versions { engine: String },
    /// モッドパックからサーバーを構築
    Provision {
        /// カタログのモッドパックID
        #[arg(long)]
        modpack_id: i64,
        /// カタログのファイルID
        #[arg(long)]
        file_id: i64,
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 25565)]
        port: u16,
        #[arg(long, default_value_t = 4096)]
        memory: u32,
    },
    /// バックアップ操作
    Backup {
        #[command(subcommand)]
        action: commands::backup::BackupAction,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minefleet=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let result = run(cli).await;

    if let Err(err) = result {
        eprintln!("{err:#}");
        std::process::exit(exit_code(&err));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let daemon = client::DaemonClient::new(cli.api_url);

    match cli.command {
        Commands::Serve { addr } => commands::serve::handle(&addr).await,
        Commands::Ps => commands::ps::handle(&daemon).await,
        Commands::Create {
            name,
            engine,
            version,
            port,
            memory,
            auto_start,
        } => {
            commands::create::handle(&daemon, name, engine, version, port, memory, auto_start)
                .await
        }
        Commands::Delete { name, yes } => commands::delete::handle(&daemon, name, yes).await,
        Commands::Start { name } => commands::lifecycle::start(&daemon, &name).await,
        Commands::Stop { name, force } => commands::lifecycle::stop(&daemon, &name, force).await,
        Commands::Restart { name } => commands::lifecycle::restart(&daemon, &name).await,
        Commands::Cmd { name, text } => commands::lifecycle::command(&daemon, &name, &text).await,
        Commands::Logs { name, follow } => commands::logs::handle(&daemon, &name, follow).await,
        Commands::Versions { engine } => commands::versions::handle(&daemon, &engine).await,
        Commands::Provision {
            modpack_id,
            file_id,
            name,
            port,
            memory,
        } => commands::provision::handle(&daemon, modpack_id, file_id, name, port, memory).await,
        Commands::Backup { action } => commands::backup::handle(&daemon, action).await,
    }
}

/// エラー種別から終了コードを決める
fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(engine_err) = err.downcast_ref::<EngineError>() {
        return match engine_err.kind() {
            "CatalogDisabled" | "UpstreamUnavailable" | "Timeout" => EXIT_UPSTREAM,
            "InvalidRequest" | "InvalidPath" => EXIT_MISCONFIGURATION,
            _ => EXIT_FAILURE,
        };
    }
    if let Some(kind) = err.downcast_ref::<client::RemoteError>().map(|e| e.kind.as_str()) {
        return match kind {
            "CatalogDisabled" | "UpstreamUnavailable" | "Timeout" => EXIT_UPSTREAM,
            "InvalidRequest" | "InvalidPath" => EXIT_MISCONFIGURATION,
            _ => EXIT_FAILURE,
        };
    }
    EXIT_FAILURE
}
