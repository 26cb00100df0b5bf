use colored::Colorize;
use minefleet_core::EngineConfig;
use minefleet_engine::Engine;

/// デーモン起動: エンジンを組み立て、autoStartを処理し、APIを提供する
///
/// レジストリとスーパーバイザーを保持するのはこのプロセスだけです。
pub async fn handle(addr: &str) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|_| anyhow::anyhow!("待ち受けアドレスを解釈できません: {addr}"))?;

    let config = EngineConfig::from_env();
    let engine = Engine::new(config)?;

    println!("{}", "🚀 MineFleet コントロールプレーン".blue().bold());
    println!(
        "  サーバーディレクトリ: {}",
        engine.config.servers_base_dir.display().to_string().cyan()
    );
    println!(
        "  カタログ: {}",
        if engine.catalog.is_enabled() {
            "有効".green()
        } else {
            "無効（CATALOG_API_KEY未設定）".yellow()
        }
    );
    match &engine.config.backup_cron {
        Some(cron) => {
            println!("  定期バックアップ: {}", cron.cyan());
            println!(
                "    {}",
                "外部cronからは minefleet backup run-scheduled を実行してください".dimmed()
            );
        }
        None => println!("  定期バックアップ: {}", "未設定（BACKUP_CRON）".dimmed()),
    }
    println!("  待ち受け: {}", addr.to_string().cyan());
    println!();

    // autoStart付きレコードを先に立ち上げる
    engine.autostart_all().await;

    minefleet_api::serve(engine, addr).await
}
