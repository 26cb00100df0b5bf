use crate::client::DaemonClient;
use colored::Colorize;
use minefleet_core::{EngineError, EngineFamily};
use serde_json::json;

/// サーバーレコードを作成（デーモン経由）
pub async fn handle(
    daemon: &DaemonClient,
    name: String,
    engine_name: String,
    version: String,
    port: u16,
    memory: u32,
    auto_start: bool,
) -> anyhow::Result<()> {
    // エンジン系統はデーモンへ送る前に検証する（設定不備は終了コード2）
    EngineFamily::parse(&engine_name).ok_or_else(|| {
        EngineError::InvalidRequest(format!(
            "未知のエンジン系統です: {engine_name}\n利用可能: vanilla, paper, spigot, bukkit, fabric, forge, neoforge, quilt, purpur, folia"
        ))
    })?;

    let created = daemon
        .post(
            "/api/servers",
            Some(json!({
                "name": name,
                "engine": engine_name,
                "version": version,
                "port": port,
                "memoryMb": memory,
                "autoStart": auto_start,
            })),
        )
        .await?;

    println!("{} サーバーを作成しました", "✓".green());
    println!(
        "  名前: {}",
        created["name"].as_str().unwrap_or(&name).cyan()
    );
    println!(
        "  ID: {}",
        created["id"].as_str().unwrap_or("-").dimmed()
    );
    println!(
        "  エンジン: {} {}",
        created["engine"].as_str().unwrap_or("-").to_lowercase(),
        created["version"].as_str().unwrap_or("-")
    );
    println!("  ポート: {}", created["port"].as_u64().unwrap_or(0));
    println!();
    println!("起動するには: minefleet start {}", name.cyan());
    Ok(())
}
