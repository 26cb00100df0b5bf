//! 起動・停止・再起動・コマンド送信（デーモン経由）

use crate::client::DaemonClient;
use colored::Colorize;
use serde_json::json;

pub async fn start(daemon: &DaemonClient, name: &str) -> anyhow::Result<()> {
    let id = daemon.server_id(name).await?;
    println!("▶ {} を起動中...", name.cyan());
    let record = daemon.post(&format!("/api/servers/{id}/start"), None).await?;
    println!(
        "{} 起動を開始しました（状態: {}）",
        "✓".green(),
        record["state"].as_str().unwrap_or("Starting")
    );
    println!("ログを見るには: minefleet logs {} -f", name.cyan());
    Ok(())
}

pub async fn stop(daemon: &DaemonClient, name: &str, force: bool) -> anyhow::Result<()> {
    let id = daemon.server_id(name).await?;
    if force {
        println!("■ {} を強制停止中...", name.yellow());
    } else {
        println!("■ {} を停止中...", name.cyan());
    }
    daemon
        .post(
            &format!("/api/servers/{id}/stop"),
            Some(json!({ "force": force })),
        )
        .await?;
    println!("{} 停止しました", "✓".green());
    Ok(())
}

pub async fn restart(daemon: &DaemonClient, name: &str) -> anyhow::Result<()> {
    let id = daemon.server_id(name).await?;
    println!("↻ {} を再起動中...", name.cyan());
    daemon
        .post(&format!("/api/servers/{id}/restart"), None)
        .await?;
    println!("{} 再起動を開始しました", "✓".green());
    Ok(())
}

pub async fn command(daemon: &DaemonClient, name: &str, text: &str) -> anyhow::Result<()> {
    let id = daemon.server_id(name).await?;
    daemon
        .post(
            &format!("/api/servers/{id}/command"),
            Some(json!({ "text": text })),
        )
        .await?;
    println!("{} 送信しました: {}", "✓".green(), text.dimmed());
    Ok(())
}
