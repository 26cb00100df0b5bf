use crate::client::DaemonClient;
use colored::Colorize;
use minefleet_core::{EngineError, EngineFamily};

/// エンジン系統の利用可能バージョンを表示（デーモン経由）
pub async fn handle(daemon: &DaemonClient, engine_name: &str) -> anyhow::Result<()> {
    let family = EngineFamily::parse(engine_name).ok_or_else(|| {
        EngineError::InvalidRequest(format!("未知のエンジン系統です: {engine_name}"))
    })?;

    let versions = daemon
        .get(&format!("/api/versions/{}", family.as_str()))
        .await?;
    let versions = versions.as_array().cloned().unwrap_or_default();

    if versions.is_empty() {
        println!(
            "{} にはバージョン一覧のAPIがありません（手持ちのjarを配置して使います）",
            family.to_string().yellow()
        );
        return Ok(());
    }

    println!("{}", format!("{family} の利用可能バージョン:").bold());
    for info in versions.iter().take(40) {
        let id = info["id"].as_str().unwrap_or("-");
        let channel = match info["channel"].as_str() {
            Some("release") => "release".green(),
            Some("beta") => "beta".yellow(),
            Some("alpha") => "alpha".red(),
            _ => "-".dimmed(),
        };
        match info["gameVersion"].as_str() {
            Some(game_version) => println!("  {id:<24} {channel}  (game {game_version})"),
            None => println!("  {id:<24} {channel}"),
        }
    }
    if versions.len() > 40 {
        println!("  … 他 {} 件", versions.len() - 40);
    }
    Ok(())
}
