//! モッドパックからのサーバー構築（デーモン経由）
//!
//! 構築はデーモン側の背景タスクで走り、このコマンドは
//! WebSocketの進捗チャネルを購読して表示するだけです。

use crate::client::DaemonClient;
use anyhow::Context;
use colored::Colorize;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use minefleet_provision::ProgressEvent;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

pub async fn handle(
    daemon: &DaemonClient,
    modpack_id: i64,
    file_id: i64,
    name: String,
    port: u16,
    memory: u32,
) -> anyhow::Result<()> {
    println!("{}", "📦 モッドパックからサーバーを構築します".blue().bold());
    println!("  モッドパック: {} / ファイル: {}", modpack_id, file_id);
    println!();

    let response = daemon
        .post(
            "/api/modpacks/create-server",
            Some(json!({
                "displayName": name,
                "catalogModpackId": modpack_id,
                "catalogFileId": file_id,
                "requestedPort": port,
                "memoryMb": memory,
            })),
        )
        .await?;
    let session_id = response["sessionId"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("デーモンがセッションIDを返しませんでした"))?
        .to_string();

    // 進捗チャネルを購読
    let ws_url = daemon.ws_url(&format!("/ws/provision/{session_id}"));
    let (mut stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .with_context(|| format!("進捗チャネルに接続できません: {ws_url}"))?;

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{bar:30.cyan/dim} {percent:>3}% {msg}")
            .expect("progress template"),
    );

    let mut outcome: Option<ProgressEvent> = None;
    while outcome.is_none() {
        let Some(message) = stream.next().await else {
            break;
        };
        match message? {
            Message::Text(text) => {
                let Ok(event) = serde_json::from_str::<ProgressEvent>(text.as_str()) else {
                    continue;
                };
                match event {
                    ProgressEvent::Progress {
                        percent,
                        message,
                        current,
                        total,
                        ..
                    } => {
                        bar.set_position(percent as u64);
                        match (current, total) {
                            (Some(current), Some(total)) => {
                                bar.set_message(format!("{message} ({current}/{total})"))
                            }
                            _ => bar.set_message(message),
                        }
                    }
                    event => outcome = Some(event),
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    match outcome {
        Some(ProgressEvent::Complete { server_id }) => {
            bar.finish_with_message("完了");
            println!();
            println!(
                "{} サーバー '{}' を構築しました",
                "✓".green().bold(),
                name.cyan()
            );
            println!("  ID: {}", server_id.to_string().dimmed());
            println!("起動するには: minefleet start {}", name.cyan());
            Ok(())
        }
        Some(ProgressEvent::Error { message }) => {
            bar.abandon_with_message("失敗");
            Err(anyhow::anyhow!("プロビジョニングに失敗しました: {message}"))
        }
        _ => Err(anyhow::anyhow!("進捗チャネルが予期せず閉じられました")),
    }
}
