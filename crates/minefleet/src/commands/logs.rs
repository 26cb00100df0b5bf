//! コンソールログの表示（デーモン経由）

use crate::client::DaemonClient;
use colored::Colorize;
use std::time::Duration;

/// ログスナップショットの表示と追跡
///
/// 追跡は通番（seq）を基準にスナップショットを定期取得して差分を流します。
pub async fn handle(daemon: &DaemonClient, name: &str, follow: bool) -> anyhow::Result<()> {
    let id = daemon.server_id(name).await?;
    let mut last_seq: Option<u64> = None;

    loop {
        let lines = daemon.get(&format!("/api/servers/{id}/logs")).await?;
        if let Some(lines) = lines.as_array() {
            for line in lines {
                let seq = line["seq"].as_u64().unwrap_or(0);
                if last_seq.map(|last| seq <= last).unwrap_or(false) {
                    continue;
                }
                last_seq = Some(seq);
                print_line(line);
            }
        }

        if !follow {
            break;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    if follow {
        println!();
        println!("{}", "Ctrl+C でログ追跡を終了".dimmed());
    }
    Ok(())
}

fn print_line(line: &serde_json::Value) {
    let text = line["text"].as_str().unwrap_or("");
    match line["stream"].as_str() {
        Some("stderr") => println!("{} {}", "stderr:".red(), text),
        Some("system") => println!("{}", text.cyan()),
        _ => println!("{text}"),
    }
}
