//! バックアップ操作（デーモン経由）

use crate::client::DaemonClient;
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;

#[derive(Subcommand)]
pub enum BackupAction {
    /// バックアップを作成
    Create {
        /// 対象サーバー名
        server: String,
        /// 表示名（省略時は日時から生成）
        #[arg(long)]
        name: Option<String>,
    },
    /// バックアップ一覧
    List {
        /// 対象サーバー名
        server: String,
    },
    /// バックアップから復元（対象サーバーは停止していること）
    Restore {
        /// バックアップID
        id: String,
    },
    /// バックアップを削除
    Delete {
        /// バックアップID
        id: String,
    },
    /// 保持日数を超えたバックアップを削除
    Prune,
    /// 定期バックアップを1回実行（外部cronからの起動用）
    RunScheduled,
}

pub async fn handle(daemon: &DaemonClient, action: BackupAction) -> anyhow::Result<()> {
    match action {
        BackupAction::Create { server, name } => {
            let id = daemon.server_id(&server).await?;
            println!("💾 {} をバックアップ中...", server.cyan());
            let backup = daemon
                .post(
                    &format!("/api/servers/{id}/backups"),
                    Some(json!({ "displayName": name })),
                )
                .await?;
            match backup["status"].as_str() {
                Some("Completed") => {
                    println!(
                        "{} 完了: {} ({})",
                        "✓".green(),
                        backup["displayName"].as_str().unwrap_or("-"),
                        format_size(backup["sizeBytes"].as_u64().unwrap_or(0))
                    );
                }
                _ => {
                    return Err(anyhow::anyhow!(
                        "バックアップに失敗しました: {}",
                        backup["displayName"].as_str().unwrap_or("-")
                    ));
                }
            }
        }
        BackupAction::List { server } => {
            let id = daemon.server_id(&server).await?;
            let backups = daemon.get(&format!("/api/servers/{id}/backups")).await?;
            let backups = backups.as_array().cloned().unwrap_or_default();
            if backups.is_empty() {
                println!("バックアップはまだありません");
                return Ok(());
            }
            for backup in backups {
                let status = match backup["status"].as_str() {
                    Some("Completed") => "completed".green(),
                    Some("Failed") => "failed".red(),
                    Some("InProgress") => "in-progress".yellow(),
                    _ => "pending".dimmed(),
                };
                println!(
                    "{}  {:<28} {:<12} {}",
                    backup["id"].as_str().unwrap_or("-").dimmed(),
                    backup["displayName"].as_str().unwrap_or("-"),
                    status,
                    backup["sizeBytes"]
                        .as_u64()
                        .map(format_size)
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
        BackupAction::Restore { id } => {
            let backup_id: uuid::Uuid = id.parse()?;
            println!("⏪ 復元中...");
            daemon
                .post(&format!("/api/backups/{backup_id}/restore"), None)
                .await?;
            println!("{} 復元しました", "✓".green());
        }
        BackupAction::Delete { id } => {
            let backup_id: uuid::Uuid = id.parse()?;
            daemon.delete(&format!("/api/backups/{backup_id}")).await?;
            println!("{} バックアップを削除しました", "✓".green());
        }
        BackupAction::Prune => {
            let result = daemon.post("/api/backups/prune", None).await?;
            println!(
                "{} 保持期間を超えたバックアップを {} 件削除しました",
                "✓".green(),
                result["pruned"].as_u64().unwrap_or(0)
            );
        }
        BackupAction::RunScheduled => {
            let result = daemon.post("/api/backups/run-scheduled", None).await?;
            println!(
                "{} 定期バックアップを {} 件作成しました",
                "✓".green(),
                result["count"].as_u64().unwrap_or(0)
            );
        }
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.1}GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{}KB", bytes.div_ceil(1024))
    }
}
