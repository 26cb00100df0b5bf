use crate::client::DaemonClient;
use colored::Colorize;
use std::io::Write;

/// サーバーを削除（デーモン経由）
///
/// 稼働中の停止と進行中プロビジョニングのキャンセルはデーモン側が行います。
pub async fn handle(daemon: &DaemonClient, name: String, yes: bool) -> anyhow::Result<()> {
    let id = daemon.server_id(&name).await?;

    if !yes {
        print!(
            "サーバー '{}' とそのデータを削除します。よろしいですか？ [y/N] ",
            name.yellow()
        );
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("中止しました");
            return Ok(());
        }
    }

    daemon.delete(&format!("/api/servers/{id}")).await?;
    println!("{} サーバー '{}' を削除しました", "✓".green(), name);
    Ok(())
}
