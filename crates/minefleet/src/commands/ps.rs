use crate::client::DaemonClient;
use colored::Colorize;

/// サーバー一覧を表示（デーモン経由）
pub async fn handle(daemon: &DaemonClient) -> anyhow::Result<()> {
    let servers = daemon.get("/api/servers").await?;
    let servers = servers.as_array().cloned().unwrap_or_default();

    if servers.is_empty() {
        println!("サーバーはまだありません。minefleet create で作成できます。");
        return Ok(());
    }

    println!(
        "{:<20} {:<10} {:<14} {:<7} {:<8} {}",
        "NAME".bold(),
        "ENGINE".bold(),
        "VERSION".bold(),
        "PORT".bold(),
        "MEMORY".bold(),
        "STATE".bold()
    );
    for server in servers {
        let state = server["state"].as_str().unwrap_or("-").to_string();
        let state = match state.as_str() {
            "Running" => state.green(),
            "Starting" | "Stopping" => state.yellow(),
            "Error" | "Exited" => state.red(),
            _ => state.dimmed(),
        };
        println!(
            "{:<20} {:<10} {:<14} {:<7} {:<8} {}",
            server["name"].as_str().unwrap_or("-"),
            server["engine"].as_str().unwrap_or("-").to_lowercase(),
            server["version"].as_str().unwrap_or("-"),
            server["port"].as_u64().unwrap_or(0),
            format!("{}MB", server["memoryMb"].as_u64().unwrap_or(0)),
            state
        );
    }
    Ok(())
}
