//! 設定ファイルの描画
//!
//! server.properties・eula.txt・JVM引数ファイルをサーバーディレクトリへ書き出します。
//! 起動のたびに呼ばれ、レコードの現在値を反映します。

use minefleet_core::{EngineError, Result, RunnableKind, ServerRecord};
use std::path::Path;
use tera::{Context, Tera};
use tracing::debug;

/// リモートコンソールのポートオフセット
const RCON_PORT_OFFSET: u32 = 10_000;
/// 既知のリモートコンソールパスワード
const RCON_PASSWORD: &str = "minefleet";
/// Xmsの上限（MB）
const MAX_INITIAL_HEAP_MB: u32 = 1024;

/// server.propertiesテンプレート
const PROPERTIES_TEMPLATE: &str = "\
# Generated by MineFleet — edits are overwritten on each start
server-port={{ port }}
motd={{ motd }}
max-players={{ max_players }}
difficulty={{ difficulty }}
gamemode={{ gamemode }}
pvp={{ pvp }}
white-list={{ whitelist }}
online-mode={{ online_mode }}
{% if seed %}level-seed={{ seed }}
{% endif %}enable-rcon=true
rcon.port={{ rcon_port }}
rcon.password={{ rcon_password }}
{% for key, value in properties %}{{ key }}={{ value }}
{% endfor %}";

pub struct ConfigWriter;

impl ConfigWriter {
    /// JVMヒープ引数を構築
    pub fn heap_args(memory_mb: u32) -> (String, String) {
        let initial = memory_mb.min(MAX_INITIAL_HEAP_MB);
        (format!("-Xmx{memory_mb}M"), format!("-Xms{initial}M"))
    }

    /// server.propertiesとeula.txtを描画
    pub fn write_all(server_dir: &Path, record: &ServerRecord) -> Result<()> {
        std::fs::create_dir_all(server_dir)?;

        let mut context = Context::new();
        context.insert("port", &record.port);
        context.insert("motd", &record.game.motd);
        context.insert("max_players", &record.game.max_players);
        context.insert("difficulty", &record.game.difficulty.to_string());
        context.insert("gamemode", &record.game.gamemode.to_string());
        context.insert("pvp", &record.game.pvp);
        context.insert("whitelist", &record.game.whitelist);
        context.insert("online_mode", &record.game.online_mode);
        context.insert("seed", &record.game.seed);
        context.insert("rcon_port", &(record.port as u32 + RCON_PORT_OFFSET));
        context.insert("rcon_password", RCON_PASSWORD);
        context.insert("properties", &record.properties);

        let rendered = Tera::one_off(PROPERTIES_TEMPLATE, &context, false)
            .map_err(|e| EngineError::internal(format!("properties template: {e}")))?;

        std::fs::write(server_dir.join("server.properties"), rendered)?;
        std::fs::write(server_dir.join("eula.txt"), "eula=true\n")?;
        debug!(dir = %server_dir.display(), "config rendered");
        Ok(())
    }

    /// スクリプト起動（Forge/NeoForge）用のJVM引数ファイルを描画
    pub fn write_jvm_args(
        server_dir: &Path,
        record: &ServerRecord,
        kind: RunnableKind,
    ) -> Result<()> {
        if kind != RunnableKind::Script {
            return Ok(());
        }
        let (xmx, xms) = Self::heap_args(record.memory_mb);
        let mut args = format!("{xmx} {xms}");
        if !record.java_opts.is_empty() {
            args.push(' ');
            args.push_str(&record.java_opts);
        }
        args.push('\n');
        std::fs::write(server_dir.join("user_jvm_args.txt"), args)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minefleet_core::EngineFamily;

    fn record() -> ServerRecord {
        let mut record =
            ServerRecord::new("alpha", EngineFamily::Vanilla, "1.20.4", 25565, 2048);
        record.game.motd = "welcome".to_string();
        record
            .properties
            .insert("view-distance".to_string(), "12".to_string());
        record
    }

    /// 描画結果にゲームオプションと固定エントリが含まれることを確認
    #[test]
    fn test_properties_rendering() {
        let dir = tempfile::tempdir().unwrap();
        ConfigWriter::write_all(dir.path(), &record()).unwrap();

        let rendered =
            std::fs::read_to_string(dir.path().join("server.properties")).unwrap();
        assert!(rendered.contains("server-port=25565"));
        assert!(rendered.contains("motd=welcome"));
        assert!(rendered.contains("rcon.port=35565"));
        assert!(rendered.contains("rcon.password=minefleet"));
        assert!(rendered.contains("view-distance=12"));
        // seed未指定なら行ごと省略
        assert!(!rendered.contains("level-seed"));

        let eula = std::fs::read_to_string(dir.path().join("eula.txt")).unwrap();
        assert_eq!(eula, "eula=true\n");
    }

    /// seed指定時にlevel-seedが描画されることを確認
    #[test]
    fn test_seed_rendered_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = record();
        record.game.seed = Some("8675309".to_string());
        ConfigWriter::write_all(dir.path(), &record).unwrap();

        let rendered =
            std::fs::read_to_string(dir.path().join("server.properties")).unwrap();
        assert!(rendered.contains("level-seed=8675309"));
    }

    /// ヒープ引数のXmsが1024MBで頭打ちになることを確認
    #[test]
    fn test_heap_args_cap() {
        assert_eq!(
            ConfigWriter::heap_args(4096),
            ("-Xmx4096M".to_string(), "-Xms1024M".to_string())
        );
        assert_eq!(
            ConfigWriter::heap_args(512),
            ("-Xmx512M".to_string(), "-Xms512M".to_string())
        );
    }

    /// スクリプト起動でだけJVM引数ファイルが書かれることを確認
    #[test]
    fn test_jvm_args_only_for_script() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = record();
        record.memory_mb = 4096;
        record.java_opts = "-XX:+UseG1GC".to_string();

        ConfigWriter::write_jvm_args(dir.path(), &record, RunnableKind::Jar).unwrap();
        assert!(!dir.path().join("user_jvm_args.txt").exists());

        ConfigWriter::write_jvm_args(dir.path(), &record, RunnableKind::Script).unwrap();
        let args = std::fs::read_to_string(dir.path().join("user_jvm_args.txt")).unwrap();
        assert_eq!(args, "-Xmx4096M -Xms1024M -XX:+UseG1GC\n");
    }
}
