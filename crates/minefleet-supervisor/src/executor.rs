//! ホスト実行プリミティブ
//!
//! スーパーバイザー自身がコンテナ内で動く構成では、ホスト側の
//! プロセス名前空間へ入ってから子プロセスを起動する必要があります。
//! その分岐を `HostExecutor` 能力として抽象化します。

use minefleet_core::Result;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

/// 子プロセス起動の能力
pub trait HostExecutor: Send + Sync {
    /// argvをcwdで起動する（stdioは全てパイプ）
    fn spawn(&self, argv: &[String], cwd: &Path) -> Result<Child>;
}

/// このプロセスの名前空間で直接fork/execする実装
#[derive(Debug, Default)]
pub struct DirectExecutor;

impl HostExecutor for DirectExecutor {
    fn spawn(&self, argv: &[String], cwd: &Path) -> Result<Child> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| minefleet_core::EngineError::internal("empty argv"))?;

        debug!(program, ?args, cwd = %cwd.display(), "spawning child");
        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()?;
        Ok(child)
    }
}

/// ホストの名前空間へ入ってから起動する実装（コンテナ内デプロイ用）
///
/// argvを `nsenter -t 1` でラップし、cwdをコンテナ内パスから
/// ホスト側パスへ読み替えます。
#[derive(Debug)]
pub struct NamespaceExecutor {
    /// コンテナ内のサーバーベースディレクトリ
    container_base: PathBuf,
    /// ホスト側で対応するベースディレクトリ
    host_base: PathBuf,
}

impl NamespaceExecutor {
    pub fn new(container_base: impl Into<PathBuf>, host_base: impl Into<PathBuf>) -> Self {
        Self {
            container_base: container_base.into(),
            host_base: host_base.into(),
        }
    }

    /// コンテナ内パスをホスト側パスへ読み替え
    fn translate(&self, cwd: &Path) -> PathBuf {
        match cwd.strip_prefix(&self.container_base) {
            Ok(rest) => self.host_base.join(rest),
            Err(_) => cwd.to_path_buf(),
        }
    }

    fn wrap(&self, argv: &[String], host_cwd: &Path) -> Vec<String> {
        let mut wrapped = vec![
            "nsenter".to_string(),
            "-t".to_string(),
            "1".to_string(),
            "-m".to_string(),
            "-u".to_string(),
            "-i".to_string(),
            "-n".to_string(),
            "-p".to_string(),
            "--".to_string(),
            "sh".to_string(),
            "-c".to_string(),
        ];
        let command = format!(
            "cd {} && exec {}",
            shell_quote(&host_cwd.to_string_lossy()),
            argv.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" ")
        );
        wrapped.push(command);
        wrapped
    }
}

impl HostExecutor for NamespaceExecutor {
    fn spawn(&self, argv: &[String], cwd: &Path) -> Result<Child> {
        let host_cwd = self.translate(cwd);
        let wrapped = self.wrap(argv, &host_cwd);
        DirectExecutor.spawn(&wrapped, cwd)
    }
}

fn shell_quote(value: &str) -> String {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./=:".contains(c))
    {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// パス読み替えがベース配下だけに適用されることを確認
    #[test]
    fn test_translate_maps_base_dir() {
        let executor = NamespaceExecutor::new("/data/servers", "/srv/minefleet/servers");
        assert_eq!(
            executor.translate(Path::new("/data/servers/alpha")),
            PathBuf::from("/srv/minefleet/servers/alpha")
        );
        assert_eq!(
            executor.translate(Path::new("/tmp/other")),
            PathBuf::from("/tmp/other")
        );
    }

    /// nsenterラップの形を確認
    #[test]
    fn test_wrap_builds_nsenter_argv() {
        let executor = NamespaceExecutor::new("/data/servers", "/srv/servers");
        let wrapped = executor.wrap(
            &["java".to_string(), "-jar".to_string(), "server.jar".to_string()],
            Path::new("/srv/servers/alpha"),
        );
        assert_eq!(wrapped[0], "nsenter");
        assert!(wrapped.last().unwrap().contains("cd /srv/servers/alpha"));
        assert!(wrapped.last().unwrap().contains("exec java -jar server.jar"));
    }

    /// 空白を含む引数が引用されることを確認
    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("nogui"), "nogui");
        assert_eq!(shell_quote("a b"), "'a b'");
    }
}
