use assert_cmd::Command;
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command as StdCommand, Stdio};
use std::time::Duration;
use tempfile::TempDir;

/// 一時データディレクトリに閉じたCLI実行環境
pub struct TestEnv {
    pub root: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    fn base_cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("minefleet").unwrap();
        cmd.env("SERVERS_BASE_DIR", self.path().join("servers"))
            .env("DATABASE_URL", self.path().join("registry.json"))
            .env_remove("CATALOG_API_KEY");
        cmd
    }

    /// デーモンなしで実行するコマンド（到達しないAPIアドレスを向く）
    pub fn cmd(&self) -> Command {
        let mut cmd = self.base_cmd();
        cmd.env("MINEFLEET_API_URL", "http://127.0.0.1:1");
        cmd
    }

    /// 起動済みデーモンへ向けたコマンド
    pub fn cmd_against(&self, daemon: &TestDaemon) -> Command {
        let mut cmd = self.base_cmd();
        cmd.env("MINEFLEET_API_URL", &daemon.api_url);
        cmd
    }

    /// 同じデータディレクトリでデーモンを起動し、待ち受けまで待つ
    pub fn start_daemon(&self) -> TestDaemon {
        let port = free_port();
        let addr = format!("127.0.0.1:{port}");
        #[allow(deprecated)]
        let bin = assert_cmd::cargo::cargo_bin("minefleet");
        let child = StdCommand::new(bin)
            .env("SERVERS_BASE_DIR", self.path().join("servers"))
            .env("DATABASE_URL", self.path().join("registry.json"))
            .env_remove("CATALOG_API_KEY")
            .args(["serve", "--addr", &addr])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");

        let daemon = TestDaemon {
            child,
            api_url: format!("http://{addr}"),
            addr,
        };
        daemon.wait_ready();
        daemon
    }
}

/// テスト用デーモンプロセス（dropで破棄）
pub struct TestDaemon {
    child: Child,
    pub api_url: String,
    addr: String,
}

impl TestDaemon {
    fn wait_ready(&self) {
        for _ in 0..100 {
            if TcpStream::connect(&self.addr).is_ok() {
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        panic!("daemon never started listening on {}", self.addr);
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}
