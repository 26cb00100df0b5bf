#![allow(deprecated)] // TODO: cargo_bin → cargo_bin! マクロへ移行

mod common;

use common::TestEnv;
use predicates::prelude::*;

/// CLIヘルプが主要コマンドを表示することを確認
#[test]
fn test_cli_help() {
    let env = TestEnv::new();
    env.cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("ps"))
        .stdout(predicate::str::contains("provision"))
        .stdout(predicate::str::contains("backup"));
}

/// バージョン表示を確認
#[test]
fn test_cli_version() {
    let env = TestEnv::new();
    env.cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("minefleet"));
}

/// 不正なサブコマンドが失敗することを確認
#[test]
fn test_invalid_command() {
    let env = TestEnv::new();
    env.cmd().arg("invalid-command").assert().failure();
}

/// デーモン未起動のエラーメッセージを確認
#[test]
fn test_daemon_unreachable() {
    let env = TestEnv::new();
    env.cmd()
        .arg("ps")
        .assert()
        .failure()
        .stderr(predicate::str::contains("デーモンに接続できません"));
}

/// 未知のエンジン系統がデーモン接続前に設定不備（終了コード2）になることを確認
#[test]
fn test_unknown_engine_is_misconfiguration() {
    let env = TestEnv::new();
    env.cmd()
        .args(["create", "alpha", "--engine", "doom", "--version", "1.0"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("未知のエンジン系統"));
}

/// createとpsの往復を確認（デーモン経由）
#[test]
fn test_create_then_ps() {
    let env = TestEnv::new();
    let daemon = env.start_daemon();

    env.cmd_against(&daemon)
        .args([
            "create", "alpha", "--engine", "vanilla", "--version", "1.20.4", "--port", "25565",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("alpha"));

    env.cmd_against(&daemon)
        .arg("ps")
        .assert()
        .success()
        .stdout(predicate::str::contains("alpha"))
        .stdout(predicate::str::contains("vanilla"))
        .stdout(predicate::str::contains("25565"))
        .stdout(predicate::str::contains("Stopped"));
}

/// 名前衝突がエラーになることを確認
#[test]
fn test_create_name_conflict() {
    let env = TestEnv::new();
    let daemon = env.start_daemon();

    env.cmd_against(&daemon)
        .args(["create", "alpha", "--engine", "vanilla", "--version", "1.20.4"])
        .assert()
        .success();

    env.cmd_against(&daemon)
        .args([
            "create", "alpha", "--engine", "paper", "--version", "1.20.4", "--port", "25570",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("既に使用されています"));
}

/// ポート衝突がエラーになることを確認
#[test]
fn test_create_port_conflict() {
    let env = TestEnv::new();
    let daemon = env.start_daemon();

    env.cmd_against(&daemon)
        .args(["create", "alpha", "--engine", "vanilla", "--version", "1.20.4"])
        .assert()
        .success();

    env.cmd_against(&daemon)
        .args(["create", "beta", "--engine", "vanilla", "--version", "1.20.4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ポート"));
}

/// 停止済みサーバーへのstopがエラーになることを確認
#[test]
fn test_stop_stopped_server() {
    let env = TestEnv::new();
    let daemon = env.start_daemon();

    env.cmd_against(&daemon)
        .args(["create", "alpha", "--engine", "vanilla", "--version", "1.20.4"])
        .assert()
        .success();

    env.cmd_against(&daemon)
        .args(["stop", "alpha"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("既に停止しています"));
}

/// delete --yesでレコードが消えることを確認（デーモンの正本から）
#[test]
fn test_delete_removes_record() {
    let env = TestEnv::new();
    let daemon = env.start_daemon();

    env.cmd_against(&daemon)
        .args(["create", "alpha", "--engine", "vanilla", "--version", "1.20.4"])
        .assert()
        .success();

    env.cmd_against(&daemon)
        .args(["delete", "alpha", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("削除しました"));

    env.cmd_against(&daemon)
        .arg("ps")
        .assert()
        .success()
        .stdout(predicate::str::contains("alpha").not());
}

/// カタログ無効時のprovisionが終了コード3になることを確認
#[test]
fn test_provision_without_catalog_key() {
    let env = TestEnv::new();
    let daemon = env.start_daemon();

    env.cmd_against(&daemon)
        .args([
            "provision",
            "--modpack-id",
            "123",
            "--file-id",
            "456",
            "--name",
            "pack1",
        ])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("CATALOG_API_KEY"));
}

/// 存在しないサーバーのバックアップ一覧がエラーになることを確認
#[test]
fn test_backup_list_unknown_server() {
    let env = TestEnv::new();
    let daemon = env.start_daemon();

    env.cmd_against(&daemon)
        .args(["backup", "list", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("見つかりません"));
}

/// 定期バックアップとpruneが外部cron向けに呼び出せることを確認
#[test]
fn test_backup_scheduled_and_prune() {
    let env = TestEnv::new();
    let daemon = env.start_daemon();

    env.cmd_against(&daemon)
        .args(["backup", "run-scheduled"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 件"));

    env.cmd_against(&daemon)
        .args(["backup", "prune"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 件"));
}
