//! プロセススーパーバイザー
//!
//! サーバー1つにつき、stdout/stderrリーダー・stdinライター・終了待ちの
//! 専用タスクを起こし、ライフサイクル状態をログパターンから導出します。
//!
//! 停止契約: stdinへ `stop` を書き、30秒待って生きていればSIGTERM、
//! さらに5秒でSIGKILL。最終終了コードがStopped/Exitedを決めます。

use crate::executor::HostExecutor;
use crate::hub::SubscriptionHub;
use crate::pattern::detect_transition;
use chrono::{DateTime, Utc};
use minefleet_core::{
    EngineError, LifecycleState, LogStream, Result, Runnable, RunnableKind, ServerRecord,
};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Xmsの上限（MB）
const MAX_INITIAL_HEAP_MB: u32 = 1024;

/// 停止エスカレーションの待ち時間
#[derive(Debug, Clone)]
pub struct StopTimeouts {
    /// `stop\n` 書き込み後の猶予
    pub graceful: Duration,
    /// SIGTERM後、SIGKILLまでの猶予
    pub escalation: Duration,
}

impl Default for StopTimeouts {
    fn default() -> Self {
        Self {
            graceful: Duration::from_secs(30),
            escalation: Duration::from_secs(5),
        }
    }
}

/// レジストリへ反映される状態イベント
#[derive(Debug, Clone)]
pub struct SupervisorEvent {
    pub server_id: Uuid,
    pub state: LifecycleState,
    pub exit_code: Option<i32>,
    pub process_handle: Option<String>,
}

/// 稼働中の子プロセス1つ分の記録
struct Entry {
    pid: Option<u32>,
    #[allow(dead_code)]
    started_at: DateTime<Utc>,
    stdin_tx: mpsc::Sender<String>,
    exit_rx: watch::Receiver<Option<i32>>,
}

pub struct Supervisor {
    executor: Arc<dyn HostExecutor>,
    hub: Arc<SubscriptionHub>,
    events: mpsc::UnboundedSender<SupervisorEvent>,
    entries: Arc<Mutex<HashMap<Uuid, Entry>>>,
    stop_timeouts: StopTimeouts,
}

impl Supervisor {
    pub fn new(
        executor: Arc<dyn HostExecutor>,
        hub: Arc<SubscriptionHub>,
        events: mpsc::UnboundedSender<SupervisorEvent>,
    ) -> Self {
        Self {
            executor,
            hub,
            events,
            entries: Arc::new(Mutex::new(HashMap::new())),
            stop_timeouts: StopTimeouts::default(),
        }
    }

    /// 停止エスカレーションの待ち時間を差し替える
    pub fn with_stop_timeouts(mut self, stop_timeouts: StopTimeouts) -> Self {
        self.stop_timeouts = stop_timeouts;
        self
    }

    /// スーパーバイザーエントリが存在するか
    pub async fn has_entry(&self, server_id: Uuid) -> bool {
        self.entries.lock().await.contains_key(&server_id)
    }

    /// 起動契約
    ///
    /// 実行可能記述子の種別からargvを組み立て、HostExecutor経由で起動します。
    /// 起動直後にStartingを配信し、各stdioストリームのタスクを起こします。
    pub async fn start(
        &self,
        record: &ServerRecord,
        runnable: &Runnable,
        server_dir: &Path,
        default_java_opts: &str,
    ) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&record.id) {
            return Err(EngineError::AlreadyRunning(record.name.clone()));
        }

        let argv = build_argv(record, runnable, default_java_opts);
        let mut child = self.executor.spawn(&argv, server_dir)?;
        let pid = child.id();

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::internal("child stdin not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::internal("child stdout not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::internal("child stderr not piped"))?;

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(64);
        let (exit_tx, exit_rx) = watch::channel(None::<i32>);

        entries.insert(
            record.id,
            Entry {
                pid,
                started_at: Utc::now(),
                stdin_tx,
                exit_rx,
            },
        );
        drop(entries);

        info!(id = %record.id, name = %record.name, pid, "server process spawned");
        self.publish(record.id, LifecycleState::Starting, None, pid.map(|p| p.to_string()));

        // stdoutリーダー
        let server_id = record.id;
        let hub = self.hub.clone();
        let events = self.events.clone();
        let mut stdout_lines = BufReader::new(stdout).lines();
        tokio::spawn(async move {
            while let Ok(Some(line)) = stdout_lines.next_line().await {
                ingest_line(&hub, &events, server_id, LogStream::Stdout, &line);
            }
        });

        // stderrリーダー
        let hub = self.hub.clone();
        let events = self.events.clone();
        let mut stderr_lines = BufReader::new(stderr).lines();
        tokio::spawn(async move {
            while let Ok(Some(line)) = stderr_lines.next_line().await {
                ingest_line(&hub, &events, server_id, LogStream::Stderr, &line);
            }
        });

        // stdinライター
        let mut stdin = stdin;
        tokio::spawn(async move {
            while let Some(command) = stdin_rx.recv().await {
                let payload = format!("{command}\n");
                if stdin.write_all(payload.as_bytes()).await.is_err() {
                    break;
                }
                let _ = stdin.flush().await;
            }
        });

        // 終了待ち（回収と最終状態の確定）
        let hub = self.hub.clone();
        let events = self.events.clone();
        let entries_handle = self.entries.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            let code = match &status {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    warn!(id = %server_id, error = %e, "child wait failed");
                    -1
                }
            };

            let prior = hub
                .current_state(server_id)
                .unwrap_or(LifecycleState::Starting);
            let final_state = match prior {
                // 準備完了前の終了は失敗
                LifecycleState::Starting => LifecycleState::Error,
                _ if code == 0 => LifecycleState::Stopped,
                _ => LifecycleState::Exited,
            };

            entries_handle.lock().await.remove(&server_id);
            info!(id = %server_id, code, state = %final_state, "server process reaped");

            hub.publish_state(server_id, final_state);
            let _ = events.send(SupervisorEvent {
                server_id,
                state: final_state,
                exit_code: Some(code),
                process_handle: None,
            });
            let _ = exit_tx.send(Some(code));
        });

        Ok(())
    }

    /// コマンド注入
    ///
    /// Running中のみ受け付け、`> ` 接頭辞のシステム行として
    /// リングへ先にエコーしてからstdinへ書き込みます。
    pub async fn send_command(&self, server_id: Uuid, name: &str, text: &str) -> Result<()> {
        if self.hub.current_state(server_id) != Some(LifecycleState::Running) {
            return Err(EngineError::NotRunning(name.to_string()));
        }
        let stdin_tx = {
            let entries = self.entries.lock().await;
            let entry = entries
                .get(&server_id)
                .ok_or_else(|| EngineError::NotRunning(name.to_string()))?;
            entry.stdin_tx.clone()
        };

        // エコーを先に配信してから書き込む（応答行より前に届く）
        self.hub
            .publish_line(server_id, LogStream::System, &format!("> {text}"));
        stdin_tx
            .send(text.to_string())
            .await
            .map_err(|_| EngineError::NotRunning(name.to_string()))?;
        Ok(())
    }

    /// 停止契約
    ///
    /// 猶予付き: `stop\n` → 30秒 → SIGTERM → 5秒 → SIGKILL。
    /// 強制: stdin猶予を飛ばして即シグナルへ。
    /// 最終終了コードを返します。
    pub async fn stop(&self, server_id: Uuid, name: &str, force: bool) -> Result<i32> {
        let (stdin_tx, exit_rx, pid) = {
            let entries = self.entries.lock().await;
            let entry = entries
                .get(&server_id)
                .ok_or_else(|| EngineError::AlreadyStopped(name.to_string()))?;
            (entry.stdin_tx.clone(), entry.exit_rx.clone(), entry.pid)
        };

        // 既に終了していれば終端状態の後からStoppingを流さない
        if exit_rx.borrow().is_none() {
            self.hub.publish_state(server_id, LifecycleState::Stopping);
            let _ = self.events.send(SupervisorEvent {
                server_id,
                state: LifecycleState::Stopping,
                exit_code: None,
                process_handle: pid.map(|p| p.to_string()),
            });
        }

        if !force {
            let _ = stdin_tx.send("stop".to_string()).await;
            if let Some(code) = wait_exit(exit_rx.clone(), self.stop_timeouts.graceful).await {
                return Ok(code);
            }
            warn!(id = %server_id, "graceful stop timed out, escalating");
        }

        if let Some(pid) = pid {
            let nix_pid = Pid::from_raw(pid as i32);
            debug!(id = %server_id, pid, "sending SIGTERM");
            let _ = signal::kill(nix_pid, Signal::SIGTERM);

            if let Some(code) = wait_exit(exit_rx.clone(), self.stop_timeouts.escalation).await {
                return Ok(code);
            }

            warn!(id = %server_id, pid, "SIGTERM ignored, sending SIGKILL");
            let _ = signal::kill(nix_pid, Signal::SIGKILL);
        }

        wait_exit(exit_rx, self.stop_timeouts.escalation)
            .await
            .ok_or_else(|| EngineError::Timeout(format!("サーバー '{name}' の停止")))
    }

    fn publish(
        &self,
        server_id: Uuid,
        state: LifecycleState,
        exit_code: Option<i32>,
        process_handle: Option<String>,
    ) {
        self.hub.publish_state(server_id, state);
        let _ = self.events.send(SupervisorEvent {
            server_id,
            state,
            exit_code,
            process_handle,
        });
    }
}

/// ログ行の取り込み: リング追記 + 扇状配信 + 状態パターン検査
fn ingest_line(
    hub: &SubscriptionHub,
    events: &mpsc::UnboundedSender<SupervisorEvent>,
    server_id: Uuid,
    stream: LogStream,
    line: &str,
) {
    if line.is_empty() {
        return;
    }
    hub.publish_line(server_id, stream, line);

    let current = hub
        .current_state(server_id)
        .unwrap_or(LifecycleState::Starting);
    if let Some(next) = detect_transition(line, current) {
        hub.publish_state(server_id, next);
        let _ = events.send(SupervisorEvent {
            server_id,
            state: next,
            exit_code: None,
            process_handle: None,
        });
    }
}

/// 終了コードを待つ（タイムアウトつき）
async fn wait_exit(mut rx: watch::Receiver<Option<i32>>, timeout: Duration) -> Option<i32> {
    let wait = async {
        loop {
            let current = *rx.borrow_and_update();
            if let Some(code) = current {
                return code;
            }
            if rx.changed().await.is_err() {
                return -1;
            }
        }
    };
    tokio::time::timeout(timeout, wait).await.ok()
}

/// 起動argvの組み立て
///
/// - jar: `java -Xmx{mem}M -Xms{min(mem,1024)}M {opts…} -jar {path} nogui`
/// - script: `sh {path} nogui`（JVM引数はuser_jvm_args.txt側）
fn build_argv(record: &ServerRecord, runnable: &Runnable, default_java_opts: &str) -> Vec<String> {
    match runnable.kind {
        RunnableKind::Jar => {
            let initial = record.memory_mb.min(MAX_INITIAL_HEAP_MB);
            let mut argv = vec![
                "java".to_string(),
                format!("-Xmx{}M", record.memory_mb),
                format!("-Xms{initial}M"),
            ];
            argv.extend(default_java_opts.split_whitespace().map(String::from));
            argv.extend(record.java_opts.split_whitespace().map(String::from));
            argv.push("-jar".to_string());
            argv.push(runnable.path.to_string_lossy().to_string());
            argv.push("nogui".to_string());
            argv
        }
        RunnableKind::Script => vec![
            "sh".to_string(),
            runnable.path.to_string_lossy().to_string(),
            "nogui".to_string(),
        ],
    }
}
