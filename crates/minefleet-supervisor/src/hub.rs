//! 購読ハブ
//!
//! サーバーごとに `logs` と `state` の2トピックを提供します。
//! リングと購読者集合を同一ロック下で所有するため、購読時の
//! バックログ配信と生配信の間に隙間も重複もありません。
//!
//! 配信はcopy-on-broadcastで、購読者が内部バッファへ触れることは
//! ありません。各購読者は容量256の有界キューを持ち、溢れた購読者は
//! 生産者をブロックせずに切り離されます（SlowConsumer）。

use crate::ring::LogRing;
use minefleet_core::{LifecycleState, LogLine, LogStream};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// 購読者ごとの配信キュー容量
pub const QUEUE_CAPACITY: usize = 256;

/// 購読者へ配信されるイベント
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// 購読直後に一度だけ届く、リング全体のスナップショット
    Backlog(Vec<LogLine>),
    Line(LogLine),
    State(LifecycleState),
}

/// 1購読の受信側
///
/// dropで購読解除になります。`recv()` が `None` を返した場合、
/// 自発的な解除でなければ配信に追従できず切り離されたことを意味します。
pub struct Subscription {
    rx: mpsc::Receiver<HubEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<HubEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<HubEvent> {
        self.rx.try_recv().ok()
    }
}

#[derive(Default)]
struct ServerTopics {
    ring: Option<LogRing>,
    last_state: Option<LifecycleState>,
    log_subscribers: Vec<mpsc::Sender<HubEvent>>,
    state_subscribers: Vec<mpsc::Sender<HubEvent>>,
}

impl ServerTopics {
    fn ring_mut(&mut self, server_id: Uuid) -> &mut LogRing {
        self.ring.get_or_insert_with(|| LogRing::new(server_id))
    }
}

/// サーバー単位のpub/subハブ
#[derive(Default)]
pub struct SubscriptionHub {
    servers: Mutex<HashMap<Uuid, ServerTopics>>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// ログ1行を取り込み、リング追記と扇状配信を行う
    pub fn publish_line(&self, server_id: Uuid, stream: LogStream, text: &str) -> LogLine {
        let mut servers = self.servers.lock().expect("hub lock");
        let topics = servers.entry(server_id).or_default();
        let line = topics.ring_mut(server_id).push(stream, text);

        fan_out(&mut topics.log_subscribers, HubEvent::Line(line.clone()));
        line
    }

    /// 状態遷移を配信
    pub fn publish_state(&self, server_id: Uuid, state: LifecycleState) {
        let mut servers = self.servers.lock().expect("hub lock");
        let topics = servers.entry(server_id).or_default();
        topics.last_state = Some(state);

        debug!(server_id = %server_id, state = %state, "state published");
        fan_out(&mut topics.state_subscribers, HubEvent::State(state));
    }

    /// 最後に観測された状態
    pub fn current_state(&self, server_id: Uuid) -> Option<LifecycleState> {
        let servers = self.servers.lock().expect("hub lock");
        servers.get(&server_id).and_then(|t| t.last_state)
    }

    /// logsトピックを購読（バックログ1件 → 生配信）
    pub fn subscribe_logs(&self, server_id: Uuid) -> Subscription {
        let mut servers = self.servers.lock().expect("hub lock");
        let topics = servers.entry(server_id).or_default();

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let backlog = topics
            .ring
            .as_ref()
            .map(|r| r.snapshot())
            .unwrap_or_default();
        // 新規チャネルへの最初の送信は失敗しない
        let _ = tx.try_send(HubEvent::Backlog(backlog));
        topics.log_subscribers.push(tx);

        Subscription { rx }
    }

    /// stateトピックを購読（最後の状態があれば即時配信）
    pub fn subscribe_state(&self, server_id: Uuid) -> Subscription {
        let mut servers = self.servers.lock().expect("hub lock");
        let topics = servers.entry(server_id).or_default();

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        if let Some(state) = topics.last_state {
            let _ = tx.try_send(HubEvent::State(state));
        }
        topics.state_subscribers.push(tx);

        Subscription { rx }
    }

    /// リングの現在内容（HTTPスナップショット用）
    pub fn snapshot_logs(&self, server_id: Uuid) -> Vec<LogLine> {
        let servers = self.servers.lock().expect("hub lock");
        servers
            .get(&server_id)
            .and_then(|t| t.ring.as_ref())
            .map(|r| r.snapshot())
            .unwrap_or_default()
    }

    /// サーバーの全トピックを破棄（レコード削除時）
    pub fn remove_server(&self, server_id: Uuid) {
        let mut servers = self.servers.lock().expect("hub lock");
        servers.remove(&server_id);
    }
}

/// copy-on-broadcastの扇状配信
///
/// キューが溢れた購読者はその場で切り離します（生産者は待たない）。
fn fan_out(subscribers: &mut Vec<mpsc::Sender<HubEvent>>, event: HubEvent) {
    subscribers.retain(|tx| match tx.try_send(event.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("subscriber queue full, dropping slow consumer");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    });
}
