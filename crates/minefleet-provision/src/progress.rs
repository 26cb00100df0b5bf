//! 進捗チャネル
//!
//! セッションIDをキーにした長時間タスク向けpub/subです。
//! 終端イベント（complete / error）の後、セッションは60秒の保持期間を
//! 経て除去されます。保持期間中の購読は終端イベントを即時に受け取れ、
//! 期間後はUnknownSessionになります。

use minefleet_core::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// 終端イベントの保持期間（60秒）
pub const TERMINAL_RETENTION: Duration = Duration::from_secs(60);

/// 進捗イベント
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    Progress {
        step: String,
        percent: u8,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        current: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    Complete { server_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. } | ProgressEvent::Error { .. })
    }
}

struct Session {
    tx: broadcast::Sender<ProgressEvent>,
    terminal: Option<ProgressEvent>,
}

/// セッションキーの進捗pub/sub
#[derive(Default)]
pub struct ProgressChannel {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新しいセッションを登録してIDを返す
    pub fn create_session(&self) -> String {
        let session_id = Uuid::new_v4().to_string();
        let (tx, _) = broadcast::channel(64);
        self.sessions
            .lock()
            .expect("progress lock")
            .insert(session_id.clone(), Session { tx, terminal: None });
        debug!(session_id = %session_id, "progress session created");
        session_id
    }

    /// 進捗イベントを配信
    ///
    /// 終端イベントは保持領域へ記録され、60秒後にセッションごと除去されます。
    pub fn publish(&self, session_id: &str, event: ProgressEvent) {
        let mut sessions = self.sessions.lock().expect("progress lock");
        let Some(session) = sessions.get_mut(session_id) else {
            return;
        };

        let _ = session.tx.send(event.clone());

        if event.is_terminal() {
            session.terminal = Some(event);
            let sessions = self.sessions.clone();
            let session_id = session_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(TERMINAL_RETENTION).await;
                sessions.lock().expect("progress lock").remove(&session_id);
                debug!(session_id = %session_id, "progress session retired");
            });
        }
    }

    pub fn progress(
        &self,
        session_id: &str,
        step: &str,
        percent: u8,
        message: impl Into<String>,
    ) {
        self.publish(
            session_id,
            ProgressEvent::Progress {
                step: step.to_string(),
                percent,
                message: message.into(),
                current: None,
                total: None,
            },
        );
    }

    pub fn progress_counted(
        &self,
        session_id: &str,
        step: &str,
        percent: u8,
        message: impl Into<String>,
        current: u32,
        total: u32,
    ) {
        self.publish(
            session_id,
            ProgressEvent::Progress {
                step: step.to_string(),
                percent,
                message: message.into(),
                current: Some(current),
                total: Some(total),
            },
        );
    }

    pub fn complete(&self, session_id: &str, server_id: Uuid) {
        self.publish(session_id, ProgressEvent::Complete { server_id });
    }

    pub fn error(&self, session_id: &str, message: impl Into<String>) {
        self.publish(
            session_id,
            ProgressEvent::Error {
                message: message.into(),
            },
        );
    }

    /// セッションを購読
    ///
    /// 終端済みセッション（保持期間中）は終端イベントを即時に返します。
    pub fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<(Option<ProgressEvent>, broadcast::Receiver<ProgressEvent>)> {
        let sessions = self.sessions.lock().expect("progress lock");
        let session = sessions
            .get(session_id)
            .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))?;
        Ok((session.terminal.clone(), session.tx.subscribe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 一連の進捗が順序どおり届くことを確認
    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let channel = ProgressChannel::new();
        let session_id = channel.create_session();
        let (terminal, mut rx) = channel.subscribe(&session_id).unwrap();
        assert!(terminal.is_none());

        channel.progress(&session_id, "fetching", 5, "メタデータ取得中");
        channel.progress(&session_id, "downloading", 15, "アーカイブ取得中");
        channel.complete(&session_id, Uuid::new_v4());

        match rx.recv().await.unwrap() {
            ProgressEvent::Progress { step, percent, .. } => {
                assert_eq!((step.as_str(), percent), ("fetching", 5));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            ProgressEvent::Progress { step, .. } => assert_eq!(step, "downloading"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.recv().await.unwrap().is_terminal());
    }

    /// 終端後の購読が保持期間中は終端イベントを受け取れることを確認
    #[tokio::test]
    async fn test_late_join_gets_terminal_event() {
        let channel = ProgressChannel::new();
        let session_id = channel.create_session();
        let server_id = Uuid::new_v4();
        channel.complete(&session_id, server_id);

        let (terminal, _rx) = channel.subscribe(&session_id).unwrap();
        match terminal {
            Some(ProgressEvent::Complete { server_id: id }) => assert_eq!(id, server_id),
            other => panic!("unexpected terminal: {other:?}"),
        }
    }

    /// 未知のセッションがUnknownSessionになることを確認
    #[tokio::test]
    async fn test_unknown_session() {
        let channel = ProgressChannel::new();
        let err = channel.subscribe("no-such-session").unwrap_err();
        assert_eq!(err.kind(), "UnknownSession");
    }

    /// セッションが互いに独立であることを確認
    #[tokio::test]
    async fn test_sessions_are_independent() {
        let channel = ProgressChannel::new();
        let a = channel.create_session();
        let b = channel.create_session();

        let (_, mut rx_b) = channel.subscribe(&b).unwrap();
        channel.progress(&a, "fetching", 5, "a only");
        channel.progress(&b, "extracting", 35, "b only");

        match rx_b.recv().await.unwrap() {
            ProgressEvent::Progress { step, .. } => assert_eq!(step, "extracting"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
