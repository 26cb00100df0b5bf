//! ストリーミングチャネル
//!
//! - コンソール: 購読直後にバックログを一度だけ送り、以後はログ行と
//!   状態遷移を流します。クライアントはコマンドを送信できます。
//! - プロビジョニング: 進捗イベントを終端（complete / error）まで流します。
//!
//! 切断は当該購読だけを終了させ、他の購読者には影響しません。

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use minefleet_core::{LifecycleState, LogLine};
use minefleet_engine::Engine;
use minefleet_supervisor::HubEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ConsoleFrame {
    #[serde(rename_all = "camelCase")]
    Logs { logs: Vec<LogLine> },
    #[serde(rename_all = "camelCase")]
    Log { line: LogLine },
    #[serde(rename_all = "camelCase")]
    State { state: LifecycleState },
    #[serde(rename_all = "camelCase")]
    Error { kind: String, message: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ConsoleRequest {
    #[serde(rename_all = "camelCase")]
    Command { text: String },
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, frame: &T) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => false,
    }
}

/// GET /ws/console/{id}
pub async fn console(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| console_session(engine, id, socket))
}

async fn console_session(engine: Arc<Engine>, id: Uuid, mut socket: WebSocket) {
    if engine.registry.get_server(id).await.is_err() {
        let _ = send_json(
            &mut socket,
            &ConsoleFrame::Error {
                kind: "NotFound".to_string(),
                message: format!("サーバーが見つかりません: {id}"),
            },
        )
        .await;
        return;
    }

    let mut logs = engine.hub.subscribe_logs(id);
    let mut state = engine.hub.subscribe_state(id);
    debug!(server_id = %id, "console subscriber attached");

    loop {
        tokio::select! {
            event = logs.recv() => match event {
                Some(HubEvent::Backlog(lines)) => {
                    if !send_json(&mut socket, &ConsoleFrame::Logs { logs: lines }).await {
                        break;
                    }
                }
                Some(HubEvent::Line(line)) => {
                    if !send_json(&mut socket, &ConsoleFrame::Log { line }).await {
                        break;
                    }
                }
                Some(HubEvent::State(_)) => {}
                // ハブ側から切り離された = 配信に追従できなかった
                None => {
                    let _ = send_json(
                        &mut socket,
                        &ConsoleFrame::Error {
                            kind: "SlowConsumer".to_string(),
                            message: "配信に追従できないため切断されました".to_string(),
                        },
                    )
                    .await;
                    break;
                }
            },
            event = state.recv() => match event {
                Some(HubEvent::State(state)) => {
                    if !send_json(&mut socket, &ConsoleFrame::State { state }).await {
                        break;
                    }
                }
                Some(_) => {}
                None => break,
            },
            message = socket.recv() => match message {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ConsoleRequest>(&text) {
                        Ok(ConsoleRequest::Command { text }) => {
                            if let Err(e) = engine.send_command(id, &text).await {
                                let _ = send_json(
                                    &mut socket,
                                    &ConsoleFrame::Error {
                                        kind: e.kind().to_string(),
                                        message: e.to_string(),
                                    },
                                )
                                .await;
                            }
                        }
                        Err(_) => {
                            let _ = send_json(
                                &mut socket,
                                &ConsoleFrame::Error {
                                    kind: "InvalidRequest".to_string(),
                                    message: "解釈できないフレームです".to_string(),
                                },
                            )
                            .await;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
    debug!(server_id = %id, "console subscriber detached");
}

/// GET /ws/provision/{session_id}
pub async fn provision(
    State(engine): State<Arc<Engine>>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| provision_session(engine, session_id, socket))
}

async fn provision_session(engine: Arc<Engine>, session_id: String, mut socket: WebSocket) {
    let (terminal, mut rx) = match engine.progress.subscribe(&session_id) {
        Ok(subscription) => subscription,
        Err(e) => {
            let _ = send_json(
                &mut socket,
                &ConsoleFrame::Error {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };

    // 既に終端していれば保持中のイベントを返して終了
    if let Some(event) = terminal {
        let _ = send_json(&mut socket, &event).await;
        return;
    }

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    if !send_json(&mut socket, &event).await {
                        break;
                    }
                    if terminal {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(session_id = %session_id, skipped, "progress subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            message = socket.recv() => match message {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
}
