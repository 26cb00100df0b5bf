//! MineFleet Supervisor — 子プロセスの監督と購読配信
//!
//! ゲームサーバー子プロセスの起動・追跡・シグナル送出・回収を担い、
//! 標準出力/標準エラーを多数の購読者へ扇状配信し、標準入力への
//! コマンド注入を多重化します。
//!
//! # 設計
//!
//! - 子プロセス1つにつき、stdout/stderrリーダー・stdinライター・
//!   終了待ちの専用タスクを持ちます
//! - ログリングと購読者集合はサーバーごとにハブが単一ロック下で所有し、
//!   購読時のバックログ配信と生配信の間に隙間も重複も生じません
//! - 状態遷移はログパターンから導出され、ハブのstateトピックへ配信
//!   されると同時にイベントストリームでレジストリ側へ通知されます

mod executor;
mod hub;
mod pattern;
mod process;
mod ring;

pub use executor::{DirectExecutor, HostExecutor, NamespaceExecutor};
pub use hub::{HubEvent, SubscriptionHub, Subscription, QUEUE_CAPACITY};
pub use pattern::detect_transition;
pub use process::{StopTimeouts, Supervisor, SupervisorEvent};
pub use ring::{LogRing, RING_CAPACITY};
