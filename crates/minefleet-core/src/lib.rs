//! MineFleet Core — ゲームサーバー管理の共有基盤
//!
//! 全クレートが共有する土台を提供します。
//!
//! # 概要
//!
//! - **model層**: サーバー・モッドパック・バックアップの永続レコード
//! - **error層**: コントロールプレーン全体で閉じたエラー集合
//! - **config層**: 環境変数から構築する起動時設定
//! - **files層**: サーバーディレクトリ内に閉じた安全なファイル操作

pub mod config;
pub mod error;
pub mod files;
pub mod model;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use model::*;
