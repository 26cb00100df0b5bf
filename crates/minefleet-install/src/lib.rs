//! MineFleet Install — 実行可能アーティファクトの取得と配置
//!
//! # 概要
//!
//! - **cache層**: SHA-256による内容アドレスのローカルストア
//! - **resolver層**: (エンジン, バージョン) → 取得計画（FetchPlan）
//! - **installer層**: 取得計画の実行と実行体の自律検出
//! - **config層**: server.properties / eula.txt / JVM引数ファイルの描画

mod cache;
mod config_writer;
mod installer;
mod resolver;

pub use cache::ArtifactCache;
pub use config_writer::ConfigWriter;
pub use installer::{detect_runnable, ArtifactInstaller};
pub use minefleet_core::{Runnable, RunnableKind};
pub use resolver::{FetchPlan, VersionChannel, VersionInfo, VersionResolver};
