//! 実行可能記述子

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 実行体の種別（スーパーバイザーの起動方法を決める）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnableKind {
    Script,
    Jar,
}

/// インストーラーが返す実行可能記述子
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runnable {
    pub kind: RunnableKind,
    pub path: PathBuf,
}
