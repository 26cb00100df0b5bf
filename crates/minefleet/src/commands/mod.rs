//! CLIコマンド
//!
//! エンジンを組み立てるのは `serve` だけです。他のコマンドはすべて
//! 稼働中デーモンのHTTP APIを呼びます（レジストリとスーパーバイザーの
//! 正本を持つプロセスを1つに保つため）。

pub mod backup;
pub mod create;
pub mod delete;
pub mod lifecycle;
pub mod logs;
pub mod provision;
pub mod ps;
pub mod serve;
pub mod versions;
