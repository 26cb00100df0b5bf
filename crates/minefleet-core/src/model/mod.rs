//! 永続・一時レコードのモデル定義

mod backup;
mod log;
mod modpack;
mod runnable;
mod server;

pub use backup::*;
pub use log::*;
pub use modpack::*;
pub use runnable::*;
pub use server::*;
