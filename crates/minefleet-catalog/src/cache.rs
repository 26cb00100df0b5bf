//! モッドリストキャッシュ
//!
//! (modpack_id, file_id) をキーに展開済みモッドリストを30分保持します。
//! キーごとのシングルフライトにより、同一キーへの並行要求が
//! 上流取得を重複させることはありません。

use crate::schema::ModListEntry;
use minefleet_core::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

/// 既定のTTL（30分）
const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

struct Slot {
    cell: Arc<OnceCell<Arc<Vec<ModListEntry>>>>,
    created: Instant,
}

/// TTL付きシングルフライトキャッシュ
pub struct ModListCache {
    ttl: Duration,
    slots: Mutex<HashMap<(i64, i64), Slot>>,
}

impl Default for ModListCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ModListCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// キャッシュヒットなら保持値、ミスなら `fetch` を1度だけ実行して保存
    ///
    /// 同一キーの並行呼び出しは同じ取得を待ち合わせます。
    /// 取得が失敗した場合、値は保存されず次の呼び出しが再取得します。
    pub async fn get_or_fetch<F, Fut>(
        &self,
        modpack_id: i64,
        file_id: i64,
        fetch: F,
    ) -> Result<Arc<Vec<ModListEntry>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ModListEntry>>>,
    {
        let key = (modpack_id, file_id);
        let cell = {
            let mut slots = self.slots.lock().await;
            match slots.get(&key) {
                Some(slot) if slot.created.elapsed() < self.ttl => slot.cell.clone(),
                _ => {
                    debug!(modpack_id, file_id, "mod list cache slot (re)created");
                    let cell = Arc::new(OnceCell::new());
                    slots.insert(
                        key,
                        Slot {
                            cell: cell.clone(),
                            created: Instant::now(),
                        },
                    );
                    cell
                }
            }
        };

        cell.get_or_try_init(|| async { fetch().await.map(Arc::new) })
            .await
            .cloned()
    }

    /// 期限切れスロットを掃除
    pub async fn evict_expired(&self) {
        let mut slots = self.slots.lock().await;
        slots.retain(|_, slot| slot.created.elapsed() < self.ttl);
    }
}
