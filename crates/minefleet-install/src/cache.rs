//! 内容アドレスのアーティファクトキャッシュ
//!
//! ダウンロード済みアーティファクトをSHA-256で格納します。
//! 第二層として任意のキー（例: `vanilla-1.20.4`）→ ハッシュの索引を持ちます。
//! 読み出しは再ハッシュで検証し、書き込みはアトミック
//! （一時ファイル + rename）です。削除（eviction）は任意であり、
//! 正しさは削除に依存しません。

use minefleet_core::{EngineError, Result};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{debug, info};

pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, hash: &str) -> PathBuf {
        self.root.join("objects").join(hash)
    }

    fn index_path(&self, key: &str) -> PathBuf {
        self.root.join("index").join(key)
    }

    /// バイト列を格納してハッシュを返す
    pub fn put(&self, bytes: &[u8]) -> Result<String> {
        let hash = hex::encode(Sha256::digest(bytes));
        let path = self.object_path(&hash);
        if path.exists() {
            return Ok(hash);
        }

        std::fs::create_dir_all(path.parent().expect("objects dir"))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        debug!(hash = %hash, bytes = bytes.len(), "artifact stored");
        Ok(hash)
    }

    /// ハッシュで取り出し（再ハッシュで検証）
    pub fn get(&self, hash: &str) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(hash);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        let actual = hex::encode(Sha256::digest(&bytes));
        if actual != hash {
            return Err(EngineError::ChecksumMismatch {
                path: path.display().to_string(),
            });
        }
        Ok(Some(bytes))
    }

    /// 索引キーをハッシュへ対応付け
    pub fn link(&self, key: &str, hash: &str) -> Result<()> {
        let path = self.index_path(key);
        std::fs::create_dir_all(path.parent().expect("index dir"))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, hash)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// 索引キーからハッシュを引く
    pub fn lookup(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.index_path(key))
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// 索引キーで取り出し（索引 + 検証読み出し）
    pub fn get_by_key(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.lookup(key) {
            Some(hash) => self.get(&hash),
            None => Ok(None),
        }
    }

    /// 古いオブジェクトから削除してサイズ上限へ収める（任意機能）
    pub fn evict_to(&self, max_bytes: u64) -> Result<()> {
        let objects_dir = self.root.join("objects");
        if !objects_dir.exists() {
            return Ok(());
        }

        let mut entries: Vec<(PathBuf, u64, std::time::SystemTime)> = Vec::new();
        let mut total: u64 = 0;
        for entry in std::fs::read_dir(&objects_dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if metadata.is_file() {
                total += metadata.len();
                entries.push((
                    entry.path(),
                    metadata.len(),
                    metadata.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
                ));
            }
        }
        if total <= max_bytes {
            return Ok(());
        }

        entries.sort_by_key(|(_, _, modified)| *modified);
        for (path, size, _) in entries {
            if total <= max_bytes {
                break;
            }
            std::fs::remove_file(&path)?;
            total = total.saturating_sub(size);
            info!(path = %path.display(), "artifact evicted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (tempfile::TempDir, ArtifactCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        (dir, cache)
    }

    /// 格納と取り出しの往復を確認
    #[test]
    fn test_put_get_roundtrip() {
        let (_dir, cache) = cache();
        let hash = cache.put(b"server jar bytes").unwrap();
        let loaded = cache.get(&hash).unwrap().unwrap();
        assert_eq!(loaded, b"server jar bytes");
    }

    /// 破損オブジェクトがChecksumMismatchになることを確認
    #[test]
    fn test_corrupted_object_fails_verification() {
        let (dir, cache) = cache();
        let hash = cache.put(b"original").unwrap();
        std::fs::write(dir.path().join("objects").join(&hash), b"tampered").unwrap();

        let err = cache.get(&hash).unwrap_err();
        assert_eq!(err.kind(), "ChecksumMismatch");
    }

    /// 索引キー経由の取り出しを確認
    #[test]
    fn test_index_lookup() {
        let (_dir, cache) = cache();
        let hash = cache.put(b"paper jar").unwrap();
        cache.link("paper-1.20.4", &hash).unwrap();

        assert_eq!(cache.lookup("paper-1.20.4").unwrap(), hash);
        assert_eq!(cache.get_by_key("paper-1.20.4").unwrap().unwrap(), b"paper jar");
        assert!(cache.get_by_key("paper-1.99.9").unwrap().is_none());
    }

    /// evictionが古いものから削除することを確認
    #[test]
    fn test_evict_oldest_first() {
        let (_dir, cache) = cache();
        let old_hash = cache.put(&[0u8; 1024]).unwrap();
        // mtimeに差をつける
        std::thread::sleep(std::time::Duration::from_millis(20));
        let new_hash = cache.put(&[1u8; 1024]).unwrap();

        cache.evict_to(1500).unwrap();
        assert!(cache.get(&old_hash).unwrap().is_none());
        assert!(cache.get(&new_hash).unwrap().is_some());
    }
}
