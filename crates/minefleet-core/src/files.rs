//! 安全なファイル操作
//!
//! サーバーのストレージディレクトリをルートとし、
//! パストラバーサルを事前に遮断した上でファイル操作を提供します。
//! 検証はいかなる変更よりも先に行われます。

use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// ディレクトリ一覧の1エントリ
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

/// 1つのサーバールートに閉じたファイルブラウザ
#[derive(Debug, Clone)]
pub struct SafeFiles {
    root: PathBuf,
}

impl SafeFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 相対パスを検証してルート配下の絶対パスへ解決
    ///
    /// `..` セグメント、絶対パス、ルートコンポーネントを拒否します。
    pub fn resolve(&self, requested: &str) -> Result<PathBuf> {
        let requested_path = Path::new(requested);

        if requested_path.is_absolute() {
            return Err(EngineError::InvalidPath(requested.to_string()));
        }

        for component in requested_path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                // `..`・ルート・プレフィックスはすべて拒否
                _ => return Err(EngineError::InvalidPath(requested.to_string())),
            }
        }

        Ok(self.root.join(requested_path))
    }

    /// ディレクトリ一覧（ディレクトリ優先、名前順）
    pub fn list(&self, requested: &str) -> Result<Vec<FileEntry>> {
        let dir = self.resolve(requested)?;
        if !dir.exists() {
            return Err(EngineError::NotFound(requested.to_string()));
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            let modified_at = metadata.modified().ok().map(DateTime::<Utc>::from);
            entries.push(FileEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: metadata.is_dir(),
                size_bytes: metadata.len(),
                modified_at,
            });
        }

        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        });

        Ok(entries)
    }

    /// テキストとして読み込み
    pub fn read_text(&self, requested: &str) -> Result<String> {
        let path = self.resolve(requested)?;
        if !path.is_file() {
            return Err(EngineError::NotFound(requested.to_string()));
        }
        Ok(std::fs::read_to_string(path)?)
    }

    /// 生バイト列として読み込み（ダウンロード用）
    pub fn read_bytes(&self, requested: &str) -> Result<Vec<u8>> {
        let path = self.resolve(requested)?;
        if !path.is_file() {
            return Err(EngineError::NotFound(requested.to_string()));
        }
        Ok(std::fs::read(path)?)
    }

    /// 書き込み（親ディレクトリは自動作成）
    pub fn write(&self, requested: &str, contents: &[u8]) -> Result<()> {
        let path = self.resolve(requested)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn mkdir(&self, requested: &str) -> Result<()> {
        let path = self.resolve(requested)?;
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    /// 削除（ディレクトリは再帰）
    pub fn delete(&self, requested: &str) -> Result<()> {
        let path = self.resolve(requested)?;
        if !path.exists() {
            return Err(EngineError::NotFound(requested.to_string()));
        }
        if path.is_dir() {
            std::fs::remove_dir_all(path)?;
        } else {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, SafeFiles) {
        let dir = tempfile::tempdir().unwrap();
        let files = SafeFiles::new(dir.path());
        (dir, files)
    }

    /// `..` を含むパスが変更前に拒否されることを確認
    #[test]
    fn test_rejects_parent_traversal() {
        let (_dir, files) = fixture();
        let err = files.resolve("../outside.txt").unwrap_err();
        assert_eq!(err.kind(), "InvalidPath");
        let err = files.resolve("mods/../../outside.txt").unwrap_err();
        assert_eq!(err.kind(), "InvalidPath");
    }

    /// 絶対パスが拒否されることを確認
    #[test]
    fn test_rejects_absolute_path() {
        let (_dir, files) = fixture();
        let err = files.resolve("/etc/passwd").unwrap_err();
        assert_eq!(err.kind(), "InvalidPath");
    }

    /// 書いた内容がそのまま読めることを確認
    #[test]
    fn test_write_read_roundtrip() {
        let (_dir, files) = fixture();
        files.write("config/foo.cfg", b"key=value").unwrap();
        assert_eq!(files.read_text("config/foo.cfg").unwrap(), "key=value");
    }

    /// 存在しないパスはNotFoundになることを確認
    #[test]
    fn test_missing_path_is_not_found() {
        let (_dir, files) = fixture();
        let err = files.read_text("nope.txt").unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    /// 一覧がディレクトリ優先・名前順であることを確認
    #[test]
    fn test_list_sorts_directories_first() {
        let (_dir, files) = fixture();
        files.write("b.txt", b"b").unwrap();
        files.write("A.txt", b"a").unwrap();
        files.mkdir("world").unwrap();
        files.mkdir("Config").unwrap();

        let names: Vec<(String, bool)> = files
            .list("")
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.is_dir))
            .collect();

        assert_eq!(
            names,
            vec![
                ("Config".to_string(), true),
                ("world".to_string(), true),
                ("A.txt".to_string(), false),
                ("b.txt".to_string(), false),
            ]
        );
    }

    /// ディレクトリ削除が再帰的であることを確認
    #[test]
    fn test_delete_directory_recursively() {
        let (_dir, files) = fixture();
        files.write("world/region/r.0.0.mca", b"data").unwrap();
        files.delete("world").unwrap();
        assert_eq!(files.list("world").unwrap_err().kind(), "NotFound");
    }
}
