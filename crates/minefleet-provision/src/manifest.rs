//! モッドパックマニフェスト
//!
//! アーカイブ直下の `manifest.json` を厳密にデコードし、
//! 主モッドローダーのID接頭辞からエンジン系統を分類します。

use minefleet_core::{EngineError, EngineFamily, Result};
use serde::{Deserialize, Serialize};

/// Fabricのローダーバージョンが欠けている場合のフォールバック
const FABRIC_LOADER_FALLBACK: &str = "0.15.11";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackManifest {
    pub minecraft: MinecraftSection,
    #[serde(default)]
    pub files: Vec<ManifestFile>,
    #[serde(default = "default_overrides")]
    pub overrides: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
}

fn default_overrides() -> String {
    "overrides".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinecraftSection {
    pub version: String,
    #[serde(rename = "modLoaders", default)]
    pub mod_loaders: Vec<ModLoader>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModLoader {
    pub id: String,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFile {
    #[serde(rename = "projectID")]
    pub project_id: i64,
    #[serde(rename = "fileID")]
    pub file_id: i64,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl PackManifest {
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::ManifestInvalid(e.to_string()))
    }

    /// 主ローダー（primary指定、なければ先頭）
    pub fn primary_loader(&self) -> Option<&ModLoader> {
        self.minecraft
            .mod_loaders
            .iter()
            .find(|l| l.primary)
            .or_else(|| self.minecraft.mod_loaders.first())
    }
}

/// 主ローダーIDの接頭辞からエンジン系統とバージョン文字列を導出
///
/// - `forge-{v}` → Forge、バージョンは `{mcVersion}-{forgeVersion}`
/// - `fabric-{v}` → Fabric、バージョンはローダーバージョン（欠落時はフォールバック）
/// - `neoforge-{v}` → NeoForge、バージョンはローダーバージョン
/// - それ以外 → Vanilla、バージョンはmcVersion
pub fn classify_modloader(manifest: &PackManifest) -> (EngineFamily, String) {
    let mc_version = &manifest.minecraft.version;
    let Some(loader) = manifest.primary_loader() else {
        return (EngineFamily::Vanilla, mc_version.clone());
    };

    // neoforge- を forge- より先に照合する
    if let Some(version) = loader.id.strip_prefix("neoforge-") {
        return (EngineFamily::NeoForge, version.to_string());
    }
    if let Some(version) = loader.id.strip_prefix("forge-") {
        return (EngineFamily::Forge, format!("{mc_version}-{version}"));
    }
    if let Some(version) = loader.id.strip_prefix("fabric-") {
        let version = if version.is_empty() {
            FABRIC_LOADER_FALLBACK
        } else {
            version
        };
        return (EngineFamily::Fabric, version.to_string());
    }
    (EngineFamily::Vanilla, mc_version.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORGE_MANIFEST: &str = r#"{
        "minecraft": {
            "version": "1.20.1",
            "modLoaders": [{"id": "forge-47.2.0", "primary": true}]
        },
        "files": [
            {"projectID": 238222, "fileID": 4711},
            {"projectID": 250398, "fileID": 4820, "required": false}
        ],
        "overrides": "overrides",
        "name": "Test Pack",
        "version": "1.0.0"
    }"#;

    /// Forgeパックの分類とバージョン合成を確認
    #[test]
    fn test_classify_forge() {
        let manifest = PackManifest::parse(FORGE_MANIFEST).unwrap();
        let (engine, version) = classify_modloader(&manifest);
        assert_eq!(engine, EngineFamily::Forge);
        assert_eq!(version, "1.20.1-47.2.0");
    }

    /// Fabricパックの分類を確認
    #[test]
    fn test_classify_fabric() {
        let manifest = PackManifest::parse(
            r#"{"minecraft": {"version": "1.20.4", "modLoaders": [{"id": "fabric-0.15.3"}]}}"#,
        )
        .unwrap();
        let (engine, version) = classify_modloader(&manifest);
        assert_eq!(engine, EngineFamily::Fabric);
        assert_eq!(version, "0.15.3");
    }

    /// Fabricのローダーバージョン欠落時のフォールバックを確認
    #[test]
    fn test_fabric_fallback_version() {
        let manifest = PackManifest::parse(
            r#"{"minecraft": {"version": "1.20.4", "modLoaders": [{"id": "fabric-"}]}}"#,
        )
        .unwrap();
        let (_, version) = classify_modloader(&manifest);
        assert_eq!(version, "0.15.11");
    }

    /// NeoForgeがforge-接頭辞に誤一致しないことを確認
    #[test]
    fn test_classify_neoforge() {
        let manifest = PackManifest::parse(
            r#"{"minecraft": {"version": "1.21", "modLoaders": [{"id": "neoforge-21.0.167"}]}}"#,
        )
        .unwrap();
        let (engine, version) = classify_modloader(&manifest);
        assert_eq!(engine, EngineFamily::NeoForge);
        assert_eq!(version, "21.0.167");
    }

    /// ローダーなしはVanilla扱いになることを確認
    #[test]
    fn test_classify_without_loader() {
        let manifest =
            PackManifest::parse(r#"{"minecraft": {"version": "1.20.4", "modLoaders": []}}"#)
                .unwrap();
        let (engine, version) = classify_modloader(&manifest);
        assert_eq!(engine, EngineFamily::Vanilla);
        assert_eq!(version, "1.20.4");
    }

    /// primary指定のローダーが優先されることを確認
    #[test]
    fn test_primary_loader_wins() {
        let manifest = PackManifest::parse(
            r#"{"minecraft": {"version": "1.20.1", "modLoaders": [
                {"id": "fabric-0.15.3"},
                {"id": "forge-47.2.0", "primary": true}
            ]}}"#,
        )
        .unwrap();
        let (engine, _) = classify_modloader(&manifest);
        assert_eq!(engine, EngineFamily::Forge);
    }

    /// 壊れたマニフェストがManifestInvalidになることを確認
    #[test]
    fn test_invalid_manifest() {
        let err = PackManifest::parse("{not json").unwrap_err();
        assert_eq!(err.kind(), "ManifestInvalid");

        let err = PackManifest::parse(r#"{"files": []}"#).unwrap_err();
        assert_eq!(err.kind(), "ManifestInvalid");
    }

    /// requiredの既定値がtrueであることを確認
    #[test]
    fn test_required_defaults_true() {
        let manifest = PackManifest::parse(FORGE_MANIFEST).unwrap();
        assert!(manifest.files[0].required);
        assert!(!manifest.files[1].required);
    }
}
