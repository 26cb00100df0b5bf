//! サーバーレコード定義

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// エンジン系統（ゲームサーバーの種別）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineFamily {
    Vanilla,
    Paper,
    Spigot,
    Bukkit,
    Fabric,
    Forge,
    NeoForge,
    Quilt,
    Purpur,
    Folia,
}

impl EngineFamily {
    /// jar命名や検出キーワードに使う小文字名
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineFamily::Vanilla => "vanilla",
            EngineFamily::Paper => "paper",
            EngineFamily::Spigot => "spigot",
            EngineFamily::Bukkit => "bukkit",
            EngineFamily::Fabric => "fabric",
            EngineFamily::Forge => "forge",
            EngineFamily::NeoForge => "neoforge",
            EngineFamily::Quilt => "quilt",
            EngineFamily::Purpur => "purpur",
            EngineFamily::Folia => "folia",
        }
    }

    /// インストーラー実行を経由する系統かどうか
    pub fn uses_installer(&self) -> bool {
        matches!(self, EngineFamily::Forge | EngineFamily::NeoForge)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vanilla" => Some(EngineFamily::Vanilla),
            "paper" => Some(EngineFamily::Paper),
            "spigot" => Some(EngineFamily::Spigot),
            "bukkit" => Some(EngineFamily::Bukkit),
            "fabric" => Some(EngineFamily::Fabric),
            "neoforge" => Some(EngineFamily::NeoForge),
            "forge" => Some(EngineFamily::Forge),
            "quilt" => Some(EngineFamily::Quilt),
            "purpur" => Some(EngineFamily::Purpur),
            "folia" => Some(EngineFamily::Folia),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// サーバーのライフサイクル状態
///
/// 遷移はスーパーバイザーのイベントだけが確定させます。
/// Stopped / Exited / Error が終端です。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Exited,
    Error,
}

impl LifecycleState {
    /// スーパーバイザーエントリが存在すべき状態かどうか
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            LifecycleState::Starting | LifecycleState::Running | LifecycleState::Stopping
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Stopped | LifecycleState::Exited | LifecycleState::Error
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Stopped => "Stopped",
            LifecycleState::Starting => "Starting",
            LifecycleState::Running => "Running",
            LifecycleState::Stopping => "Stopping",
            LifecycleState::Exited => "Exited",
            LifecycleState::Error => "Error",
        };
        f.write_str(s)
    }
}

/// ストレージの種別
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "token")]
pub enum Storage {
    /// 名前付きボリューム識別子
    NamedVolume(String),
    /// ホスト上のバインドパス
    BindPath(String),
}

/// ゲーム難易度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Peaceful,
    #[default]
    Easy,
    Normal,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Difficulty::Peaceful => "peaceful",
            Difficulty::Easy => "easy",
            Difficulty::Normal => "normal",
            Difficulty::Hard => "hard",
        };
        f.write_str(s)
    }
}

/// ゲームモード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Gamemode {
    #[default]
    Survival,
    Creative,
    Adventure,
    Spectator,
}

impl std::fmt::Display for Gamemode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Gamemode::Survival => "survival",
            Gamemode::Creative => "creative",
            Gamemode::Adventure => "adventure",
            Gamemode::Spectator => "spectator",
        };
        f.write_str(s)
    }
}

/// ゲームオプション（server.propertiesへ描画される）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOptions {
    pub seed: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub gamemode: Gamemode,
    #[serde(default = "default_true")]
    pub pvp: bool,
    #[serde(default)]
    pub whitelist: bool,
    #[serde(default = "default_true")]
    pub online_mode: bool,
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    #[serde(default = "default_motd")]
    pub motd: String,
}

fn default_true() -> bool {
    true
}
fn default_max_players() -> u32 {
    20
}
fn default_motd() -> String {
    "A MineFleet Server".to_string()
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            seed: None,
            difficulty: Difficulty::default(),
            gamemode: Gamemode::default(),
            pvp: true,
            whitelist: false,
            online_mode: true,
            max_players: default_max_players(),
            motd: default_motd(),
        }
    }
}

/// サーバーレコード（永続）
///
/// 不変条件:
/// - `name` と `port` はレジストリ内で一意
/// - `state.is_live()` のときスーパーバイザーエントリが存在する
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub engine: EngineFamily,
    pub version: String,
    pub port: u16,
    pub memory_mb: u32,
    #[serde(default)]
    pub java_opts: String,
    #[serde(default)]
    pub auto_start: bool,
    pub state: LifecycleState,
    pub storage: Storage,
    /// プロセス／コンテナの不透明ハンドル
    pub process_handle: Option<String>,
    #[serde(default)]
    pub game: GameOptions,
    /// 追加のserver.propertiesエントリ
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    pub modpack_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServerRecord {
    pub fn new(name: impl Into<String>, engine: EngineFamily, version: impl Into<String>, port: u16, memory_mb: u32) -> Self {
        let now = Utc::now();
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            storage: Storage::NamedVolume(format!("minefleet-{}", name)),
            name,
            description: None,
            engine,
            version: version.into(),
            port,
            memory_mb,
            java_opts: String::new(),
            auto_start: false,
            state: LifecycleState::Stopped,
            process_handle: None,
            game: GameOptions::default(),
            properties: BTreeMap::new(),
            modpack_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// is_liveの判定が状態図どおりであることを確認
    #[test]
    fn test_live_states() {
        assert!(LifecycleState::Starting.is_live());
        assert!(LifecycleState::Running.is_live());
        assert!(LifecycleState::Stopping.is_live());
        assert!(!LifecycleState::Stopped.is_live());
        assert!(!LifecycleState::Exited.is_live());
        assert!(!LifecycleState::Error.is_live());
    }

    /// エンジン名の往復変換を確認
    #[test]
    fn test_engine_parse_roundtrip() {
        for family in [
            EngineFamily::Vanilla,
            EngineFamily::Paper,
            EngineFamily::NeoForge,
            EngineFamily::Folia,
        ] {
            assert_eq!(EngineFamily::parse(family.as_str()), Some(family));
        }
        assert_eq!(EngineFamily::parse("unknown"), None);
    }

    /// レコードのシリアライズがcamelCaseであることを確認
    #[test]
    fn test_record_serializes_camel_case() {
        let record = ServerRecord::new("alpha", EngineFamily::Vanilla, "1.20.4", 25565, 2048);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("memoryMb").is_some());
        assert!(json.get("autoStart").is_some());
        assert_eq!(json["state"], "Stopped");
    }
}
