//! Catalog response schemas.
//!
//! Upstream responses are decoded into explicit per-operation shapes.
//! Unknown fields are collected into `extra`; a missing required field is a
//! decode failure surfaced as `UpstreamUnavailable` by the client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Generic upstream envelope: `{ "data": …, "pagination": … }`
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    pub pagination: Option<Paging>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging {
    pub index: u32,
    pub page_size: u32,
    pub result_count: u32,
    pub total_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Logo {
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModpackLinks {
    pub website_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Search hit for a modpack/mod project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub summary: Option<String>,
    #[serde(default)]
    pub authors: Vec<Author>,
    pub logo: Option<Logo>,
    pub download_count: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Full metadata for one modpack project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModpackMeta {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub summary: Option<String>,
    #[serde(default)]
    pub authors: Vec<Author>,
    pub logo: Option<Logo>,
    pub links: Option<ModpackLinks>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One downloadable file of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDetail {
    pub id: i64,
    pub file_name: String,
    pub download_url: Option<String>,
    pub file_length: Option<u64>,
    #[serde(default)]
    pub game_versions: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Metadata for one referenced mod (bulk lookup).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModMetadata {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub summary: Option<String>,
    pub logo: Option<Logo>,
    pub links: Option<ModpackLinks>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Enriched mod-list entry: manifest reference joined with catalog metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModListEntry {
    #[serde(rename = "projectID")]
    pub project_id: i64,
    #[serde(rename = "fileID")]
    pub file_id: i64,
    pub required: bool,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub summary: Option<String>,
    pub logo: Option<String>,
    pub website_url: Option<String>,
}
