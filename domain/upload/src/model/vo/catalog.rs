use serde::{Deserialize, Serialize};

/// Metadata written to the video catalog once the artifact is durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub video_id: i64,
    pub owner_id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub size_bytes: u64,
    /// BLAKE3 hex of the artifact.
    pub digest: String,
}
