use serde::{Deserialize, Serialize};

use crate::model::entity::SessionKey;

/// Start a new upload session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadCommand {
    pub owner_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub total_chunks: u32,
    /// Explicit session token; generated when absent.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Size of the whole file, used for the quota reservation.
    #[serde(default)]
    pub estimated_size: Option<u64>,
}

/// Deliver one chunk of a session.
#[derive(Debug, Clone)]
pub struct UploadChunkCommand {
    pub key: SessionKey,
    pub chunk_number: u32,
    pub payload: Vec<u8>,
    /// `<hex>` or `<algo>:<hex>`.
    pub checksum: String,
}

/// Events emitted to the upload event topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum UploadEvent {
    #[serde(rename_all = "camelCase")]
    VideoPublished {
        owner_id: i64,
        session_id: String,
        video_id: i64,
        title: String,
        artifact_location: String,
        size_bytes: u64,
    },
    #[serde(rename_all = "camelCase")]
    UploadCancelled {
        owner_id: i64,
        session_id: String,
        reclaimed_bytes: u64,
    },
    #[serde(rename_all = "camelCase")]
    UploadFailed {
        owner_id: i64,
        session_id: String,
        reason: String,
    },
}

impl UploadEvent {
    pub fn owner_id(&self) -> i64 {
        match self {
            UploadEvent::VideoPublished { owner_id, .. }
            | UploadEvent::UploadCancelled { owner_id, .. }
            | UploadEvent::UploadFailed { owner_id, .. } => *owner_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            UploadEvent::VideoPublished { .. } => "video_published",
            UploadEvent::UploadCancelled { .. } => "upload_cancelled",
            UploadEvent::UploadFailed { .. } => "upload_failed",
        }
    }
}
