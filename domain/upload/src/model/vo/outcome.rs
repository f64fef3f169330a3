use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SessionStatus;

/// Returned by a successful start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedUpload {
    pub session_id: String,
    pub video_id: i64,
    /// Temp storage handle of the session.
    pub temp_dir: String,
    pub expires_at: DateTime<Utc>,
    /// Suggested chunk size in bytes.
    pub chunk_size: u64,
}

/// Returned for every accepted chunk, including repeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReceipt {
    pub uploaded_count: u32,
    pub total_chunks: u32,
    pub progress_percent: f64,
    pub already_marked: bool,
    pub is_complete: bool,
}

/// Outcome of a completed upload, kept on the session until it is reclaimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedUpload {
    pub video_id: i64,
    pub artifact_location: String,
    pub catalog_status: String,
    pub size_bytes: u64,
    pub digest: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStatus {
    Cleaned,
    /// The session was already gone.
    AlreadyReclaimed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcome {
    pub cleanup_status: CleanupStatus,
    pub reclaimed_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub uploaded_count: u32,
    pub total_chunks: u32,
    pub missing_chunks: Vec<u32>,
    pub progress_percent: f64,
    pub status: SessionStatus,
    pub eta_seconds: u64,
}
