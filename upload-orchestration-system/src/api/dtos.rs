use actix_easy_multipart::{tempfile::Tempfile, text::Text, MultipartForm};
use chrono::{DateTime, Utc};
use domain_upload::model::vo::{CompletedUpload, StartedUpload};
use serde::{Deserialize, Serialize};

#[derive(MultipartForm)]
pub struct UploadChunkRequest {
    pub session_id: Text<String>,
    pub owner_id: Text<i64>,
    pub chunk_number: Text<u32>,
    /// `<hex>` or `<algo>:<hex>`.
    pub chunk_checksum: Text<String>,
    pub bin: Vec<Tempfile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub session_id: String,
    pub owner_id: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadResponse {
    pub session_id: String,
    pub video_id: i64,
    pub temp_path_handle: String,
    pub expires_at: DateTime<Utc>,
    pub chunk_size: u64,
}

impl From<StartedUpload> for StartUploadResponse {
    fn from(value: StartedUpload) -> Self {
        Self {
            session_id: value.session_id,
            video_id: value.video_id,
            temp_path_handle: value.temp_dir,
            expires_at: value.expires_at,
            chunk_size: value.chunk_size,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadResponse {
    pub video_id: i64,
    pub artifact_location: String,
    pub catalog_status: String,
}

impl From<CompletedUpload> for CompleteUploadResponse {
    fn from(value: CompletedUpload) -> Self {
        Self {
            video_id: value.video_id,
            artifact_location: value.artifact_location,
            catalog_status: value.catalog_status,
        }
    }
}
