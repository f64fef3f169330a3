use async_trait::async_trait;

use crate::command::{StartUploadCommand, UploadChunkCommand};
use crate::exception::UploadResult;
use crate::model::entity::SessionKey;
use crate::model::vo::{CancelOutcome, ChunkReceipt, CompletedUpload, StartedUpload, UploadProgress};

/// # Resumable chunked upload service
///
/// A session is started with a fixed chunk count, chunks arrive in any order and any number of times,
/// and completion merges them in chunk order into one artifact exactly once.
/// Temp storage and session state are removed on completion, cancellation or expiry.
#[async_trait]
pub trait UploadService: Send + Sync {
    /// Reserve quota, create the session and provision temp storage.
    async fn start_upload(&self, cmd: StartUploadCommand) -> UploadResult<StartedUpload>;

    /// Verify, persist and acknowledge one chunk.
    async fn upload_chunk(&self, cmd: UploadChunkCommand) -> UploadResult<ChunkReceipt>;

    /// Merge, hand off and catalogue the artifact.
    ///
    /// Error `IncompleteUpload` with the missing chunk numbers when not every chunk arrived.
    async fn complete_upload(&self, key: &SessionKey) -> UploadResult<CompletedUpload>;

    /// Tear down session, tracker state and temp storage.
    async fn cancel_upload(&self, key: &SessionKey) -> UploadResult<CancelOutcome>;

    async fn get_upload_progress(&self, key: &SessionKey) -> UploadResult<UploadProgress>;
}
