use async_trait::async_trait;

use crate::exception::UploadResult;
use crate::model::entity::SessionKey;
use crate::model::vo::{ChunkProgress, MarkOutcome};

/// # Chunk acknowledgment tracker
///
/// One membership set per session is the only record of received chunks.
#[async_trait]
pub trait ChunkTracker: Send + Sync {
    /// Validate `nth` against the session's chunk count, add it if absent and recount, atomically.
    ///
    /// Marking a member again leaves the count unchanged and reports `already_marked`.
    async fn mark_chunk(&self, key: &SessionKey, nth: u32) -> UploadResult<MarkOutcome>;

    /// Count and missing chunk numbers of the session.
    async fn progress(&self, key: &SessionKey) -> UploadResult<ChunkProgress>;
}
