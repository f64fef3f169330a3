use std::path::Path;

use async_trait::async_trait;

/// Durable store of final video artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload the local file and return its source url.
    async fn put_artifact(
        &self,
        owner_id: i64,
        video_id: i64,
        local_path: &Path,
    ) -> anyhow::Result<String>;
}
