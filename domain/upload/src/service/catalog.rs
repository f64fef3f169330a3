use async_trait::async_trait;

use crate::model::vo::VideoRecord;

/// Relational catalog of published videos.
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    async fn allocate_video_id(&self) -> anyhow::Result<i64>;

    async fn insert_video_record(&self, record: &VideoRecord, source_url: &str)
        -> anyhow::Result<i64>;
}
