use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;

use crate::{
    command::UploadEvent,
    exception::UploadResult,
    model::{
        entity::{SessionKey, UploadSession},
        vo::{
            Chunk, ChunkProgress, ChunkWrite, CompletedUpload, MarkOutcome, MergedArtifact,
            QuotaDecision, SessionStatus, VideoRecord,
        },
    },
    repository::{ChunkTracker, SessionStore},
    service::{
        ArtifactStore, ChunkCacheService, MessageQueueProducerTemplate, QuotaService, VideoCatalog,
    },
};

mock! {
    pub UploadEventProducer {}
    #[async_trait]
    impl MessageQueueProducerTemplate<UploadEvent> for UploadEventProducer {
        async fn send_object(&self, content: &UploadEvent, topic: &str) -> anyhow::Result<()>;
    }
}

mock! {
    pub SessionStore {}
    #[async_trait]
    impl SessionStore for SessionStore {
        async fn create(&self, session: &UploadSession, ttl_ms: i64) -> UploadResult<()>;
        async fn get(&self, key: &SessionKey) -> UploadResult<(UploadSession, Option<CompletedUpload>)>;
        async fn transition(
            &self,
            key: &SessionKey,
            from: &[SessionStatus],
            to: SessionStatus,
        ) -> UploadResult<SessionStatus>;
        async fn acquire_processing(&self, key: &SessionKey, lease_ms: i64) -> UploadResult<String>;
        async fn renew_processing(&self, key: &SessionKey, lease: &str, lease_ms: i64) -> UploadResult<()>;
        async fn complete(
            &self,
            key: &SessionKey,
            lease: &str,
            outcome: &CompletedUpload,
        ) -> UploadResult<()>;
        async fn fail_processing(&self, key: &SessionKey, lease: &str) -> UploadResult<()>;
        async fn delete(&self, key: &SessionKey) -> UploadResult<()>;
    }
}

mock! {
    pub ChunkTracker {}
    #[async_trait]
    impl ChunkTracker for ChunkTracker {
        async fn mark_chunk(&self, key: &SessionKey, nth: u32) -> UploadResult<MarkOutcome>;
        async fn progress(&self, key: &SessionKey) -> UploadResult<ChunkProgress>;
    }
}

mock! {
    pub ChunkCacheService {}
    #[async_trait]
    impl ChunkCacheService for ChunkCacheService {
        fn temp_dir(&self, key: &SessionKey) -> String;
        async fn provision(&self, key: &SessionKey) -> anyhow::Result<()>;
        async fn write_chunk(&self, chunk: Chunk) -> anyhow::Result<ChunkWrite>;
        async fn merge(&self, key: &SessionKey, total_chunks: u32) -> anyhow::Result<MergedArtifact>;
        async fn reclaim(&self, key: &SessionKey) -> anyhow::Result<u64>;
        async fn sweep_expired(&self, max_age: Duration) -> anyhow::Result<usize>;
    }
}

mock! {
    pub QuotaService {}
    #[async_trait]
    impl QuotaService for QuotaService {
        async fn check_and_reserve(&self, owner_id: i64, bytes: u64) -> anyhow::Result<QuotaDecision>;
        async fn release(&self, owner_id: i64, bytes: u64) -> anyhow::Result<()>;
        async fn settle(&self, owner_id: i64, reserved: u64, actual: u64) -> anyhow::Result<()>;
    }
}

mock! {
    pub ArtifactStore {}
    #[async_trait]
    impl ArtifactStore for ArtifactStore {
        async fn put_artifact(
            &self,
            owner_id: i64,
            video_id: i64,
            local_path: &Path,
        ) -> anyhow::Result<String>;
    }
}

mock! {
    pub VideoCatalog {}
    #[async_trait]
    impl VideoCatalog for VideoCatalog {
        async fn allocate_video_id(&self) -> anyhow::Result<i64>;
        async fn insert_video_record(&self, record: &VideoRecord, source_url: &str) -> anyhow::Result<i64>;
    }
}
