use std::time::Duration;

use async_trait::async_trait;

use crate::model::entity::SessionKey;
use crate::model::vo::{Chunk, ChunkWrite, MergedArtifact};

/// # Local chunk cache
///
/// Each session owns one directory under the cache base holding raw chunks and the merged artifact.
#[async_trait]
pub trait ChunkCacheService: Send + Sync {
    /// Handle of the session directory, relative to the cache base.
    fn temp_dir(&self, key: &SessionKey) -> String;

    async fn provision(&self, key: &SessionKey) -> anyhow::Result<()>;

    /// Write a chunk, replacing an earlier copy. Never recreates a removed session directory.
    async fn write_chunk(&self, chunk: Chunk) -> anyhow::Result<ChunkWrite>;

    /// Concatenate chunks `1..=total_chunks` in order into the session artifact.
    async fn merge(&self, key: &SessionKey, total_chunks: u32) -> anyhow::Result<MergedArtifact>;

    /// Remove the session directory, returning the bytes it held. Idempotent.
    async fn reclaim(&self, key: &SessionKey) -> anyhow::Result<u64>;

    /// Remove session directories untouched for longer than `max_age`, returning how many.
    async fn sweep_expired(&self, max_age: Duration) -> anyhow::Result<usize>;
}
