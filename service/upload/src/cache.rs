use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use domain_upload::{
    model::{
        entity::SessionKey,
        vo::{Chunk, ChunkWrite, MergedArtifact},
    },
    service::ChunkCacheService,
};
use tokio::io::AsyncWriteExt;
use typed_builder::TypedBuilder;
use uuid::Uuid;

const ARTIFACT_NAME: &str = "artifact";
const MULTIPART_DIR: &str = "multipart";

#[derive(TypedBuilder, Clone)]
pub struct LocalCacheServiceImpl {
    #[builder(default = "base_dir".into(), setter(into))]
    base: PathBuf,
}

impl LocalCacheServiceImpl {
    fn session_dir(&self, key: &SessionKey) -> PathBuf {
        self.base.join(self.temp_dir(key))
    }

    fn part_path(&self, key: &SessionKey, nth: u32) -> PathBuf {
        self.session_dir(key).join(nth.to_string())
    }

    fn artifact_path(&self, key: &SessionKey) -> PathBuf {
        self.session_dir(key).join(ARTIFACT_NAME)
    }

    async fn concat_parts(
        &self,
        key: &SessionKey,
        total_chunks: u32,
        staging: &Path,
    ) -> anyhow::Result<(u64, String)> {
        let mut out = tokio::fs::File::create(staging)
            .await
            .with_context(|| format!("create artifact {staging:?}"))?;
        let mut hasher = blake3::Hasher::new();
        let mut size = 0u64;
        for nth in 1..=total_chunks {
            let path = self.part_path(key, nth);
            let content = tokio::fs::read(&path)
                .await
                .with_context(|| format!("read chunk {nth} of session {key} at {path:?}"))?;
            hasher.update(&content);
            out.write_all(&content).await?;
            size += content.len() as u64;
        }
        out.flush().await?;
        out.sync_all().await?;
        Ok((size, hasher.finalize().to_hex().to_string()))
    }
}

async fn dir_size(dir: &Path) -> std::io::Result<u64> {
    let mut size = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if metadata.is_file() {
            size += metadata.len();
        }
    }
    Ok(size)
}

#[async_trait]
impl ChunkCacheService for LocalCacheServiceImpl {
    fn temp_dir(&self, key: &SessionKey) -> String {
        format!("{MULTIPART_DIR}/{}", key.tag())
    }

    async fn provision(&self, key: &SessionKey) -> anyhow::Result<()> {
        let dir = self.session_dir(key);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("provision temp dir {dir:?}"))?;
        Ok(())
    }

    async fn write_chunk(&self, chunk: Chunk) -> anyhow::Result<ChunkWrite> {
        let dir = self.session_dir(&chunk.key);
        let staging = dir.join(format!("{}.tmp-{}", chunk.nth, Uuid::new_v4().simple()));
        match tokio::fs::write(&staging, &chunk.content).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ChunkWrite::SessionGone),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("write chunk {} of session {}", chunk.nth, chunk.key)))
            }
        }
        // Rename so that a merge never observes a half written chunk.
        match tokio::fs::rename(&staging, self.part_path(&chunk.key, chunk.nth)).await {
            Ok(()) => Ok(ChunkWrite::Written {
                bytes: chunk.content.len() as u64,
            }),
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                if e.kind() == ErrorKind::NotFound {
                    Ok(ChunkWrite::SessionGone)
                } else {
                    Err(anyhow::Error::new(e)
                        .context(format!("commit chunk {} of session {}", chunk.nth, chunk.key)))
                }
            }
        }
    }

    async fn merge(&self, key: &SessionKey, total_chunks: u32) -> anyhow::Result<MergedArtifact> {
        let staging = self.session_dir(key).join(format!("{ARTIFACT_NAME}.tmp"));
        let (size_bytes, digest) = match self.concat_parts(key, total_chunks, &staging).await {
            Ok(x) => x,
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e);
            }
        };
        let path = self.artifact_path(key);
        tokio::fs::rename(&staging, &path).await?;
        Ok(MergedArtifact {
            path,
            size_bytes,
            digest,
        })
    }

    async fn reclaim(&self, key: &SessionKey) -> anyhow::Result<u64> {
        let dir = self.session_dir(key);
        let size = match dir_size(&dir).await {
            Ok(x) => x,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(anyhow::Error::new(e).context(format!("measure {dir:?}"))),
        };
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(size),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(anyhow::Error::new(e).context(format!("remove {dir:?}"))),
        }
    }

    async fn sweep_expired(&self, max_age: Duration) -> anyhow::Result<usize> {
        let root = self.base.join(MULTIPART_DIR);
        let mut entries = match tokio::fs::read_dir(&root).await {
            Ok(x) => x,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(anyhow::Error::new(e).context(format!("list {root:?}"))),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_dir() {
                continue;
            }
            let age = metadata.modified()?.elapsed().unwrap_or_default();
            if age < max_age {
                continue;
            }
            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Cannot sweep {:?}: {e}", entry.path()),
            }
        }
        Ok(removed)
    }
}
