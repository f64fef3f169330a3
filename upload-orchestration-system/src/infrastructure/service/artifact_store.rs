use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use domain_upload::service::ArtifactStore;
use opendal::{
    services::{Fs, S3},
    Operator,
};
use tokio::io::AsyncReadExt;
use typed_builder::TypedBuilder;

use crate::infrastructure::config::{ObjectStoreConfig, ObjectStoreKind};

const WRITE_BUFFER: usize = 8 * 1024 * 1024;

/// Hands merged artifacts off to the durable object store.
#[derive(TypedBuilder)]
pub struct OpendalArtifactStore {
    operator: Operator,
    #[builder(default, setter(into))]
    public_base_url: String,
}

fn object_path(owner_id: i64, video_id: i64) -> String {
    format!("videos/{owner_id}/{video_id}/source.mp4")
}

pub fn create_operator(options: &ObjectStoreConfig) -> anyhow::Result<Operator> {
    Ok(match options.kind {
        ObjectStoreKind::S3 => {
            let mut builder = S3::default();
            builder
                .endpoint(&options.endpoint)
                .root(&options.root)
                .bucket(&options.bucket)
                .region(&options.region)
                .access_key_id(&options.access_key_id)
                .secret_access_key(&options.secret_access_key);
            Operator::new(builder)?.finish()
        }
        ObjectStoreKind::Fs => {
            let mut builder = Fs::default();
            builder.root(&options.root);
            Operator::new(builder)?.finish()
        }
    })
}

impl OpendalArtifactStore {
    fn location(&self, path: &str) -> String {
        if self.public_base_url.is_empty() {
            path.to_owned()
        } else {
            format!("{}/{path}", self.public_base_url.trim_end_matches('/'))
        }
    }
}

#[async_trait]
impl ArtifactStore for OpendalArtifactStore {
    async fn put_artifact(
        &self,
        owner_id: i64,
        video_id: i64,
        local_path: &Path,
    ) -> anyhow::Result<String> {
        let path = object_path(owner_id, video_id);
        let mut file = tokio::fs::File::open(local_path)
            .await
            .with_context(|| format!("open artifact {local_path:?}"))?;
        let mut writer = self.operator.writer(&path).await?;
        loop {
            let mut buf = Vec::with_capacity(WRITE_BUFFER);
            let read = (&mut file).take(WRITE_BUFFER as u64).read_to_end(&mut buf).await?;
            if read == 0 {
                break;
            }
            if let Err(e) = writer.write(buf).await {
                let _ = writer.abort().await;
                return Err(anyhow::Error::new(e).context(format!("write object {path}")));
            }
        }
        writer.close().await.with_context(|| format!("close object {path}"))?;
        tracing::debug!(owner_id, video_id, "Artifact stored at {path}");
        Ok(self.location(&path))
    }
}

#[cfg(test)]
mod tests {
    use opendal::services::Memory;

    use super::*;

    #[tokio::test]
    async fn artifact_is_copied_to_video_path() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("artifact");
        let content = vec![7u8; WRITE_BUFFER + 3];
        tokio::fs::write(&local, &content).await.unwrap();
        let operator = Operator::new(Memory::default()).unwrap().finish();
        let store = OpendalArtifactStore::builder()
            .operator(operator.clone())
            .public_base_url("https://cdn.example.com/")
            .build();

        let location = store.put_artifact(3, 99, &local).await.unwrap();
        assert_eq!(location, "https://cdn.example.com/videos/3/99/source.mp4");
        let stored = operator.read("videos/3/99/source.mp4").await.unwrap();
        assert_eq!(stored, content);
    }

    #[tokio::test]
    async fn missing_local_file_is_an_error() {
        let operator = Operator::new(Memory::default()).unwrap().finish();
        let store = OpendalArtifactStore::builder().operator(operator).build();
        assert!(store.put_artifact(1, 1, Path::new("/nonexistent/artifact")).await.is_err());
    }
}
