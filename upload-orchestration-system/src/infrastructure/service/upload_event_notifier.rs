use domain_upload::command::UploadEvent;
use typed_builder::TypedBuilder;

/// Fans upload events out to the log and, when configured, a notification webhook.
#[derive(TypedBuilder)]
pub struct UploadEventNotifier {
    http_client: reqwest::Client,
    #[builder(default)]
    webhook_url: Option<String>,
}

impl UploadEventNotifier {
    pub async fn notify(&self, event: &UploadEvent) -> anyhow::Result<()> {
        match event {
            UploadEvent::VideoPublished {
                session_id,
                video_id,
                artifact_location,
                ..
            } => tracing::info!(
                owner_id = event.owner_id(),
                session_id,
                video_id,
                "Video published at {artifact_location}"
            ),
            UploadEvent::UploadCancelled {
                session_id,
                reclaimed_bytes,
                ..
            } => tracing::info!(
                owner_id = event.owner_id(),
                session_id,
                reclaimed_bytes,
                "Upload cancelled"
            ),
            UploadEvent::UploadFailed {
                session_id, reason, ..
            } => tracing::warn!(
                owner_id = event.owner_id(),
                session_id,
                "Upload failed: {reason}"
            ),
        }
        let Some(url) = &self.webhook_url else {
            return Ok(());
        };
        self.http_client
            .post(url)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        tracing::debug!("Sent {} event to {url}", event.kind());
        Ok(())
    }
}
