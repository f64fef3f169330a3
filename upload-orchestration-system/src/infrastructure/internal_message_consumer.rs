use std::sync::Arc;

use domain_upload::command::UploadEvent;

use super::{message_queue::ConsumerReturn, ServiceProvider};

pub fn upload_event_consumer(content: &str, sp: Arc<ServiceProvider>) -> ConsumerReturn<'_> {
    Box::pin(async move {
        let event: UploadEvent = serde_json::from_str(content)?;
        sp.notifier.notify(&event).await
    })
}
