use std::{sync::Arc, time::Duration};

use domain_upload::service::ChunkCacheService;
use tokio::time::interval;
use tracing::Instrument;
use typed_builder::TypedBuilder;

use crate::infrastructure::background_service::BackgroundService;

/// Removes chunk directories left behind by sessions that expired in the coordination store.
#[derive(TypedBuilder)]
pub struct TempSweeper {
    cache_service: Arc<dyn ChunkCacheService>,
    interval: Duration,
    max_age: Duration,
}

#[async_trait::async_trait]
impl BackgroundService for TempSweeper {
    async fn run(&self) {
        let mut interval = interval(self.interval);
        loop {
            interval.tick().await;
            let cache_service = self.cache_service.clone();
            let max_age = self.max_age;
            let sweep = async move {
                match cache_service.sweep_expired(max_age).await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!("Swept {removed} expired upload directories."),
                    Err(e) => tracing::error!("Sweeping upload directories failed: {e:?}"),
                }
            };
            sweep.instrument(tracing::trace_span!("temp_sweeper")).await;
        }
    }
}
