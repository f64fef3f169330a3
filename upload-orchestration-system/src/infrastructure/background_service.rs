/// Long-running task started next to the web host.
#[async_trait::async_trait]
pub trait BackgroundService: Send + Sync {
    async fn run(&self);
}
