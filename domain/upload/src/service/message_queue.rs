use async_trait::async_trait;

/// Enqueue serializable messages to a topic without waiting for their consumers.
#[async_trait]
pub trait MessageQueueProducerTemplate<T>: Send + Sync
where
    T: Send + Sync,
{
    async fn send_object(&self, content: &T, topic: &str) -> anyhow::Result<()>;
}
