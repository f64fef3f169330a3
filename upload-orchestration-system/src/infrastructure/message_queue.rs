use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc, time::Duration};

use domain_upload::service::MessageQueueProducerTemplate;
use tracing::Instrument;

use super::background_service::BackgroundService;

pub type ConsumerReturn<'async_fn> =
    Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'async_fn>>;
pub type ConsumerFn<SP> =
    for<'async_fn> fn(content: &'async_fn str, sp: Arc<SP>) -> ConsumerReturn<'async_fn>;

#[derive(Debug, Clone)]
pub struct InternalMessage {
    pub target: String,
    pub body: String,
    /// Deliveries already attempted.
    pub attempt: u32,
}

/// In-process topic queue. Sends never wait for consumers.
pub struct InternalMessageQueueProducer {
    receiver: flume::Receiver<InternalMessage>,
    sender: flume::Sender<InternalMessage>,
}

#[async_trait::async_trait]
impl<T> MessageQueueProducerTemplate<T> for InternalMessageQueueProducer
where
    T: serde::Serialize + Send + Sync,
{
    async fn send_object(&self, content: &T, topic: &str) -> anyhow::Result<()> {
        Ok(self
            .sender
            .send_async(InternalMessage {
                target: topic.to_string(),
                body: serde_json::to_string(content)?,
                attempt: 0,
            })
            .await?)
    }
}

impl Default for InternalMessageQueueProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl InternalMessageQueueProducer {
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }

    pub fn get_receiver(&self) -> flume::Receiver<InternalMessage> {
        self.receiver.clone()
    }

    pub fn get_sender(&self) -> flume::Sender<InternalMessage> {
        self.sender.clone()
    }
}

/// Dispatches messages to the consumer mapped to their topic.
///
/// A failed message is enqueued again after `retry_delay` until `max_attempts` deliveries were made.
pub struct InternalMessageQueueConsumer<SP>
where
    SP: Send + Sync + 'static,
{
    receiver: flume::Receiver<InternalMessage>,
    sender: flume::Sender<InternalMessage>,
    service_provider: Arc<SP>,
    fn_mapper: HashMap<String, ConsumerFn<SP>>,
    max_attempts: u32,
    retry_delay: Duration,
}

#[async_trait::async_trait]
impl<SP> BackgroundService for InternalMessageQueueConsumer<SP>
where
    SP: Send + Sync + 'static,
{
    async fn run(&self) {
        loop {
            match self.receiver.recv_async().await {
                Ok(message) => {
                    tracing::trace!("message received: {:#?}.", message);
                    match self.fn_mapper.get(message.target.as_str()) {
                        Some(x) => {
                            let sp = self.service_provider.clone();
                            let result = x(message.body.as_str(), sp)
                                .instrument(tracing::trace_span!("internal_message_queue"))
                                .await;
                            if let Err(e) = result {
                                self.redeliver(message, e);
                            }
                        }
                        None => tracing::warn!("No such consumer: {}.", message.target),
                    }
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    return;
                }
            }
        }
    }
}

impl<SP> InternalMessageQueueConsumer<SP>
where
    SP: Send + Sync + 'static,
{
    pub fn new(
        producer: &InternalMessageQueueProducer,
        service_provider: Arc<SP>,
        fn_mapper: HashMap<String, ConsumerFn<SP>>,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            receiver: producer.get_receiver(),
            sender: producer.get_sender(),
            service_provider,
            fn_mapper,
            max_attempts,
            retry_delay,
        }
    }

    fn redeliver(&self, mut message: InternalMessage, error: anyhow::Error) {
        message.attempt += 1;
        if message.attempt >= self.max_attempts {
            tracing::error!(
                "Dropping message of topic {} after {} attempts: {error:?}",
                message.target,
                message.attempt
            );
            return;
        }
        tracing::warn!(
            "Message of topic {} failed on attempt {}, retrying: {error}",
            message.target,
            message.attempt
        );
        let sender = self.sender.clone();
        let delay = self.retry_delay * message.attempt;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = sender.send_async(message).await {
                tracing::error!("Cannot enqueue message again: {e}");
            }
        });
    }
}
