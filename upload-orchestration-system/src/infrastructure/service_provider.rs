use std::{collections::HashMap, sync::Arc, time::Duration};

use domain_upload::service::{ChunkCacheService, UploadService};
use service_upload::{LocalCacheServiceImpl, UploadServiceImpl};

use super::{
    background_service::BackgroundService,
    config::UploadSystemConfig,
    database::{Database, RedisClient, RedisRepo},
    internal_message_consumer,
    message_queue::{ConsumerFn, InternalMessageQueueConsumer, InternalMessageQueueProducer},
    service::{
        create_operator, OpendalArtifactStore, RedisQuotaService, SeaOrmVideoCatalog, TempSweeper,
        UploadEventNotifier,
    },
};

/// Everything the handlers and background services share, built once at startup.
pub struct ServiceProvider {
    pub config: UploadSystemConfig,
    pub upload_service: Arc<dyn UploadService>,
    pub cache_service: Arc<dyn ChunkCacheService>,
    pub internal_message_queue_producer: Arc<InternalMessageQueueProducer>,
    pub notifier: Arc<UploadEventNotifier>,
}

impl ServiceProvider {
    pub async fn build(config: config::Config) -> anyhow::Result<Self> {
        let config: UploadSystemConfig = config.try_deserialize()?;
        let common_config = &config.common;
        let upload_config = &config.upload;

        let redis_client = Arc::new(RedisClient::open(&common_config.redis.urls)?);
        let redis_repository = Arc::new(RedisRepo::builder().client(redis_client.clone()).build());
        let database = Database::new(&common_config.db.url).await?;

        let cache_service: Arc<dyn ChunkCacheService> = Arc::new(
            LocalCacheServiceImpl::builder()
                .base(common_config.host.upload_file_path.as_str())
                .build(),
        );
        let quota_service = Arc::new(
            RedisQuotaService::builder()
                .repo(RedisRepo::builder().client(redis_client).build())
                .config(config.quota.clone())
                .build(),
        );
        let artifact_store = Arc::new(
            OpendalArtifactStore::builder()
                .operator(create_operator(&config.object_store)?)
                .public_base_url(config.object_store.public_base_url.as_str())
                .build(),
        );
        let catalog = Arc::new(SeaOrmVideoCatalog::builder().db(database).build());
        let internal_message_queue_producer = Arc::new(InternalMessageQueueProducer::new());

        let upload_service = Arc::new(
            UploadServiceImpl::builder()
                .session_store(redis_repository.clone())
                .chunk_tracker(redis_repository)
                .cache_service(cache_service.clone())
                .quota_service(quota_service)
                .artifact_store(artifact_store)
                .catalog(catalog)
                .event_producer(internal_message_queue_producer.clone())
                .event_topic(config.internal_topics.upload_events.as_str())
                .exp_msecs(common_config.redis.exp_msecs)
                .chunk_size(upload_config.chunk_size)
                .max_total_chunks(upload_config.max_total_chunks)
                .processing_lease_msecs(upload_config.processing_lease_msecs)
                .default_checksum_algorithm(upload_config.default_checksum_algorithm)
                .retry_policy(upload_config.handoff_retry)
                .build(),
        );

        let notifier = Arc::new(
            UploadEventNotifier::builder()
                .http_client(reqwest::Client::builder().build()?)
                .webhook_url(config.notification.webhook_url.clone())
                .build(),
        );

        Ok(Self {
            config,
            upload_service,
            cache_service,
            internal_message_queue_producer,
            notifier,
        })
    }

    pub fn background_services(self: &Arc<Self>) -> Vec<Arc<dyn BackgroundService>> {
        let mut fn_mapper: HashMap<String, ConsumerFn<ServiceProvider>> = HashMap::new();
        fn_mapper.insert(
            self.config.internal_topics.upload_events.to_owned(),
            internal_message_consumer::upload_event_consumer,
        );
        let consumer: Arc<dyn BackgroundService> = Arc::new(InternalMessageQueueConsumer::new(
            &self.internal_message_queue_producer,
            self.clone(),
            fn_mapper,
            self.config.notification.max_attempts,
            Duration::from_millis(self.config.notification.retry_delay_ms),
        ));
        let sweeper: Arc<dyn BackgroundService> = Arc::new(
            TempSweeper::builder()
                .cache_service(self.cache_service.clone())
                .interval(Duration::from_secs(self.config.upload.sweep_interval_secs))
                .max_age(Duration::from_millis(self.config.common.redis.exp_msecs.max(0) as u64))
                .build(),
        );
        vec![consumer, sweeper]
    }
}
