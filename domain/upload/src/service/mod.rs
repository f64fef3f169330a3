mod artifact;
mod cache;
mod catalog;
mod message_queue;
mod quota;
mod upload;

#[rustfmt::skip]
pub use {
    artifact::ArtifactStore,
    cache::ChunkCacheService,
    catalog::VideoCatalog,
    message_queue::MessageQueueProducerTemplate,
    quota::QuotaService,
    upload::UploadService,
};
