mod artifact_store;
mod quota;
mod temp_sweeper;
mod upload_event_notifier;
mod video_catalog;

#[rustfmt::skip]
pub use {
    artifact_store::{create_operator, OpendalArtifactStore},
    quota::RedisQuotaService,
    temp_sweeper::TempSweeper,
    upload_event_notifier::UploadEventNotifier,
    video_catalog::SeaOrmVideoCatalog,
};
