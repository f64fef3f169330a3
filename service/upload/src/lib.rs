mod cache;
mod retry;
mod upload;

#[rustfmt::skip]
pub use {
    cache::LocalCacheServiceImpl,
    retry::RetryPolicy,
    upload::UploadServiceImpl,
};
