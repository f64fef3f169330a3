mod chunk_tracker;
mod session;

#[rustfmt::skip]
pub use {
    chunk_tracker::ChunkTracker,
    session::SessionStore,
};
