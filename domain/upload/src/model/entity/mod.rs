mod session;

#[rustfmt::skip]
pub use {
    session::SessionKey,
    session::UploadSession,
};
