mod catalog;
mod checksum;
mod chunk;
mod outcome;
mod progress;
mod quota;
mod status;

#[rustfmt::skip]
pub use {
    catalog::*,
    checksum::*,
    chunk::*,
    outcome::*,
    progress::*,
    quota::*,
    status::*,
};
