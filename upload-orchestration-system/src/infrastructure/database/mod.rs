mod orm;
mod redis;

#[rustfmt::skip]
pub use {
    self::orm::Database,
    self::redis::{RedisClient, RedisRepo},
};
