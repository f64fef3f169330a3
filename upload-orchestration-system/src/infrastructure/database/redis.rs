use std::sync::Arc;

use anyhow::Context;
use redis::{Cmd, FromRedisValue, RedisResult, ScriptInvocation};
use typed_builder::TypedBuilder;

#[derive(TypedBuilder)]
pub struct RedisRepo {
    pub client: Arc<RedisClient>,
}

#[derive(Clone)]
pub enum RedisClient {
    Single(redis::Client),
    Cluster(redis::cluster::ClusterClient),
}

pub enum RedisConnection {
    Single(redis::aio::MultiplexedConnection),
    Cluster(redis::cluster_async::ClusterConnection),
}

impl RedisClient {
    /// Single node for one url, cluster otherwise.
    pub fn open(urls: &[String]) -> anyhow::Result<Self> {
        Ok(match urls {
            [] => anyhow::bail!("No redis url configured."),
            [url] => RedisClient::Single(redis::Client::open(url.as_str())?),
            nodes => RedisClient::Cluster(redis::cluster::ClusterClient::new(nodes.to_vec())?),
        })
    }

    pub async fn get_connection(&self) -> anyhow::Result<RedisConnection> {
        let connection = match self {
            RedisClient::Single(s) => {
                RedisConnection::Single(s.get_multiplexed_tokio_connection().await?)
            }
            RedisClient::Cluster(c) => RedisConnection::Cluster(c.get_async_connection().await?),
        };
        Ok(connection)
    }
}

impl RedisConnection {
    pub async fn query<T: FromRedisValue>(&mut self, cmd: &Cmd) -> RedisResult<T> {
        match self {
            RedisConnection::Single(sc) => cmd.query_async(sc).await,
            RedisConnection::Cluster(cc) => cmd.query_async(cc).await,
        }
    }

    /// Run a script; the server executes it atomically.
    pub async fn invoke<T: FromRedisValue>(
        &mut self,
        invocation: &ScriptInvocation<'_>,
    ) -> RedisResult<T> {
        match self {
            RedisConnection::Single(sc) => invocation.invoke_async(sc).await,
            RedisConnection::Cluster(cc) => invocation.invoke_async(cc).await,
        }
    }
}

impl RedisRepo {
    pub async fn connection(&self) -> anyhow::Result<RedisConnection> {
        self.client.get_connection().await.context("Cannot connect to redis")
    }
}
