use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::info;

const BLOCKED_TOKEN_PREFIX: &str = "blocked_token";

/// Tokens revoked (logged out) before they expired.
#[async_trait]
pub trait TokenBlocklist: Send + Sync {
    async fn is_token_revoked(&self, token: &str) -> Result<bool, redis::RedisError>;
}

#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

impl RedisService {
    /// Parses the URL only; no connection is made until first use.
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.get_conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("✅ Connected to Redis");
        Ok(())
    }

    pub async fn get_conn(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

#[async_trait]
impl TokenBlocklist for RedisService {
    async fn is_token_revoked(&self, token: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.get_conn().await?;
        conn.exists(format!("{}:{}", BLOCKED_TOKEN_PREFIX, token)).await
    }
}
