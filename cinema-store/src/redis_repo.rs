use async_trait::async_trait;
use cinema_core::{LockToken, SeatId, SeatLockStore, StoreError, StoreResult};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

const RELEASE_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    else
        return 0
    end
"#;

const EXTEND_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("PEXPIRE", KEYS[1], ARGV[2])
    else
        return 0
    end
"#;

/// Seat locks as plain Redis string keys with a server-side TTL.
#[derive(Clone)]
pub struct RedisClient {
    conn: MultiplexedConnection,
    release: redis::Script,
    extend: redis::Script,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis lock store");
        Ok(Self {
            conn,
            release: redis::Script::new(RELEASE_SCRIPT),
            extend: redis::Script::new(EXTEND_SCRIPT),
        })
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    ttl.as_millis().max(1) as u64
}

#[async_trait]
impl SeatLockStore for RedisClient {
    async fn set_if_absent(&self, seat: &SeatId, token: &LockToken, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();

        // SET NX: only set if key does not exist
        let result: Option<String> = redis::cmd("SET")
            .arg(seat.lock_key())
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(StoreError::unavailable)?;

        Ok(result.is_some())
    }

    async fn compare_and_delete(&self, seat: &SeatId, token: &LockToken) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .release
            .key(seat.lock_key())
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(StoreError::unavailable)?;
        Ok(deleted == 1)
    }

    async fn compare_and_expire(&self, seat: &SeatId, token: &LockToken, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let extended: i64 = self
            .extend
            .key(seat.lock_key())
            .arg(token.as_str())
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(StoreError::unavailable)?;
        Ok(extended == 1)
    }

    async fn get(&self, seat: &SeatId) -> StoreResult<Option<LockToken>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(seat.lock_key()).await.map_err(StoreError::unavailable)?;
        Ok(value.map(LockToken::from))
    }
}
