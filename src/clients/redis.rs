use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, Direction, Script, aio::MultiplexedConnection};
use tracing::{info, warn};

use crate::{
    clients::{IdempotencyStore, OverflowBuffer, QuarantineBuffer},
    config::Config,
    models::{retry::RetryConfig, status::IdempotencyStatus},
    utils::retry_with_backoff,
};

const STATUS_PROCESSING: &str = "processing";
const STATUS_DONE: &str = "done";

const RELEASE_UNLESS_DONE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return 0
end
redis.call('DEL', KEYS[1])
return 1
"#;

#[derive(Clone)]
pub struct RedisClient {
    connection: MultiplexedConnection,
    processing_ttl_seconds: u64,
    done_ttl_seconds: u64,
    overflow_list_key: String,
    in_flight_list_key: String,
    quarantine_list_key: String,
    retry_config: RetryConfig,
}

impl RedisClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to Redis");

        let client = Client::open(config.redis_url.as_str())
            .map_err(|_| anyhow!("Failed to create redis client"))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|_| anyhow!("Failed to connect to redis client"))?;

        info!("Redis connection established");

        Ok(Self {
            connection,
            processing_ttl_seconds: config.processing_ttl_seconds,
            done_ttl_seconds: config.done_ttl_seconds,
            overflow_list_key: config.overflow_list_key.clone(),
            in_flight_list_key: config.in_flight_list_key.clone(),
            quarantine_list_key: config.quarantine_list_key.clone(),
            retry_config: config.retry_config(),
        })
    }

    pub async fn ping(&self) -> Result<(), Error> {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| anyhow!("Redis ping failed: {}", e))?;

        Ok(())
    }

    fn idempotency_key(key: &str) -> String {
        format!("idempotency:{}", key)
    }
}

#[async_trait]
impl IdempotencyStore for RedisClient {
    async fn try_acquire(&self, key: &str) -> Result<bool, Error> {
        let key = Self::idempotency_key(key);
        let mut conn = self.connection.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(STATUS_PROCESSING)
            .arg("NX")
            .arg("EX")
            .arg(self.processing_ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow!("Failed to acquire idempotency key: {}", e))?;

        Ok(reply.is_some())
    }

    async fn mark_done(&self, key: &str) -> Result<(), Error> {
        let key = Self::idempotency_key(key);

        retry_with_backoff(&self.retry_config, || {
            let key_clone = key.clone();
            let mut conn = self.connection.clone();
            let ttl = self.done_ttl_seconds;

            async move {
                conn.set_ex::<_, _, ()>(&key_clone, STATUS_DONE, ttl)
                    .await
                    .map_err(|e| e.to_string())
            }
        })
        .await
        .map_err(|e| anyhow!("mark_done failed: {}", e))?;

        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), Error> {
        let key = Self::idempotency_key(key);
        let mut conn = self.connection.clone();

        conn.del::<_, ()>(&key)
            .await
            .map_err(|e| anyhow!("Failed to release idempotency key: {}", e))?;

        Ok(())
    }

    async fn release_unless_done(&self, key: &str) -> Result<bool, Error> {
        let key = Self::idempotency_key(key);
        let mut conn = self.connection.clone();

        let script = Script::new(RELEASE_UNLESS_DONE);
        let released: i32 = script
            .key(&key)
            .arg(STATUS_DONE)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| anyhow!("Failed to release idempotency key: {}", e))?;

        Ok(released == 1)
    }

    async fn status(&self, key: &str) -> Result<IdempotencyStatus, Error> {
        let key = Self::idempotency_key(key);
        let mut conn = self.connection.clone();

        let value: Option<String> = conn
            .get(&key)
            .await
            .map_err(|_| anyhow!("Failed to get cached value"))?;

        match value.as_deref() {
            None => Ok(IdempotencyStatus::NotFound),
            Some(STATUS_PROCESSING) => Ok(IdempotencyStatus::Processing),
            Some(STATUS_DONE) => Ok(IdempotencyStatus::Done),
            Some(other) => {
                warn!(key = %key, status = other, "Unknown idempotency status");
                Ok(IdempotencyStatus::NotFound)
            }
        }
    }
}

#[async_trait]
impl OverflowBuffer for RedisClient {
    async fn append(&self, entry: &str) -> Result<u64, Error> {
        let mut conn = self.connection.clone();

        let len: u64 = conn
            .lpush(&self.overflow_list_key, entry)
            .await
            .map_err(|e| anyhow!("Failed to append to overflow buffer: {}", e))?;

        Ok(len)
    }

    async fn claim_oldest(&self) -> Result<Option<String>, Error> {
        let mut conn = self.connection.clone();

        let entry: Option<String> = conn
            .lmove(
                &self.overflow_list_key,
                &self.in_flight_list_key,
                Direction::Right,
                Direction::Left,
            )
            .await
            .map_err(|e| anyhow!("Failed to claim overflow entry: {}", e))?;

        Ok(entry)
    }

    async fn acknowledge(&self, entry: &str) -> Result<(), Error> {
        let mut conn = self.connection.clone();

        conn.lrem::<_, _, ()>(&self.in_flight_list_key, 1, entry)
            .await
            .map_err(|e| anyhow!("Failed to remove in-flight entry: {}", e))?;

        Ok(())
    }

    async fn restore(&self, entry: &str) -> Result<(), Error> {
        let mut conn = self.connection.clone();

        redis::pipe()
            .atomic()
            .lrem(&self.in_flight_list_key, 1, entry)
            .ignore()
            .rpush(&self.overflow_list_key, entry)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| anyhow!("Failed to restore overflow entry: {}", e))?;

        Ok(())
    }

    async fn recover_in_flight(&self) -> Result<u64, Error> {
        let mut conn = self.connection.clone();
        let mut recovered = 0;

        loop {
            let moved: Option<String> = conn
                .lmove(
                    &self.in_flight_list_key,
                    &self.overflow_list_key,
                    Direction::Left,
                    Direction::Right,
                )
                .await
                .map_err(|e| anyhow!("Failed to recover in-flight entries: {}", e))?;

            if moved.is_none() {
                break;
            }
            recovered += 1;
        }

        Ok(recovered)
    }

    async fn pending_size(&self) -> Result<u64, Error> {
        let mut conn = self.connection.clone();

        conn.llen(&self.overflow_list_key)
            .await
            .map_err(|e| anyhow!("Failed to read overflow buffer length: {}", e))
    }

    async fn in_flight_size(&self) -> Result<u64, Error> {
        let mut conn = self.connection.clone();

        conn.llen(&self.in_flight_list_key)
            .await
            .map_err(|e| anyhow!("Failed to read in-flight length: {}", e))
    }
}

#[async_trait]
impl QuarantineBuffer for RedisClient {
    async fn quarantine(&self, raw: &str) -> Result<u64, Error> {
        let mut conn = self.connection.clone();

        let len: u64 = conn
            .lpush(&self.quarantine_list_key, raw)
            .await
            .map_err(|e| anyhow!("Failed to write quarantine buffer: {}", e))?;

        Ok(len)
    }

    async fn size(&self) -> Result<u64, Error> {
        let mut conn = self.connection.clone();

        conn.llen(&self.quarantine_list_key)
            .await
            .map_err(|e| anyhow!("Failed to read quarantine length: {}", e))
    }
}
