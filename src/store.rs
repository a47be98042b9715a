use anyhow::Context as _;
use async_trait::async_trait;
use redis::AsyncCommands as _;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;

use crate::card::Card;

/// The single key holding the whole serialized card list. Every visitor
/// shares one list; there are no per-card keys and no secondary indexes.
pub const CARDS_KEY: &str = "global_cards";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("card store unavailable: {0}")]
    Unavailable(String),
    #[error("stored card list is not valid card data: {0}")]
    Deserialization(String),
}

/// Load-everything / overwrite-everything persistence.
///
/// There is deliberately no merge or versioning: the last `save_all` wins,
/// which is acceptable for the single casual writer this targets. Concurrent
/// sessions will clobber each other.
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Returns the stored list; an absent value is an empty list, never an
    /// error. A present-but-malformed value is surfaced as
    /// [`StoreError::Deserialization`] rather than silently dropped.
    async fn load_all(&self) -> Result<Vec<Card>, StoreError>;

    /// Serializes and overwrites the entire stored value.
    async fn save_all(&self, cards: &[Card]) -> Result<(), StoreError>;
}

pub struct RedisCardStore {
    manager: ConnectionManager,
    key: String,
}

impl RedisCardStore {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url).context("create redis client")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("connect to redis")?;
        tracing::info!("redis connection established");

        Ok(Self {
            manager,
            key: CARDS_KEY.to_string(),
        })
    }
}

#[async_trait]
impl CardStore for RedisCardStore {
    async fn load_all(&self) -> Result<Vec<Card>, StoreError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(&self.key)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;

        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).map_err(|err| StoreError::Deserialization(err.to_string()))
    }

    async fn save_all(&self, cards: &[Card]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(cards)
            .map_err(|err| StoreError::Deserialization(err.to_string()))?;

        let mut conn = self.manager.clone();
        conn.set::<_, _, ()>(&self.key, raw)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(())
    }
}

/// Same blob semantics as the redis store, held in memory. Backs tests and
/// `--redis-url`-less local runs; nothing survives a restart.
#[derive(Default)]
pub struct MemoryCardStore {
    value: Mutex<Option<String>>,
}

impl MemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the raw stored value, valid JSON or not.
    pub fn with_raw_value(raw: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(raw.into())),
        }
    }
}

#[async_trait]
impl CardStore for MemoryCardStore {
    async fn load_all(&self) -> Result<Vec<Card>, StoreError> {
        let value = self.value.lock().await;
        let Some(raw) = value.as_deref() else {
            return Ok(Vec::new());
        };
        serde_json::from_str(raw).map_err(|err| StoreError::Deserialization(err.to_string()))
    }

    async fn save_all(&self, cards: &[Card]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(cards)
            .map_err(|err| StoreError::Deserialization(err.to_string()))?;
        *self.value.lock().await = Some(raw);
        Ok(())
    }
}
