//! Opaque keyed record store with compare-and-set writes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// A stored record together with its monotonically increasing version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedRecord {
    pub version: u64,
    pub payload: String,
}

/// Keyed durable store with atomic read-modify-write per record.
///
/// `put` with `expected_version: None` is create-if-absent; with `Some(v)` it
/// only writes when the stored version still equals `v`. Both return `false`
/// on conflict instead of failing, so callers drive their own retry loops.
/// No multi-record atomicity is offered or needed; records never reference
/// each other.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<VersionedRecord>>;

    /// Compare-and-set write. Returns `true` when the write was applied.
    async fn put(
        &self,
        key: &str,
        expected_version: Option<u64>,
        payload: String,
    ) -> StoreResult<bool>;

    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// All keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Cheap connectivity probe for health checks.
    async fn ping(&self) -> StoreResult<()>;
}

/// In-memory record store for tests and single-node setups.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, VersionedRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<VersionedRecord>> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn put(
        &self,
        key: &str,
        expected_version: Option<u64>,
        payload: String,
    ) -> StoreResult<bool> {
        let mut records = self.records.lock().await;
        match expected_version {
            None => {
                if records.contains_key(key) {
                    return Ok(false);
                }
                records.insert(key.to_string(), VersionedRecord { version: 1, payload });
                Ok(true)
            }
            Some(expected) => match records.get_mut(key) {
                Some(existing) if existing.version == expected => {
                    existing.version += 1;
                    existing.payload = payload;
                    Ok(true)
                }
                _ => Ok(false),
            },
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.records.lock().await.remove(key).is_some())
    }

    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .records
            .lock()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Version-checked write, executed server-side so concurrent callers
/// serialize on the record.
const CAS_SCRIPT: &str = r#"
local cur = redis.call('HGET', KEYS[1], 'version')
if ARGV[1] == '' then
    if cur then return 0 end
    redis.call('HSET', KEYS[1], 'version', 1, 'payload', ARGV[2])
    return 1
end
if not cur or cur ~= ARGV[1] then
    return 0
end
redis.call('HSET', KEYS[1], 'version', tonumber(cur) + 1, 'payload', ARGV[2])
return 1
"#;

/// Redis-backed record store.
///
/// Records live in hashes under `<namespace><key>` with `version` and
/// `payload` fields; writes go through [`CAS_SCRIPT`].
pub struct RedisStore {
    client: redis::Client,
    namespace: String,
    cas: redis::Script,
}

impl RedisStore {
    pub fn new(redis_url: &str, namespace: impl Into<String>) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            namespace: namespace.into(),
            cas: redis::Script::new(CAS_SCRIPT),
        })
    }

    /// Create from `REDIS_URL` with the default `remuxd:` namespace.
    pub fn from_env() -> StoreResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&url, "remuxd:")
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<VersionedRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let (version, payload): (Option<u64>, Option<String>) = redis::cmd("HMGET")
            .arg(self.full_key(key))
            .arg("version")
            .arg("payload")
            .query_async(&mut conn)
            .await?;

        match (version, payload) {
            (Some(version), Some(payload)) => Ok(Some(VersionedRecord { version, payload })),
            _ => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &str,
        expected_version: Option<u64>,
        payload: String,
    ) -> StoreResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let expected = expected_version.map(|v| v.to_string()).unwrap_or_default();
        let applied: i64 = self
            .cas
            .key(self.full_key(key))
            .arg(expected)
            .arg(payload)
            .invoke_async(&mut conn)
            .await?;

        if applied == 0 {
            debug!(key, "compare-and-set conflict");
        }
        Ok(applied == 1)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let removed: u64 = redis::cmd("DEL")
            .arg(self.full_key(key))
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let pattern = format!("{}{}*", self.namespace, prefix);
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            keys.extend(
                batch
                    .into_iter()
                    .filter_map(|k| k.strip_prefix(&self.namespace).map(str::to_string)),
            );

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_create_if_absent() {
        let store = MemoryStore::new();

        assert!(store.put("a", None, "one".into()).await.unwrap());
        // second create for the same key is a conflict
        assert!(!store.put("a", None, "two".into()).await.unwrap());

        let record = store.get("a").await.unwrap().unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.payload, "one");
    }

    #[tokio::test]
    async fn test_memory_store_cas_update() {
        let store = MemoryStore::new();
        store.put("a", None, "one".into()).await.unwrap();

        assert!(store.put("a", Some(1), "two".into()).await.unwrap());
        // stale version is rejected
        assert!(!store.put("a", Some(1), "three".into()).await.unwrap());

        let record = store.get("a").await.unwrap().unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(record.payload, "two");
    }

    #[tokio::test]
    async fn test_memory_store_keys_by_prefix() {
        let store = MemoryStore::new();
        store.put("task:1", None, "{}".into()).await.unwrap();
        store.put("task:2", None, "{}".into()).await.unwrap();
        store.put("attempt:1:1", None, "{}".into()).await.unwrap();

        let mut keys = store.keys("task:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["task:1", "task:2"]);
    }

    #[tokio::test]
    async fn test_memory_store_delete() {
        let store = MemoryStore::new();
        store.put("a", None, "one".into()).await.unwrap();

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.get("a").await.unwrap().is_none());
    }
}
