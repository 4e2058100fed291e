use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Default entry lifetime: one week.
pub const DEFAULT_TTL_SECS: i64 = 604_800;

/// Cached generation result. Entries are immutable for their lifetime;
/// expired entries are treated as absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub sql: String,
    pub explanation: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: u64,
}

impl CacheEntry {
    pub fn new(
        sql: String,
        explanation: String,
        input_tokens: u64,
        output_tokens: u64,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            sql,
            explanation,
            input_tokens,
            output_tokens,
            created_at: now,
            expires_at: now + ttl,
            hit_count: 0,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[derive(Debug)]
pub struct CacheError(pub String);

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cache store error: {}", self.0)
    }
}

impl Error for CacheError {}

/// Normalization applied to the natural-language text before hashing:
/// trim, lowercase, collapse internal whitespace runs to a single space.
/// Raises the hit rate for near-identical phrasing without any fuzzy
/// matching.
pub fn normalize_question(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Deterministic cache key over (team, normalized question, schema
/// fingerprint).
pub fn derive_key(team_id: &str, question: &str, schema_fingerprint: &str) -> String {
    let composite = format!(
        "{}:{}:{}",
        team_id,
        normalize_question(question),
        schema_fingerprint
    );
    let mut hasher = Sha256::new();
    hasher.update(composite.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cache store contract. Unavailability must never fail a request; the
/// orchestrator treats any error as a miss.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;
}

/// In-process cache store with TTL expiry.
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if entry.is_expired() => {
                debug!("Cache entry expired for key {}...", &key[..16.min(key.len())]);
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => {
                entry.hit_count += 1;
                info!(
                    "Cache hit for key {}... (hits: {})",
                    &key[..16.min(key.len())],
                    entry.hit_count
                );
                Ok(Some(entry.clone()))
            }
            None => {
                debug!("Cache miss for key {}...", &key[..16.min(key.len())]);
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic() {
        let a = derive_key("team-1", "Show me all users", "abc123");
        let b = derive_key("team-1", "Show me all users", "abc123");
        assert_eq!(a, b);
    }

    #[test]
    fn key_normalizes_case_and_whitespace() {
        let a = derive_key("team-1", "Show me all users", "abc123");
        let b = derive_key("team-1", "  show ME   all\tusers ", "abc123");
        assert_eq!(a, b);
    }

    #[test]
    fn key_varies_with_each_component() {
        let base = derive_key("team-1", "show revenue", "abc123");
        assert_ne!(base, derive_key("team-2", "show revenue", "abc123"));
        assert_ne!(base, derive_key("team-1", "show costs", "abc123"));
        assert_ne!(base, derive_key("team-1", "show revenue", "def456"));
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryCacheStore::new();
        let entry = CacheEntry::new(
            "SELECT 1".to_string(),
            "constant".to_string(),
            100,
            20,
            Duration::seconds(DEFAULT_TTL_SECS),
        );
        store.put("k1", entry).await.unwrap();

        let hit = store.get("k1").await.unwrap().unwrap();
        assert_eq!(hit.sql, "SELECT 1");
        assert_eq!(hit.hit_count, 1);

        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_absent() {
        let store = MemoryCacheStore::new();
        let entry = CacheEntry::new(
            "SELECT 1".to_string(),
            "constant".to_string(),
            0,
            0,
            Duration::seconds(-1),
        );
        store.put("k1", entry).await.unwrap();
        assert!(store.get("k1").await.unwrap().is_none());
    }
}
